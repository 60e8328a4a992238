use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned account identifier. Ascending ids define the lock order.
pub type AccountId = i64;

/// The fixed set of currencies an account can be opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Cad,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Eur, Currency::Cad];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Cad => "CAD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::ALL
            .into_iter()
            .find(|currency| currency.code() == s)
            .ok_or_else(|| LedgerError::ValidationError(format!("unsupported currency: {s}")))
    }
}

/// A monetary account.
///
/// `balance` is expressed in minor currency units and only ever changes
/// through a signed delta applied inside a transaction that also records the
/// matching [`Entry`](crate::domain::transfer::Entry).
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub balance: i64,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// A freshly opened account. Balance always starts at zero.
    pub fn open(id: AccountId, owner: impl Into<String>, currency: Currency) -> Self {
        Self {
            id,
            owner: owner.into(),
            balance: 0,
            currency,
            created_at: Utc::now(),
        }
    }

    /// Returns a copy with `delta` added to the balance, rejecting overflow.
    pub fn with_delta(&self, delta: i64) -> Result<Self, LedgerError> {
        let balance = self.balance.checked_add(delta).ok_or_else(|| {
            LedgerError::ConstraintViolation(format!(
                "balance of account {} out of range after adding {}",
                self.id, delta
            ))
        })?;
        Ok(Self {
            balance,
            ..self.clone()
        })
    }
}

/// One page of a listing, in ascending id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub const MAX_PAGE_SIZE: usize = 10;

    /// Builds a page from a 1-based page id and a page size in `1..=10`.
    pub fn new(page_id: usize, page_size: usize) -> Result<Self, LedgerError> {
        if page_id < 1 {
            return Err(LedgerError::ValidationError(
                "page_id must be at least 1".to_string(),
            ));
        }
        if !(1..=Self::MAX_PAGE_SIZE).contains(&page_size) {
            return Err(LedgerError::ValidationError(format!(
                "page_size must be between 1 and {}",
                Self::MAX_PAGE_SIZE
            )));
        }
        let offset = (page_id - 1)
            .checked_mul(page_size)
            .ok_or_else(|| LedgerError::ValidationError("page_id is out of range".to_string()))?;
        Ok(Self {
            limit: page_size,
            offset,
        })
    }

    /// Applies the page to an already ordered sequence.
    pub fn slice<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}
