use crate::domain::account::{Account, AccountId, Currency};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AccountRow<'a> {
    id: AccountId,
    owner: &'a str,
    balance: i64,
    currency: Currency,
}

/// Writes the account report as CSV: `id,owner,balance,currency`.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes one row per account, in the order given, and flushes.
    pub fn write_accounts<'a>(
        &mut self,
        accounts: impl IntoIterator<Item = &'a Account>,
    ) -> Result<()> {
        for account in accounts {
            self.writer.serialize(AccountRow {
                id: account.id,
                owner: &account.owner,
                balance: account.balance,
                currency: account.currency,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
