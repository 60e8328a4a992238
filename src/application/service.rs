use super::balance::add_balance;
use super::engine::{TransferEngine, TransferTx};
use crate::domain::account::{Account, AccountId, Currency, Page};
use crate::domain::ports::{LedgerTransaction, UnitOfWork};
use crate::domain::transfer::{Entry, Transfer, TransferTxParams, TransferTxResult};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// A transfer as requested by a client, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
    pub currency: Currency,
}

impl TransferRequest {
    fn validate(&self) -> Result<TransferTxParams> {
        if self.from_account_id < 1 || self.to_account_id < 1 {
            return Err(LedgerError::ValidationError(
                "account ids must be at least 1".to_string(),
            ));
        }
        if self.from_account_id == self.to_account_id {
            return Err(LedgerError::ValidationError(
                "cannot transfer to the same account".to_string(),
            ));
        }
        if self.amount <= 0 {
            return Err(LedgerError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }
        Ok(TransferTxParams {
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
            amount: self.amount,
        })
    }
}

/// Request-facing operations on the ledger.
///
/// Validates input, then drives the [`TransferEngine`]. Currency and funds
/// checks run inside the same unit of work as the transfer itself, so a
/// rejected request never commits any money movement.
pub struct LedgerService {
    engine: TransferEngine,
    max_retries: u32,
}

impl LedgerService {
    pub fn new(engine: TransferEngine) -> Self {
        Self {
            engine,
            max_retries: 0,
        }
    }

    /// Retries a transfer that failed with `Conflict` up to `max_retries` times.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn engine(&self) -> &TransferEngine {
        &self.engine
    }

    pub async fn open_account(
        &self,
        owner: &str,
        currency: Currency,
        opening_balance: i64,
    ) -> Result<Account> {
        if owner.trim().is_empty() {
            return Err(LedgerError::ValidationError(
                "owner must not be empty".to_string(),
            ));
        }
        if opening_balance < 0 {
            return Err(LedgerError::ValidationError(
                "opening balance must not be negative".to_string(),
            ));
        }
        let account = self
            .engine
            .execute(OpenAccount {
                owner: owner.to_string(),
                currency,
                opening_balance,
            })
            .await?;
        tracing::info!(
            account_id = account.id,
            %currency,
            balance = account.balance,
            "account opened"
        );
        Ok(account)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account> {
        self.engine.execute(GetAccount(id)).await
    }

    pub async fn list_accounts(&self, page_id: usize, page_size: usize) -> Result<Vec<Account>> {
        let page = Page::new(page_id, page_size)?;
        self.engine.execute(ListAccounts(page)).await
    }

    /// Every account in ascending id order, fetched page by page.
    pub async fn all_accounts(&self) -> Result<Vec<Account>> {
        let mut accounts = Vec::new();
        for page_id in 1.. {
            let page = self.list_accounts(page_id, Page::MAX_PAGE_SIZE).await?;
            let last = page.len() < Page::MAX_PAGE_SIZE;
            accounts.extend(page);
            if last {
                break;
            }
        }
        Ok(accounts)
    }

    pub async fn account_entries(
        &self,
        id: AccountId,
        page_id: usize,
        page_size: usize,
    ) -> Result<Vec<Entry>> {
        let page = Page::new(page_id, page_size)?;
        self.engine.execute(ListEntries { id, page }).await
    }

    pub async fn account_transfers(
        &self,
        id: AccountId,
        page_id: usize,
        page_size: usize,
    ) -> Result<Vec<Transfer>> {
        let page = Page::new(page_id, page_size)?;
        self.engine.execute(ListTransfers { id, page }).await
    }

    /// Validates and executes a transfer.
    pub async fn create_transfer(&self, request: TransferRequest) -> Result<TransferTxResult> {
        let params = request.validate()?;
        let mut attempt = 0;
        loop {
            let work = CheckedTransfer {
                params,
                currency: request.currency,
            };
            match self.engine.execute(work).await {
                Err(err) if err.is_conflict() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "retrying conflicting transfer");
                }
                Err(err) => return Err(err),
                Ok(result) => {
                    tracing::info!(
                        transfer_id = result.transfer.id,
                        from = params.from_account_id,
                        to = params.to_account_id,
                        amount = params.amount,
                        "transfer committed"
                    );
                    return Ok(result);
                }
            }
        }
    }
}

struct OpenAccount {
    owner: String,
    currency: Currency,
    opening_balance: i64,
}

#[async_trait]
impl UnitOfWork for OpenAccount {
    type Output = Account;

    async fn run(self, tx: &mut dyn LedgerTransaction) -> Result<Account> {
        let account = tx.create_account(&self.owner, self.currency).await?;
        if self.opening_balance == 0 {
            return Ok(account);
        }
        tx.create_entry(account.id, self.opening_balance).await?;
        add_balance(tx, account.id, self.opening_balance).await
    }
}

struct GetAccount(AccountId);

#[async_trait]
impl UnitOfWork for GetAccount {
    type Output = Account;

    async fn run(self, tx: &mut dyn LedgerTransaction) -> Result<Account> {
        tx.get_account(self.0).await
    }
}

struct ListAccounts(Page);

#[async_trait]
impl UnitOfWork for ListAccounts {
    type Output = Vec<Account>;

    async fn run(self, tx: &mut dyn LedgerTransaction) -> Result<Vec<Account>> {
        tx.list_accounts(self.0).await
    }
}

struct ListEntries {
    id: AccountId,
    page: Page,
}

#[async_trait]
impl UnitOfWork for ListEntries {
    type Output = Vec<Entry>;

    async fn run(self, tx: &mut dyn LedgerTransaction) -> Result<Vec<Entry>> {
        tx.get_account(self.id).await?;
        tx.list_entries(self.id, self.page).await
    }
}

struct ListTransfers {
    id: AccountId,
    page: Page,
}

#[async_trait]
impl UnitOfWork for ListTransfers {
    type Output = Vec<Transfer>;

    async fn run(self, tx: &mut dyn LedgerTransaction) -> Result<Vec<Transfer>> {
        tx.get_account(self.id).await?;
        tx.list_transfers(self.id, self.page).await
    }
}

/// Currency checks, the transfer itself and the overdraft check, in one
/// transaction.
struct CheckedTransfer {
    params: TransferTxParams,
    currency: Currency,
}

async fn check_currency(
    tx: &mut dyn LedgerTransaction,
    id: AccountId,
    currency: Currency,
) -> Result<()> {
    let account = tx.get_account(id).await?;
    if account.currency != currency {
        return Err(LedgerError::CurrencyMismatch {
            account: id,
            expected: currency,
            actual: account.currency,
        });
    }
    Ok(())
}

#[async_trait]
impl UnitOfWork for CheckedTransfer {
    type Output = TransferTxResult;

    async fn run(self, tx: &mut dyn LedgerTransaction) -> Result<TransferTxResult> {
        check_currency(tx, self.params.from_account_id, self.currency).await?;
        check_currency(tx, self.params.to_account_id, self.currency).await?;
        let result = TransferTx::new(self.params).run(tx).await?;
        // Checked on the post-update snapshot, taken under the row lock.
        if result.from_account.balance < 0 {
            return Err(LedgerError::InsufficientFunds {
                account: result.from_account.id,
                balance: result.from_account.balance + self.params.amount,
                amount: self.params.amount,
            });
        }
        Ok(result)
    }
}
