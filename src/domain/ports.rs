use super::account::{Account, AccountId, Currency, Page};
use super::transfer::{Entry, EntryId, Transfer, TransferId, TransferTxParams};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A transactional ledger store.
///
/// Every record operation happens inside a [`LedgerTransaction`] obtained
/// from [`LedgerStore::begin`]. Implementations must be safe to share across
/// tasks; isolation between concurrent transactions is the store's job.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin<'a>(&'a self) -> Result<Box<dyn LedgerTransaction + 'a>>;
}

/// An open, rollback-capable store transaction.
///
/// Writes are not visible to other transactions until [`commit`] succeeds.
/// Dropping the transaction without committing discards its writes and
/// releases every row lock it holds.
///
/// [`commit`]: LedgerTransaction::commit
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Inserts a new account with a zero balance.
    async fn create_account(&mut self, owner: &str, currency: Currency) -> Result<Account>;
    async fn get_account(&mut self, id: AccountId) -> Result<Account>;
    async fn list_accounts(&mut self, page: Page) -> Result<Vec<Account>>;

    /// Adds `delta` to the balance as one atomic increment, taking the
    /// account's row lock for the rest of the transaction. Returns the
    /// account as it looks after the update.
    async fn add_account_balance(&mut self, id: AccountId, delta: i64) -> Result<Account>;

    async fn create_entry(&mut self, account_id: AccountId, amount: i64) -> Result<Entry>;
    async fn get_entry(&mut self, id: EntryId) -> Result<Entry>;
    async fn list_entries(&mut self, account_id: AccountId, page: Page) -> Result<Vec<Entry>>;

    async fn create_transfer(&mut self, params: TransferTxParams) -> Result<Transfer>;
    async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer>;
    /// Transfers where `account_id` is either the source or the destination.
    async fn list_transfers(&mut self, account_id: AccountId, page: Page)
    -> Result<Vec<Transfer>>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

pub type LedgerStoreBox = Box<dyn LedgerStore>;
pub type SharedLedgerStore = Arc<dyn LedgerStore>;

/// A sequence of store operations that must commit or roll back together.
#[async_trait]
pub trait UnitOfWork: Send {
    type Output: Send;

    async fn run(self, tx: &mut dyn LedgerTransaction) -> Result<Self::Output>;
}

/// Runs `work` inside a fresh transaction.
///
/// Commits when the work succeeds. On failure the transaction is rolled back
/// and the error returned untouched; a failing rollback is reported
/// together with the cause.
pub async fn run_in_transaction<W>(store: &dyn LedgerStore, work: W) -> Result<W::Output>
where
    W: UnitOfWork,
{
    let mut tx = store.begin().await?;
    match work.run(tx.as_mut()).await {
        Ok(output) => {
            tx.commit().await?;
            Ok(output)
        }
        Err(cause) => match tx.rollback().await {
            Ok(()) => Err(cause),
            Err(rollback) => Err(LedgerError::RollbackFailed {
                cause: Box::new(cause),
                rollback: Box::new(rollback),
            }),
        },
    }
}
