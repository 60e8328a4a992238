use crate::domain::account::{Account, AccountId, Currency, Page};
use crate::domain::ports::{LedgerStore, LedgerTransaction};
use crate::domain::transfer::{Entry, EntryId, Transfer, TransferId, TransferTxParams};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    entries: BTreeMap<EntryId, Entry>,
    transfers: BTreeMap<TransferId, Transfer>,
}

/// Id sequences. Like database sequences they never roll back.
#[derive(Default)]
struct Sequences {
    account: AtomicI64,
    entry: AtomicI64,
    transfer: AtomicI64,
}

impl Sequences {
    fn next(counter: &AtomicI64) -> i64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

type RowLock = Arc<Mutex<()>>;

/// A thread-safe in-memory ledger store.
///
/// Committed records live in `Arc<RwLock<..>>` tables. Each account has its
/// own row lock, taken by [`LedgerTransaction::add_account_balance`] and held
/// until the transaction commits, rolls back or is dropped. Writes are staged
/// per transaction and published in one step on commit.
///
/// `Clone` shares the underlying tables, so a clone observes the same data.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
    row_locks: Arc<Mutex<HashMap<AccountId, RowLock>>>,
    sequences: Arc<Sequences>,
    lock_timeout: Option<Duration>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory store that waits for row locks forever.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives up on a row lock wait after `timeout`, failing with `Conflict`.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    async fn row_lock(&self, id: AccountId) -> RowLock {
        let mut locks = self.row_locks.lock().await;
        locks.entry(id).or_default().clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn LedgerTransaction + 'a>> {
        Ok(Box::new(InMemoryTransaction {
            store: self,
            held: HashMap::new(),
            accounts: BTreeMap::new(),
            entries: Vec::new(),
            transfers: Vec::new(),
        }))
    }
}

/// An open transaction on [`InMemoryLedgerStore`].
pub struct InMemoryTransaction<'a> {
    store: &'a InMemoryLedgerStore,
    held: HashMap<AccountId, OwnedMutexGuard<()>>,
    accounts: BTreeMap<AccountId, Account>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
}

impl InMemoryTransaction<'_> {
    async fn lock_row(&mut self, id: AccountId) -> Result<()> {
        if self.held.contains_key(&id) {
            return Ok(());
        }
        let row = self.store.row_lock(id).await;
        let guard = match self.store.lock_timeout {
            Some(limit) => tokio::time::timeout(limit, row.lock_owned())
                .await
                .map_err(|_| {
                    LedgerError::Conflict(format!("lock wait timeout on account {id}"))
                })?,
            None => row.lock_owned().await,
        };
        self.held.insert(id, guard);
        Ok(())
    }

    /// Reads an account as this transaction sees it: its own staged version
    /// first, the committed one otherwise.
    async fn visible_account(&self, id: AccountId) -> Result<Account> {
        if let Some(account) = self.accounts.get(&id) {
            return Ok(account.clone());
        }
        let tables = self.store.tables.read().await;
        tables
            .accounts
            .get(&id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(id))
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction<'_> {
    async fn create_account(&mut self, owner: &str, currency: Currency) -> Result<Account> {
        if owner.trim().is_empty() {
            return Err(LedgerError::ConstraintViolation(
                "account owner must not be empty".to_string(),
            ));
        }
        let id = Sequences::next(&self.store.sequences.account);
        let account = Account::open(id, owner, currency);
        self.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn get_account(&mut self, id: AccountId) -> Result<Account> {
        self.visible_account(id).await
    }

    async fn list_accounts(&mut self, page: Page) -> Result<Vec<Account>> {
        let tables = self.store.tables.read().await;
        let mut merged = tables.accounts.clone();
        merged.extend(self.accounts.clone());
        Ok(page.slice(merged.into_values()))
    }

    async fn add_account_balance(&mut self, id: AccountId, delta: i64) -> Result<Account> {
        // Existence is checked before locking so a missing row never leaves
        // an orphan lock entry behind.
        self.visible_account(id).await?;
        self.lock_row(id).await?;
        // Re-read under the lock: another transaction may have committed
        // while this one was waiting.
        let updated = self.visible_account(id).await?.with_delta(delta)?;
        self.accounts.insert(id, updated.clone());
        Ok(updated)
    }

    async fn create_entry(&mut self, account_id: AccountId, amount: i64) -> Result<Entry> {
        self.visible_account(account_id).await?;
        let entry = Entry {
            id: Sequences::next(&self.store.sequences.entry),
            account_id,
            amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn get_entry(&mut self, id: EntryId) -> Result<Entry> {
        if let Some(entry) = self.entries.iter().find(|e| e.id == id) {
            return Ok(entry.clone());
        }
        let tables = self.store.tables.read().await;
        tables
            .entries
            .get(&id)
            .cloned()
            .ok_or(LedgerError::EntryNotFound(id))
    }

    async fn list_entries(&mut self, account_id: AccountId, page: Page) -> Result<Vec<Entry>> {
        let tables = self.store.tables.read().await;
        let committed = tables.entries.values();
        let entries = committed
            .chain(self.entries.iter())
            .filter(|e| e.account_id == account_id)
            .cloned();
        Ok(page.slice(entries))
    }

    async fn create_transfer(&mut self, params: TransferTxParams) -> Result<Transfer> {
        if params.amount <= 0 {
            return Err(LedgerError::ConstraintViolation(format!(
                "transfer amount must be positive, got {}",
                params.amount
            )));
        }
        self.visible_account(params.from_account_id).await?;
        self.visible_account(params.to_account_id).await?;
        let transfer = Transfer {
            id: Sequences::next(&self.store.sequences.transfer),
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer> {
        if let Some(transfer) = self.transfers.iter().find(|t| t.id == id) {
            return Ok(transfer.clone());
        }
        let tables = self.store.tables.read().await;
        tables
            .transfers
            .get(&id)
            .cloned()
            .ok_or(LedgerError::TransferNotFound(id))
    }

    async fn list_transfers(
        &mut self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>> {
        let tables = self.store.tables.read().await;
        let transfers = tables
            .transfers
            .values()
            .chain(self.transfers.iter())
            .filter(|t| t.involves(account_id))
            .cloned();
        Ok(page.slice(transfers))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let mut tables = this.store.tables.write().await;
        tables.accounts.extend(this.accounts);
        tables
            .entries
            .extend(this.entries.into_iter().map(|e| (e.id, e)));
        tables
            .transfers
            .extend(this.transfers.into_iter().map(|t| (t.id, t)));
        drop(tables);
        // Row locks are released only once the new balances are visible.
        drop(this.held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
