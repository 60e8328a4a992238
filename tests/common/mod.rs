#![allow(dead_code)]

use async_trait::async_trait;
use ledgerd::application::engine::TransferEngine;
use ledgerd::application::service::LedgerService;
use ledgerd::domain::account::{Account, AccountId, Currency, Page};
use ledgerd::domain::ports::{LedgerStore, LedgerTransaction};
use ledgerd::domain::transfer::{Entry, EntryId, Transfer, TransferId, TransferTxParams};
use ledgerd::error::{LedgerError, Result};
use ledgerd::infrastructure::in_memory::InMemoryLedgerStore;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const ALL: Page = Page {
    limit: usize::MAX,
    offset: 0,
};

pub fn random_owner() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect()
}

pub fn random_amount() -> i64 {
    rand::thread_rng().gen_range(1..=1000)
}

pub fn engine_over(store: &InMemoryLedgerStore) -> TransferEngine {
    TransferEngine::new(Box::new(store.clone()))
}

/// Opens a USD account with `balance` already credited through an entry.
pub async fn open_account(store: &InMemoryLedgerStore, balance: i64) -> Account {
    LedgerService::new(engine_over(store))
        .open_account(&random_owner(), Currency::Usd, balance)
        .await
        .expect("Failed to open account")
}

pub async fn balance_of(store: &impl LedgerStore, id: AccountId) -> i64 {
    let mut tx = store.begin().await.unwrap();
    tx.get_account(id).await.unwrap().balance
}

pub async fn entries_of(store: &impl LedgerStore, id: AccountId) -> Vec<Entry> {
    let mut tx = store.begin().await.unwrap();
    tx.list_entries(id, ALL).await.unwrap()
}

pub async fn transfers_of(store: &impl LedgerStore, id: AccountId) -> Vec<Transfer> {
    let mut tx = store.begin().await.unwrap();
    tx.list_transfers(id, ALL).await.unwrap()
}

/// Wraps the in-memory store and fails the n-th record operation of every
/// transaction, or its rollback, on request. Records the account id of every
/// balance update in call order.
#[derive(Clone)]
pub struct FaultyStore {
    pub inner: InMemoryLedgerStore,
    fail_at: Option<usize>,
    fail_rollback: bool,
    balance_updates: Arc<Mutex<Vec<AccountId>>>,
}

impl FaultyStore {
    pub fn new(inner: InMemoryLedgerStore) -> Self {
        Self {
            inner,
            fail_at: None,
            fail_rollback: false,
            balance_updates: Arc::default(),
        }
    }

    /// Drains the ids passed to `add_account_balance` so far.
    pub fn take_balance_updates(&self) -> Vec<AccountId> {
        std::mem::take(&mut *self.balance_updates.lock().unwrap())
    }

    pub fn failing_at(mut self, op: usize) -> Self {
        self.fail_at = Some(op);
        self
    }

    pub fn failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }
}

fn injected(what: &str) -> LedgerError {
    LedgerError::InternalError(Box::new(std::io::Error::other(format!(
        "injected failure in {what}"
    ))))
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn LedgerTransaction + 'a>> {
        Ok(Box::new(FaultyTransaction {
            inner: self.inner.begin().await?,
            ops: 0,
            fail_at: self.fail_at,
            fail_rollback: self.fail_rollback,
            balance_updates: Arc::clone(&self.balance_updates),
        }))
    }
}

struct FaultyTransaction<'a> {
    inner: Box<dyn LedgerTransaction + 'a>,
    ops: usize,
    fail_at: Option<usize>,
    fail_rollback: bool,
    balance_updates: Arc<Mutex<Vec<AccountId>>>,
}

impl FaultyTransaction<'_> {
    fn tick(&mut self, what: &str) -> Result<()> {
        self.ops += 1;
        if self.fail_at == Some(self.ops) {
            return Err(injected(what));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTransaction for FaultyTransaction<'_> {
    async fn create_account(&mut self, owner: &str, currency: Currency) -> Result<Account> {
        self.tick("create_account")?;
        self.inner.create_account(owner, currency).await
    }

    async fn get_account(&mut self, id: AccountId) -> Result<Account> {
        self.tick("get_account")?;
        self.inner.get_account(id).await
    }

    async fn list_accounts(&mut self, page: Page) -> Result<Vec<Account>> {
        self.tick("list_accounts")?;
        self.inner.list_accounts(page).await
    }

    async fn add_account_balance(&mut self, id: AccountId, delta: i64) -> Result<Account> {
        self.tick("add_account_balance")?;
        self.balance_updates.lock().unwrap().push(id);
        self.inner.add_account_balance(id, delta).await
    }

    async fn create_entry(&mut self, account_id: AccountId, amount: i64) -> Result<Entry> {
        self.tick("create_entry")?;
        self.inner.create_entry(account_id, amount).await
    }

    async fn get_entry(&mut self, id: EntryId) -> Result<Entry> {
        self.tick("get_entry")?;
        self.inner.get_entry(id).await
    }

    async fn list_entries(&mut self, account_id: AccountId, page: Page) -> Result<Vec<Entry>> {
        self.tick("list_entries")?;
        self.inner.list_entries(account_id, page).await
    }

    async fn create_transfer(&mut self, params: TransferTxParams) -> Result<Transfer> {
        self.tick("create_transfer")?;
        self.inner.create_transfer(params).await
    }

    async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer> {
        self.tick("get_transfer")?;
        self.inner.get_transfer(id).await
    }

    async fn list_transfers(
        &mut self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>> {
        self.tick("list_transfers")?;
        self.inner.list_transfers(account_id, page).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let fail_rollback = self.fail_rollback;
        self.inner.rollback().await?;
        if fail_rollback {
            return Err(injected("rollback"));
        }
        Ok(())
    }
}

/// Writes a commands CSV: `accounts` USD accounts opened with `opening`
/// each, then `transfers` transfers of 1 cycling through the accounts.
pub fn generate_commands_csv(
    path: &Path,
    accounts: usize,
    opening: i64,
    transfers: usize,
) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["type", "owner", "currency", "from", "to", "amount"])?;

    for i in 1..=accounts {
        wtr.write_record([
            "open",
            &format!("owner-{i}"),
            "USD",
            "",
            "",
            &opening.to_string(),
        ])?;
    }

    for i in 0..transfers {
        let from = i % accounts + 1;
        let to = (i + 1) % accounts + 1;
        wtr.write_record([
            "transfer",
            "",
            "USD",
            &from.to_string(),
            &to.to_string(),
            "1",
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
