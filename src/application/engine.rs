use super::balance::{BalanceChange, apply_in_lock_order};
use crate::domain::ports::{
    LedgerStoreBox, LedgerTransaction, SharedLedgerStore, UnitOfWork, run_in_transaction,
};
use crate::domain::transfer::{TransferTxParams, TransferTxResult};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// The funds-transfer engine.
///
/// `TransferEngine` moves money between two accounts as one atomic unit of
/// work against the ledger store. It keeps no in-process state besides the
/// store handle, so a single instance can be shared by any number of tasks.
#[derive(Clone)]
pub struct TransferEngine {
    store: SharedLedgerStore,
    tx_timeout: Option<Duration>,
}

impl TransferEngine {
    /// Creates a new `TransferEngine` over the given store.
    pub fn new(store: LedgerStoreBox) -> Self {
        Self::from_shared(Arc::from(store))
    }

    pub fn from_shared(store: SharedLedgerStore) -> Self {
        Self {
            store,
            tx_timeout: None,
        }
    }

    /// Bounds every unit of work run by this engine. When the bound expires
    /// the in-flight transaction is dropped, which rolls it back.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &SharedLedgerStore {
        &self.store
    }

    /// Moves `params.amount` from one account to the other.
    ///
    /// Creates the transfer record and both entries, then updates both
    /// balances. Either all five writes commit or none do. Errors from the
    /// store are returned as they are.
    pub async fn transfer_tx(&self, params: TransferTxParams) -> Result<TransferTxResult> {
        let result = self.execute(TransferTx::new(params)).await?;
        tracing::info!(
            transfer_id = result.transfer.id,
            from = params.from_account_id,
            to = params.to_account_id,
            amount = params.amount,
            "transfer committed"
        );
        Ok(result)
    }

    /// Runs any unit of work in its own transaction, honouring the timeout.
    pub async fn execute<W>(&self, work: W) -> Result<W::Output>
    where
        W: UnitOfWork,
    {
        let unit = run_in_transaction(self.store.as_ref(), work);
        match self.tx_timeout {
            Some(limit) => tokio::time::timeout(limit, unit)
                .await
                .map_err(|_| LedgerError::Timeout(limit))?,
            None => unit.await,
        }
    }
}

/// The write sequence of one transfer.
///
/// Exposed as a [`UnitOfWork`] so callers can run it inside a larger
/// transaction, for example together with their own validation reads.
#[derive(Debug, Clone, Copy)]
pub struct TransferTx {
    params: TransferTxParams,
}

impl TransferTx {
    pub fn new(params: TransferTxParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl UnitOfWork for TransferTx {
    type Output = TransferTxResult;

    async fn run(self, tx: &mut dyn LedgerTransaction) -> Result<TransferTxResult> {
        let TransferTxParams {
            from_account_id,
            to_account_id,
            amount,
        } = self.params;

        let transfer = tx.create_transfer(self.params).await?;
        let from_entry = tx.create_entry(from_account_id, -amount).await?;
        let to_entry = tx.create_entry(to_account_id, amount).await?;
        tracing::debug!(transfer_id = transfer.id, "transfer and entries recorded");

        let (from_account, to_account) = apply_in_lock_order(
            tx,
            BalanceChange::new(from_account_id, -amount),
            BalanceChange::new(to_account_id, amount),
        )
        .await?;

        Ok(TransferTxResult {
            transfer,
            from_entry,
            to_entry,
            from_account,
            to_account,
        })
    }
}
