use crate::domain::account::{Account, AccountId};
use crate::domain::ports::LedgerTransaction;
use crate::error::Result;

/// A signed delta to apply to one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub account_id: AccountId,
    pub delta: i64,
}

impl BalanceChange {
    pub fn new(account_id: AccountId, delta: i64) -> Self {
        Self { account_id, delta }
    }
}

/// Applies `delta` to one account inside the caller's transaction.
///
/// The store performs the read-modify-write as a single increment under the
/// account's row lock, so concurrent callers serialize instead of racing.
pub async fn add_balance(
    tx: &mut dyn LedgerTransaction,
    account_id: AccountId,
    delta: i64,
) -> Result<Account> {
    let account = tx.add_account_balance(account_id, delta).await?;
    tracing::debug!(account_id, delta, balance = account.balance, "balance updated");
    Ok(account)
}

/// The order in which two accounts' row locks must be taken.
pub fn lock_order(a: AccountId, b: AccountId) -> [AccountId; 2] {
    if a < b { [a, b] } else { [b, a] }
}

/// Applies both changes in ascending account id order and returns the
/// updated accounts in argument order.
///
/// Every transaction touching the same pair of accounts locks them in the
/// same relative order, whichever direction the money flows.
pub async fn apply_in_lock_order(
    tx: &mut dyn LedgerTransaction,
    first: BalanceChange,
    second: BalanceChange,
) -> Result<(Account, Account)> {
    let [lower, _] = lock_order(first.account_id, second.account_id);
    if first.account_id == lower {
        let first_account = add_balance(tx, first.account_id, first.delta).await?;
        let second_account = add_balance(tx, second.account_id, second.delta).await?;
        Ok((first_account, second_account))
    } else {
        let second_account = add_balance(tx, second.account_id, second.delta).await?;
        let first_account = add_balance(tx, first.account_id, first.delta).await?;
        Ok((first_account, second_account))
    }
}
