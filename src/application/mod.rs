//! Application layer containing the ledger's business logic orchestration.
//!
//! [`engine::TransferEngine`] performs the atomic transfer write sequence,
//! [`balance`] holds the balance updater and its lock-ordering rule, and
//! [`service::LedgerService`] validates requests before handing them to the engine.

pub mod balance;
pub mod engine;
pub mod service;
