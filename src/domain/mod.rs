//! Ledger records and the store port the application layer is written against.

pub mod account;
pub mod ports;
pub mod transfer;
