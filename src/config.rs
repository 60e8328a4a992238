use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Input commands CSV file
    pub input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// How long a transaction waits for an account's row lock before giving up.
    #[arg(long, default_value_t = 1000)]
    pub lock_timeout_ms: u64,

    /// Upper bound on a whole unit of work. Unbounded when omitted.
    #[arg(long)]
    pub tx_timeout_ms: Option<u64>,

    /// Retries for transfers that fail on a lock conflict.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn tx_timeout(&self) -> Option<Duration> {
        self.tx_timeout_ms.map(Duration::from_millis)
    }
}
