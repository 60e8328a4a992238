use clap::Parser;
use ledgerd::application::engine::TransferEngine;
use ledgerd::application::service::LedgerService;
use ledgerd::config::Config;
use ledgerd::domain::ports::LedgerStoreBox;
use ledgerd::infrastructure::in_memory::InMemoryLedgerStore;
use ledgerd::interfaces::csv::account_writer::AccountWriter;
use ledgerd::interfaces::csv::command_reader::{Command, CommandReader};
use ledgerd::logging::init_logging;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;

fn open_store(config: &Config) -> Result<LedgerStoreBox> {
    match &config.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => {
            let store = ledgerd::infrastructure::rocksdb::RocksDBStore::open_with_lock_timeout(
                db_path,
                config.lock_timeout(),
            )
            .into_diagnostic()?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Box::new(
                InMemoryLedgerStore::new().with_lock_timeout(config.lock_timeout()),
            ))
        }
        None => Ok(Box::new(
            InMemoryLedgerStore::new().with_lock_timeout(config.lock_timeout()),
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_logging(&config.log_level);

    let mut engine = TransferEngine::new(open_store(&config)?);
    if let Some(timeout) = config.tx_timeout() {
        engine = engine.with_timeout(timeout);
    }
    let service = LedgerService::new(engine).with_max_retries(config.max_retries);

    // Process commands
    let file = File::open(&config.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        let outcome = match command {
            Ok(Command::Open {
                owner,
                currency,
                opening_balance,
            }) => service
                .open_account(&owner, currency, opening_balance)
                .await
                .map(|_| ()),
            Ok(Command::Transfer(request)) => service.create_transfer(request).await.map(|_| ()),
            Err(e) => {
                eprintln!("Error reading command: {}", e);
                continue;
            }
        };
        if let Err(e) = outcome {
            eprintln!("Error processing command: {}", e);
        }
    }

    // Output final state
    let accounts = service.all_accounts().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(&accounts).into_diagnostic()?;

    Ok(())
}
