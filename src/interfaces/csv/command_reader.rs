use crate::application::service::TransferRequest;
use crate::domain::account::{AccountId, Currency};
use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Open,
    Transfer,
}

/// One raw CSV row: `type, owner, currency, from, to, amount`.
#[derive(Debug, Deserialize)]
struct CommandRecord {
    r#type: CommandType,
    owner: Option<String>,
    currency: Option<Currency>,
    from: Option<AccountId>,
    to: Option<AccountId>,
    amount: Option<i64>,
}

/// A batch command, with every field its type requires present.
#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Open {
        owner: String,
        currency: Currency,
        opening_balance: i64,
    },
    Transfer(TransferRequest),
}

fn required<T>(value: Option<T>, field: &str, kind: CommandType) -> Result<T> {
    value.ok_or_else(|| {
        LedgerError::ValidationError(format!("{kind:?} command is missing `{field}`"))
    })
}

impl TryFrom<CommandRecord> for Command {
    type Error = LedgerError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let kind = record.r#type;
        match kind {
            CommandType::Open => Ok(Command::Open {
                owner: required(record.owner, "owner", kind)?,
                currency: required(record.currency, "currency", kind)?,
                opening_balance: record.amount.unwrap_or(0),
            }),
            CommandType::Transfer => Ok(Command::Transfer(TransferRequest {
                from_account_id: required(record.from, "from", kind)?,
                to_account_id: required(record.to, "to", kind)?,
                amount: required(record.amount, "amount", kind)?,
                currency: required(record.currency, "currency", kind)?,
            })),
        }
    }
}

/// Reads commands from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<Command>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and validates commands.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize::<CommandRecord>()
            .map(|result| result.map_err(LedgerError::from).and_then(Command::try_from))
    }
}
