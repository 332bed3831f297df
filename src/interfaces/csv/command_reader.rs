use crate::error::{AppError, Result};
use serde::Deserialize;
use std::fmt;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    List,
    Purchase,
    Acknowledge,
    Consume,
    Restore,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::List => "list",
            Self::Purchase => "purchase",
            Self::Acknowledge => "acknowledge",
            Self::Consume => "consume",
            Self::Restore => "restore",
        })
    }
}

/// One row of the commands CSV. `id` is optional for `list` and ignored by `restore`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Command {
    pub command: CommandKind,
    pub id: Option<String>,
}

impl Command {
    /// The target id, for commands that need one.
    pub fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::ValidationError(format!("{} requires an id", self.command)))
    }
}

/// Reads commands from a CSV source, in file order.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(AppError::from))
    }
}
