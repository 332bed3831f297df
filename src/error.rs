use crate::domain::records::{BillingResult, ResponseCode};
use std::fmt;
use thiserror::Error;

/// Domain error kinds surfaced to callers of the billing engine.
///
/// Most kinds are translations of provider response codes. Some are also raised
/// locally: `ItemUnavailable` for unregistered or unlisted ids, `ItemNotOwned`
/// when no purchase token exists, `Timeout` when a purchase outlives its limit,
/// plus `NotConsumable` and `OperationInProgress`, which only the engine raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    FeatureNotSupported,
    ServiceDisconnected,
    UserCanceled,
    ServiceUnavailable,
    BillingUnavailable,
    ItemUnavailable,
    DeveloperError,
    Generic,
    ItemAlreadyOwned,
    ItemNotOwned,
    NotConsumable,
    OperationInProgress,
    Unknown,
}

impl ErrorKind {
    /// Translates a non-OK provider response code into a domain kind.
    pub fn from_code(code: ResponseCode) -> Self {
        match code {
            ResponseCode::ServiceTimeout => Self::Timeout,
            ResponseCode::FeatureNotSupported => Self::FeatureNotSupported,
            ResponseCode::ServiceDisconnected => Self::ServiceDisconnected,
            ResponseCode::UserCanceled => Self::UserCanceled,
            ResponseCode::ServiceUnavailable => Self::ServiceUnavailable,
            ResponseCode::BillingUnavailable => Self::BillingUnavailable,
            ResponseCode::ItemUnavailable => Self::ItemUnavailable,
            ResponseCode::DeveloperError => Self::DeveloperError,
            ResponseCode::Error => Self::Generic,
            ResponseCode::ItemAlreadyOwned => Self::ItemAlreadyOwned,
            ResponseCode::ItemNotOwned => Self::ItemNotOwned,
            ResponseCode::Ok | ResponseCode::Other(_) => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::FeatureNotSupported => "feature not supported",
            Self::ServiceDisconnected => "service disconnected",
            Self::UserCanceled => "user canceled",
            Self::ServiceUnavailable => "service unavailable",
            Self::BillingUnavailable => "billing unavailable",
            Self::ItemUnavailable => "item unavailable",
            Self::DeveloperError => "developer error",
            Self::Generic => "error",
            Self::ItemAlreadyOwned => "item already owned",
            Self::ItemNotOwned => "item not owned",
            Self::NotConsumable => "not consumable",
            Self::OperationInProgress => "operation in progress",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A typed failure from a billing workflow.
///
/// `Clone` so a single connection failure can be handed to every queued waiter
/// and every pending purchase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BillingError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BillingError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<&BillingResult> for BillingError {
    fn from(result: &BillingResult) -> Self {
        Self::new(ErrorKind::from_code(result.code), result.to_string())
    }
}

impl From<BillingResult> for BillingError {
    fn from(result: BillingResult) -> Self {
        Self::from(&result)
    }
}

/// Errors raised by the application surface (CLI, config and CSV handling).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] serde_json::Error),
    #[error("Billing error: {0}")]
    BillingError(#[from] BillingError),
    #[error("Invalid input: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Result type of every engine workflow.
pub type EngineResult<T> = std::result::Result<T, BillingError>;
