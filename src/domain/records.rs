use serde::{Deserialize, Serialize};
use std::fmt;

/// Response codes reported by the billing provider.
///
/// Numeric values follow the provider's wire contract; anything unrecognized is
/// carried through as `Other`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ResponseCode {
    ServiceTimeout,
    FeatureNotSupported,
    ServiceDisconnected,
    Ok,
    UserCanceled,
    ServiceUnavailable,
    BillingUnavailable,
    ItemUnavailable,
    DeveloperError,
    Error,
    ItemAlreadyOwned,
    ItemNotOwned,
    Other(i32),
}

impl From<i32> for ResponseCode {
    fn from(value: i32) -> Self {
        match value {
            -3 => Self::ServiceTimeout,
            -2 => Self::FeatureNotSupported,
            -1 => Self::ServiceDisconnected,
            0 => Self::Ok,
            1 => Self::UserCanceled,
            2 => Self::ServiceUnavailable,
            3 => Self::BillingUnavailable,
            4 => Self::ItemUnavailable,
            5 => Self::DeveloperError,
            6 => Self::Error,
            7 => Self::ItemAlreadyOwned,
            8 => Self::ItemNotOwned,
            other => Self::Other(other),
        }
    }
}

impl From<ResponseCode> for i32 {
    fn from(code: ResponseCode) -> Self {
        match code {
            ResponseCode::ServiceTimeout => -3,
            ResponseCode::FeatureNotSupported => -2,
            ResponseCode::ServiceDisconnected => -1,
            ResponseCode::Ok => 0,
            ResponseCode::UserCanceled => 1,
            ResponseCode::ServiceUnavailable => 2,
            ResponseCode::BillingUnavailable => 3,
            ResponseCode::ItemUnavailable => 4,
            ResponseCode::DeveloperError => 5,
            ResponseCode::Error => 6,
            ResponseCode::ItemAlreadyOwned => 7,
            ResponseCode::ItemNotOwned => 8,
            ResponseCode::Other(value) => value,
        }
    }
}

/// Outcome of a single provider call: a response code plus the provider's debug text.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct BillingResult {
    pub code: ResponseCode,
    #[serde(default)]
    pub debug_message: String,
}

impl BillingResult {
    pub fn new(code: ResponseCode, debug_message: impl Into<String>) -> Self {
        Self {
            code,
            debug_message: debug_message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(ResponseCode::Ok, "")
    }

    pub fn is_ok(&self) -> bool {
        self.code == ResponseCode::Ok
    }
}

impl From<ResponseCode> for BillingResult {
    fn from(code: ResponseCode) -> Self {
        Self::new(code, "")
    }
}

impl fmt::Display for BillingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.debug_message.is_empty() {
            write!(f, "response code {}", i32::from(self.code))
        } else {
            write!(
                f,
                "response code {} ({})",
                i32::from(self.code),
                self.debug_message
            )
        }
    }
}

/// Provider-side state of a purchase transaction.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseState {
    #[default]
    Unspecified,
    Purchased,
    Pending,
}

impl fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unspecified => "unspecified",
            Self::Purchased => "purchased",
            Self::Pending => "pending",
        })
    }
}

/// Descriptive metadata the provider returns for a purchasable item.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Display price, already formatted by the provider (e.g. `$0.99`).
    pub price: String,
    /// Price in micro-units of `currency` (1_000_000 micros = 1 unit).
    pub price_amount_micros: i64,
    pub currency: String,
}

/// A purchase transaction reported by the provider. One record may cover several ids.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub ids: Vec<String>,
    pub token: String,
    pub state: PurchaseState,
    pub acknowledged: bool,
}

impl PurchaseRecord {
    pub fn covers(&self, id: &str) -> bool {
        self.ids.iter().any(|covered| covered == id)
    }
}
