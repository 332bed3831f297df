use super::records::{CatalogRecord, PurchaseRecord, PurchaseState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an item behaves once bought.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Bought once and kept; must be acknowledged.
    OneTime,
    /// Can be consumed and bought again.
    Consumable,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OneTime => "one_time",
            Self::Consumable => "consumable",
        })
    }
}

/// Loaded display metadata for an item.
///
/// Pass-through only: no currency conversion or price arithmetic happens here.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct CatalogInfo {
    pub title: String,
    pub description: String,
    pub price: String,
    pub price_amount_micros: i64,
    pub currency: String,
}

impl CatalogInfo {
    /// The micro-unit amount as a decimal value in `currency` units.
    pub fn price_value(&self) -> Decimal {
        Decimal::new(self.price_amount_micros, 6).normalize()
    }
}

impl From<&CatalogRecord> for CatalogInfo {
    fn from(record: &CatalogRecord) -> Self {
        Self {
            title: record.title.clone(),
            description: record.description.clone(),
            price: record.price.clone(),
            price_amount_micros: record.price_amount_micros,
            currency: record.currency.clone(),
        }
    }
}

/// A purchasable item merged with its live purchase state.
///
/// `id` and `kind` are fixed at registration. The remaining fields are only
/// written by reconciliation in [`crate::application::reconcile`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct CatalogEntry {
    id: String,
    kind: ItemKind,
    catalog_info: Option<CatalogInfo>,
    purchase_token: Option<String>,
    purchase_state: PurchaseState,
    acknowledged: bool,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id: id.into(),
            kind,
            catalog_info: None,
            purchase_token: None,
            purchase_state: PurchaseState::Unspecified,
            acknowledged: false,
        }
    }

    pub fn one_time(id: impl Into<String>) -> Self {
        Self::new(id, ItemKind::OneTime)
    }

    pub fn consumable(id: impl Into<String>) -> Self {
        Self::new(id, ItemKind::Consumable)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn catalog_info(&self) -> Option<&CatalogInfo> {
        self.catalog_info.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.catalog_info.is_some()
    }

    pub fn title(&self) -> Option<&str> {
        self.catalog_info.as_ref().map(|info| info.title.as_str())
    }

    pub fn description(&self) -> Option<&str> {
        self.catalog_info.as_ref().map(|info| info.description.as_str())
    }

    pub fn price(&self) -> Option<&str> {
        self.catalog_info.as_ref().map(|info| info.price.as_str())
    }

    /// Zero until catalog info has been loaded.
    pub fn price_amount_micros(&self) -> i64 {
        self.catalog_info
            .as_ref()
            .map_or(0, |info| info.price_amount_micros)
    }

    pub fn currency(&self) -> Option<&str> {
        self.catalog_info.as_ref().map(|info| info.currency.as_str())
    }

    pub fn purchase_token(&self) -> Option<&str> {
        self.purchase_token.as_deref()
    }

    pub fn purchase_state(&self) -> PurchaseState {
        self.purchase_state
    }

    pub fn is_one_time(&self) -> bool {
        self.kind == ItemKind::OneTime
    }

    pub fn is_consumable(&self) -> bool {
        self.kind == ItemKind::Consumable
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Fully owned: purchased and acknowledged.
    pub fn is_purchased(&self) -> bool {
        self.acknowledged && self.purchase_state == PurchaseState::Purchased
    }

    /// Pending from the caller's point of view, which includes a purchase the
    /// provider reports as purchased but that is not acknowledged yet.
    pub fn is_pending(&self) -> bool {
        self.purchase_state == PurchaseState::Pending
            || (!self.acknowledged && self.purchase_state == PurchaseState::Purchased)
    }

    /// The provider-facing record for this entry, once catalog info is loaded.
    pub fn to_catalog_record(&self) -> Option<CatalogRecord> {
        self.catalog_info.as_ref().map(|info| CatalogRecord {
            id: self.id.clone(),
            title: info.title.clone(),
            description: info.description.clone(),
            price: info.price.clone(),
            price_amount_micros: info.price_amount_micros,
            currency: info.currency.clone(),
        })
    }

    pub(crate) fn set_catalog_info(&mut self, info: CatalogInfo) {
        self.catalog_info = Some(info);
    }

    pub(crate) fn clear_purchase(&mut self) {
        self.purchase_token = None;
        self.acknowledged = false;
        self.purchase_state = PurchaseState::Unspecified;
    }

    pub(crate) fn apply_purchase(&mut self, record: &PurchaseRecord) {
        self.purchase_token = Some(record.token.clone());
        self.acknowledged = record.acknowledged;
        self.purchase_state = record.state;
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, state={}, acknowledged={})",
            self.id, self.kind, self.purchase_state, self.acknowledged
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(state: PurchaseState, acknowledged: bool) -> PurchaseRecord {
        PurchaseRecord {
            ids: vec!["sword".to_string()],
            token: "tok".to_string(),
            state,
            acknowledged,
        }
    }

    #[test]
    fn test_new_entry_is_unloaded_and_unowned() {
        let entry = CatalogEntry::one_time("sword");
        assert!(!entry.is_loaded());
        assert_eq!(entry.price(), None);
        assert_eq!(entry.price_amount_micros(), 0);
        assert_eq!(entry.purchase_token(), None);
        assert!(!entry.is_purchased());
        assert!(!entry.is_pending());
        assert!(entry.is_one_time());
        assert!(!entry.is_consumable());
    }

    #[test]
    fn test_purchased_but_unacknowledged_is_pending() {
        let mut entry = CatalogEntry::one_time("sword");
        entry.apply_purchase(&record(PurchaseState::Purchased, false));
        assert!(entry.is_pending());
        assert!(!entry.is_purchased());

        entry.apply_purchase(&record(PurchaseState::Purchased, true));
        assert!(!entry.is_pending());
        assert!(entry.is_purchased());
        assert_eq!(entry.purchase_token(), Some("tok"));
    }

    #[test]
    fn test_provider_pending_state_is_pending() {
        let mut entry = CatalogEntry::consumable("sword");
        entry.apply_purchase(&record(PurchaseState::Pending, true));
        assert!(entry.is_pending());
        assert!(!entry.is_purchased());
    }

    #[test]
    fn test_clear_purchase_resets_live_fields() {
        let mut entry = CatalogEntry::one_time("sword");
        entry.apply_purchase(&record(PurchaseState::Purchased, true));
        entry.clear_purchase();
        assert_eq!(entry.purchase_token(), None);
        assert!(!entry.is_acknowledged());
        assert_eq!(entry.purchase_state(), PurchaseState::Unspecified);
    }

    #[test]
    fn test_price_value_from_micros() {
        let info = CatalogInfo {
            title: "Coins".to_string(),
            description: "100 coins".to_string(),
            price: "$0.99".to_string(),
            price_amount_micros: 990_000,
            currency: "USD".to_string(),
        };
        assert_eq!(info.price_value(), dec!(0.99));
    }
}
