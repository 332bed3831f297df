use super::records::{BillingResult, CatalogRecord, PurchaseRecord};
use async_trait::async_trait;
use std::sync::Arc;

/// Receives the provider's out-of-band notifications.
///
/// The provider calls these from whatever thread it likes, so implementations
/// must not block on async work.
pub trait PurchasesUpdatedListener: Send + Sync {
    /// Outcome of any purchase flow. Not correlated to the call that launched it.
    fn on_purchases_updated(&self, result: BillingResult, purchases: Option<Vec<PurchaseRecord>>);

    /// The provider dropped an established connection.
    fn on_service_disconnected(&self);
}

/// Capability interface of the external billing service.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Installs the single global listener for purchase updates.
    fn set_purchases_updated_listener(&self, listener: PurchasesUpdatedListenerRef);

    async fn connect(&self) -> BillingResult;
    fn disconnect(&self);
    fn is_ready(&self) -> bool;

    async fn query_catalog(&self, ids: &[String]) -> (BillingResult, Vec<CatalogRecord>);
    async fn query_purchases(&self) -> (BillingResult, Vec<PurchaseRecord>);

    /// Synchronously accepts or rejects launching the purchase UI. The purchase
    /// outcome itself arrives later through the listener.
    fn launch_purchase_flow(&self, record: &CatalogRecord) -> BillingResult;

    async fn acknowledge(&self, token: &str) -> BillingResult;
    async fn consume(&self, token: &str) -> BillingResult;
}

pub type BillingProviderRef = Arc<dyn BillingProvider>;
pub type PurchasesUpdatedListenerRef = Arc<dyn PurchasesUpdatedListener>;
