use super::connection::{ConnectionManager, ConnectionState};
use super::registry::PendingPurchaseRegistry;
use super::store::CatalogStore;
use crate::config::{EngineConfig, ErrorMessages};
use crate::domain::catalog::CatalogEntry;
use crate::domain::ports::{BillingProviderRef, PurchasesUpdatedListener};
use crate::domain::records::{BillingResult, CatalogRecord, PurchaseRecord, PurchaseState};
use crate::error::{BillingError, EngineResult, ErrorKind};
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument};

/// The purchase orchestration engine.
///
/// `BillingEngine` owns the provider handle, the catalog store, the pending
/// purchase registry and the connection manager, and composes them into the
/// public workflows. Every workflow first validates the requested ids against
/// the store, so unknown ids fail before any provider call is made.
///
/// The engine is an ordinary value: wrap it in an `Arc` to share it between
/// tasks.
pub struct BillingEngine {
    provider: BillingProviderRef,
    store: Arc<CatalogStore>,
    registry: Arc<PendingPurchaseRegistry>,
    connection: Arc<ConnectionManager>,
    config: EngineConfig,
}

impl BillingEngine {
    /// Creates an engine with `entries` pre-registered and installs its purchase
    /// update listener on `provider`.
    ///
    /// # Arguments
    ///
    /// * `provider` - The billing service the engine talks to.
    /// * `entries` - Items the caller may ask about.
    /// * `config` - Timeouts and error message templates.
    pub fn new<I>(provider: BillingProviderRef, entries: I, config: EngineConfig) -> Self
    where
        I: IntoIterator<Item = CatalogEntry>,
    {
        let store = Arc::new(CatalogStore::with_entries(entries));
        let registry = Arc::new(PendingPurchaseRegistry::new());
        let connection = Arc::new(ConnectionManager::new(
            Arc::clone(&provider),
            Arc::clone(&registry),
        ));

        provider.set_purchases_updated_listener(Arc::new(PurchaseUpdateDispatcher {
            store: Arc::clone(&store),
            registry: Arc::clone(&registry),
            connection: Arc::downgrade(&connection),
        }));

        Self {
            provider,
            store,
            registry,
            connection,
            config,
        }
    }

    /// Registers another item. Returns `false` if the id is already known.
    pub fn register_item(&self, entry: CatalogEntry) -> bool {
        self.store.register(entry)
    }

    pub fn entry(&self, id: &str) -> Option<CatalogEntry> {
        self.store.get(id)
    }

    /// Every registered entry, in registration order.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.store.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn pending_purchases(&self) -> usize {
        self.registry.len()
    }

    /// Ends the provider connection. Later workflows fail with `ServiceDisconnected`.
    pub fn close(&self) {
        self.connection.close();
    }

    /// Loaded entries for `ids`, in request order.
    ///
    /// Served from the store when every id already has catalog info. Otherwise
    /// catalog info and owned purchases are fetched together and reconciled.
    /// Ids the provider does not return are left out rather than failing.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn list_catalog(&self, ids: &[String]) -> EngineResult<Vec<CatalogEntry>> {
        if let Some(unknown) = self.store.first_unknown(ids) {
            return Err(self.not_found(unknown));
        }
        if self.store.all_loaded(ids) {
            debug!("catalog served from store");
            return Ok(self.store.loaded_subset(ids));
        }

        self.connection.ensure_connected().await?;
        let (catalog, purchases) = tokio::join!(
            self.provider.query_catalog(ids),
            self.provider.query_purchases()
        );
        let catalog = into_payload(catalog)?;
        let purchases = into_payload(purchases)?;

        self.store.apply_catalog_info(&catalog);
        self.store.apply_purchases(&purchases);

        let entries = self.store.loaded_subset(ids);
        info!(loaded = entries.len(), "catalog listed");
        Ok(entries)
    }

    /// Runs the purchase flow for `id`.
    ///
    /// Returns `Ok(None)` when the flow ends without a completed purchase (the
    /// user canceled or the payment is still pending). With `auto_acknowledge`
    /// a fresh purchase is acknowledged before returning.
    #[instrument(skip(self))]
    pub async fn purchase(&self, id: &str, auto_acknowledge: bool) -> EngineResult<Option<CatalogEntry>> {
        self.require(id)?;
        // Held across the awaits below so a concurrent purchase of `id` cannot launch too.
        let reservation = self.registry.reserve(id).ok_or_else(|| self.in_progress(id))?;

        self.connection.ensure_connected().await?;
        let record = self.catalog_record(id).await?;

        check(self.provider.launch_purchase_flow(&record))?;
        let pending = reservation.activate();
        debug!("purchase flow launched");

        let outcome = pending
            .wait(self.config.purchase_timeout())
            .await
            .ok_or_else(|| self.local_error(ErrorKind::Timeout, &self.config.messages.purchase_timeout, id))?;

        let Some(purchase) = outcome? else {
            info!("purchase finished without a result");
            return Ok(None);
        };

        info!(acknowledged = purchase.acknowledged, "purchase completed");
        if auto_acknowledge && !purchase.acknowledged {
            return self.acknowledge(id).await.map(Some);
        }
        Ok(self.store.get(id))
    }

    /// Acknowledges the purchase of `id`. A no-op when already acknowledged.
    #[instrument(skip(self))]
    pub async fn acknowledge(&self, id: &str) -> EngineResult<CatalogEntry> {
        let entry = self.require(id)?;
        if entry.is_acknowledged() {
            debug!("already acknowledged");
            return Ok(entry);
        }

        self.connection.ensure_connected().await?;
        let token = self.purchase_token(id).await?;
        check(self.provider.acknowledge(&token).await)?;
        self.refresh_purchases().await?;

        info!("purchase acknowledged");
        self.require(id)
    }

    /// Consumes the purchase of a consumable `id` so it can be bought again.
    #[instrument(skip(self))]
    pub async fn consume(&self, id: &str) -> EngineResult<CatalogEntry> {
        let entry = self.require(id)?;
        if !entry.is_consumable() {
            return Err(self.local_error(ErrorKind::NotConsumable, &self.config.messages.not_consumable, id));
        }

        self.connection.ensure_connected().await?;
        let token = self.purchase_token(id).await?;
        check(self.provider.consume(&token).await)?;
        self.refresh_purchases().await?;

        info!("purchase consumed");
        self.require(id)
    }

    /// Refreshes purchases and returns the first entry, in registration order,
    /// that is purchased and either consumable or unacknowledged.
    ///
    /// One entry per call: repeated calls work through the backlog.
    #[instrument(skip(self))]
    pub async fn restore_purchases(&self, auto_acknowledge: bool) -> EngineResult<Option<CatalogEntry>> {
        self.connection.ensure_connected().await?;
        self.refresh_purchases().await?;

        let Some(entry) = self.store.find_first(|entry| {
            entry.purchase_state() == PurchaseState::Purchased
                && (entry.is_consumable() || !entry.is_acknowledged())
        }) else {
            debug!("nothing to restore");
            return Ok(None);
        };

        info!(id = entry.id(), "restoring purchase");
        if auto_acknowledge {
            return self.acknowledge(entry.id()).await.map(Some);
        }
        Ok(Some(entry))
    }

    async fn refresh_purchases(&self) -> EngineResult<()> {
        let purchases = into_payload(self.provider.query_purchases().await)?;
        self.store.apply_purchases(&purchases);
        Ok(())
    }

    /// Catalog record for `id`, fetched from the provider if not loaded yet.
    async fn catalog_record(&self, id: &str) -> EngineResult<CatalogRecord> {
        if let Some(record) = self.require(id)?.to_catalog_record() {
            return Ok(record);
        }

        let ids = [id.to_string()];
        let records = into_payload(self.provider.query_catalog(&ids).await)?;
        self.store.apply_catalog_info(&records);

        records
            .into_iter()
            .find(|record| record.id == id)
            .ok_or_else(|| self.not_found(id))
    }

    /// Purchase token for `id`, refreshing purchases if none is cached.
    async fn purchase_token(&self, id: &str) -> EngineResult<String> {
        if let Some(token) = self.require(id)?.purchase_token() {
            return Ok(token.to_string());
        }

        self.refresh_purchases().await?;
        self.require(id)?
            .purchase_token()
            .map(str::to_string)
            .ok_or_else(|| self.local_error(ErrorKind::ItemNotOwned, &self.config.messages.item_not_owned, id))
    }

    fn require(&self, id: &str) -> EngineResult<CatalogEntry> {
        self.store.get(id).ok_or_else(|| self.not_found(id))
    }

    fn not_found(&self, id: &str) -> BillingError {
        self.local_error(ErrorKind::ItemUnavailable, &self.config.messages.item_not_found, id)
    }

    fn in_progress(&self, id: &str) -> BillingError {
        self.local_error(
            ErrorKind::OperationInProgress,
            &self.config.messages.operation_in_progress,
            id,
        )
    }

    fn local_error(&self, kind: ErrorKind, template: &str, id: &str) -> BillingError {
        BillingError::new(kind, ErrorMessages::render(template, id))
    }
}

/// The listener installed on the provider.
///
/// Applies the delivered purchases to the store before resolving waiters, so a
/// resumed workflow reads the updated entry.
struct PurchaseUpdateDispatcher {
    store: Arc<CatalogStore>,
    registry: Arc<PendingPurchaseRegistry>,
    connection: Weak<ConnectionManager>,
}

impl PurchasesUpdatedListener for PurchaseUpdateDispatcher {
    fn on_purchases_updated(&self, result: BillingResult, purchases: Option<Vec<PurchaseRecord>>) {
        info!(
            code = i32::from(result.code),
            purchases = purchases.as_ref().map_or(0, Vec::len),
            "purchases updated"
        );
        if result.is_ok()
            && let Some(records) = &purchases
        {
            self.store.apply_purchase_updates(records);
        }
        self.registry.dispatch(&result, purchases.as_deref());
    }

    fn on_service_disconnected(&self) {
        if let Some(connection) = self.connection.upgrade() {
            connection.on_service_disconnected();
        }
    }
}

fn check(result: BillingResult) -> EngineResult<()> {
    if result.is_ok() {
        Ok(())
    } else {
        Err(BillingError::from(result))
    }
}

fn into_payload<T>((result, payload): (BillingResult, T)) -> EngineResult<T> {
    check(result).map(|()| payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records::ResponseCode;
    use crate::infrastructure::in_memory::{InMemoryBillingProvider, Operation, PurchaseBehavior};

    fn listing(id: &str) -> CatalogRecord {
        CatalogRecord {
            id: id.to_string(),
            title: "Remove ads".to_string(),
            description: "No more banners".to_string(),
            price: "$2.99".to_string(),
            price_amount_micros: 2_990_000,
            currency: "USD".to_string(),
        }
    }

    fn engine(provider: &Arc<InMemoryBillingProvider>) -> BillingEngine {
        BillingEngine::new(
            provider.clone(),
            [CatalogEntry::one_time("remove_ads")],
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_cached_catalog_skips_provider() {
        let provider = Arc::new(InMemoryBillingProvider::new().with_listing(listing("remove_ads")));
        let engine = engine(&provider);
        let ids = vec!["remove_ads".to_string()];

        engine.list_catalog(&ids).await.unwrap();
        let calls = provider.total_calls();
        let entries = engine.list_catalog(&ids).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(provider.total_calls(), calls);
    }

    #[tokio::test]
    async fn test_purchase_loads_catalog_lazily() {
        let provider = Arc::new(InMemoryBillingProvider::new().with_listing(listing("remove_ads")));
        let engine = engine(&provider);

        let entry = engine.purchase("remove_ads", false).await.unwrap().unwrap();

        assert_eq!(entry.price(), Some("$2.99"));
        assert!(entry.is_pending());
        assert_eq!(provider.call_count(Operation::QueryCatalog), 1);
        assert_eq!(provider.call_count(Operation::Acknowledge), 0);
    }

    #[tokio::test]
    async fn test_launch_rejection_fails_without_registering() {
        let provider = Arc::new(InMemoryBillingProvider::new().with_listing(listing("remove_ads")));
        provider.fail_next(Operation::LaunchPurchaseFlow, ResponseCode::DeveloperError);
        let engine = engine(&provider);

        let error = engine.purchase("remove_ads", true).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::DeveloperError);
        assert_eq!(engine.pending_purchases(), 0);
    }

    #[tokio::test]
    async fn test_purchase_of_unlisted_item_is_unavailable() {
        let provider = Arc::new(InMemoryBillingProvider::new());
        let engine = engine(&provider);

        let error = engine.purchase("remove_ads", true).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::ItemUnavailable);
        assert_eq!(provider.call_count(Operation::LaunchPurchaseFlow), 0);
    }

    #[tokio::test]
    async fn test_purchase_times_out() {
        let provider = Arc::new(InMemoryBillingProvider::new().with_listing(listing("remove_ads")));
        provider.set_purchase_behavior(PurchaseBehavior::Manual);
        let config = EngineConfig::default()
            .with_purchase_timeout(Some(std::time::Duration::from_millis(30)));
        let engine = BillingEngine::new(provider.clone(), [CatalogEntry::one_time("remove_ads")], config);

        let error = engine.purchase("remove_ads", true).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Timeout);
        assert_eq!(error.message, "Purchase of remove_ads timed out");
        assert_eq!(engine.pending_purchases(), 0);
    }

    #[tokio::test]
    async fn test_registered_item_becomes_usable() {
        let provider = Arc::new(InMemoryBillingProvider::new().with_listing(listing("gold")));
        let engine = engine(&provider);
        let ids = vec!["gold".to_string()];

        assert_eq!(
            engine.list_catalog(&ids).await.unwrap_err().kind(),
            ErrorKind::ItemUnavailable
        );
        assert!(engine.register_item(CatalogEntry::consumable("gold")));
        assert_eq!(engine.list_catalog(&ids).await.unwrap().len(), 1);
    }
}
