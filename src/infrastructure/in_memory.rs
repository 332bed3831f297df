use crate::domain::ports::{BillingProvider, PurchasesUpdatedListenerRef};
use crate::domain::records::{
    BillingResult, CatalogRecord, PurchaseRecord, PurchaseState, ResponseCode,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Provider operations, used for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Disconnect,
    QueryCatalog,
    QueryPurchases,
    LaunchPurchaseFlow,
    Acknowledge,
    Consume,
}

/// What the simulated user does once a purchase UI is launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PurchaseBehavior {
    /// Completes the purchase; the update reports it as purchased.
    #[default]
    Approve,
    /// The payment is deferred; the update reports it as pending.
    Pending,
    /// The user backs out; the update carries `UserCanceled` and no purchases.
    Cancel,
    /// Nothing is delivered; tests call `deliver_purchases_updated` themselves.
    Manual,
}

struct ProviderState {
    listings: BTreeMap<String, CatalogRecord>,
    purchases: Vec<PurchaseRecord>,
    ready: bool,
    behavior: PurchaseBehavior,
    connect_delay: Duration,
    update_delay: Duration,
    failures: HashMap<Operation, VecDeque<ResponseCode>>,
    calls: HashMap<Operation, usize>,
    next_token: u64,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            listings: BTreeMap::new(),
            purchases: Vec::new(),
            ready: false,
            behavior: PurchaseBehavior::default(),
            connect_delay: Duration::ZERO,
            update_delay: Duration::from_millis(5),
            failures: HashMap::new(),
            calls: HashMap::new(),
            next_token: 1,
        }
    }
}

impl ProviderState {
    /// Counts the call and returns an injected or connection failure, if any.
    fn begin(&mut self, operation: Operation) -> Option<BillingResult> {
        *self.calls.entry(operation).or_default() += 1;
        if let Some(code) = self
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Some(BillingResult::new(code, format!("injected {operation:?} failure")));
        }
        if !self.ready && operation != Operation::Connect {
            return Some(BillingResult::new(
                ResponseCode::ServiceDisconnected,
                "not connected",
            ));
        }
        None
    }
}

/// A billing provider that lives entirely in memory.
///
/// Holds the store listings and the user's purchases, and simulates the
/// purchase UI according to [`PurchaseBehavior`]. Purchase outcomes are
/// delivered out-of-band to the installed listener, like a real provider.
#[derive(Default)]
pub struct InMemoryBillingProvider {
    state: Mutex<ProviderState>,
    listener: Mutex<Option<PurchasesUpdatedListenerRef>>,
}

impl InMemoryBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(self, record: CatalogRecord) -> Self {
        self.add_listing(record);
        self
    }

    pub fn with_purchase(self, record: PurchaseRecord) -> Self {
        self.add_purchase(record);
        self
    }

    pub fn add_listing(&self, record: CatalogRecord) {
        self.lock().listings.insert(record.id.clone(), record);
    }

    pub fn add_purchase(&self, record: PurchaseRecord) {
        self.lock().purchases.push(record);
    }

    pub fn set_purchase_behavior(&self, behavior: PurchaseBehavior) {
        self.lock().behavior = behavior;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = delay;
    }

    /// Delay between an accepted launch and the delivered purchase update.
    pub fn set_update_delay(&self, delay: Duration) {
        self.lock().update_delay = delay;
    }

    /// Makes the next call of `operation` fail with `code`. Calls queue up.
    pub fn fail_next(&self, operation: Operation, code: ResponseCode) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(code);
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    pub fn purchases(&self) -> Vec<PurchaseRecord> {
        self.lock().purchases.clone()
    }

    /// Invokes the installed listener directly, as the provider would.
    pub fn deliver_purchases_updated(
        &self,
        result: BillingResult,
        purchases: Option<Vec<PurchaseRecord>>,
    ) {
        if let Some(listener) = self.listener() {
            listener.on_purchases_updated(result, purchases);
        }
    }

    /// Drops the connection and notifies the listener.
    pub fn drop_connection(&self) {
        self.lock().ready = false;
        if let Some(listener) = self.listener() {
            listener.on_service_disconnected();
        }
    }

    fn listener(&self) -> Option<PurchasesUpdatedListenerRef> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_update(
        &self,
        delay: Duration,
        result: BillingResult,
        purchases: Option<Vec<PurchaseRecord>>,
    ) {
        let Some(listener) = self.listener() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            listener.on_purchases_updated(result, purchases);
        });
    }
}

#[async_trait]
impl BillingProvider for InMemoryBillingProvider {
    fn set_purchases_updated_listener(&self, listener: PurchasesUpdatedListenerRef) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    async fn connect(&self) -> BillingResult {
        let delay = self.lock().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        if let Some(failure) = state.begin(Operation::Connect) {
            return failure;
        }
        state.ready = true;
        BillingResult::ok()
    }

    fn disconnect(&self) {
        let mut state = self.lock();
        *state.calls.entry(Operation::Disconnect).or_default() += 1;
        state.ready = false;
    }

    fn is_ready(&self) -> bool {
        self.lock().ready
    }

    async fn query_catalog(&self, ids: &[String]) -> (BillingResult, Vec<CatalogRecord>) {
        let mut state = self.lock();
        if let Some(failure) = state.begin(Operation::QueryCatalog) {
            return (failure, Vec::new());
        }
        let records = ids
            .iter()
            .filter_map(|id| state.listings.get(id).cloned())
            .collect();
        (BillingResult::ok(), records)
    }

    async fn query_purchases(&self) -> (BillingResult, Vec<PurchaseRecord>) {
        let mut state = self.lock();
        if let Some(failure) = state.begin(Operation::QueryPurchases) {
            return (failure, Vec::new());
        }
        (BillingResult::ok(), state.purchases.clone())
    }

    fn launch_purchase_flow(&self, record: &CatalogRecord) -> BillingResult {
        let (behavior, delay, update) = {
            let mut state = self.lock();
            if let Some(failure) = state.begin(Operation::LaunchPurchaseFlow) {
                return failure;
            }
            if !state.listings.contains_key(&record.id) {
                return BillingResult::new(ResponseCode::ItemUnavailable, "not listed");
            }
            if state.purchases.iter().any(|p| p.covers(&record.id)) {
                return BillingResult::new(ResponseCode::ItemAlreadyOwned, "already owned");
            }

            let purchase_state = match state.behavior {
                PurchaseBehavior::Approve => Some(PurchaseState::Purchased),
                PurchaseBehavior::Pending => Some(PurchaseState::Pending),
                PurchaseBehavior::Cancel | PurchaseBehavior::Manual => None,
            };
            let update = purchase_state.map(|purchase_state| {
                let token = format!("token-{}", state.next_token);
                state.next_token += 1;
                let purchase = PurchaseRecord {
                    ids: vec![record.id.clone()],
                    token,
                    state: purchase_state,
                    acknowledged: false,
                };
                state.purchases.push(purchase.clone());
                purchase
            });
            (state.behavior, state.update_delay, update)
        };

        debug!(id = %record.id, ?behavior, "simulated purchase flow launched");
        match (behavior, update) {
            (PurchaseBehavior::Manual, _) => {}
            (PurchaseBehavior::Cancel, _) => self.schedule_update(
                delay,
                BillingResult::new(ResponseCode::UserCanceled, "user canceled"),
                None,
            ),
            (_, update) => self.schedule_update(delay, BillingResult::ok(), update.map(|p| vec![p])),
        }
        BillingResult::ok()
    }

    async fn acknowledge(&self, token: &str) -> BillingResult {
        let mut state = self.lock();
        if let Some(failure) = state.begin(Operation::Acknowledge) {
            return failure;
        }
        match state.purchases.iter_mut().find(|p| p.token == token) {
            Some(purchase) => {
                purchase.acknowledged = true;
                BillingResult::ok()
            }
            None => BillingResult::new(ResponseCode::ItemNotOwned, "unknown purchase token"),
        }
    }

    async fn consume(&self, token: &str) -> BillingResult {
        let mut state = self.lock();
        if let Some(failure) = state.begin(Operation::Consume) {
            return failure;
        }
        match state.purchases.iter().position(|p| p.token == token) {
            Some(position) => {
                state.purchases.remove(position);
                BillingResult::ok()
            }
            None => BillingResult::new(ResponseCode::ItemNotOwned, "unknown purchase token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str) -> CatalogRecord {
        CatalogRecord {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            price: "$1.99".to_string(),
            price_amount_micros: 1_990_000,
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn test_queries_require_connection() {
        let provider = InMemoryBillingProvider::new().with_listing(listing("gems"));

        let (result, records) = provider.query_catalog(&["gems".to_string()]).await;
        assert_eq!(result.code, ResponseCode::ServiceDisconnected);
        assert!(records.is_empty());

        assert!(provider.connect().await.is_ok());
        let (result, records) = provider.query_catalog(&["gems".to_string()]).await;
        assert!(result.is_ok());
        assert_eq!(records, vec![listing("gems")]);
        assert_eq!(provider.call_count(Operation::QueryCatalog), 2);
    }

    #[tokio::test]
    async fn test_injected_failure_is_used_once() {
        let provider = InMemoryBillingProvider::new();
        provider.fail_next(Operation::Connect, ResponseCode::ServiceUnavailable);

        assert_eq!(provider.connect().await.code, ResponseCode::ServiceUnavailable);
        assert!(!provider.is_ready());
        assert!(provider.connect().await.is_ok());
    }

    #[tokio::test]
    async fn test_acknowledge_and_consume_update_purchases() {
        let provider = InMemoryBillingProvider::new().with_purchase(PurchaseRecord {
            ids: vec!["gems".to_string()],
            token: "t1".to_string(),
            state: PurchaseState::Purchased,
            acknowledged: false,
        });
        provider.connect().await;

        assert!(provider.acknowledge("t1").await.is_ok());
        assert!(provider.purchases()[0].acknowledged);

        assert!(provider.consume("t1").await.is_ok());
        assert!(provider.purchases().is_empty());
        assert_eq!(provider.consume("t1").await.code, ResponseCode::ItemNotOwned);
    }

    #[tokio::test]
    async fn test_launch_rejects_owned_item() {
        let provider = InMemoryBillingProvider::new()
            .with_listing(listing("gems"))
            .with_purchase(PurchaseRecord {
                ids: vec!["gems".to_string()],
                token: "t1".to_string(),
                state: PurchaseState::Purchased,
                acknowledged: true,
            });
        provider.connect().await;

        let result = provider.launch_purchase_flow(&listing("gems"));
        assert_eq!(result.code, ResponseCode::ItemAlreadyOwned);
    }
}
