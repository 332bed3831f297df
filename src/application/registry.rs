//! Correlates the provider's global purchase-update callback with the
//! purchase flows waiting on it.
//!
//! The provider reports every purchase outcome through one listener with no
//! reference to the launch that caused it. Waiters are therefore keyed by item
//! id and matched on id membership in the returned purchase records. A failure
//! result names no flow at all, so it fails every waiter.

use crate::domain::records::{BillingResult, PurchaseRecord, PurchaseState, ResponseCode};
use crate::error::{BillingError, EngineResult, ErrorKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a purchase flow resolves to: the purchase record, `None` when the flow
/// ended without a completed purchase, or a typed error.
pub type PurchaseOutcome = EngineResult<Option<PurchaseRecord>>;

/// A slot without a sender is only reserved: the purchase UI has not been
/// launched yet, so notifications pass it by.
struct Slot {
    ticket: u64,
    sender: Option<oneshot::Sender<PurchaseOutcome>>,
}

#[derive(Default)]
struct RegistryInner {
    slots: HashMap<String, Slot>,
    next_ticket: u64,
}

impl RegistryInner {
    fn drain_waiting(&mut self) -> Vec<(String, oneshot::Sender<PurchaseOutcome>)> {
        let waiting: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.sender.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        waiting
            .into_iter()
            .filter_map(|id| {
                let sender = self.slots.remove(&id)?.sender?;
                Some((id, sender))
            })
            .collect()
    }
}

/// One slot per item id; each slot resolves exactly once.
#[derive(Default)]
pub struct PendingPurchaseRegistry {
    inner: Mutex<RegistryInner>,
}

/// Holds an id for a purchase that is about to launch.
///
/// Dropping it releases the id. [`activate`](Self::activate) turns it into a
/// waiting [`PendingPurchase`] once the provider has accepted the launch.
pub struct Reservation {
    registry: Arc<PendingPurchaseRegistry>,
    id: String,
    ticket: u64,
    active: bool,
}

/// Handle held by the workflow that launched a purchase. Dropping it before
/// the slot resolves abandons the slot.
pub struct PendingPurchase {
    registry: Arc<PendingPurchaseRegistry>,
    id: String,
    ticket: u64,
    receiver: oneshot::Receiver<PurchaseOutcome>,
}

impl PendingPurchaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is reserved or waiting.
    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().slots.contains_key(id)
    }

    /// Purchases waiting on the provider. Reservations are not counted.
    pub fn len(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|slot| slot.sender.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserves `id` ahead of a launch. Returns `None` if a purchase of `id` is
    /// already reserved or waiting; the existing holder is left untouched.
    pub fn reserve(self: &Arc<Self>, id: &str) -> Option<Reservation> {
        let mut inner = self.lock();
        if inner.slots.contains_key(id) {
            return None;
        }
        let ticket = inner.next_ticket;
        inner.next_ticket += 1;
        inner.slots.insert(id.to_string(), Slot { ticket, sender: None });
        debug!(id, ticket, "purchase reserved");

        Some(Reservation {
            registry: Arc::clone(self),
            id: id.to_string(),
            ticket,
            active: false,
        })
    }

    /// Reserves and activates in one step.
    pub fn register(self: &Arc<Self>, id: &str) -> Option<PendingPurchase> {
        self.reserve(id).map(Reservation::activate)
    }

    /// Routes one purchase-update notification to the matching waiters.
    ///
    /// An OK result resolves the waiters named in `purchases`. A user cancel
    /// resolves every waiter without a result. Anything else, including an OK
    /// result that carries no purchase list, fails every waiter.
    ///
    /// Returns how many waiters were resolved.
    pub fn dispatch(&self, result: &BillingResult, purchases: Option<&[PurchaseRecord]>) -> usize {
        match purchases {
            Some(records) if result.is_ok() => self.resolve_matching(records),
            _ if result.code == ResponseCode::UserCanceled => {
                let drained = self.lock().drain_waiting();
                let count = drained.len();
                for (id, sender) in drained {
                    debug!(id, "purchase canceled by user");
                    let _ = sender.send(Ok(None));
                }
                count
            }
            None if result.is_ok() => self.reject_all(BillingError::new(
                ErrorKind::Unknown,
                format!("{result} without a purchase list"),
            )),
            _ => self.reject_all(BillingError::from(result)),
        }
    }

    /// Fails every waiting purchase with `error`. Reservations are kept; their
    /// holders have not launched anything yet.
    pub fn reject_all(&self, error: BillingError) -> usize {
        let drained = self.lock().drain_waiting();
        let count = drained.len();
        if count > 0 {
            warn!(count, %error, "rejecting pending purchases");
        }
        for (_, sender) in drained {
            let _ = sender.send(Err(error.clone()));
        }
        count
    }

    fn resolve_matching(&self, records: &[PurchaseRecord]) -> usize {
        let mut resolved = Vec::new();
        {
            let mut inner = self.lock();
            for record in records {
                let completed = record.state == PurchaseState::Purchased;
                for id in &record.ids {
                    if inner.slots.get(id).is_some_and(|slot| slot.sender.is_some())
                        && let Some(Slot { sender: Some(sender), .. }) = inner.slots.remove(id)
                    {
                        resolved.push((id.clone(), sender, completed.then(|| record.clone())));
                    }
                }
            }
        }
        let count = resolved.len();
        for (id, sender, outcome) in resolved {
            debug!(id, completed = outcome.is_some(), "purchase resolved");
            let _ = sender.send(Ok(outcome));
        }
        count
    }

    /// Removes the slot for `id` only if it still belongs to `ticket`.
    fn abandon(&self, id: &str, ticket: u64) -> bool {
        let mut inner = self.lock();
        match inner.slots.get(id) {
            Some(slot) if slot.ticket == ticket => {
                inner.slots.remove(id);
                true
            }
            _ => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Reservation {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Opens the slot for notifications. Call only after the launch was accepted.
    pub fn activate(mut self) -> PendingPurchase {
        let (sender, receiver) = oneshot::channel();
        {
            let mut inner = self.registry.lock();
            match inner.slots.get_mut(&self.id) {
                Some(slot) if slot.ticket == self.ticket => slot.sender = Some(sender),
                // Released underneath us; the receiver reports a dropped sender.
                _ => drop(sender),
            }
        }
        self.active = true;
        debug!(id = %self.id, ticket = self.ticket, "purchase registered");

        PendingPurchase {
            registry: Arc::clone(&self.registry),
            id: self.id.clone(),
            ticket: self.ticket,
            receiver,
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.active && self.registry.abandon(&self.id, self.ticket) {
            debug!(id = %self.id, "purchase reservation released");
        }
    }
}

impl PendingPurchase {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the slot to resolve. Returns `None` if `timeout` expires first,
    /// in which case the slot has been removed from the registry.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Option<PurchaseOutcome> {
        let received = match timeout {
            None => (&mut self.receiver).await,
            Some(limit) => match tokio::time::timeout(limit, &mut self.receiver).await {
                Ok(received) => received,
                Err(_) => {
                    if self.registry.abandon(&self.id, self.ticket) {
                        return None;
                    }
                    // Resolved between the deadline and the removal.
                    return self.receiver.try_recv().ok();
                }
            },
        };

        Some(received.unwrap_or_else(|_| {
            Err(BillingError::new(
                ErrorKind::ServiceDisconnected,
                format!("purchase of {} was dropped before it resolved", self.id),
            ))
        }))
    }
}

impl Drop for PendingPurchase {
    fn drop(&mut self) {
        if self.registry.abandon(&self.id, self.ticket) {
            debug!(id = %self.id, "purchase abandoned by its caller");
        }
    }
}
