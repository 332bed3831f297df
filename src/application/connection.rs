use super::registry::PendingPurchaseRegistry;
use crate::domain::ports::BillingProviderRef;
use crate::error::{BillingError, EngineResult, ErrorKind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

type Waiter = oneshot::Sender<EngineResult<()>>;

struct ConnectionInner {
    state: ConnectionState,
    waiters: Vec<Waiter>,
    closed: bool,
}

/// Owns the single provider connection.
///
/// Concurrent `ensure_connected` calls share one physical connect attempt: the
/// first caller starts it, everyone else queues, and the outcome is handed to
/// every queued caller at once.
pub struct ConnectionManager {
    provider: BillingProviderRef,
    registry: Arc<PendingPurchaseRegistry>,
    inner: Arc<Mutex<ConnectionInner>>,
}

impl ConnectionManager {
    pub fn new(provider: BillingProviderRef, registry: Arc<PendingPurchaseRegistry>) -> Self {
        Self {
            provider,
            registry,
            inner: Arc::new(Mutex::new(ConnectionInner {
                state: ConnectionState::Disconnected,
                waiters: Vec::new(),
                closed: false,
            })),
        }
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner).state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected && self.provider.is_ready()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    /// Resolves once the provider is connected.
    ///
    /// Fails with the translated provider error if the shared connect attempt
    /// fails, or with `ServiceDisconnected` after [`close`](Self::close).
    pub async fn ensure_connected(&self) -> EngineResult<()> {
        let receiver = {
            let mut inner = lock(&self.inner);
            if inner.closed {
                return Err(closed_error());
            }
            if inner.state == ConnectionState::Connected {
                if self.provider.is_ready() {
                    return Ok(());
                }
                debug!("provider no longer ready, reconnecting");
                inner.state = ConnectionState::Disconnected;
            }

            let (sender, receiver) = oneshot::channel();
            inner.waiters.push(sender);

            if inner.state != ConnectionState::Connecting {
                inner.state = ConnectionState::Connecting;
                self.spawn_connect();
            }
            receiver
        };

        receiver.await.unwrap_or_else(|_| {
            Err(BillingError::new(
                ErrorKind::ServiceDisconnected,
                "connection attempt was abandoned",
            ))
        })
    }

    /// Marks the connection as lost. The next `ensure_connected` reconnects.
    pub fn on_service_disconnected(&self) {
        let mut inner = lock(&self.inner);
        if inner.state == ConnectionState::Connected {
            info!("billing service disconnected");
            inner.state = ConnectionState::Disconnected;
        }
    }

    /// Releases the provider connection. The manager cannot be used afterwards:
    /// queued waiters and pending purchases fail with `ServiceDisconnected`.
    pub fn close(&self) {
        let waiters = {
            let mut inner = lock(&self.inner);
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.state = ConnectionState::Disconnected;
            std::mem::take(&mut inner.waiters)
        };

        self.provider.disconnect();
        info!("billing connection closed");

        let error = closed_error();
        for waiter in waiters {
            let _ = waiter.send(Err(error.clone()));
        }
        self.registry.reject_all(error);
    }

    fn spawn_connect(&self) {
        let provider = Arc::clone(&self.provider);
        let registry = Arc::clone(&self.registry);
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            debug!("starting billing connection");
            let result = provider.connect().await;

            let (outcome, waiters) = {
                let mut guard = lock(&inner);
                let outcome = if guard.closed {
                    Err(closed_error())
                } else if result.is_ok() {
                    guard.state = ConnectionState::Connected;
                    Ok(())
                } else {
                    guard.state = ConnectionState::Disconnected;
                    Err(BillingError::from(&result))
                };
                (outcome, std::mem::take(&mut guard.waiters))
            };

            match &outcome {
                Ok(()) => info!(waiters = waiters.len(), "billing service connected"),
                Err(error) => {
                    warn!(waiters = waiters.len(), %error, "billing connection failed");
                    if result.is_ok() {
                        // Closed while connecting; release what the provider just opened.
                        provider.disconnect();
                    }
                    registry.reject_all(error.clone());
                }
            }

            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        });
    }
}

fn lock(inner: &Mutex<ConnectionInner>) -> MutexGuard<'_, ConnectionInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn closed_error() -> BillingError {
    BillingError::new(ErrorKind::ServiceDisconnected, "billing connection is closed")
}
