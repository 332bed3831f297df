//! Application layer containing the purchase orchestration.
//!
//! [`engine::BillingEngine`] is the entry point. It composes the catalog store,
//! the pending purchase registry and the connection manager, and reaches the
//! billing service only through the [`crate::domain::ports::BillingProvider`] port.

pub mod connection;
pub mod engine;
pub mod reconcile;
pub mod registry;
pub mod store;
