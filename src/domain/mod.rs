//! Domain model: catalog entries, provider records and the provider port.

pub mod catalog;
pub mod ports;
pub mod records;
