//! # prodigio-app
//!
//! Application layer: the resilient GATT client and its **port definitions**.
//!
//! ## Responsibilities
//! - Define the [`GattTransport`](ports::GattTransport) port that BLE
//!   adapters implement (scan, connect, read, write)
//! - Wrap every GATT operation in a bounded [`retry`] loop
//! - Track each peripheral's connect/authenticate state in a
//!   [`PeripheralConnection`](link::PeripheralConnection)
//! - Keep exactly one connection per peripheral in the [`DevicePool`](pool::DevicePool)
//! - Discover machines, refresh their decoded attributes and issue brew
//!   commands through the [`ProdigioClient`](client::ProdigioClient)
//!
//! ## Dependency rule
//! Depends on `prodigio-domain` only (plus `tokio` for sync and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod bundle;
pub mod client;
pub mod config;
pub mod error;
pub mod link;
pub mod pool;
pub mod ports;
pub mod retry;
