//! # prodigio-adapter-ble
//!
//! BLE adapter: implements the [`GattTransport`](prodigio_app::ports::GattTransport)
//! port on top of `btleplug`.
//!
//! ## How it works
//!
//! A scan listens for advertisements for the configured duration and keeps
//! a handle to every peripheral it saw, keyed by Bluetooth address. GATT
//! operations look that handle up, check the link is still up and perform
//! a single attempt; retries and re-authentication are the client's job.
//!
//! `btleplug` errors are mapped onto the port's error classes:
//!
//! | btleplug | class |
//! |----------|-------|
//! | `NotConnected`, `DeviceNotFound`, `TimedOut` | link lost |
//! | text mentioning "authentication" or "authorization" | auth required |
//! | `PermissionDenied` (host refused access), anything else | transient |
//!
//! ## Dependency rule
//!
//! Depends on `prodigio-app` and `prodigio-domain`, never the reverse.

mod config;
mod error;
mod transport;

pub use config::BleConfig;
pub use error::BleError;
pub use transport::BtleplugTransport;
