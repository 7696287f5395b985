//! # prodigio-domain
//!
//! Pure domain model for talking to Nespresso Prodigio machines over BLE.
//!
//! ## Responsibilities
//! - Protocol constants: service and characteristic UUIDs
//! - Peripheral identity and advertisement snapshots
//! - Decoding raw sensor characteristic payloads into typed readings
//! - Encoding brew commands from a volume selection
//! - The application-layer authentication credential
//! - Typed attribute values exposed to callers
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod attribute_value;
pub mod auth;
pub mod command;
pub mod error;
pub mod peripheral;
pub mod protocol;
pub mod sensor;

pub use attribute_value::AttributeValue;
pub use auth::AuthCode;
pub use command::{BrewCommand, Volume};
pub use peripheral::{Advertisement, DeviceInfo, PeripheralId};
pub use sensor::{MachineState, SensorKind, SensorReading, SliderPosition};
