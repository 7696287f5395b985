//! GATT transport port: the BLE capability the client is built on.
//!
//! An adapter (e.g. `prodigio-adapter-ble`) bridges a concrete radio stack
//! into these primitives. Implementations are expected to be stateless with
//! respect to retries: every call is a single attempt, and failures are
//! reported with enough detail for [`TransportError::class`] to decide how
//! the connection state machine should react.

use std::future::Future;

use prodigio_domain::peripheral::{Advertisement, PeripheralId};
use uuid::Uuid;

/// How the connection state machine reacts to a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The link dropped or was never established; reconnect before retrying.
    LinkLost,
    /// The peripheral rejected the request for lack of authentication;
    /// re-authenticate before retrying.
    AuthRequired,
    /// Anything else; retry as-is.
    Transient,
}

/// A single failed transport call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peripheral was never seen by a scan on this adapter.
    #[error("unknown peripheral {0}")]
    UnknownPeripheral(PeripheralId),

    /// The peripheral is not (or no longer) connected.
    #[error("peripheral not connected")]
    NotConnected,

    /// The peripheral refused the request until the auth code is written.
    #[error("insufficient authentication")]
    InsufficientAuthentication,

    /// The requested characteristic is not exposed by the peripheral.
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    /// The requested descriptor is not exposed by the peripheral.
    #[error("descriptor {0} not found")]
    DescriptorNotFound(Uuid),

    /// The radio stack gave up waiting for the peripheral.
    #[error("operation timed out")]
    TimedOut,

    /// Any other radio stack failure.
    #[error("BLE transport failure")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Classify this failure for the connection state machine.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownPeripheral(_) | Self::NotConnected | Self::TimedOut => {
                ErrorClass::LinkLost
            }
            Self::InsufficientAuthentication => ErrorClass::AuthRequired,
            Self::CharacteristicNotFound(_) | Self::DescriptorNotFound(_) | Self::Other(_) => {
                ErrorClass::Transient
            }
        }
    }
}

/// A characteristic exposed by a connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    /// UUIDs of the descriptors attached to this characteristic.
    pub descriptors: Vec<Uuid>,
}

/// Address of a descriptor: the owning characteristic plus its own UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRef {
    pub characteristic: Uuid,
    pub uuid: Uuid,
}

/// Primitive BLE operations.
///
/// This is a **port**: the client calls it, adapters implement it.
/// Disconnect notifications are delivered out-of-band by the adapter and
/// forwarded with [`ProdigioClient::watch_disconnects`](crate::client::ProdigioClient::watch_disconnects).
pub trait GattTransport: Send + Sync {
    /// Scan for advertising peripherals.
    fn scan(&self) -> impl Future<Output = Result<Vec<Advertisement>, TransportError>> + Send;

    /// Establish a link and discover services.
    fn connect(&self, id: &PeripheralId)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// List the characteristics exposed by a connected peripheral.
    fn characteristics(
        &self,
        id: &PeripheralId,
    ) -> impl Future<Output = Result<Vec<CharacteristicInfo>, TransportError>> + Send;

    /// Read a characteristic value.
    fn read_characteristic(
        &self,
        id: &PeripheralId,
        uuid: Uuid,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Read a descriptor value.
    fn read_descriptor(
        &self,
        id: &PeripheralId,
        descriptor: DescriptorRef,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Write a characteristic value, optionally waiting for the peripheral's
    /// acknowledgement.
    fn write_characteristic(
        &self,
        id: &PeripheralId,
        uuid: Uuid,
        data: &[u8],
        with_response: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_classify_link_failures() {
        assert_eq!(TransportError::NotConnected.class(), ErrorClass::LinkLost);
        assert_eq!(TransportError::TimedOut.class(), ErrorClass::LinkLost);
        assert_eq!(
            TransportError::UnknownPeripheral(PeripheralId::new("AA:BB:CC:DD:EE:FF")).class(),
            ErrorClass::LinkLost
        );
    }

    #[test]
    fn should_classify_auth_failures() {
        assert_eq!(
            TransportError::InsufficientAuthentication.class(),
            ErrorClass::AuthRequired
        );
    }

    #[test]
    fn should_classify_everything_else_as_transient() {
        assert_eq!(
            TransportError::CharacteristicNotFound(Uuid::nil()).class(),
            ErrorClass::Transient
        );
        let other = TransportError::Other("gatt error 0x0e".into());
        assert_eq!(other.class(), ErrorClass::Transient);
        assert_eq!(other.to_string(), "BLE transport failure");
    }
}
