//! Client and connection error types.

use prodigio_domain::peripheral::PeripheralId;

use crate::ports::gatt::{ErrorClass, TransportError};

/// A GATT operation failed on every attempt its retry budget allowed.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed after {attempts} attempts")]
pub struct LinkError {
    /// Name of the operation (e.g. `"read_characteristic"`).
    pub operation: &'static str,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// The failure of the last attempt.
    #[source]
    pub source: TransportError,
}

impl LinkError {
    /// Classification of the last failure.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        self.source.class()
    }
}

/// Errors surfaced by the [`ProdigioClient`](crate::client::ProdigioClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Scanning for peripherals failed.
    #[error("BLE scan failed")]
    Scan(#[source] TransportError),

    /// A scan completed without finding any Prodigio machine.
    #[error("no Prodigio machine found")]
    NoDevices,

    /// The peripheral is not part of the current discovery result.
    #[error("device {0} has not been discovered")]
    UnknownDevice(PeripheralId),

    /// An operation on a single peripheral gave up.
    #[error("operation on {id} failed")]
    Link {
        id: PeripheralId,
        #[source]
        source: LinkError,
    },
}

impl ClientError {
    pub(crate) fn link(id: &PeripheralId) -> impl FnOnce(LinkError) -> Self + '_ {
        move |source| Self::Link {
            id: id.clone(),
            source,
        }
    }
}
