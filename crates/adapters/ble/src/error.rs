//! BLE adapter error types.

use prodigio_app::ports::TransportError;
use prodigio_domain::peripheral::PeripheralId;
use uuid::Uuid;

/// Errors specific to the BLE adapter.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// A btleplug operation failed.
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),

    /// The peripheral has not been returned by any scan yet.
    #[error("peripheral {0} has not been seen by a scan")]
    UnknownPeripheral(PeripheralId),

    /// The peripheral does not expose the characteristic.
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    /// The characteristic does not carry the descriptor.
    #[error("descriptor {descriptor} not found on characteristic {characteristic}")]
    DescriptorNotFound { characteristic: Uuid, descriptor: Uuid },
}

impl From<BleError> for TransportError {
    fn from(err: BleError) -> Self {
        match err {
            BleError::Ble(inner) => classify(inner),
            BleError::UnknownPeripheral(id) => Self::UnknownPeripheral(id),
            BleError::CharacteristicNotFound(uuid) => Self::CharacteristicNotFound(uuid),
            BleError::DescriptorNotFound { descriptor, .. } => Self::DescriptorNotFound(descriptor),
            other @ BleError::NotAvailable => Self::Other(Box::new(other)),
        }
    }
}

fn classify(err: btleplug::Error) -> TransportError {
    match err {
        btleplug::Error::NotConnected | btleplug::Error::DeviceNotFound => {
            TransportError::NotConnected
        }
        btleplug::Error::TimedOut(_) => TransportError::TimedOut,
        other if is_authentication_failure(&other) => TransportError::InsufficientAuthentication,
        other => TransportError::Other(Box::new(other)),
    }
}

// BlueZ and CoreBluetooth only report ATT insufficient authentication and
// authorization as text. `PermissionDenied` is the host refusing Bluetooth
// access, which a pairing write cannot fix.
fn is_authentication_failure(err: &btleplug::Error) -> bool {
    let message = err.to_string().to_ascii_lowercase();
    message.contains("authentication") || message.contains("authorization")
}
