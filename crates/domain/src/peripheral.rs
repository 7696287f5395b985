//! Peripheral identity and advertisement snapshots.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol;

/// Stable address of a BLE peripheral (e.g. `"C4:7C:8D:6A:12:34"`).
///
/// Addresses are normalised to upper case so that lookups are not
/// sensitive to how a platform or a user spells them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeripheralId(String);

impl PeripheralId {
    /// Wrap an address string.
    #[must_use]
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_ascii_uppercase())
    }

    /// Access the address string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// What a scan reports about a single peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: PeripheralId,
    pub local_name: Option<String>,
    pub services: Vec<Uuid>,
}

impl Advertisement {
    /// Whether this advertisement belongs to a Prodigio machine.
    ///
    /// Matches on the advertised service UUID, falling back to the local
    /// name for platforms that drop service lists from scan responses.
    #[must_use]
    pub fn is_prodigio(&self) -> bool {
        self.services.contains(&protocol::SERVICE)
            || self
                .local_name
                .as_deref()
                .is_some_and(|name| name.starts_with(protocol::LOCAL_NAME_PREFIX))
    }

    /// Display name: the advertised local name, or the address.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.local_name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Static description of a discovered machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
}

impl DeviceInfo {
    /// Device info for a Prodigio machine seen in `advertisement`.
    #[must_use]
    pub fn prodigio(advertisement: &Advertisement) -> Self {
        Self {
            name: advertisement.display_name().to_owned(),
            manufacturer: "Nespresso",
            model: "Prodigio",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertisement(name: Option<&str>, services: Vec<Uuid>) -> Advertisement {
        Advertisement {
            id: PeripheralId::new("aa:bb:cc:dd:ee:ff"),
            local_name: name.map(str::to_owned),
            services,
        }
    }

    #[test]
    fn should_normalise_address_to_upper_case() {
        let id = PeripheralId::new(" c4:7c:8d:6a:12:34 ");
        assert_eq!(id.as_str(), "C4:7C:8D:6A:12:34");
        assert_eq!(id, PeripheralId::from("C4:7C:8D:6A:12:34"));
    }

    #[test]
    fn should_match_on_service_uuid() {
        let adv = advertisement(None, vec![protocol::SERVICE]);
        assert!(adv.is_prodigio());
    }

    #[test]
    fn should_match_on_local_name_prefix() {
        let adv = advertisement(Some("Prodigio-AB12"), Vec::new());
        assert!(adv.is_prodigio());
    }

    #[test]
    fn should_reject_unrelated_peripheral() {
        let adv = advertisement(Some("Flower care"), vec![Uuid::nil()]);
        assert!(!adv.is_prodigio());
    }

    #[test]
    fn should_fall_back_to_address_for_display_name() {
        let adv = advertisement(None, Vec::new());
        assert_eq!(adv.display_name(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(DeviceInfo::prodigio(&adv).model, "Prodigio");
    }
}
