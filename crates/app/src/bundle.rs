//! Device bundle: a discovered machine plus its latest decoded attributes.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use prodigio_domain::attribute_value::AttributeValue;
use prodigio_domain::command::Volume;
use prodigio_domain::peripheral::{Advertisement, DeviceInfo, PeripheralId};
use serde::Serialize;

/// Mutable part of a bundle.
#[derive(Debug, Default)]
struct BundleState {
    attributes: BTreeMap<String, AttributeValue>,
    selected_volume: Volume,
    last_refreshed: Option<DateTime<Utc>>,
}

/// A discovered peripheral with its decoded attributes and brew selection.
///
/// Bundles are created by discovery and replaced wholesale by the next scan.
/// Attributes are merged key by key: a refresh only overwrites the keys it
/// managed to read.
#[derive(Debug)]
pub struct DeviceBundle {
    advertisement: Advertisement,
    info: DeviceInfo,
    state: Mutex<BundleState>,
}

/// Serializable point-in-time view of a bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleSnapshot {
    pub id: PeripheralId,
    #[serde(flatten)]
    pub info: DeviceInfo,
    pub selected_volume: Volume,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl DeviceBundle {
    #[must_use]
    pub fn new(advertisement: Advertisement) -> Self {
        let info = DeviceInfo::prodigio(&advertisement);
        Self {
            advertisement,
            info,
            state: Mutex::new(BundleState::default()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &PeripheralId {
        &self.advertisement.id
    }

    #[must_use]
    pub fn advertisement(&self) -> &Advertisement {
        &self.advertisement
    }

    #[must_use]
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Copy of the current attribute map.
    #[must_use]
    pub fn attributes(&self) -> BTreeMap<String, AttributeValue> {
        self.lock().attributes.clone()
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        self.lock().attributes.get(key).cloned()
    }

    /// Merge `value` under `key`, leaving other keys untouched.
    pub fn merge(&self, key: impl Into<String>, value: AttributeValue) {
        self.lock().attributes.insert(key.into(), value);
    }

    #[must_use]
    pub fn selected_volume(&self) -> Volume {
        self.lock().selected_volume
    }

    pub fn select_volume(&self, volume: Volume) {
        self.lock().selected_volume = volume;
    }

    #[must_use]
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.lock().last_refreshed
    }

    pub(crate) fn touch(&self, at: DateTime<Utc>) {
        self.lock().last_refreshed = Some(at);
    }

    #[must_use]
    pub fn snapshot(&self) -> BundleSnapshot {
        let state = self.lock();
        BundleSnapshot {
            id: self.advertisement.id.clone(),
            info: self.info.clone(),
            selected_volume: state.selected_volume,
            attributes: state.attributes.clone(),
            last_refreshed: state.last_refreshed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BundleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
