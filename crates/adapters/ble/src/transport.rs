//! btleplug implementation of [`GattTransport`].

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, PeripheralProperties,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use prodigio_app::ports::{CharacteristicInfo, DescriptorRef, GattTransport, TransportError};
use prodigio_domain::peripheral::{Advertisement, PeripheralId};
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;
use uuid::Uuid;

use crate::config::BleConfig;
use crate::error::BleError;

const DISCONNECT_CHANNEL_CAPACITY: usize = 16;

/// GATT transport over the host's first BLE adapter.
///
/// Peripherals are addressed by their Bluetooth address. Only peripherals
/// returned by a previous [`scan`](GattTransport::scan) can be connected.
pub struct BtleplugTransport {
    central: Adapter,
    scan_duration: Duration,
    peripherals: RwLock<HashMap<PeripheralId, Peripheral>>,
}

impl BtleplugTransport {
    /// Open the first BLE adapter on the host.
    ///
    /// # Errors
    ///
    /// Returns [`BleError::NotAvailable`] when the host has no adapter, or
    /// [`BleError::Ble`] if the BLE stack cannot be reached.
    pub async fn new(config: &BleConfig) -> Result<Self, BleError> {
        let manager = Manager::new().await?;
        let central = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BleError::NotAvailable)?;

        match central.adapter_info().await {
            Ok(info) => tracing::info!(adapter = %info, "BLE adapter ready"),
            Err(err) => tracing::debug!(%err, "could not describe BLE adapter"),
        }

        Ok(Self {
            central,
            scan_duration: config.scan_duration(),
            peripherals: RwLock::new(HashMap::new()),
        })
    }

    /// Stream of peripherals the BLE stack reports as disconnected.
    ///
    /// A background task forwards events until the receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`BleError::Ble`] if the adapter event stream cannot be opened.
    pub async fn disconnect_events(&self) -> Result<mpsc::Receiver<PeripheralId>, BleError> {
        let mut events = self.central.events().await?;
        let central = self.central.clone();
        let (tx, rx) = mpsc::channel(DISCONNECT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let CentralEvent::DeviceDisconnected(platform_id) = event else {
                    continue;
                };
                let peripheral = match central.peripheral(&platform_id).await {
                    Ok(peripheral) => peripheral,
                    Err(err) => {
                        tracing::warn!(%err, "disconnect event for unknown peripheral");
                        continue;
                    }
                };
                let id = PeripheralId::new(peripheral.address().to_string());
                tracing::debug!(%id, "BLE stack reported disconnect");
                if tx.send(id).await.is_err() {
                    break;
                }
            }
            tracing::debug!("BLE event stream ended");
        });

        Ok(rx)
    }

    async fn scan_once(&self) -> Result<Vec<Advertisement>, BleError> {
        tracing::debug!(duration = ?self.scan_duration, "BLE scan started");
        // Unfiltered: some stacks only expose the service UUID after connecting,
        // so name-based matching must still see those machines.
        self.central.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(self.scan_duration).await;
        self.central.stop_scan().await?;

        let mut advertisements = Vec::new();
        let mut seen = HashMap::new();
        for peripheral in self.central.peripherals().await? {
            let props = match peripheral.properties().await {
                Ok(Some(props)) => props,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(%err, "failed to read peripheral properties");
                    continue;
                }
            };
            tracing::trace!(
                address = %props.address,
                name = ?props.local_name,
                rssi = ?props.rssi,
                "BLE device detected"
            );
            let advertisement = advertisement(props);
            seen.insert(advertisement.id.clone(), peripheral);
            advertisements.push(advertisement);
        }

        self.peripherals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(seen);

        Ok(advertisements)
    }

    fn peripheral(&self, id: &PeripheralId) -> Result<Peripheral, BleError> {
        self.peripherals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| BleError::UnknownPeripheral(id.clone()))
    }

    /// The peripheral, provided its link is currently up.
    async fn connected(&self, id: &PeripheralId) -> Result<Peripheral, BleError> {
        let peripheral = self.peripheral(id)?;
        if peripheral.is_connected().await? {
            Ok(peripheral)
        } else {
            Err(btleplug::Error::NotConnected.into())
        }
    }

    async fn connect_peripheral(&self, id: &PeripheralId) -> Result<(), BleError> {
        let peripheral = self.peripheral(id)?;
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;
        tracing::debug!(%id, "GATT services discovered");
        Ok(())
    }

    async fn list_characteristics(&self, id: &PeripheralId) -> Result<Vec<CharacteristicInfo>, BleError> {
        let peripheral = self.connected(id).await?;
        Ok(peripheral
            .characteristics()
            .iter()
            .map(characteristic_info)
            .collect())
    }

    async fn read(&self, id: &PeripheralId, uuid: Uuid) -> Result<Vec<u8>, BleError> {
        let peripheral = self.connected(id).await?;
        let characteristic = find_characteristic(&peripheral, uuid)?;
        Ok(peripheral.read(&characteristic).await?)
    }

    async fn read_desc(&self, id: &PeripheralId, target: DescriptorRef) -> Result<Vec<u8>, BleError> {
        let peripheral = self.connected(id).await?;
        let characteristic = find_characteristic(&peripheral, target.characteristic)?;
        let descriptor = characteristic
            .descriptors
            .into_iter()
            .find(|d| d.uuid == target.uuid)
            .ok_or(BleError::DescriptorNotFound {
                characteristic: target.characteristic,
                descriptor: target.uuid,
            })?;
        Ok(peripheral.read_descriptor(&descriptor).await?)
    }

    async fn write(
        &self,
        id: &PeripheralId,
        uuid: Uuid,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), BleError> {
        let peripheral = self.connected(id).await?;
        let characteristic = find_characteristic(&peripheral, uuid)?;
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        peripheral.write(&characteristic, data, write_type).await?;
        tracing::trace!(%id, %uuid, len = data.len(), "GATT write acknowledged");
        Ok(())
    }
}

impl GattTransport for BtleplugTransport {
    async fn scan(&self) -> Result<Vec<Advertisement>, TransportError> {
        Ok(self.scan_once().await?)
    }

    async fn connect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        Ok(self.connect_peripheral(id).await?)
    }

    async fn characteristics(&self, id: &PeripheralId) -> Result<Vec<CharacteristicInfo>, TransportError> {
        Ok(self.list_characteristics(id).await?)
    }

    async fn read_characteristic(&self, id: &PeripheralId, uuid: Uuid) -> Result<Vec<u8>, TransportError> {
        Ok(self.read(id, uuid).await?)
    }

    async fn read_descriptor(
        &self,
        id: &PeripheralId,
        descriptor: DescriptorRef,
    ) -> Result<Vec<u8>, TransportError> {
        Ok(self.read_desc(id, descriptor).await?)
    }

    async fn write_characteristic(
        &self,
        id: &PeripheralId,
        uuid: Uuid,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError> {
        Ok(self.write(id, uuid, data, with_response).await?)
    }
}

fn advertisement(props: PeripheralProperties) -> Advertisement {
    Advertisement {
        id: PeripheralId::new(props.address.to_string()),
        local_name: props.local_name,
        services: props.services,
    }
}

fn characteristic_info(characteristic: &Characteristic) -> CharacteristicInfo {
    CharacteristicInfo {
        uuid: characteristic.uuid,
        descriptors: characteristic.descriptors.iter().map(|d| d.uuid).collect(),
    }
}

/// Find a GATT characteristic by UUID on a peripheral that has already
/// discovered its services.
fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic, BleError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or(BleError::CharacteristicNotFound(uuid))
}
