//! Discovery, attribute aggregation and brew commands.
//!
//! [`ProdigioClient`] owns the current set of [`DeviceBundle`]s and the
//! [`DevicePool`]. Discovery replaces the bundle set wholesale; a machine
//! that misses one scan burst disappears until a later scan sees it again.
//! Refreshes are isolated per characteristic and per peripheral: a failure
//! is logged and reported, and the remaining reads carry on.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use prodigio_domain::auth::AuthCode;
use prodigio_domain::command::{BrewCommand, Volume};
use prodigio_domain::error::ValidationError;
use prodigio_domain::peripheral::{Advertisement, PeripheralId};
use prodigio_domain::protocol;
use prodigio_domain::sensor::{self, SensorKind};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::bundle::DeviceBundle;
use crate::config::ClientConfig;
use crate::error::{ClientError, LinkError};
use crate::link::PeripheralConnection;
use crate::pool::DevicePool;
use crate::ports::gatt::{DescriptorRef, GattTransport, TransportError};
use crate::retry::{self, RetryPolicy};

/// A sensor characteristic that could not be read during a refresh.
#[derive(Debug)]
pub struct ReadFailure {
    pub kind: SensorKind,
    pub error: LinkError,
}

/// Outcome of refreshing one bundle.
#[derive(Debug)]
pub struct RefreshReport {
    pub id: PeripheralId,
    /// Sensors read, decoded and merged.
    pub updated: Vec<SensorKind>,
    /// Sensors whose read gave up.
    pub failures: Vec<ReadFailure>,
}

impl RefreshReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Raw value of one descriptor, as returned by [`ProdigioClient::inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorReading {
    pub descriptor: DescriptorRef,
    pub value: Vec<u8>,
}

/// Per-peripheral refresh results, ordered by peripheral id.
pub type RefreshResults = Vec<(PeripheralId, Result<RefreshReport, ClientError>)>;

/// Resilient client for every Prodigio machine in radio range.
pub struct ProdigioClient<T> {
    transport: Arc<T>,
    pool: Arc<DevicePool<T>>,
    policy: RetryPolicy,
    bundles: RwLock<Vec<Arc<DeviceBundle>>>,
    discovered: watch::Sender<Option<usize>>,
}

impl<T: GattTransport + 'static> ProdigioClient<T> {
    #[must_use]
    pub fn new(transport: Arc<T>, auth_code: AuthCode, policy: RetryPolicy) -> Self {
        let pool = DevicePool::new(Arc::clone(&transport), auth_code, policy);
        let (discovered, _) = watch::channel(None);
        Self {
            transport,
            pool: Arc::new(pool),
            policy,
            bundles: RwLock::new(Vec::new()),
            discovered,
        }
    }

    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the configured auth code is invalid.
    pub fn from_config(transport: Arc<T>, config: &ClientConfig) -> Result<Self, ValidationError> {
        Ok(Self::new(
            transport,
            config.auth_code()?,
            config.retry_policy(),
        ))
    }

    #[must_use]
    pub fn pool(&self) -> &DevicePool<T> {
        &self.pool
    }

    /// Receiver notified with the device count after every completed discovery.
    ///
    /// Holds `None` until the first discovery finishes.
    #[must_use]
    pub fn discovery_signal(&self) -> watch::Receiver<Option<usize>> {
        self.discovered.subscribe()
    }

    /// Bundles from the latest discovery.
    #[must_use]
    pub fn bundles(&self) -> Vec<Arc<DeviceBundle>> {
        self.bundles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn bundle(&self, id: &PeripheralId) -> Option<Arc<DeviceBundle>> {
        self.bundles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|bundle| bundle.id() == id)
            .cloned()
    }

    /// Scan for Prodigio machines and replace the bundle set with the result.
    ///
    /// Returns the number of machines found.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Scan`] if every scan attempt failed. The
    /// previous bundle set is kept in that case.
    pub async fn discover(&self) -> Result<usize, ClientError> {
        let advertisements = retry::retry(
            self.policy,
            |_| self.transport.scan(),
            |attempt, err: &TransportError| {
                tracing::warn!(attempt, %err, "BLE scan failed");
            },
        )
        .await
        .map_err(ClientError::Scan)?;

        let mut seen = HashSet::new();
        let bundles: Vec<_> = advertisements
            .into_iter()
            .filter(Advertisement::is_prodigio)
            .filter(|adv| seen.insert(adv.id.clone()))
            .map(|adv| {
                tracing::debug!(id = %adv.id, name = adv.display_name(), "found Prodigio machine");
                Arc::new(DeviceBundle::new(adv))
            })
            .collect();

        let count = bundles.len();
        *self.bundles.write().unwrap_or_else(PoisonError::into_inner) = bundles;
        self.discovered.send_replace(Some(count));

        tracing::info!(count, "Prodigio discovery complete");
        Ok(count)
    }

    /// Read every sensor characteristic the machine exposes and merge the
    /// decoded values into `bundle`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Link`] if the characteristic list could not be
    /// obtained. Individual read failures are reported in the
    /// [`RefreshReport`] instead.
    pub async fn refresh_attributes(&self, bundle: &DeviceBundle) -> Result<RefreshReport, ClientError> {
        let connection = self.pool.get_or_create(bundle.id());
        refresh_bundle(&connection, bundle).await
    }

    /// Refresh every discovered bundle, peripherals in parallel.
    pub async fn refresh_all(&self) -> RefreshResults {
        let mut tasks = JoinSet::new();
        for bundle in self.bundles() {
            let connection = self.pool.get_or_create(bundle.id());
            tasks.spawn(async move {
                let result = refresh_bundle(&connection, &bundle).await;
                (bundle.id().clone(), result)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => results.push(outcome),
                Err(err) => tracing::warn!(%err, "refresh task aborted"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// One polling cycle: discover, then refresh everything found.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Scan`] if scanning failed and
    /// [`ClientError::NoDevices`] if no machine is in range.
    pub async fn update(&self) -> Result<RefreshResults, ClientError> {
        if self.discover().await? == 0 {
            return Err(ClientError::NoDevices);
        }
        Ok(self.refresh_all().await)
    }

    /// Set the volume used by [`brew`](Self::brew) for this machine.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownDevice`] if the machine is not in the
    /// current discovery result.
    pub fn select_volume(&self, id: &PeripheralId, volume: Volume) -> Result<(), ClientError> {
        let bundle = self
            .bundle(id)
            .ok_or_else(|| ClientError::UnknownDevice(id.clone()))?;
        bundle.select_volume(volume);
        Ok(())
    }

    /// Brew with the machine's selected volume.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownDevice`] for undiscovered machines and
    /// [`ClientError::Link`] if authentication or the command write gave up.
    pub async fn brew(&self, id: &PeripheralId) -> Result<(), ClientError> {
        let volume = self
            .bundle(id)
            .ok_or_else(|| ClientError::UnknownDevice(id.clone()))?
            .selected_volume();
        self.brew_with(id, volume).await
    }

    /// Authenticate and send a brew command for `volume`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Link`] if authentication or the command write
    /// gave up.
    pub async fn brew_with(&self, id: &PeripheralId, volume: Volume) -> Result<(), ClientError> {
        let connection = self.pool.get_or_create(id);
        connection
            .authenticate()
            .await
            .map_err(ClientError::link(id))?;

        let frame = BrewCommand::new(volume).encode();
        connection
            .write_characteristic(protocol::COMMAND_CHAR, &frame, true)
            .await
            .map_err(ClientError::link(id))?;

        tracing::info!(%id, %volume, "brew command sent");
        Ok(())
    }

    /// Best-effort cancel. No cancel command is known for this machine
    /// family, so this does nothing and a brew in progress runs to the end.
    ///
    /// # Errors
    ///
    /// Currently never fails.
    #[allow(clippy::unused_async)]
    pub async fn cancel(&self, id: &PeripheralId) -> Result<(), ClientError> {
        tracing::debug!(%id, "cancel requested, no cancel command is known");
        Ok(())
    }

    /// Read every descriptor of every characteristic the machine exposes.
    ///
    /// Descriptors that cannot be read are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Link`] if the characteristic list could not be
    /// obtained.
    pub async fn inspect(&self, id: &PeripheralId) -> Result<Vec<DescriptorReading>, ClientError> {
        let connection = self.pool.get_or_create(id);
        let characteristics = connection
            .characteristics()
            .await
            .map_err(ClientError::link(id))?;

        let mut readings = Vec::new();
        for characteristic in characteristics {
            for uuid in characteristic.descriptors {
                let descriptor = DescriptorRef {
                    characteristic: characteristic.uuid,
                    uuid,
                };
                match connection.read_descriptor(descriptor).await {
                    Ok(value) => readings.push(DescriptorReading { descriptor, value }),
                    Err(err) => tracing::warn!(
                        %id,
                        characteristic = %descriptor.characteristic,
                        descriptor = %descriptor.uuid,
                        %err,
                        "failed to read descriptor"
                    ),
                }
            }
        }
        Ok(readings)
    }

    /// Forward out-of-band disconnect notifications to the pool until the
    /// sender side closes.
    pub fn watch_disconnects(&self, mut events: mpsc::Receiver<PeripheralId>) -> JoinHandle<()> {
        let pool = Arc::clone(&self.pool);
        tokio::spawn(async move {
            while let Some(id) = events.recv().await {
                pool.mark_link_lost(&id);
            }
            tracing::debug!("disconnect event stream closed");
        })
    }
}

async fn refresh_bundle<T: GattTransport>(
    connection: &PeripheralConnection<T>,
    bundle: &DeviceBundle,
) -> Result<RefreshReport, ClientError> {
    let id = bundle.id();
    let exposed = connection
        .characteristics()
        .await
        .map_err(ClientError::link(id))?;

    let kinds: Vec<SensorKind> = exposed
        .iter()
        .filter_map(|c| SensorKind::from_characteristic(c.uuid))
        .collect();
    if kinds.is_empty() {
        tracing::warn!(%id, "peripheral exposes no sensor characteristics");
    }

    let mut report = RefreshReport {
        id: id.clone(),
        updated: Vec::with_capacity(kinds.len()),
        failures: Vec::new(),
    };

    for kind in kinds {
        match connection.read_characteristic(kind.characteristic()).await {
            Ok(raw) => {
                tracing::trace!(%id, key = kind.key(), ?raw, "sensor payload");
                if sensor::is_anomalous(kind, &raw) {
                    tracing::debug!(
                        %id,
                        key = kind.key(),
                        len = raw.len(),
                        "unexpected sensor payload, decoded best-effort"
                    );
                }
                let value = sensor::decode(kind, &raw).to_attribute();
                tracing::debug!(%id, key = kind.key(), ?value, "sensor reading decoded");
                bundle.merge(kind.key(), value);
                report.updated.push(kind);
            }
            Err(error) => {
                tracing::warn!(%id, key = kind.key(), %error, "failed to read sensor characteristic");
                report.failures.push(ReadFailure { kind, error });
            }
        }
    }

    if !report.updated.is_empty() {
        bundle.touch(Utc::now());
    }
    Ok(report)
}
