//! Device pool: one [`PeripheralConnection`] per peripheral, for the life of
//! the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use prodigio_domain::auth::AuthCode;
use prodigio_domain::peripheral::PeripheralId;

use crate::link::PeripheralConnection;
use crate::ports::gatt::GattTransport;
use crate::retry::RetryPolicy;

/// Maps peripheral identity to its long-lived connection.
///
/// Entries are created on first lookup and never removed. Creation happens
/// inside the map's critical section, so concurrent lookups of a new
/// identity always agree on a single connection.
pub struct DevicePool<T> {
    transport: Arc<T>,
    auth_code: AuthCode,
    policy: RetryPolicy,
    connections: Mutex<HashMap<PeripheralId, Arc<PeripheralConnection<T>>>>,
}

impl<T: GattTransport> DevicePool<T> {
    #[must_use]
    pub fn new(transport: Arc<T>, auth_code: AuthCode, policy: RetryPolicy) -> Self {
        Self {
            transport,
            auth_code,
            policy,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Return the connection for `id`, creating it on first use.
    pub fn get_or_create(&self, id: &PeripheralId) -> Arc<PeripheralConnection<T>> {
        let mut connections = self.lock();
        let connection = connections.entry(id.clone()).or_insert_with(|| {
            tracing::debug!(%id, "creating peripheral connection");
            Arc::new(PeripheralConnection::new(
                id.clone(),
                Arc::clone(&self.transport),
                self.auth_code.clone(),
                self.policy,
            ))
        });
        Arc::clone(connection)
    }

    /// Return the connection for `id` if one was ever created.
    pub fn get(&self, id: &PeripheralId) -> Option<Arc<PeripheralConnection<T>>> {
        self.lock().get(id).cloned()
    }

    /// Forward an out-of-band disconnect notification. Unknown peripherals
    /// are ignored: they will connect from scratch on first use anyway.
    pub fn mark_link_lost(&self, id: &PeripheralId) {
        if let Some(connection) = self.get(id) {
            tracing::debug!(%id, "peripheral disconnected");
            connection.mark_link_lost();
        }
    }

    /// Number of connections created so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // The map is only touched by non-panicking code, so a poisoned lock
    // still holds a consistent map.
    fn lock(&self) -> MutexGuard<'_, HashMap<PeripheralId, Arc<PeripheralConnection<T>>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
