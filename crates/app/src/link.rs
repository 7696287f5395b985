//! Per-peripheral connection state machine.
//!
//! ```text
//!              connect()                authenticate()
//! Disconnected ─────────▶ Connected ─────────────────▶ Authenticated
//!      ▲                     ▲                               │
//!      │   LinkLost error    │   AuthRequired error          │
//!      └─────────────────────┴───────────────────────────────┘
//! ```
//!
//! Every public operation runs under the connection's session lock for its
//! whole retry sequence, so requests to one peripheral never overlap. Each
//! attempt first brings the link up to the state the operation needs
//! (reconnecting and re-authenticating as required) and then issues the
//! request. Disconnects reported by the radio stack only raise a flag; the
//! next operation observes it and reconnects.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use prodigio_domain::auth::AuthCode;
use prodigio_domain::peripheral::PeripheralId;
use prodigio_domain::protocol;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::LinkError;
use crate::ports::gatt::{
    CharacteristicInfo, DescriptorRef, ErrorClass, GattTransport, TransportError,
};
use crate::retry::RetryPolicy;

/// Link state of a single peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkState {
    Disconnected,
    Connected,
    Authenticated,
}

#[derive(Debug)]
struct Session {
    state: LinkState,
    last_error: Option<ErrorClass>,
}

impl Session {
    fn transition(&mut self, id: &PeripheralId, to: LinkState) {
        if self.state != to {
            tracing::debug!(%id, from = ?self.state, ?to, "link state changed");
            self.state = to;
        }
    }

    fn record_failure(&mut self, id: &PeripheralId, err: &TransportError) {
        let class = err.class();
        self.last_error = Some(class);
        match class {
            ErrorClass::LinkLost => self.transition(id, LinkState::Disconnected),
            ErrorClass::AuthRequired if self.state == LinkState::Authenticated => {
                self.transition(id, LinkState::Connected);
            }
            ErrorClass::AuthRequired | ErrorClass::Transient => {}
        }
    }
}

/// One long-lived (possibly lapsed) link to a peripheral.
///
/// Created by the [`DevicePool`](crate::pool::DevicePool); never torn down.
pub struct PeripheralConnection<T> {
    id: PeripheralId,
    transport: Arc<T>,
    auth_code: AuthCode,
    policy: RetryPolicy,
    session: Mutex<Session>,
    link_lost: AtomicBool,
}

impl<T: GattTransport> PeripheralConnection<T> {
    #[must_use]
    pub fn new(
        id: PeripheralId,
        transport: Arc<T>,
        auth_code: AuthCode,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            id,
            transport,
            auth_code,
            policy,
            session: Mutex::new(Session {
                state: LinkState::Disconnected,
                last_error: None,
            }),
            link_lost: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> &PeripheralId {
        &self.id
    }

    /// Current link state. Waits for any operation in flight to finish.
    pub async fn state(&self) -> LinkState {
        self.session.lock().await.state
    }

    /// Classification of the most recent failed attempt, if any.
    pub async fn last_error(&self) -> Option<ErrorClass> {
        self.session.lock().await.last_error
    }

    /// Record an out-of-band disconnect. Safe to call from any context;
    /// the next operation reconnects.
    pub fn mark_link_lost(&self) {
        self.link_lost.store(true, Ordering::Release);
    }

    /// Bring the link to at least [`LinkState::Connected`].
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] once the retry budget is exhausted.
    pub async fn connect(&self) -> Result<(), LinkError> {
        self.run("connect", LinkState::Connected, || async { Ok(()) })
            .await
    }

    /// Bring the link to [`LinkState::Authenticated`]. No-op when already there.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] once the retry budget is exhausted.
    pub async fn authenticate(&self) -> Result<(), LinkError> {
        self.run("authenticate", LinkState::Authenticated, || async { Ok(()) })
            .await
    }

    /// List the characteristics exposed by the peripheral.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] once the retry budget is exhausted.
    pub async fn characteristics(&self) -> Result<Vec<CharacteristicInfo>, LinkError> {
        self.run("characteristics", LinkState::Authenticated, || {
            self.transport.characteristics(&self.id)
        })
        .await
    }

    /// Read a characteristic value.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] once the retry budget is exhausted.
    pub async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>, LinkError> {
        self.run("read_characteristic", LinkState::Authenticated, || {
            self.transport.read_characteristic(&self.id, uuid)
        })
        .await
    }

    /// Read a descriptor value.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] once the retry budget is exhausted.
    pub async fn read_descriptor(&self, descriptor: DescriptorRef) -> Result<Vec<u8>, LinkError> {
        self.run("read_descriptor", LinkState::Authenticated, || {
            self.transport.read_descriptor(&self.id, descriptor)
        })
        .await
    }

    /// Write a characteristic value.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] once the retry budget is exhausted.
    pub async fn write_characteristic(
        &self,
        uuid: Uuid,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), LinkError> {
        self.run("write_characteristic", LinkState::Authenticated, || {
            self.transport
                .write_characteristic(&self.id, uuid, data, with_response)
        })
        .await
    }

    /// Retry loop shared by every operation.
    async fn run<R, F, Fut>(
        &self,
        operation: &'static str,
        required: LinkState,
        mut op: F,
    ) -> Result<R, LinkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, TransportError>>,
    {
        let mut session = self.session.lock().await;
        let mut budget = self.policy.budget();
        loop {
            let result = match self.advance(&mut session, required).await {
                Ok(()) => op().await,
                Err(err) => Err(err),
            };
            match result {
                Ok(value) => {
                    session.last_error = None;
                    return Ok(value);
                }
                Err(err) => {
                    session.record_failure(&self.id, &err);
                    tracing::warn!(
                        id = %self.id,
                        operation,
                        attempt = budget.attempt(),
                        class = ?err.class(),
                        %err,
                        "GATT operation failed"
                    );
                    if !budget.next_attempt().await {
                        return Err(LinkError {
                            operation,
                            attempts: budget.attempt(),
                            source: err,
                        });
                    }
                }
            }
        }
    }

    /// Drive the state machine up to `required`.
    async fn advance(
        &self,
        session: &mut Session,
        required: LinkState,
    ) -> Result<(), TransportError> {
        if self.link_lost.swap(false, Ordering::AcqRel) {
            session.transition(&self.id, LinkState::Disconnected);
        }

        if session.state == LinkState::Disconnected {
            self.transport.connect(&self.id).await?;
            session.transition(&self.id, LinkState::Connected);
        }

        if required == LinkState::Authenticated && session.state == LinkState::Connected {
            self.transport
                .write_characteristic(
                    &self.id,
                    protocol::AUTH_CHAR,
                    self.auth_code.as_bytes(),
                    true,
                )
                .await?;
            session.transition(&self.id, LinkState::Authenticated);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use prodigio_domain::peripheral::Advertisement;
    use tokio::time::Instant;

    /// Transport that replays scripted results and counts calls.
    #[derive(Default)]
    struct ScriptedTransport {
        connect_results: StdMutex<VecDeque<Result<(), TransportError>>>,
        auth_results: StdMutex<VecDeque<Result<(), TransportError>>>,
        read_results: StdMutex<VecDeque<Result<Vec<u8>, TransportError>>>,
        read_latency: Duration,
        reads_in_flight: AtomicUsize,
        max_reads_in_flight: AtomicUsize,
        calls: StdMutex<Vec<&'static str>>,
    }

    impl ScriptedTransport {
        fn log(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn count(&self, call: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl GattTransport for ScriptedTransport {
        async fn scan(&self) -> Result<Vec<Advertisement>, TransportError> {
            Ok(Vec::new())
        }

        async fn connect(&self, _id: &PeripheralId) -> Result<(), TransportError> {
            self.log("connect");
            self.connect_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        async fn characteristics(
            &self,
            _id: &PeripheralId,
        ) -> Result<Vec<CharacteristicInfo>, TransportError> {
            self.log("characteristics");
            Ok(Vec::new())
        }

        async fn read_characteristic(
            &self,
            _id: &PeripheralId,
            _uuid: Uuid,
        ) -> Result<Vec<u8>, TransportError> {
            self.log("read");
            let in_flight = self.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_reads_in_flight.fetch_max(in_flight, Ordering::SeqCst);
            if !self.read_latency.is_zero() {
                tokio::time::sleep(self.read_latency).await;
            }
            self.reads_in_flight.fetch_sub(1, Ordering::SeqCst);
            self.read_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(vec![0x00, 0x05]))
        }

        async fn read_descriptor(
            &self,
            _id: &PeripheralId,
            _descriptor: DescriptorRef,
        ) -> Result<Vec<u8>, TransportError> {
            self.log("read_descriptor");
            Ok(vec![0x01])
        }

        async fn write_characteristic(
            &self,
            _id: &PeripheralId,
            uuid: Uuid,
            _data: &[u8],
            _with_response: bool,
        ) -> Result<(), TransportError> {
            if uuid == protocol::AUTH_CHAR {
                self.log("auth");
                self.auth_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
            } else {
                self.log("write");
                Ok(())
            }
        }
    }

    fn connection(transport: &Arc<ScriptedTransport>, attempts: u32) -> PeripheralConnection<ScriptedTransport> {
        patient_connection(transport, RetryPolicy::new(attempts, Duration::ZERO))
    }

    fn patient_connection(
        transport: &Arc<ScriptedTransport>,
        policy: RetryPolicy,
    ) -> PeripheralConnection<ScriptedTransport> {
        PeripheralConnection::new(
            PeripheralId::new("C4:7C:8D:6A:12:34"),
            Arc::clone(transport),
            "87302f3c2b62e4f0".parse().unwrap(),
            policy,
        )
    }

    #[tokio::test]
    async fn should_start_disconnected() {
        let transport = Arc::new(ScriptedTransport::default());
        let conn = connection(&transport, 3);
        assert_eq!(conn.state().await, LinkState::Disconnected);
        assert_eq!(conn.last_error().await, None);
    }

    #[tokio::test]
    async fn should_connect_then_authenticate_before_reading() {
        let transport = Arc::new(ScriptedTransport::default());
        let conn = connection(&transport, 3);

        let value = conn.read_characteristic(protocol::CAPS_CHAR).await.unwrap();

        assert_eq!(value, vec![0x00, 0x05]);
        assert_eq!(transport.calls(), vec!["connect", "auth", "read"]);
        assert_eq!(conn.state().await, LinkState::Authenticated);
    }

    #[tokio::test]
    async fn should_not_repeat_handshake_when_authenticated() {
        let transport = Arc::new(ScriptedTransport::default());
        let conn = connection(&transport, 3);

        conn.authenticate().await.unwrap();
        conn.authenticate().await.unwrap();
        conn.read_characteristic(protocol::CAPS_CHAR).await.unwrap();

        assert_eq!(transport.count("connect"), 1);
        assert_eq!(transport.count("auth"), 1);
    }

    #[tokio::test]
    async fn should_stop_at_connected_for_connect() {
        let transport = Arc::new(ScriptedTransport::default());
        let conn = connection(&transport, 3);

        conn.connect().await.unwrap();

        assert_eq!(conn.state().await, LinkState::Connected);
        assert_eq!(transport.count("auth"), 0);
    }

    #[tokio::test]
    async fn should_retry_failed_connect_until_success() {
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .connect_results
            .lock()
            .unwrap()
            .extend([Err(TransportError::NotConnected), Err(TransportError::TimedOut)]);
        let conn = connection(&transport, 3);

        conn.connect().await.unwrap();

        assert_eq!(transport.count("connect"), 3);
        assert_eq!(conn.state().await, LinkState::Connected);
    }

    #[tokio::test]
    async fn should_keep_disconnected_after_exhausted_connect() {
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .connect_results
            .lock()
            .unwrap()
            .extend((0..2).map(|_| Err(TransportError::NotConnected)));
        let conn = connection(&transport, 2);

        let err = conn.connect().await.unwrap_err();

        assert_eq!(err.attempts, 2);
        assert_eq!(err.operation, "connect");
        assert!(matches!(err.source, TransportError::NotConnected));
        assert_eq!(conn.state().await, LinkState::Disconnected);
        assert_eq!(conn.last_error().await, Some(ErrorClass::LinkLost));
    }

    #[tokio::test]
    async fn should_reauthenticate_once_after_auth_required() {
        let transport = Arc::new(ScriptedTransport::default());
        let conn = connection(&transport, 3);
        conn.authenticate().await.unwrap();
        assert_eq!(transport.count("auth"), 1);

        transport
            .read_results
            .lock()
            .unwrap()
            .push_back(Err(TransportError::InsufficientAuthentication));

        conn.read_characteristic(protocol::STATE_CHAR).await.unwrap();

        assert_eq!(transport.count("auth"), 2);
        assert_eq!(transport.count("connect"), 1);
        assert_eq!(
            transport.calls(),
            vec!["connect", "auth", "read", "auth", "read"]
        );
        assert_eq!(conn.state().await, LinkState::Authenticated);
    }

    #[tokio::test]
    async fn should_reconnect_after_link_lost_error() {
        let transport = Arc::new(ScriptedTransport::default());
        let conn = connection(&transport, 3);
        conn.authenticate().await.unwrap();

        transport
            .read_results
            .lock()
            .unwrap()
            .push_back(Err(TransportError::NotConnected));

        conn.read_characteristic(protocol::STATE_CHAR).await.unwrap();

        assert_eq!(transport.count("connect"), 2);
        assert_eq!(transport.count("auth"), 2);
    }

    #[tokio::test]
    async fn should_retry_transient_error_without_handshake() {
        let transport = Arc::new(ScriptedTransport::default());
        let conn = connection(&transport, 3);
        conn.authenticate().await.unwrap();

        transport
            .read_results
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Other("busy".into())));

        conn.read_characteristic(protocol::STATE_CHAR).await.unwrap();

        assert_eq!(transport.count("connect"), 1);
        assert_eq!(transport.count("auth"), 1);
        assert_eq!(transport.count("read"), 2);
        assert_eq!(conn.last_error().await, None);
    }

    #[tokio::test]
    async fn should_reconnect_on_next_use_after_out_of_band_disconnect() {
        let transport = Arc::new(ScriptedTransport::default());
        let conn = connection(&transport, 3);
        conn.authenticate().await.unwrap();

        conn.mark_link_lost();
        assert_eq!(transport.count("connect"), 1);

        conn.read_descriptor(DescriptorRef {
            characteristic: protocol::STATE_CHAR,
            uuid: Uuid::nil(),
        })
        .await
        .unwrap();

        assert_eq!(
            transport.calls(),
            vec!["connect", "auth", "connect", "auth", "read_descriptor"]
        );
    }

    #[tokio::test]
    async fn should_fail_after_exact_budget_when_read_always_fails() {
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .read_results
            .lock()
            .unwrap()
            .extend((0..5).map(|_| Err(TransportError::Other("gatt error".into()))));
        let conn = connection(&transport, 5);

        let err = conn
            .read_characteristic(protocol::SLIDER_CHAR)
            .await
            .unwrap_err();

        assert_eq!(transport.count("read"), 5);
        assert_eq!(err.attempts, 5);
        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(err.source.to_string(), "BLE transport failure");
    }

    #[tokio::test]
    async fn should_write_through_authenticated_link() {
        let transport = Arc::new(ScriptedTransport::default());
        let conn = connection(&transport, 3);

        conn.write_characteristic(protocol::COMMAND_CHAR, &[0x03], true)
            .await
            .unwrap();

        assert_eq!(transport.calls(), vec!["connect", "auth", "write"]);
    }

    #[tokio::test]
    async fn should_keep_link_when_auth_write_is_rejected() {
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .auth_results
            .lock()
            .unwrap()
            .extend((0..2).map(|_| Err(TransportError::InsufficientAuthentication)));
        let conn = connection(&transport, 2);

        let err = conn.authenticate().await.unwrap_err();

        assert_eq!(err.class(), ErrorClass::AuthRequired);
        assert_eq!(conn.state().await, LinkState::Connected);
        assert_eq!(transport.count("connect"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_never_overlap_reads_on_one_connection() {
        let transport = Arc::new(ScriptedTransport {
            read_latency: Duration::from_millis(100),
            ..ScriptedTransport::default()
        });
        let conn = connection(&transport, 3);
        let begin = Instant::now();

        let (a, b, c) = tokio::join!(
            conn.read_characteristic(protocol::STATE_CHAR),
            conn.read_characteristic(protocol::CAPS_CHAR),
            conn.read_characteristic(protocol::SLIDER_CHAR),
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(transport.max_reads_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(transport.count("read"), 3);
        assert_eq!(transport.count("connect"), 1);
        assert_eq!(begin.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn should_hold_connection_through_retry_backoff() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.read_results.lock().unwrap().extend([
            Err(TransportError::Other("busy".into())),
            Ok(vec![0x01]),
            Ok(vec![0x02]),
        ]);
        let conn = patient_connection(&transport, RetryPolicy::new(3, Duration::from_secs(2)));
        let begin = Instant::now();

        let (first, second) = tokio::join!(
            conn.read_characteristic(protocol::STATE_CHAR),
            async {
                // Arrives while the first read is backing off.
                tokio::time::sleep(Duration::from_secs(1)).await;
                let value = conn.read_characteristic(protocol::CAPS_CHAR).await;
                (value, begin.elapsed())
            },
        );

        assert_eq!(first.unwrap(), vec![0x01]);
        let (second, finished_at) = second;
        assert_eq!(second.unwrap(), vec![0x02]);
        assert_eq!(finished_at, Duration::from_secs(2));
        assert_eq!(transport.max_reads_in_flight.load(Ordering::SeqCst), 1);
    }
}
