//! Ownership of the collector connection and its session token.

use log::{error, warn};

use super::{
    backoff::BackoffState,
    cancel::{CancelToken, Cancelled},
    config::{BackoffPolicy, Credentials},
    error::ConnectError,
    handshake,
    transport::{Connection, Connector, Interrupter},
};

/// Keeps a live, authenticated connection available to the delivery loop.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    credentials: Credentials,
    token: Vec<u8>,
    connection: Option<Connection>,
    backoff: BackoffPolicy,
    interrupter: Interrupter,
    peer_id: String,
}

impl ConnectionManager {
    pub fn new(
        connector: Box<dyn Connector>,
        credentials: Credentials,
        token: Vec<u8>,
        backoff: BackoffPolicy,
        peer_id: String,
    ) -> Self {
        Self {
            connector,
            credentials,
            token,
            connection: None,
            backoff,
            interrupter: Interrupter::default(),
            peer_id,
        }
    }

    /// Register every new transport with `interrupter` so a stop request can
    /// abort a blocked handshake or write.
    pub fn with_interrupter(mut self, interrupter: Interrupter) -> Self {
        self.interrupter = interrupter;
        self
    }

    /// Session token presented in every frame.
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The open connection together with the token, for writing frames.
    pub fn session(&mut self) -> Option<(&mut Connection, &[u8])> {
        let token = self.token.as_slice();
        self.connection.as_mut().map(|conn| (conn, token))
    }

    /// Make sure a live, authenticated connection exists.
    ///
    /// Returns `Ok(false)` when the caller should retry later. Connect and
    /// handshake failures are logged here and never escape.
    pub fn ensure_ready(&mut self, cancel: &CancelToken) -> Result<bool, Cancelled> {
        if self.connection.as_ref().is_some_and(Connection::is_alive) {
            return Ok(true);
        }
        self.close();

        match self.reconnect(cancel) {
            Ok(ready) => Ok(ready),
            Err(ConnectError::Cancelled(cancelled)) => {
                self.close();
                Err(cancelled)
            }
            Err(err) => {
                error!("{}: {err}", self.peer_id);
                self.close();
                self.token.clear();
                Ok(false)
            }
        }
    }

    fn reconnect(&mut self, cancel: &CancelToken) -> Result<bool, ConnectError> {
        let Some(transport) = self.connector.connect(cancel)? else {
            return Ok(false);
        };
        self.interrupter.arm(transport.as_ref());
        let mut connection = Connection::new(transport);
        if handshake::needs_handshake(&self.token) {
            self.token = handshake::perform(&mut connection, &self.credentials)?;
        }
        self.connection = Some(connection);
        Ok(true)
    }

    /// Block until [`ensure_ready`](Self::ensure_ready) succeeds.
    ///
    /// Sleeps between attempts follow the linear backoff policy and are
    /// interrupted by `cancel`.
    pub fn await_ready(&mut self, cancel: &CancelToken) -> Result<(), Cancelled> {
        if self.ensure_ready(cancel)? {
            return Ok(());
        }
        let mut backoff = BackoffState::new(self.backoff.clone());
        loop {
            let delay = backoff.next_sleep();
            warn!(
                "{}: connection not ready, retrying in {} s",
                self.peer_id,
                delay.as_secs_f32()
            );
            cancel.sleep(delay)?;
            if self.ensure_ready(cancel)? {
                return Ok(());
            }
        }
    }

    /// Drop the current connection, shutting the socket down.
    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        self.interrupter.disarm();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("peer_id", &self.peer_id)
            .field("connected", &self.connection.is_some())
            .field("token_len", &self.token.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::tcp_appender::{
        handshake::HEADER,
        transport::mock::{MockConnector, MockTransport},
    };
    use rstest::rstest;

    const CACHED: &[u8] = b"cached-token-0123";

    fn token_reply(header: [u8; 2], token: &[u8]) -> MockTransport {
        let mut bytes = header.to_vec();
        bytes.extend((token.len() as u16).to_be_bytes());
        bytes.extend_from_slice(token);
        MockTransport::with_reply(&bytes)
    }

    fn manager(connector: &MockConnector, token: &[u8]) -> ConnectionManager {
        ConnectionManager::new(
            Box::new(connector.clone()),
            Credentials::default(),
            token.to_vec(),
            BackoffPolicy {
                step: Duration::from_millis(5),
                cap: Duration::from_millis(20),
            },
            "test:1".into(),
        )
    }

    #[rstest]
    fn handshake_runs_when_token_missing() {
        let transport = token_reply(HEADER, b"fresh-token-abcdef");
        let connector = MockConnector::new([Some(transport.clone())]);
        let mut manager = manager(&connector, b"");

        assert!(manager.ensure_ready(&CancelToken::new()).unwrap());
        assert_eq!(manager.token(), b"fresh-token-abcdef");
        assert!(!transport.wire.lock().written.is_empty());
    }

    #[rstest]
    fn cached_token_skips_handshake() {
        let transport = MockTransport::default();
        let connector = MockConnector::new([Some(transport.clone())]);
        let mut manager = manager(&connector, CACHED);

        assert!(manager.ensure_ready(&CancelToken::new()).unwrap());
        assert!(transport.wire.lock().written.is_empty());
        assert_eq!(manager.token(), CACHED);
    }

    #[rstest]
    fn interrupter_tracks_the_open_connection() {
        let transport = MockTransport::default();
        let connector = MockConnector::new([Some(transport.clone())]);
        let interrupter = Interrupter::new();
        let mut manager = manager(&connector, CACHED).with_interrupter(interrupter.clone());

        assert!(manager.ensure_ready(&CancelToken::new()).unwrap());
        interrupter.interrupt();
        assert_eq!(transport.wire.lock().interrupts, 1);
        assert!(!manager.ensure_ready(&CancelToken::new()).unwrap());
        assert_eq!(connector.attempts(), 2);
    }

    #[rstest]
    fn closed_connection_is_no_longer_interruptible() {
        let transport = MockTransport::default();
        let connector = MockConnector::new([Some(transport.clone())]);
        let interrupter = Interrupter::new();
        let mut manager = manager(&connector, CACHED).with_interrupter(interrupter.clone());

        assert!(manager.ensure_ready(&CancelToken::new()).unwrap());
        manager.close();
        interrupter.interrupt();
        assert_eq!(transport.wire.lock().interrupts, 0);
    }

    #[rstest]
    fn live_connection_is_reused() {
        let connector = MockConnector::new([Some(MockTransport::default())]);
        let mut manager = manager(&connector, CACHED);
        let cancel = CancelToken::new();

        assert!(manager.ensure_ready(&cancel).unwrap());
        assert!(manager.ensure_ready(&cancel).unwrap());
        assert_eq!(connector.attempts(), 1);
    }

    #[rstest]
    fn dead_connection_is_replaced() {
        let first = MockTransport::default();
        let second = MockTransport::default();
        let connector = MockConnector::new([Some(first.clone()), Some(second.clone())]);
        let mut manager = manager(&connector, CACHED);
        let cancel = CancelToken::new();

        assert!(manager.ensure_ready(&cancel).unwrap());
        first.wire.lock().dead = true;
        assert!(manager.ensure_ready(&cancel).unwrap());
        assert_eq!(connector.attempts(), 2);
        assert_eq!(first.wire.lock().shutdowns, 1);
        assert_eq!(second.wire.lock().shutdowns, 0);
    }

    #[rstest]
    fn bad_header_tears_down_without_caching_token() {
        let transport = token_reply([0x00, 0x01], b"never-cached-token");
        let connector = MockConnector::new([Some(transport.clone())]);
        let mut manager = manager(&connector, b"");

        assert!(!manager.ensure_ready(&CancelToken::new()).unwrap());
        assert!(manager.token().is_empty());
        assert!(!manager.is_connected());
        assert_eq!(transport.wire.lock().shutdowns, 1);
    }

    #[rstest]
    fn not_ready_connector_is_not_an_error() {
        let connector = MockConnector::new([None]);
        let mut manager = manager(&connector, CACHED);
        assert!(!manager.ensure_ready(&CancelToken::new()).unwrap());
        assert_eq!(manager.token(), CACHED);
    }

    #[rstest]
    fn await_ready_backs_off_until_connected() {
        let connector = MockConnector::new([None, None, Some(MockTransport::default())]);
        let mut manager = manager(&connector, CACHED);

        manager.await_ready(&CancelToken::new()).unwrap();
        assert!(manager.is_connected());
        assert_eq!(connector.attempts(), 3);
    }

    #[rstest]
    fn await_ready_stops_on_cancel() {
        let connector = MockConnector::new([None]);
        let mut manager = manager(&connector, CACHED);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(manager.await_ready(&cancel), Err(Cancelled));
    }
}
