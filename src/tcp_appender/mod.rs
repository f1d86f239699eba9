//! TCP appender shipping records to a logdoc collector.
//!
//! This module defines `LogdocTcpAppender`, which queues
//! [`LogdocRecord`](crate::log_record::LogdocRecord) values and forwards them
//! over a persistent, token-authenticated TCP connection. A single worker
//! thread owns the connection, reconnects with a capped linear backoff,
//! requeues the record in flight when a write fails, and restarts its
//! delivery loop after a fixed delay.

pub(crate) mod backoff;
pub mod cancel;
mod config;
mod connection;
mod error;
pub mod handshake;
mod handler;
mod queue;
pub mod serialise;
mod transport;
mod worker;

#[cfg(test)]
mod test_support;

pub use cancel::{CancelToken, Cancelled};
pub use config::{
    BackoffPolicy, Credentials, DEFAULT_BACKOFF_CAP, DEFAULT_BACKOFF_STEP, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_PORT, DEFAULT_QUEUE_SIZE, DEFAULT_RESTART_DELAY, DEFAULT_RETRY_DELAY,
    DEFAULT_STRING_TOKEN_SIZE, LogdocConfig, SOCKET_CHECK_TIMEOUT, SkipFlags,
};
pub use connection::ConnectionManager;
pub use error::{ConnectError, DeliveryError, FrameError, ProtocolError};
pub use handler::LogdocTcpAppender;
pub use queue::RecordQueue;
pub use serialise::{Framer, PartInfo, PartialId};
pub use transport::{
    Connection, Connector, InterruptHandle, Interrupter, TcpConnector, TcpTransport, Transport,
};
pub use worker::{DeliveryLoop, DeliveryState, LoopOutcome, RetryScheduler};
