//! Public appender type exported by the crate.

use std::{sync::Arc, thread};

use log::{error, info, warn};
use parking_lot::Mutex;

use crate::{
    handler::{AppendError, LogdocHandler, StartError},
    log_record::LogdocRecord,
    rate_limited_warner::RateLimitedWarner,
    shaping::RecordShaper,
};

use super::{
    cancel::CancelToken,
    config::LogdocConfig,
    connection::ConnectionManager,
    queue::RecordQueue,
    serialise::Framer,
    transport::{Connector, Interrupter, TcpConnector},
    worker::{DeliveryLoop, RetryScheduler, spawn_worker},
};

/// Appender shipping records to a logdoc collector over TCP.
///
/// Records are buffered in a bounded queue and written by a dedicated worker
/// thread which reconnects, re-authenticates and restarts itself as needed.
pub struct LogdocTcpAppender {
    queue: Arc<RecordQueue>,
    cancel: CancelToken,
    interrupter: Interrupter,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    warner: RateLimitedWarner,
    peer_id: String,
}

impl LogdocTcpAppender {
    /// Resolve the collector address and start the delivery worker.
    ///
    /// An unresolvable host is reported once and no worker is launched.
    pub fn start(config: LogdocConfig, shaper: RecordShaper) -> Result<Self, StartError> {
        let peer_id = config.peer_id();
        let connector = TcpConnector::resolve(&config.host, config.port, config.retry_delay)
            .map_err(|source| {
                error!("unknown host: {}: {source}", config.host);
                StartError::UnknownHost {
                    host: config.host.clone(),
                    source,
                }
            })?;
        info!("logdoc collector: {peer_id}");
        Self::start_with_connector(config, shaper, Box::new(connector))
    }

    /// Start the worker with a caller-supplied connector.
    pub fn start_with_connector(
        config: LogdocConfig,
        shaper: RecordShaper,
        connector: Box<dyn Connector>,
    ) -> Result<Self, StartError> {
        let peer_id = config.peer_id();
        let queue = Arc::new(RecordQueue::new(config.queue_size));
        let interrupter = Interrupter::new();
        let connections = ConnectionManager::new(
            connector,
            config.credentials.clone(),
            config.token_bytes.clone(),
            config.backoff.clone(),
            peer_id.clone(),
        )
        .with_interrupter(interrupter.clone());
        let framer = Framer::new(config.skip, config.decorations.clone(), config.max_frame_size);
        let delivery = DeliveryLoop::new(
            Arc::clone(&queue),
            connections,
            framer,
            shaper,
            config.multiline,
            config.string_token_size,
            peer_id.clone(),
        );
        let scheduler = RetryScheduler::new(config.restart_delay, peer_id.clone());
        let cancel = CancelToken::new();
        let handle = spawn_worker(delivery, scheduler, cancel.clone())?;
        Ok(Self {
            queue,
            cancel,
            interrupter,
            handle: Mutex::new(Some(handle)),
            warner: RateLimitedWarner::new(config.warn_interval),
            peer_id,
        })
    }

    /// Records waiting to be delivered.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_started(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Stop the worker, closing the connection. Queued records are abandoned.
    ///
    /// The socket is shut down before joining, so a worker blocked on a
    /// collector that stopped reading returns promptly.
    pub fn stop(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        self.cancel.cancel();
        self.queue.wake_all();
        self.interrupter.interrupt();
        if handle.join().is_err() {
            warn!("{}: delivery worker panicked", self.peer_id);
        }
        self.warner.flush(|count| {
            warn!("{}: {count} log records dropped before stop", self.peer_id);
        });
    }
}

impl LogdocHandler for LogdocTcpAppender {
    fn append(&self, record: LogdocRecord) -> Result<(), AppendError> {
        if self.cancel.is_cancelled() {
            self.warner.record_drop();
            self.warner.warn_if_due(|count| {
                warn!("{}: dropped {count} records after stop", self.peer_id);
            });
            return Err(AppendError::Closed);
        }
        self.queue.offer_last(record).map_err(|_| {
            self.warner.record_drop();
            self.warner.warn_if_due(|count| {
                warn!("{}: queue full; dropped {count} records", self.peer_id);
            });
            AppendError::QueueFull
        })
    }

    fn flush(&self) -> bool {
        self.warner.flush(|count| {
            warn!("{}: dropped {count} records in the last interval", self.peer_id);
        });
        self.queue.is_empty()
    }
}

impl Drop for LogdocTcpAppender {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for LogdocTcpAppender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogdocTcpAppender")
            .field("peer_id", &self.peer_id)
            .field("pending", &self.pending())
            .finish()
    }
}
