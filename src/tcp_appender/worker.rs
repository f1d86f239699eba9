//! Worker thread driving delivery to the collector.
//!
//! The worker owns the [`ConnectionManager`] and is the only consumer of the
//! [`RecordQueue`]. A draining pass that fails is torn down and restarted by
//! the [`RetryScheduler`] after a fixed delay; cancellation while waiting for
//! records ends the worker without a restart.

use std::{
    convert::Infallible,
    io::{self, Write},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};

use super::{
    cancel::{CancelToken, Cancelled},
    connection::ConnectionManager,
    error::{DeliveryError, FrameError},
    queue::RecordQueue,
    serialise::{Framer, PartInfo, total_size_tokens},
};
use crate::{log_record::LogdocRecord, shaping::RecordShaper};

/// Observable phase of the delivery loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryState {
    Idle,
    Connecting,
    Draining,
    /// The queue ran dry and buffered frames were flushed.
    Flushed,
    Faulted,
    Restarting,
}

/// How a single run of the delivery loop ended.
#[derive(Debug)]
pub enum LoopOutcome {
    /// Cancelled while connecting or waiting for records.
    Stopped,
    /// Aborted by an error; the loop should be restarted.
    Faulted(DeliveryError),
}

/// Consumes the queue and writes frames over the managed connection.
pub struct DeliveryLoop {
    queue: Arc<RecordQueue>,
    connections: ConnectionManager,
    framer: Framer,
    shaper: RecordShaper,
    multiline: bool,
    string_token_size: i32,
    peer_id: String,
    state: DeliveryState,
}

impl DeliveryLoop {
    pub fn new(
        queue: Arc<RecordQueue>,
        connections: ConnectionManager,
        framer: Framer,
        shaper: RecordShaper,
        multiline: bool,
        string_token_size: i32,
        peer_id: String,
    ) -> Self {
        Self {
            queue,
            connections,
            framer,
            shaper,
            multiline,
            string_token_size,
            peer_id,
            state: DeliveryState::Idle,
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    fn transition(&mut self, next: DeliveryState) {
        debug!("{}: delivery {:?} -> {:?}", self.peer_id, self.state, next);
        self.state = next;
    }

    /// Run one connect-and-drain pass until cancellation or failure.
    ///
    /// The connection is closed on every exit path.
    pub fn run(&mut self, cancel: &CancelToken) -> LoopOutcome {
        info!("{}: delivery loop started", self.peer_id);
        let Err(err) = self.connect_and_drain(cancel);
        self.connections.close();
        match err {
            DeliveryError::Cancelled(Cancelled) => {
                info!("{}: connection closed, delivery interrupted", self.peer_id);
                self.transition(DeliveryState::Idle);
                LoopOutcome::Stopped
            }
            err => {
                error!("{}: delivery loop failed: {err}", self.peer_id);
                self.transition(DeliveryState::Faulted);
                LoopOutcome::Faulted(err)
            }
        }
    }

    fn connect_and_drain(&mut self, cancel: &CancelToken) -> Result<Infallible, DeliveryError> {
        self.transition(DeliveryState::Connecting);
        self.connections.await_ready(cancel)?;
        self.transition(DeliveryState::Draining);
        loop {
            let record = self.queue.take_first(cancel)?;
            self.state = DeliveryState::Draining;
            let frames = match self.encode(&record) {
                Ok(frames) => frames,
                Err(err) => {
                    error!(
                        "{}: abandoning {} record from {} ({} bytes) that cannot be framed: {err}",
                        self.peer_id,
                        record.metadata.level,
                        record.metadata.source,
                        record.text.len()
                    );
                    Vec::new()
                }
            };
            if let Err(err) = self.write(&frames) {
                error!("{}: failed to deliver record: {err}", self.peer_id);
                if let Err(record) = self.queue.offer_first(record) {
                    warn!(
                        "{}: queue is full, dropping record that failed delivery: {record}",
                        self.peer_id
                    );
                }
                return Err(err);
            }
        }
    }

    /// Encode every frame of `record` before any of it reaches the wire.
    fn encode(&mut self, record: &LogdocRecord) -> Result<Vec<Vec<u8>>, FrameError> {
        let shaped = self.shaper.shape(record);
        if shaped.parts.is_empty() {
            return Ok(Vec::new());
        }
        let token = self.connections.token();
        if !self.multiline {
            let text = shaped.parts.join("\n");
            let frame = self
                .framer
                .encode_single(token, record, &text, &shaped.fields)?;
            return Ok(vec![frame]);
        }

        let partial_id = self.framer.next_partial_id();
        let total_parts = shaped.parts.len();
        let size_tokens = total_size_tokens(self.string_token_size, total_parts);
        shaped
            .parts
            .iter()
            .enumerate()
            .map(|(index, payload)| {
                let part = PartInfo {
                    partial_id,
                    index,
                    total_parts,
                    total_size_tokens: size_tokens,
                };
                self.framer
                    .encode_multipart(token, &part, record, payload, &shaped.fields)
            })
            .collect()
    }

    /// Write encoded frames, flushing when the queue has drained.
    fn write(&mut self, frames: &[Vec<u8>]) -> Result<(), DeliveryError> {
        let (conn, _) = self
            .connections
            .session()
            .ok_or(DeliveryError::NotConnected)?;
        for frame in frames {
            conn.write_all(frame)?;
        }
        if self.queue.is_empty() {
            conn.flush()?;
            self.state = DeliveryState::Flushed;
        }
        Ok(())
    }

    /// Release the connection before the worker exits.
    pub fn shutdown(&mut self) {
        self.connections.close();
        self.transition(DeliveryState::Idle);
    }
}

impl std::fmt::Debug for DeliveryLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryLoop")
            .field("peer_id", &self.peer_id)
            .field("state", &self.state)
            .field("multiline", &self.multiline)
            .finish()
    }
}

/// Restarts the whole delivery loop after it crashed out of draining.
#[derive(Clone, Debug)]
pub struct RetryScheduler {
    delay: Duration,
    peer_id: String,
}

impl RetryScheduler {
    pub fn new(delay: Duration, peer_id: String) -> Self {
        Self { delay, peer_id }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait out the restart delay; a stop request cancels the restart.
    pub fn on_fault(&self, cancel: &CancelToken) -> Result<(), Cancelled> {
        info!(
            "{}: restarting delivery loop in {} s",
            self.peer_id,
            self.delay.as_secs_f32()
        );
        cancel.sleep(self.delay)
    }
}

fn worker_loop(mut delivery: DeliveryLoop, scheduler: RetryScheduler, cancel: CancelToken) {
    loop {
        match delivery.run(&cancel) {
            LoopOutcome::Stopped => break,
            LoopOutcome::Faulted(_) => {
                delivery.transition(DeliveryState::Restarting);
                if scheduler.on_fault(&cancel).is_err() {
                    break;
                }
            }
        }
    }
    delivery.shutdown();
    info!("{}: delivery loop stopped", scheduler.peer_id);
}

/// Start the dedicated delivery thread.
pub fn spawn_worker(
    delivery: DeliveryLoop,
    scheduler: RetryScheduler,
    cancel: CancelToken,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("logdoc-delivery".into())
        .spawn(move || worker_loop(delivery, scheduler, cancel))
}
