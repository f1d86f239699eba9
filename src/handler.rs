use std::io;

use thiserror::Error;

use crate::log_record::LogdocRecord;

/// Errors returned to producers when a record cannot be queued.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum AppendError {
    #[error("queue full")]
    QueueFull,
    #[error("appender closed")]
    Closed,
}

/// Errors that prevent an appender from starting.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("unknown host: {host}: {source}")]
    UnknownHost {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn delivery worker: {0}")]
    Spawn(#[from] io::Error),
}

/// Trait implemented by appenders accepting log records.
///
/// `LogdocHandler` is `Send + Sync` so one appender can be shared by every
/// producing thread. Implementations queue the record for their own consumer
/// thread without blocking the caller.
pub trait LogdocHandler: Send + Sync {
    /// Queue a record for delivery.
    fn append(&self, record: LogdocRecord) -> Result<(), AppendError>;

    /// Report pending drop counts; returns `true` when nothing is queued.
    fn flush(&self) -> bool;
}
