//! Compatibility bridge for the Rust `log` crate.
//!
//! `LogdocLogBridge` implements `log::Log` and forwards each record to a
//! [`LogdocHandler`], usually a
//! [`LogdocTcpAppender`](crate::tcp_appender::LogdocTcpAppender). Records
//! emitted by this crate itself are never forwarded, so transport
//! diagnostics cannot feed back into the queue they describe.

use std::borrow::Cow;
use std::sync::Arc;

use log::{LevelFilter, Metadata, Record};

use crate::handler::LogdocHandler;
use crate::is_own_target;
use crate::level::LogdocLevel;
use crate::log_record::LogdocRecord;

/// Adapter implementing the Rust `log::Log` trait.
pub struct LogdocLogBridge {
    handler: Arc<dyn LogdocHandler>,
    max_level: LevelFilter,
}

fn normalise_target(target: &str) -> Cow<'_, str> {
    if target.contains("::") {
        Cow::Owned(target.replace("::", "."))
    } else {
        Cow::Borrowed(target)
    }
}

impl LogdocLogBridge {
    pub fn new(handler: Arc<dyn LogdocHandler>) -> Self {
        Self {
            handler,
            max_level: LevelFilter::Trace,
        }
    }

    /// Only forward records at or above `level`.
    pub fn with_max_level(mut self, level: LevelFilter) -> Self {
        self.max_level = level;
        self
    }

    /// Install the bridge as the global Rust logger.
    ///
    /// Fails when a different global logger is already set.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let level = self.max_level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl log::Log for LogdocLogBridge {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level && !is_own_target(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let source = normalise_target(record.target());
        let mut entry = LogdocRecord::new(
            source.as_ref(),
            LogdocLevel::from(record.level()),
            &record.args().to_string(),
        );
        if let Some(file) = record.file() {
            entry = entry.with_field("file", file);
        }
        if let Some(line) = record.line() {
            entry = entry.with_field("line", line.to_string());
        }
        // Queue overflow is already reported by the handler.
        let _ = self.handler.append(entry);
    }

    fn flush(&self) {
        self.handler.flush();
    }
}

impl std::fmt::Debug for LogdocLogBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogdocLogBridge")
            .field("max_level", &self.max_level)
            .finish_non_exhaustive()
    }
}
