//! Resilient TCP transport shipping log records to a logdoc collector.
//!
//! Producers hand [`LogdocRecord`] values to a [`LogdocTcpAppender`], which
//! buffers them in a bounded queue and delivers them from a single worker
//! thread over a token-authenticated connection. Appenders are configured
//! with [`LogdocAppenderBuilder`] or loaded from an INI file with
//! [`file_config::load_config`].

pub mod fields;
pub mod file_config;
pub mod handler;
pub mod handlers;
pub mod level;
#[cfg(feature = "log-compat")]
pub mod log_compat;
pub mod log_record;
pub mod rate_limited_warner;
pub mod shaping;
pub mod tcp_appender;
#[cfg(feature = "tracing-compat")]
pub mod tracing_compat;

pub use fields::{DynamicFields, FieldDecorations};
pub use file_config::{ConfigFileError, load_config};
pub use handler::{AppendError, LogdocHandler, StartError};
pub use handlers::{
    HandlerBuildError, HandlerBuilderTrait, LogdocAppenderBuilder, tcp_builder::BackoffOverrides,
};
pub use level::LogdocLevel;
#[cfg(feature = "log-compat")]
pub use log_compat::LogdocLogBridge;
pub use log_record::{LogdocRecord, RecordMetadata};
pub use rate_limited_warner::RateLimitedWarner;
pub use shaping::{
    Cleaner, ControlCharCleaner, Fielder, KeyValueFielder, Multiplexer, NoFields, RecordShaper,
    ShapedRecord, StackTraceRenderer, ThrowableRenderer, TokenMultiplexer,
};
pub use tcp_appender::{
    BackoffPolicy, CancelToken, Credentials, LogdocConfig, LogdocTcpAppender, SkipFlags,
};
#[cfg(feature = "tracing-compat")]
pub use tracing_compat::LogdocLayer;

/// Whether `target` is this crate or one of its modules.
///
/// The bridges skip these so transport diagnostics never feed back into the
/// queue they describe.
#[cfg(any(feature = "log-compat", feature = "tracing-compat"))]
pub(crate) fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(env!("CARGO_CRATE_NAME"))
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}
