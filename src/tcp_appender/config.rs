//! Configuration structures consumed by the TCP appender lifecycle.
//!
//! `LogdocAppenderBuilder` constructs these values before passing them to
//! [`LogdocTcpAppender`](super::LogdocTcpAppender) for runtime use. Apart from
//! normalising the key prefix and suffix, values are passed through untouched.

use std::{collections::BTreeMap, time::Duration};

use crate::{
    fields::{DynamicFields, FieldDecorations},
    rate_limited_warner::DEFAULT_WARN_INTERVAL,
};

/// Default bounded queue capacity.
pub const DEFAULT_QUEUE_SIZE: usize = 1024;
/// Default collector port.
pub const DEFAULT_PORT: u16 = 5656;
/// Default delay the connector waits after a failed connect attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);
/// Bound on connect attempts and the liveness check of an open socket.
pub const SOCKET_CHECK_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default maximum body size (in bytes) of a single frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 20; // 1 MiB
/// Increment added to the reconnect delay after each failed attempt.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(3);
/// Ceiling of the reconnect delay.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);
/// Delay before a crashed delivery loop is started again.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);
/// Token size used when the caller configures none; disables splitting.
pub const DEFAULT_STRING_TOKEN_SIZE: i32 = -1;

/// Linear backoff policy for reconnection attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub step: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            step: DEFAULT_BACKOFF_STEP,
            cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

/// Credentials presented during the token handshake.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
    /// Pre-issued token; preferred over login/password when non-empty.
    pub token: String,
}

/// Which metadata the encoder leaves out of each frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SkipFlags {
    pub time: bool,
    pub source: bool,
    pub level: bool,
}

/// Configuration object describing how to construct a
/// [`LogdocTcpAppender`](super::LogdocTcpAppender).
#[derive(Clone, Debug)]
pub struct LogdocConfig {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
    /// Token bytes already issued by the collector, if any.
    pub token_bytes: Vec<u8>,
    pub queue_size: usize,
    pub retry_delay: Duration,
    pub skip: SkipFlags,
    pub multiline: bool,
    pub string_token_size: i32,
    pub decorations: FieldDecorations,
    pub max_frame_size: usize,
    pub backoff: BackoffPolicy,
    pub restart_delay: Duration,
    pub warn_interval: Duration,
}

impl Default for LogdocConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_PORT,
            credentials: Credentials::default(),
            token_bytes: Vec::new(),
            queue_size: DEFAULT_QUEUE_SIZE,
            retry_delay: DEFAULT_RETRY_DELAY,
            skip: SkipFlags::default(),
            multiline: false,
            string_token_size: DEFAULT_STRING_TOKEN_SIZE,
            decorations: FieldDecorations::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            backoff: BackoffPolicy::default(),
            restart_delay: DEFAULT_RESTART_DELAY,
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }
}

impl LogdocConfig {
    /// `host:port` label used as a prefix in transport log messages.
    pub fn peer_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Set key prefix and suffix, normalising them.
    pub fn with_affixes(mut self, prefix: Option<&str>, suffix: Option<&str>) -> Self {
        self.decorations.set_affixes(prefix, suffix);
        self
    }

    pub fn with_static_prefix(mut self, fields: BTreeMap<String, String>) -> Self {
        self.decorations.static_prefix = fields;
        self
    }

    pub fn with_static_suffix(mut self, fields: BTreeMap<String, String>) -> Self {
        self.decorations.static_suffix = fields;
        self
    }

    pub fn with_dynamic_fields(mut self, fields: DynamicFields) -> Self {
        self.decorations.dynamic = Some(fields);
        self
    }
}
