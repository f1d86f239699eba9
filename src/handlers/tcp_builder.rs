//! Builder for [`LogdocTcpAppender`](crate::tcp_appender::LogdocTcpAppender).
//!
//! Collects collector address, credentials, field decorations, record
//! shaping and the delivery timings, validating them before the appender's
//! worker is started.

use std::{collections::BTreeMap, time::Duration};

use crate::{
    fields::DynamicFields,
    handler::LogdocHandler,
    shaping::RecordShaper,
    tcp_appender::{Credentials, LogdocConfig, LogdocTcpAppender, SkipFlags},
};

use super::{HandlerBuildError, HandlerBuilderTrait};

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(HandlerBuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Overrides for the reconnect backoff applied by the appender.
#[derive(Clone, Debug, Default)]
pub struct BackoffOverrides {
    step_ms: Option<u64>,
    cap_ms: Option<u64>,
}

impl BackoffOverrides {
    /// Create overrides with no custom values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the per-attempt increment in milliseconds.
    pub fn with_step_ms(mut self, step_ms: u64) -> Self {
        self.step_ms = Some(step_ms);
        self
    }

    /// Override the delay ceiling in milliseconds.
    pub fn with_cap_ms(mut self, cap_ms: u64) -> Self {
        self.cap_ms = Some(cap_ms);
        self
    }

    fn apply(&self, config: &mut LogdocConfig) -> Result<(), HandlerBuildError> {
        if let Some(step) = self.step_ms {
            ensure_positive!(step, "backoff_step_ms")?;
            config.backoff.step = Duration::from_millis(step);
        }
        if let Some(cap) = self.cap_ms {
            ensure_positive!(cap, "backoff_cap_ms")?;
            config.backoff.cap = Duration::from_millis(cap);
        }
        Ok(())
    }
}

/// Builder for constructing [`LogdocTcpAppender`] instances.
#[derive(Clone, Debug, Default)]
pub struct LogdocAppenderBuilder {
    host: Option<String>,
    port: Option<u16>,
    credentials: Credentials,
    token_bytes: Option<Vec<u8>>,
    prefix: Option<String>,
    suffix: Option<String>,
    static_prefix: BTreeMap<String, String>,
    static_suffix: BTreeMap<String, String>,
    dynamic: Option<DynamicFieldsSlot>,
    queue_size: Option<usize>,
    retry_delay_ms: Option<u64>,
    skip: SkipFlags,
    multiline: bool,
    string_token_size: Option<i32>,
    max_frame_size: Option<usize>,
    restart_delay_ms: Option<u64>,
    warn_interval_ms: Option<u64>,
    backoff: BackoffOverrides,
    shaper: Option<RecordShaper>,
}

#[derive(Clone)]
struct DynamicFieldsSlot(DynamicFields);

impl std::fmt::Debug for DynamicFieldsSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DynamicFields(<fn>)")
    }
}

impl LogdocAppenderBuilder {
    /// Create a new builder with no collector configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the collector address.
    pub fn with_collector(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Authenticate with a login and password.
    pub fn with_login(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials.login = login.into();
        self.credentials.password = password.into();
        self
    }

    /// Authenticate with a pre-issued token string.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.credentials.token = token.into();
        self
    }

    option_setter!(
        #[doc = "Seed the token cache with bytes issued by an earlier session."]
        with_token_bytes,
        token_bytes,
        Vec<u8>
    );
    option_setter!(
        #[doc = "Set the bounded queue capacity."]
        with_queue_size,
        queue_size,
        usize
    );
    option_setter!(with_retry_delay_ms, retry_delay_ms, u64);
    option_setter!(with_string_token_size, string_token_size, i32);
    option_setter!(with_max_frame_size, max_frame_size, usize);
    option_setter!(with_restart_delay_ms, restart_delay_ms, u64);
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);

    /// Prefix and suffix added to every record field key.
    pub fn with_affixes(mut self, prefix: Option<&str>, suffix: Option<&str>) -> Self {
        self.prefix = prefix.map(str::to_owned);
        self.suffix = suffix.map(str::to_owned);
        self
    }

    /// Add a field emitted before the record's own fields.
    pub fn with_static_prefix_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.static_prefix.insert(key.into(), value.into());
        self
    }

    /// Add a field emitted after the record's own fields.
    pub fn with_static_suffix_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.static_suffix.insert(key.into(), value.into());
        self
    }

    /// Fields computed each time a frame is encoded.
    pub fn with_dynamic_fields(mut self, fields: DynamicFields) -> Self {
        self.dynamic = Some(DynamicFieldsSlot(fields));
        self
    }

    /// Choose which metadata to leave out of frames.
    pub fn with_skip(mut self, skip: SkipFlags) -> Self {
        self.skip = skip;
        self
    }

    /// Ship split records as multipart frames.
    pub fn with_multiline(mut self, multiline: bool) -> Self {
        self.multiline = multiline;
        self
    }

    /// Override backoff timings using the provided overrides.
    pub fn with_backoff(mut self, overrides: BackoffOverrides) -> Self {
        self.backoff = overrides;
        self
    }

    /// Replace the default record shaping strategies.
    pub fn with_shaper(mut self, shaper: RecordShaper) -> Self {
        self.shaper = Some(shaper);
        self
    }

    fn validate(&self) -> Result<(), HandlerBuildError> {
        self.validate_collector()?;
        if let Some(size) = self.queue_size {
            ensure_positive!(size, "queue_size")?;
        }
        if let Some(delay) = self.retry_delay_ms {
            ensure_positive!(delay, "retry_delay_ms")?;
        }
        if let Some(size) = self.max_frame_size {
            ensure_positive!(size, "max_frame_size")?;
        }
        if let Some(delay) = self.restart_delay_ms {
            ensure_positive!(delay, "restart_delay_ms")?;
        }
        Ok(())
    }

    fn validate_collector(&self) -> Result<(), HandlerBuildError> {
        match &self.host {
            None => Err(HandlerBuildError::InvalidConfig(
                "logdoc appender requires a collector host".into(),
            )),
            Some(host) if host.trim().is_empty() => Err(HandlerBuildError::InvalidConfig(
                "collector host must not be empty".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Validate the builder and produce the appender configuration.
    pub fn build_config(&self) -> Result<LogdocConfig, HandlerBuildError> {
        self.validate()?;
        let mut config = LogdocConfig {
            credentials: self.credentials.clone(),
            skip: self.skip,
            multiline: self.multiline,
            ..LogdocConfig::default()
        };
        self.apply_optional_fields(&mut config);
        self.backoff.apply(&mut config)?;
        config = config
            .with_affixes(self.prefix.as_deref(), self.suffix.as_deref())
            .with_static_prefix(self.static_prefix.clone())
            .with_static_suffix(self.static_suffix.clone());
        if let Some(DynamicFieldsSlot(fields)) = &self.dynamic {
            config = config.with_dynamic_fields(fields.clone());
        }
        Ok(config)
    }

    fn apply_optional_fields(&self, config: &mut LogdocConfig) {
        if let Some(host) = &self.host {
            config.host = host.trim().to_owned();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bytes) = &self.token_bytes {
            config.token_bytes = bytes.clone();
        }
        if let Some(size) = self.queue_size {
            config.queue_size = size;
        }
        if let Some(delay) = self.retry_delay_ms {
            config.retry_delay = Duration::from_millis(delay);
        }
        if let Some(size) = self.string_token_size {
            config.string_token_size = size;
        }
        if let Some(size) = self.max_frame_size {
            config.max_frame_size = size;
        }
        if let Some(delay) = self.restart_delay_ms {
            config.restart_delay = Duration::from_millis(delay);
        }
        if let Some(interval) = self.warn_interval_ms {
            config.warn_interval = Duration::from_millis(interval);
        }
    }

    /// Shaper used by the built appender; defaults split at the token size.
    fn shaper(&self, config: &LogdocConfig) -> RecordShaper {
        self.shaper
            .clone()
            .unwrap_or_else(|| RecordShaper::with_token_size(config.string_token_size))
    }

    /// Build and start the concrete appender.
    pub fn build_appender(&self) -> Result<LogdocTcpAppender, HandlerBuildError> {
        let config = self.build_config()?;
        let shaper = self.shaper(&config);
        Ok(LogdocTcpAppender::start(config, shaper)?)
    }
}

impl HandlerBuilderTrait for LogdocAppenderBuilder {
    fn build(&self) -> Result<Box<dyn LogdocHandler>, HandlerBuildError> {
        Ok(Box::new(self.build_appender()?))
    }
}
