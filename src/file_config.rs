//! INI configuration loader for the TCP appender.
//!
//! Reads an INI file with `rust-ini`, decoding it with an optional
//! `encoding_rs` label, and turns the `[logdoc]` section into a
//! [`LogdocAppenderBuilder`]. Range checks are left to the builder so file
//! and code configuration are validated identically.
//!
//! ```ini
//! [logdoc]
//! host = collector.internal
//! port = 5656
//! login = svc
//! password = secret
//! multiline = true
//! string_token_size = 512
//!
//! [logdoc.static_prefix]
//! env = prod
//! ```

use std::{fs, io::ErrorKind, path::Path};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use encoding_rs::Encoding;
use ini::{Ini, Properties};
use thiserror::Error;

use crate::{
    handlers::tcp_builder::{BackoffOverrides, LogdocAppenderBuilder},
    tcp_appender::{DEFAULT_PORT, SkipFlags},
};

/// Section holding the appender settings.
pub const SECTION: &str = "logdoc";
/// Section holding fields emitted before each record's fields.
pub const STATIC_PREFIX_SECTION: &str = "logdoc.static_prefix";
/// Section holding fields emitted after each record's fields.
pub const STATIC_SUFFIX_SECTION: &str = "logdoc.static_suffix";

/// Errors raised while loading an INI configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("{0} doesn't exist")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is an empty file")]
    Empty(String),
    #[error("unknown encoding {0}")]
    UnknownEncoding(String),
    #[error("{path} is not valid {encoding}")]
    Decode { path: String, encoding: &'static str },
    #[error("{path} is invalid: {message}")]
    Parse { path: String, message: String },
    #[error("missing [logdoc] section")]
    MissingSection,
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Load the appender configuration from `path`.
///
/// `encoding` is an `encoding_rs` label such as `"windows-1251"`; UTF-8 is
/// assumed when omitted.
pub fn load_config(
    path: impl AsRef<Path>,
    encoding: Option<&str>,
) -> Result<LogdocAppenderBuilder, ConfigFileError> {
    let path = path.as_ref().display().to_string();
    let bytes = read_file_bytes(&path)?;
    if bytes.is_empty() {
        return Err(ConfigFileError::Empty(path));
    }
    let text = decode_with_encoding(&path, &bytes, encoding.unwrap_or("utf-8"))?;
    parse_config(&path, &text)
}

fn read_file_bytes(path: &str) -> Result<Vec<u8>, ConfigFileError> {
    fs::read(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => ConfigFileError::NotFound(path.to_owned()),
        _ => ConfigFileError::Io {
            path: path.to_owned(),
            source: err,
        },
    })
}

fn decode_with_encoding(path: &str, bytes: &[u8], label: &str) -> Result<String, ConfigFileError> {
    let normalized_label = label.trim().to_ascii_lowercase();
    let encoding = Encoding::for_label(normalized_label.as_bytes())
        .ok_or_else(|| ConfigFileError::UnknownEncoding(label.to_owned()))?;
    let (decoded, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(ConfigFileError::Decode {
            path: path.to_owned(),
            encoding: encoding.name(),
        });
    }
    Ok(decoded.into_owned())
}

/// Parse INI text into a builder. `origin` names the source in errors.
pub fn parse_config(origin: &str, text: &str) -> Result<LogdocAppenderBuilder, ConfigFileError> {
    let ini = Ini::load_from_str(text).map_err(|err| ConfigFileError::Parse {
        path: origin.to_owned(),
        message: err.to_string(),
    })?;
    let props = ini
        .section(Some(SECTION))
        .ok_or(ConfigFileError::MissingSection)?;

    let mut builder = LogdocAppenderBuilder::new();
    if let Some(host) = props.get("host") {
        let port = parse_opt::<u16>(props, "port")?.unwrap_or(DEFAULT_PORT);
        builder = builder.with_collector(host, port);
    }
    if props.contains_key("login") || props.contains_key("password") {
        builder = builder.with_login(
            props.get("login").unwrap_or_default(),
            props.get("password").unwrap_or_default(),
        );
    }
    if let Some(token) = props.get("token") {
        builder = builder.with_token(token);
    }
    if let Some(encoded) = props.get("token_bytes") {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| invalid("token_bytes", encoded))?;
        builder = builder.with_token_bytes(bytes);
    }
    builder = builder.with_affixes(props.get("prefix"), props.get("suffix"));
    builder = apply_numbers(builder, props)?;
    builder = builder
        .with_skip(SkipFlags {
            time: parse_bool(props, "skip_time")?,
            source: parse_bool(props, "skip_source")?,
            level: parse_bool(props, "skip_level")?,
        })
        .with_multiline(parse_bool(props, "multiline")?);

    for (key, value) in section_entries(&ini, STATIC_PREFIX_SECTION) {
        builder = builder.with_static_prefix_field(key, value);
    }
    for (key, value) in section_entries(&ini, STATIC_SUFFIX_SECTION) {
        builder = builder.with_static_suffix_field(key, value);
    }
    Ok(builder)
}

fn section_entries<'a>(ini: &'a Ini, name: &str) -> impl Iterator<Item = (&'a str, &'a str)> {
    ini.section(Some(name)).into_iter().flat_map(Properties::iter)
}

fn apply_numbers(
    mut builder: LogdocAppenderBuilder,
    props: &Properties,
) -> Result<LogdocAppenderBuilder, ConfigFileError> {
    if let Some(size) = parse_opt(props, "queue_size")? {
        builder = builder.with_queue_size(size);
    }
    if let Some(delay) = parse_opt(props, "retry_delay_ms")? {
        builder = builder.with_retry_delay_ms(delay);
    }
    if let Some(size) = parse_opt(props, "string_token_size")? {
        builder = builder.with_string_token_size(size);
    }
    if let Some(size) = parse_opt(props, "max_frame_size")? {
        builder = builder.with_max_frame_size(size);
    }
    if let Some(delay) = parse_opt(props, "restart_delay_ms")? {
        builder = builder.with_restart_delay_ms(delay);
    }
    if let Some(interval) = parse_opt(props, "warn_interval_ms")? {
        builder = builder.with_warn_interval_ms(interval);
    }
    let mut backoff = BackoffOverrides::new();
    if let Some(step) = parse_opt(props, "backoff_step_ms")? {
        backoff = backoff.with_step_ms(step);
    }
    if let Some(cap) = parse_opt(props, "backoff_cap_ms")? {
        backoff = backoff.with_cap_ms(cap);
    }
    Ok(builder.with_backoff(backoff))
}

fn invalid(key: &str, value: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    }
}

fn parse_opt<T: std::str::FromStr>(
    props: &Properties,
    key: &str,
) -> Result<Option<T>, ConfigFileError> {
    props
        .get(key)
        .map(|raw| raw.trim().parse().map_err(|_| invalid(key, raw)))
        .transpose()
}

fn parse_bool(props: &Properties, key: &str) -> Result<bool, ConfigFileError> {
    let Some(raw) = props.get(key) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, raw)),
    }
}
