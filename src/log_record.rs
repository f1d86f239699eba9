//! Log record representation shipped by the logdoc transport.
//!
//! A [`LogdocRecord`] is produced by the host formatter and is immutable once
//! it has been queued. Records carry their text, caller-attached fields, an
//! optional rendered throwable, and the metadata that the wire encoder may
//! omit depending on the skip flags.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::level::LogdocLevel;

/// Source, severity and creation time of a record.
#[derive(Clone, Debug)]
pub struct RecordMetadata {
    /// Logger or module that produced the record.
    pub source: String,
    pub level: LogdocLevel,
    /// Time the record was created.
    pub timestamp: DateTime<Utc>,
}

impl Default for RecordMetadata {
    fn default() -> Self {
        Self {
            source: String::new(),
            level: LogdocLevel::default(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogdocRecord {
    /// Formatted message text.
    pub text: String,
    /// Structured key-value pairs attached by the caller.
    pub fields: BTreeMap<String, String>,
    /// Rendered error information, when the event carried one.
    pub throwable: Option<String>,
    pub metadata: RecordMetadata,
}

impl LogdocRecord {
    /// Construct a record from `source`, `level`, and `text`, stamped now.
    pub fn new(source: &str, level: LogdocLevel, text: &str) -> Self {
        Self {
            text: text.to_owned(),
            fields: BTreeMap::new(),
            throwable: None,
            metadata: RecordMetadata {
                source: source.to_owned(),
                level,
                timestamp: Utc::now(),
            },
        }
    }

    /// Attach a structured field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Attach rendered error information.
    pub fn with_throwable(mut self, throwable: impl Into<String>) -> Self {
        self.throwable = Some(throwable.into());
        self
    }

    /// Override the creation time.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.metadata.timestamp = timestamp;
        self
    }
}

impl fmt::Display for LogdocRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.metadata.level, self.text)
    }
}
