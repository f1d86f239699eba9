//! Record shaping strategies consumed by the delivery loop.
//!
//! The transport never decides how a message is cleaned, which fields are
//! extracted from it, or how it is split into parts. Those policies are
//! supplied as trait objects bundled in a [`RecordShaper`]; closures with the
//! matching signature implement the traits directly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::log_record::LogdocRecord;

/// Extracts structured fields from a message.
pub trait Fielder: Send + Sync {
    fn fields(&self, text: &str) -> BTreeMap<String, String>;
}

/// Normalises message text before it is split.
pub trait Cleaner: Send + Sync {
    fn clean(&self, text: &str) -> String;
}

/// Splits a cleaned message into ordered parts.
pub trait Multiplexer: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// Renders the error information attached to a record.
pub trait StackTraceRenderer: Send + Sync {
    fn render(&self, record: &LogdocRecord) -> String;
}

impl<F> Fielder for F
where
    F: Fn(&str) -> BTreeMap<String, String> + Send + Sync,
{
    fn fields(&self, text: &str) -> BTreeMap<String, String> {
        self(text)
    }
}

impl<F> Cleaner for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn clean(&self, text: &str) -> String {
        self(text)
    }
}

impl<F> Multiplexer for F
where
    F: Fn(&str) -> Vec<String> + Send + Sync,
{
    fn split(&self, text: &str) -> Vec<String> {
        self(text)
    }
}

impl<F> StackTraceRenderer for F
where
    F: Fn(&LogdocRecord) -> String + Send + Sync,
{
    fn render(&self, record: &LogdocRecord) -> String {
        self(record)
    }
}

/// Fielder that extracts nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFields;

impl Fielder for NoFields {
    fn fields(&self, _text: &str) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Fielder picking whitespace separated `key=value` tokens out of a message.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyValueFielder;

impl Fielder for KeyValueFielder {
    fn fields(&self, text: &str) -> BTreeMap<String, String> {
        text.split_whitespace()
            .filter_map(|token| token.split_once('='))
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
            .collect()
    }
}

/// Trims the message and drops control characters other than newline and tab.
#[derive(Clone, Copy, Debug, Default)]
pub struct ControlCharCleaner;

impl Cleaner for ControlCharCleaner {
    fn clean(&self, text: &str) -> String {
        text.trim()
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect()
    }
}

/// Splits text into chunks of at most `token_size` characters.
///
/// A non-positive size disables splitting.
#[derive(Clone, Copy, Debug)]
pub struct TokenMultiplexer {
    token_size: i32,
}

impl TokenMultiplexer {
    pub fn new(token_size: i32) -> Self {
        Self { token_size }
    }
}

impl Multiplexer for TokenMultiplexer {
    fn split(&self, text: &str) -> Vec<String> {
        let Ok(size) = usize::try_from(self.token_size) else {
            return vec![text.to_owned()];
        };
        if size == 0 || text.is_empty() {
            return vec![text.to_owned()];
        }
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(size)
            .map(|chunk| chunk.iter().collect())
            .collect()
    }
}

/// Renders the record's throwable text verbatim.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThrowableRenderer;

impl StackTraceRenderer for ThrowableRenderer {
    fn render(&self, record: &LogdocRecord) -> String {
        record.throwable.clone().unwrap_or_default()
    }
}

/// Bundle of shaping strategies handed to the delivery loop.
#[derive(Clone)]
pub struct RecordShaper {
    pub fielder: Arc<dyn Fielder>,
    pub cleaner: Arc<dyn Cleaner>,
    pub multiplexer: Arc<dyn Multiplexer>,
    pub renderer: Arc<dyn StackTraceRenderer>,
}

/// Text and fields ready for framing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapedRecord {
    pub parts: Vec<String>,
    pub fields: BTreeMap<String, String>,
}

impl RecordShaper {
    /// Default strategies splitting at `token_size` characters.
    pub fn with_token_size(token_size: i32) -> Self {
        Self {
            fielder: Arc::new(NoFields),
            cleaner: Arc::new(ControlCharCleaner),
            multiplexer: Arc::new(TokenMultiplexer::new(token_size)),
            renderer: Arc::new(ThrowableRenderer),
        }
    }

    pub fn with_fielder(mut self, fielder: impl Fielder + 'static) -> Self {
        self.fielder = Arc::new(fielder);
        self
    }

    pub fn with_cleaner(mut self, cleaner: impl Cleaner + 'static) -> Self {
        self.cleaner = Arc::new(cleaner);
        self
    }

    pub fn with_multiplexer(mut self, multiplexer: impl Multiplexer + 'static) -> Self {
        self.multiplexer = Arc::new(multiplexer);
        self
    }

    pub fn with_renderer(mut self, renderer: impl StackTraceRenderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    /// Compute the parts and fields for `record`.
    ///
    /// Extracted fields override caller-attached ones with the same key. The
    /// rendered throwable is appended on its own line before splitting.
    pub fn shape(&self, record: &LogdocRecord) -> ShapedRecord {
        let mut fields = record.fields.clone();
        fields.extend(self.fielder.fields(&record.text));

        let mut text = self.cleaner.clean(&record.text);
        if record.throwable.is_some() {
            text.push('\n');
            text.push_str(&self.renderer.render(record));
        }
        ShapedRecord {
            parts: self.multiplexer.split(&text),
            fields,
        }
    }
}

impl Default for RecordShaper {
    fn default() -> Self {
        Self::with_token_size(-1)
    }
}

impl fmt::Debug for RecordShaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordShaper").finish_non_exhaustive()
    }
}
