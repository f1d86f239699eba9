//! Key decorations applied to the metadata fields of every frame.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Produces fields evaluated at encode time, such as the current thread name.
pub type DynamicFields = Arc<dyn Fn() -> BTreeMap<String, String> + Send + Sync>;

/// Normalise a key prefix so it ends with a single `.`.
///
/// `None` and blank values produce an empty prefix.
pub fn normalise_prefix(prefix: Option<&str>) -> String {
    match prefix.map(str::trim) {
        None | Some("") => String::new(),
        Some(p) if p.ends_with('.') => p.to_owned(),
        Some(p) => format!("{p}."),
    }
}

/// Normalise a key suffix so it starts with a single `.`.
pub fn normalise_suffix(suffix: Option<&str>) -> String {
    match suffix.map(str::trim) {
        None | Some("") => String::new(),
        Some(s) if s.starts_with('.') => s.to_owned(),
        Some(s) => format!(".{s}"),
    }
}

/// Prefix, suffix and fixed fields merged into each record's fields.
#[derive(Clone, Default)]
pub struct FieldDecorations {
    prefix: String,
    suffix: String,
    /// Fields emitted ahead of the record's own fields.
    pub static_prefix: BTreeMap<String, String>,
    /// Fields emitted after the record's own fields.
    pub static_suffix: BTreeMap<String, String>,
    pub dynamic: Option<DynamicFields>,
}

impl FieldDecorations {
    pub fn new(prefix: Option<&str>, suffix: Option<&str>) -> Self {
        Self {
            prefix: normalise_prefix(prefix),
            suffix: normalise_suffix(suffix),
            ..Self::default()
        }
    }

    /// Replace the key prefix and suffix, normalising both.
    pub fn set_affixes(&mut self, prefix: Option<&str>, suffix: Option<&str>) {
        self.prefix = normalise_prefix(prefix);
        self.suffix = normalise_suffix(suffix);
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Render the ordered field list for one frame.
    ///
    /// Order: static prefix fields, decorated record fields, static suffix
    /// fields, dynamic fields. Later entries win on duplicate keys.
    pub fn apply(&self, fields: &BTreeMap<String, String>) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::with_capacity(
            self.static_prefix.len() + fields.len() + self.static_suffix.len(),
        );
        let mut push = |key: String, value: &str| {
            if let Some(slot) = out.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value.to_owned();
            } else {
                out.push((key, value.to_owned()));
            }
        };
        for (key, value) in &self.static_prefix {
            push(key.clone(), value);
        }
        for (key, value) in fields {
            push(format!("{}{key}{}", self.prefix, self.suffix), value);
        }
        for (key, value) in &self.static_suffix {
            push(key.clone(), value);
        }
        if let Some(dynamic) = &self.dynamic {
            for (key, value) in dynamic() {
                push(key, &value);
            }
        }
        out
    }
}

impl fmt::Debug for FieldDecorations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDecorations")
            .field("prefix", &self.prefix)
            .field("suffix", &self.suffix)
            .field("static_prefix", &self.static_prefix)
            .field("static_suffix", &self.static_suffix)
            .field("dynamic", &self.dynamic.is_some())
            .finish()
    }
}
