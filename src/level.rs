//! Severity levels understood by the logdoc collector.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(into = "&'static str")]
pub enum LogdocLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

impl LogdocLevel {
    /// Text form used on the wire and in log output.
    pub fn as_str(self) -> &'static str {
        match self {
            LogdocLevel::Trace => "TRACE",
            LogdocLevel::Debug => "DEBUG",
            LogdocLevel::Info => "INFO",
            LogdocLevel::Warn => "WARN",
            LogdocLevel::Error => "ERROR",
            LogdocLevel::Critical => "CRITICAL",
        }
    }

    pub fn parse_or_info(s: &str) -> Self {
        s.parse().unwrap_or(Self::Info)
    }
}

impl From<LogdocLevel> for &'static str {
    fn from(level: LogdocLevel) -> Self {
        level.as_str()
    }
}

impl fmt::Display for LogdocLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogdocLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Self::Trace),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" | "FATAL" => Ok(Self::Critical),
            _ => Err(()),
        }
    }
}

impl From<log::Level> for LogdocLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => LogdocLevel::Trace,
            log::Level::Debug => LogdocLevel::Debug,
            log::Level::Info => LogdocLevel::Info,
            log::Level::Warn => LogdocLevel::Warn,
            log::Level::Error => LogdocLevel::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("info", LogdocLevel::Info)]
    #[case(" Warning ", LogdocLevel::Warn)]
    #[case("FATAL", LogdocLevel::Critical)]
    #[case("bogus", LogdocLevel::Info)]
    fn parses_levels_leniently(#[case] input: &str, #[case] expected: LogdocLevel) {
        assert_eq!(LogdocLevel::parse_or_info(input), expected);
    }

    #[rstest]
    fn maps_log_crate_levels() {
        assert_eq!(LogdocLevel::from(log::Level::Error), LogdocLevel::Error);
        assert_eq!(LogdocLevel::from(log::Level::Trace).to_string(), "TRACE");
    }
}
