//! Fixtures pairing a [`FakeCollector`] with a builder pointed at it.
//!
//! Timings are shortened to milliseconds so reconnect and restart paths run
//! quickly.

use logdoc_rs::{BackoffOverrides, LogdocAppenderBuilder};
use rstest::fixture;

use super::collector::FakeCollector;

/// Builder for `collector` with test-friendly delays.
pub fn builder_for(collector: &FakeCollector) -> LogdocAppenderBuilder {
    LogdocAppenderBuilder::new()
        .with_collector(collector.host(), collector.port())
        .with_login("svc", "secret")
        .with_retry_delay_ms(20)
        .with_restart_delay_ms(50)
        .with_backoff(BackoffOverrides::new().with_step_ms(30).with_cap_ms(120))
}

/// A running collector that accepts every login.
#[fixture]
pub fn collector() -> FakeCollector {
    FakeCollector::start()
}
