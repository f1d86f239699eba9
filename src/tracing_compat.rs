//! `tracing` layer forwarding events to a [`LogdocHandler`].
//!
//! The event's `message` field becomes the record text; every other field is
//! attached as a record field. Events targeting this crate are ignored.

use std::{fmt, sync::Arc};

use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{layer::Context, Layer};

use crate::{
    handler::LogdocHandler, is_own_target, level::LogdocLevel, log_record::LogdocRecord,
};

/// Layer shipping `tracing` events through a logdoc handler.
pub struct LogdocLayer {
    handler: Arc<dyn LogdocHandler>,
}

impl LogdocLayer {
    pub fn new(handler: Arc<dyn LogdocHandler>) -> Self {
        Self { handler }
    }
}

fn map_level(level: &Level) -> LogdocLevel {
    match *level {
        Level::TRACE => LogdocLevel::Trace,
        Level::DEBUG => LogdocLevel::Debug,
        Level::INFO => LogdocLevel::Info,
        Level::WARN => LogdocLevel::Warn,
        Level::ERROR => LogdocLevel::Error,
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_owned();
        } else {
            self.fields.push((field.name().to_owned(), value.to_owned()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .push((field.name().to_owned(), format!("{value:?}")));
        }
    }
}

impl<S: Subscriber> Layer<S> for LogdocLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_own_target(metadata.target()) {
            return;
        }
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        let source = metadata.target().replace("::", ".");
        let record = visitor.fields.into_iter().fold(
            LogdocRecord::new(&source, map_level(metadata.level()), &visitor.message),
            |record, (key, value)| record.with_field(key, value),
        );
        // Queue overflow is already reported by the handler.
        let _ = self.handler.append(record);
    }
}
