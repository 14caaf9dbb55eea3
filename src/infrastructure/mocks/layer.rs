//! Log capture for asserting on emitted tracing events.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing::Level;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Layer that records every event it sees.
#[derive(Clone, Default)]
pub struct MockCaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

/// A recorded tracing event.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    /// Structured fields other than `message`, formatted with `Debug`
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    /// Look up a structured field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl MockCaptureLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, oldest first.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.recorded().clone()
    }

    pub fn count(&self) -> usize {
        self.recorded().len()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.recorded().clear();
    }

    fn recorded(&self) -> MutexGuard<'_, Vec<CapturedEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S: Subscriber> Layer<S> for MockCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _: Context<'_, S>) {
        let mut collected = FieldCollector::default();
        event.record(&mut collected);

        let level = *event.metadata().level();
        self.recorded().push(CapturedEvent {
            level,
            message: collected.message,
            fields: collected.fields,
        });
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Vec<(String, String)>,
}

impl FieldCollector {
    fn push(&mut self, field: &Field, rendered: String) {
        match field.name() {
            "message" => self.message = rendered,
            name => self.fields.push((name.to_owned(), rendered)),
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }
}
