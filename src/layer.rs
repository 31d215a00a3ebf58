use crate::record::{LogEvent, LogLevel};
use crate::scheduler::BatchingScheduler;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Targets whose events are never shipped: this crate's own diagnostics
/// and the HTTP stack used to deliver documents.
pub const DEFAULT_IGNORED_TARGETS: &[&str] = &["tracing_docstore_sink", "hyper", "reqwest", "h2", "rustls"];

/// `tracing_subscriber` layer that turns events into [`LogEvent`]s and
/// enqueues them on a [`BatchingScheduler`].
///
/// `on_event` only appends to an in-memory buffer; delivery happens on the
/// scheduler's background task.
pub struct DocStoreLayer {
    scheduler: BatchingScheduler,
    min_level: LogLevel,
    ignored_targets: Vec<String>,
}

impl DocStoreLayer {
    /// Ship events at `min_level` and above to `scheduler`.
    pub fn new(scheduler: BatchingScheduler, min_level: LogLevel) -> Self {
        DocStoreLayer {
            scheduler,
            min_level,
            ignored_targets: DEFAULT_IGNORED_TARGETS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Also skip events whose target starts with `prefix`.
    #[must_use]
    pub fn ignore_target(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_targets.push(prefix.into());
        self
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored_targets.iter().any(|prefix| {
            target == prefix.as_str() || target.strip_prefix(prefix.as_str()).map_or(false, |rest| rest.starts_with("::"))
        })
    }
}

impl<S> Layer<S> for DocStoreLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = LogLevel::from(meta.level());
        if level < self.min_level || self.is_ignored(meta.target()) {
            return;
        }

        let mut properties = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut exception: Option<String> = None;

        let mut visitor = FieldVisitor {
            properties: &mut properties,
            message: &mut message,
            exception: &mut exception,
        };
        event.record(&mut visitor);

        self.scheduler.enqueue(LogEvent {
            timestamp: Utc::now(),
            level,
            message_template: message.unwrap_or_default(),
            properties,
            exception,
            target: Some(meta.target().to_string()),
        });
    }
}

struct FieldVisitor<'a> {
    properties: &'a mut BTreeMap<String, serde_json::Value>,
    message: &'a mut Option<String>,
    exception: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        self.properties.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let rendered = value.to_string();
        if self.exception.is_none() {
            *self.exception = Some(rendered.clone());
        }
        self.insert(field, serde_json::Value::String(rendered));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, serde_json::Value::String(format!("{:?}", value)));
        }
    }
}
