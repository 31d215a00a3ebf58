//! In-memory fakes shared by the pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_docstore_sink::diagnostics::{Diagnostic, DiagnosticSink};
use tracing_docstore_sink::document::OutboundDocument;
use tracing_docstore_sink::record::{LogEvent, LogLevel};
use tracing_docstore_sink::scheduler::BatchingScheduler;
use tracing_docstore_sink::sink::{DeliveryError, DocumentStore};

/// Store that keeps every accepted document in memory.
///
/// Documents whose rendered message is listed in `reject` fail with a
/// rejection, `disconnect` fails with a fatal error and `panic` panics.
///
/// Once [`observe`](Self::observe)d, every write records the scheduler's
/// pending count, and `close` feeds `enqueue_on_close` back to it.
#[derive(Default)]
pub struct RecordingStore {
    pub documents: Mutex<Vec<OutboundDocument>>,
    pub attempts: Mutex<Vec<String>>,
    pub close_calls: AtomicUsize,
    pub pending_seen: Mutex<Vec<usize>>,
    scheduler: Mutex<Option<BatchingScheduler>>,
    enqueue_on_close: Vec<LogEvent>,
    delay: Option<Duration>,
    reject: HashSet<String>,
    disconnect: HashSet<String>,
    panic: HashSet<String>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn rejecting(mut self, message: &str) -> Self {
        self.reject.insert(message.to_string());
        self
    }

    pub fn disconnecting_on(mut self, message: &str) -> Self {
        self.disconnect.insert(message.to_string());
        self
    }

    pub fn panicking_on(mut self, message: &str) -> Self {
        self.panic.insert(message.to_string());
        self
    }

    pub fn enqueuing_on_close(mut self, event: LogEvent) -> Self {
        self.enqueue_on_close.push(event);
        self
    }

    pub fn observe(&self, scheduler: &BatchingScheduler) {
        *self.scheduler.lock() = Some(scheduler.clone());
    }

    pub fn messages(&self) -> Vec<String> {
        self.documents
            .lock()
            .iter()
            .map(|d| d.rendered_message.clone())
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.documents.lock().iter().map(|d| d.key()).collect()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn closes(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn write_one(&self, key: &str, document: &OutboundDocument) -> Result<(), DeliveryError> {
        let message = document.rendered_message.clone();
        self.attempts.lock().push(message.clone());
        if let Some(scheduler) = self.scheduler.lock().as_ref() {
            self.pending_seen.lock().push(scheduler.pending());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic.contains(&message) {
            panic!("store blew up on {}", message);
        }
        if self.disconnect.contains(&message) {
            return Err(DeliveryError::Closed);
        }
        if self.reject.contains(&message) {
            return Err(DeliveryError::Rejected {
                status: 400,
                body: format!("bad document {}", key),
            });
        }

        self.documents.lock().push(document.clone());
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            for event in &self.enqueue_on_close {
                scheduler.enqueue(event.clone());
            }
        }
    }
}

/// Diagnostic sink that records everything it is given.
#[derive(Default)]
pub struct RecordingDiagnostics {
    pub reports: Mutex<Vec<Diagnostic>>,
}

impl RecordingDiagnostics {
    pub fn all(&self) -> Vec<Diagnostic> {
        self.reports.lock().clone()
    }

    pub fn write_failures(&self) -> usize {
        self.reports
            .lock()
            .iter()
            .filter(|d| matches!(d, Diagnostic::WriteFailed { .. }))
            .count()
    }
}

impl DiagnosticSink for RecordingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        self.reports.lock().push(diagnostic);
    }
}

/// Event rendering to `"event {n}"`.
pub fn numbered(n: u64) -> LogEvent {
    LogEvent::new(LogLevel::Info, "event {n}").with_property("n", n)
}

pub fn expected(range: std::ops::Range<u64>) -> Vec<String> {
    range.map(|n| format!("event {}", n)).collect()
}
