use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::document::OutboundDocument;
use crate::record::LogEvent;
use crate::render::MessageFormatter;
use crate::sink::{DeliveryError, DocumentStore};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Running totals of write outcomes, updated per document.
#[derive(Debug, Default)]
pub struct DeliveryCounters {
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
}

/// Outcome of one completed deliver step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// A deliver step that could not finish its batch.
#[derive(thiserror::Error, Debug)]
pub enum BatchStepError {
    #[error("store connection failed after {} of {total} event(s): {source}", .report.delivered + .report.failed)]
    Connection {
        #[source]
        source: DeliveryError,
        report: BatchReport,
        total: usize,
    },

    #[error("deliver step panicked on a batch of {total} event(s)")]
    Panicked { total: usize },
}

/// Write every event of `batch` to `store`, one document per event, in order.
///
/// Each event gets a fresh random key and a message rendered by
/// `formatter`. A rejected write is reported to `diagnostics` and the step
/// moves on; the event is not retried. Only a fatal error (the connection
/// is gone) ends the step early, abandoning the rest of the batch.
pub async fn deliver_batch(
    store: &dyn DocumentStore,
    formatter: &dyn MessageFormatter,
    diagnostics: &dyn DiagnosticSink,
    counters: &DeliveryCounters,
    batch: Vec<LogEvent>,
) -> Result<BatchReport, BatchStepError> {
    let total = batch.len();
    let mut report = BatchReport::default();

    for event in batch {
        let rendered = formatter.render(&event);
        let document = OutboundDocument::from_event(Uuid::new_v4(), event, rendered);
        let key = document.key();

        match store.write_one(&key, &document).await {
            Ok(()) => {
                report.delivered += 1;
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) if err.is_fatal() => {
                return Err(BatchStepError::Connection { source: err, report, total });
            }
            Err(err) => {
                report.failed += 1;
                counters.failed.fetch_add(1, Ordering::Relaxed);
                diagnostics.report(Diagnostic::WriteFailed {
                    key,
                    level: document.level,
                    message: document.rendered_message,
                    reason: err.to_string(),
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogLevel;
    use crate::render::TemplateFormatter;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    #[derive(Default)]
    struct ScriptedStore {
        written: Mutex<Vec<(String, String)>>,
        attempts: Mutex<usize>,
    }

    #[async_trait]
    impl DocumentStore for ScriptedStore {
        async fn write_one(&self, key: &str, document: &OutboundDocument) -> Result<(), DeliveryError> {
            *self.attempts.lock() += 1;
            match document.message_template.as_str() {
                "reject" => Err(DeliveryError::Rejected { status: 409, body: "conflict".into() }),
                "disconnect" => Err(DeliveryError::Closed),
                _ => {
                    self.written
                        .lock()
                        .push((key.to_string(), document.rendered_message.clone()));
                    Ok(())
                }
            }
        }
    }

    #[derive(Default)]
    struct Collected(Mutex<Vec<Diagnostic>>);

    impl DiagnosticSink for Collected {
        fn report(&self, diagnostic: Diagnostic) {
            self.0.lock().push(diagnostic);
        }
    }

    fn event(template: &str) -> LogEvent {
        LogEvent::new(LogLevel::Info, template).with_property("n", 1)
    }

    #[tokio::test]
    async fn writes_each_event_under_a_fresh_key() {
        let store = ScriptedStore::default();
        let diagnostics = Collected::default();
        let counters = DeliveryCounters::default();
        let batch = vec![event("first {n}"), event("second {n}"), event("third {n}")];

        let report = deliver_batch(&store, &TemplateFormatter, &diagnostics, &counters, batch)
            .await
            .unwrap();

        assert_eq!(report, BatchReport { delivered: 3, failed: 0 });
        let written = store.written.lock();
        let messages: Vec<_> = written.iter().map(|(_, m)| m.as_str()).collect();
        assert_eq!(messages, vec!["first 1", "second 1", "third 1"]);
        let keys: HashSet<_> = written.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys.len(), 3);
        assert!(diagnostics.0.lock().is_empty());
    }

    #[tokio::test]
    async fn rejected_write_does_not_stop_the_batch() {
        let store = ScriptedStore::default();
        let diagnostics = Collected::default();
        let counters = DeliveryCounters::default();
        let batch = vec![event("a"), event("reject"), event("c")];

        let report = deliver_batch(&store, &TemplateFormatter, &diagnostics, &counters, batch)
            .await
            .unwrap();

        assert_eq!(report, BatchReport { delivered: 2, failed: 1 });
        assert_eq!(*store.attempts.lock(), 3);
        assert_eq!(counters.failed.load(Ordering::Relaxed), 1);

        let reported = diagnostics.0.lock();
        assert_eq!(reported.len(), 1);
        match &reported[0] {
            Diagnostic::WriteFailed { message, reason, .. } => {
                assert_eq!(message, "reject");
                assert!(reason.contains("409"));
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[tokio::test]
    async fn closed_connection_abandons_the_rest() {
        let store = ScriptedStore::default();
        let diagnostics = Collected::default();
        let counters = DeliveryCounters::default();
        let batch = vec![event("a"), event("disconnect"), event("c"), event("d")];

        let err = deliver_batch(&store, &TemplateFormatter, &diagnostics, &counters, batch)
            .await
            .unwrap_err();

        match err {
            BatchStepError::Connection { report, total, .. } => {
                assert_eq!(report, BatchReport { delivered: 1, failed: 0 });
                assert_eq!(total, 4);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(*store.attempts.lock(), 2);
        assert_eq!(counters.delivered.load(Ordering::Relaxed), 1);
    }
}
