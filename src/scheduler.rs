//! Periodic batching scheduler.
//!
//! Producers append to an in-memory FIFO without ever waiting on I/O. A
//! single background task wakes up every `period` (or on [`flush`]),
//! removes up to `batch_posting_limit` events and hands them to
//! [`deliver_batch`]. The next drain only starts once the previous deliver
//! step has returned, so the store never sees concurrent writes from the
//! pipeline.
//!
//! ```text
//!   producers ──enqueue──> [ buffer ] ──drain (≤ limit)──> deliver_batch ──> store
//!                               ^                               |
//!                               └──────── tick / flush ─────────┘
//! ```
//!
//! [`flush`]: BatchingScheduler::flush

use crate::config::{ConfigError, OverflowPolicy, SinkConfig, MIN_PERIOD};
use crate::deliver::{deliver_batch, BatchStepError, DeliveryCounters};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::record::LogEvent;
use crate::render::{MessageFormatter, TemplateFormatter};
use crate::sink::DocumentStore;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a [`BatchingScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle,
    /// A drained batch is being delivered.
    Flushing,
    /// `stop` was called; the remaining buffer is being drained. Events
    /// enqueued now are still delivered until the drain finds the buffer
    /// empty, after which they are refused.
    ShuttingDown,
    /// Terminal. Late events are discarded.
    Stopped,
}

impl SchedulerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SchedulerState::Idle,
            1 => SchedulerState::Flushing,
            2 => SchedulerState::ShuttingDown,
            _ => SchedulerState::Stopped,
        }
    }
}

/// Point-in-time copy of the scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Events accepted into the buffer.
    pub enqueued: u64,
    /// Documents the store accepted.
    pub delivered: u64,
    /// Documents the store rejected.
    pub failed: u64,
    /// Events discarded without a write attempt: overflow, late enqueue,
    /// or shutdown timeout.
    pub dropped: u64,
    /// Events abandoned by a failed deliver step.
    pub lost: u64,
    /// Events currently buffered.
    pub pending: usize,
}

/// Result of [`BatchingScheduler::stop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Documents delivered while stopping.
    pub delivered: u64,
    /// Buffered events discarded because the timeout elapsed.
    pub dropped: usize,
    /// Whether the final drain hit the timeout.
    pub timed_out: bool,
}

enum Admission {
    Accepted,
    Overflow(usize),
    Late,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
    abandoned: AtomicU64,
    lost: AtomicU64,
    delivery: DeliveryCounters,
}

struct Inner {
    buffer: Mutex<VecDeque<LogEvent>>,
    state: AtomicU8,
    store: Arc<dyn DocumentStore>,
    formatter: Arc<dyn MessageFormatter>,
    diagnostics: Arc<dyn DiagnosticSink>,
    batch_posting_limit: usize,
    period: Duration,
    max_buffered_events: Option<usize>,
    overflow_policy: OverflowPolicy,
    overflowing: AtomicBool,
    /// Set under the buffer lock once nothing more may be buffered.
    sealed: AtomicBool,
    late_reported: AtomicBool,
    flush_requested: Notify,
    cancel: CancellationToken,
    finished: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Counters,
}

/// Buffers [`LogEvent`]s and delivers them to a [`DocumentStore`] in
/// periodic batches.
///
/// Cloning is cheap; all clones share the same buffer and background task.
#[derive(Clone)]
pub struct BatchingScheduler {
    inner: Arc<Inner>,
}

impl BatchingScheduler {
    /// Validate `config` and build a scheduler around `store`.
    ///
    /// Nothing is spawned until [`start`](Self::start) is called; events
    /// enqueued before that are kept in the buffer.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        config: &SinkConfig,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let formatter = config
            .formatter
            .clone()
            .unwrap_or_else(|| Arc::new(TemplateFormatter) as Arc<dyn MessageFormatter>);

        Ok(Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(VecDeque::new()),
                state: AtomicU8::new(SchedulerState::Idle as u8),
                store,
                formatter,
                diagnostics,
                batch_posting_limit: config.batch_posting_limit,
                period: config.period.max(MIN_PERIOD),
                max_buffered_events: config.max_buffered_events,
                overflow_policy: config.overflow_policy,
                overflowing: AtomicBool::new(false),
                sealed: AtomicBool::new(false),
                late_reported: AtomicBool::new(false),
                flush_requested: Notify::new(),
                cancel: CancellationToken::new(),
                finished: CancellationToken::new(),
                worker: Mutex::new(None),
                counters: Counters::default(),
            }),
        })
    }

    /// Spawn the background drain loop on the current Tokio runtime.
    ///
    /// Calling it again, or after [`stop`](Self::stop), does nothing.
    pub fn start(&self) {
        let mut worker = self.inner.worker.lock();
        if worker.is_some() || self.inner.cancel.is_cancelled() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *worker = Some(tokio::spawn(async move { inner.run().await }));
    }

    /// Append `event` to the buffer. Never blocks and never fails; overflow
    /// and late events are reported to the diagnostic sink.
    pub fn enqueue(&self, event: LogEvent) {
        let inner = &*self.inner;

        let admission = {
            let mut buffer = inner.buffer.lock();
            if inner.sealed.load(Ordering::Relaxed) {
                inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Admission::Late
            } else {
                match inner.max_buffered_events {
                    Some(capacity) if buffer.len() >= capacity => {
                        match inner.overflow_policy {
                            OverflowPolicy::DropOldest => {
                                buffer.pop_front();
                                buffer.push_back(event);
                                inner.counters.evicted.fetch_add(1, Ordering::Relaxed);
                                inner.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                            }
                            OverflowPolicy::DropNewest => {
                                inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Admission::Overflow(capacity)
                    }
                    _ => {
                        buffer.push_back(event);
                        inner.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                        Admission::Accepted
                    }
                }
            }
        };

        match admission {
            Admission::Accepted => {}
            Admission::Late => {
                if !inner.late_reported.swap(true, Ordering::Relaxed) {
                    inner.diagnostics.report(Diagnostic::EnqueueAfterStop);
                }
            }
            Admission::Overflow(capacity) => {
                if !inner.overflowing.swap(true, Ordering::Relaxed) {
                    inner.diagnostics.report(Diagnostic::BufferOverflow {
                        policy: inner.overflow_policy,
                        capacity,
                    });
                }
            }
        }
    }

    /// Ask the background task to drain one batch now instead of waiting
    /// for the next tick.
    pub fn flush(&self) {
        self.inner.flush_requested.notify_one();
    }

    /// Stop the scheduler and drain everything still buffered.
    ///
    /// The periodic timer is cancelled first; the background task then
    /// delivers the remaining events in batches of at most
    /// `batch_posting_limit`. If that takes longer than `timeout` the task
    /// is aborted, whatever is left is discarded and a
    /// [`Diagnostic::ShutdownTimeout`] is reported. The store is closed in
    /// every case.
    ///
    /// Events enqueued while the drain is running are delivered with it;
    /// once it has emptied the buffer further events are refused and
    /// reported as [`Diagnostic::EnqueueAfterStop`].
    ///
    /// Concurrent or later calls wait (up to their own `timeout`) for the
    /// first one to finish and return an empty report.
    pub async fn stop(&self, timeout: Duration) -> StopReport {
        let inner = &self.inner;

        let begin = inner.state.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
            match SchedulerState::from_u8(s) {
                SchedulerState::ShuttingDown | SchedulerState::Stopped => None,
                _ => Some(SchedulerState::ShuttingDown as u8),
            }
        });
        if begin.is_err() {
            let timed_out = tokio::time::timeout(timeout, inner.finished.cancelled())
                .await
                .is_err();
            return StopReport {
                timed_out,
                ..StopReport::default()
            };
        }

        let delivered_before = inner.counters.delivery.delivered.load(Ordering::Relaxed);
        inner.cancel.cancel();
        let worker = inner.worker.lock().take();

        let timed_out = match worker {
            Some(mut handle) => match tokio::time::timeout(timeout, &mut handle).await {
                Ok(_) => false,
                Err(_) => {
                    handle.abort();
                    // wait for the in-flight write to be cancelled
                    let _ = handle.await;
                    true
                }
            },
            // never started: drain on the caller's task
            None => tokio::time::timeout(timeout, inner.drain_all()).await.is_err(),
        };

        let dropped = {
            let mut buffer = inner.buffer.lock();
            inner.sealed.store(true, Ordering::Relaxed);
            buffer.clear();
            inner.unsettled(0)
        };
        if dropped > 0 {
            inner.counters.abandoned.fetch_add(dropped as u64, Ordering::Relaxed);
        }
        if timed_out {
            inner.diagnostics.report(Diagnostic::ShutdownTimeout { timeout, dropped });
        } else if dropped > 0 {
            inner.diagnostics.report(Diagnostic::DroppedOnShutdown { dropped });
        }

        inner.store.close().await;
        inner.state.store(SchedulerState::Stopped as u8, Ordering::SeqCst);
        inner.finished.cancel();

        StopReport {
            delivered: inner.counters.delivery.delivered.load(Ordering::Relaxed) - delivered_before,
            dropped,
            timed_out,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.state()
    }

    /// Number of events currently buffered.
    pub fn pending(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn take_pending(&self) -> Vec<LogEvent> {
        self.inner.buffer.lock().drain(..).collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.inner.counters;
        SchedulerStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            delivered: c.delivery.delivered.load(Ordering::Relaxed),
            failed: c.delivery.failed.load(Ordering::Relaxed),
            dropped: c.evicted.load(Ordering::Relaxed)
                + c.rejected.load(Ordering::Relaxed)
                + c.abandoned.load(Ordering::Relaxed),
            lost: c.lost.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }
}

impl Inner {
    fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: SchedulerState, to: SchedulerState) {
        let _ = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst);
    }

    async fn run(self: Arc<Self>) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.flush_requested.notified() => {}
            }
            self.flush_once().await;
        }

        self.drain_all().await;
    }

    async fn flush_once(&self) {
        let batch = self.drain_batch();
        if batch.is_empty() {
            return;
        }
        self.transition(SchedulerState::Idle, SchedulerState::Flushing);
        self.deliver(batch).await;
        self.transition(SchedulerState::Flushing, SchedulerState::Idle);
    }

    /// Deliver batches until the buffer is empty, then seal it so that
    /// nothing enqueued afterwards can be left behind.
    async fn drain_all(&self) {
        loop {
            let batch = {
                let mut buffer = self.buffer.lock();
                if buffer.is_empty() {
                    self.sealed.store(true, Ordering::Relaxed);
                    return;
                }
                self.take_batch(&mut buffer)
            };
            self.deliver(batch).await;
        }
    }

    fn drain_batch(&self) -> Vec<LogEvent> {
        let mut buffer = self.buffer.lock();
        self.take_batch(&mut buffer)
    }

    fn take_batch(&self, buffer: &mut VecDeque<LogEvent>) -> Vec<LogEvent> {
        let take = buffer.len().min(self.batch_posting_limit);
        let batch: Vec<LogEvent> = buffer.drain(..take).collect();
        if take > 0 {
            self.overflowing.store(false, Ordering::Relaxed);
        }
        batch
    }

    async fn deliver(&self, batch: Vec<LogEvent>) {
        let total = batch.len();
        let step = deliver_batch(
            &*self.store,
            &*self.formatter,
            &*self.diagnostics,
            &self.counters.delivery,
            batch,
        );

        let err = match AssertUnwindSafe(step).catch_unwind().await {
            Ok(Ok(_)) => return,
            Ok(Err(err)) => err,
            Err(_) => BatchStepError::Panicked { total },
        };

        let lost = {
            let buffer = self.buffer.lock();
            self.unsettled(buffer.len())
        };
        self.counters.lost.fetch_add(lost as u64, Ordering::Relaxed);
        self.diagnostics.report(Diagnostic::BatchFailed {
            reason: err.to_string(),
            lost,
        });
    }

    /// Accepted events that were neither delivered, rejected by the store,
    /// evicted, lost nor abandoned, minus the `buffered` ones. Only
    /// meaningful with the buffer lock held and no deliver step running.
    fn unsettled(&self, buffered: usize) -> usize {
        let c = &self.counters;
        let settled = c.evicted.load(Ordering::Relaxed)
            + c.lost.load(Ordering::Relaxed)
            + c.abandoned.load(Ordering::Relaxed)
            + c.delivery.delivered.load(Ordering::Relaxed)
            + c.delivery.failed.load(Ordering::Relaxed)
            + buffered as u64;
        c.enqueued.load(Ordering::Relaxed).saturating_sub(settled) as usize
    }
}
