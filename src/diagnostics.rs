//! Self-reporting channel for pipeline failures.
//!
//! The scheduler and deliver step never surface errors to producers; every
//! internal problem is handed to a [`DiagnosticSink`] injected at
//! construction. [`TracingDiagnostics`] forwards them to `tracing`.

use crate::config::OverflowPolicy;
use crate::record::LogLevel;
use std::time::Duration;

/// An internal failure of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The buffer reached its cap; further events are dropped per `policy`
    /// until the next drain makes room.
    BufferOverflow { policy: OverflowPolicy, capacity: usize },

    /// Events are being enqueued after the scheduler stopped.
    EnqueueAfterStop,

    /// A single document write failed; the event is discarded.
    WriteFailed {
        key: String,
        level: LogLevel,
        message: String,
        reason: String,
    },

    /// A batch was abandoned part way through.
    BatchFailed { reason: String, lost: usize },

    /// Graceful shutdown ran out of time; `dropped` events were discarded.
    ShutdownTimeout { timeout: Duration, dropped: usize },

    /// Shutdown finished in time but `dropped` buffered events were never
    /// handed to the store.
    DroppedOnShutdown { dropped: usize },
}

/// Write-only destination for [`Diagnostic`]s.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Reports diagnostics as `tracing` events.
///
/// Events are emitted under this crate's target, which
/// [`DocStoreLayer`](crate::layer::DocStoreLayer) never ships, so
/// diagnostics cannot loop back into the buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::BufferOverflow { policy, capacity } => {
                tracing::warn!(?policy, capacity, "log buffer full, dropping events");
            }
            Diagnostic::EnqueueAfterStop => {
                tracing::warn!("log scheduler stopped, dropping late events");
            }
            Diagnostic::WriteFailed { key, level, message, reason } => {
                tracing::error!(%key, %level, %message, %reason, "document write failed");
            }
            Diagnostic::BatchFailed { reason, lost } => {
                tracing::error!(%reason, lost, "log batch failed");
            }
            Diagnostic::ShutdownTimeout { timeout, dropped } => {
                tracing::warn!(?timeout, dropped, "log shutdown timed out before the buffer drained");
            }
            Diagnostic::DroppedOnShutdown { dropped } => {
                tracing::warn!(dropped, "log shutdown discarded undelivered events");
            }
        }
    }
}
