use crate::config::{ConfigError, SinkConfig};
use crate::diagnostics::TracingDiagnostics;
use crate::layer::DocStoreLayer;
use crate::record::LogLevel;
use crate::scheduler::{BatchingScheduler, StopReport};
use crate::sink::DocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Subscriber-side settings.
///
/// **Fields**
/// - `min_level`: lowest level shipped to the store.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   installed next to the store layer, so events (and the pipeline's own
///   diagnostics) are also printed to the console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub min_level: LogLevel,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            enable_stdout: true,
        }
    }
}

/// Errors from installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to install global subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Keeps the pipeline alive; call [`shutdown`](SinkGuard::shutdown) before
/// the runtime exits so buffered events are delivered.
#[must_use = "dropping the guard without calling `shutdown` loses buffered events"]
pub struct SinkGuard {
    scheduler: BatchingScheduler,
    shutdown_timeout: Duration,
}

impl SinkGuard {
    pub fn scheduler(&self) -> &BatchingScheduler {
        &self.scheduler
    }

    /// Stop the scheduler, draining the buffer within the configured
    /// shutdown timeout.
    pub async fn shutdown(self) -> StopReport {
        self.scheduler.stop(self.shutdown_timeout).await
    }
}

/// Install a global `tracing` subscriber that ships events to `store`.
///
/// **Parameters**
/// - `store`: [`DocumentStore`] receiving one document per event.
/// - `sink_config`: batching and buffering parameters.
/// - `layer_config`: level threshold and console output.
///
/// Must be called from within a Tokio runtime: the scheduler's background
/// task is spawned here.
pub fn init_tracing_with_config(
    store: Arc<dyn DocumentStore>,
    sink_config: SinkConfig,
    layer_config: LayerConfig,
) -> Result<SinkGuard, InitError> {
    let scheduler = BatchingScheduler::new(store, &sink_config, Arc::new(TracingDiagnostics))?;
    let layer = DocStoreLayer::new(scheduler.clone(), layer_config.min_level);

    // Registry and Layered<..> differ in type with and without the fmt
    // layer, so the subscriber is assembled in two variants.
    if layer_config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    scheduler.start();

    Ok(SinkGuard {
        scheduler,
        shutdown_timeout: sink_config.shutdown_timeout,
    })
}

/// Install the subscriber with an HTTP document store built from
/// `sink_config` and the default [`LayerConfig`].
///
/// This is the recommended entrypoint for typical services.
#[cfg(feature = "http")]
pub fn init_tracing(sink_config: SinkConfig) -> Result<SinkGuard, InitError> {
    let store = crate::http_store::HttpDocumentStore::from_config(&sink_config)?;
    init_tracing_with_config(Arc::new(store), sink_config, LayerConfig::default())
}
