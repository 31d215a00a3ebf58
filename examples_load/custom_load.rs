use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use tracing_docstore_sink::config::{OverflowPolicy, SinkConfig};
use tracing_docstore_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_docstore_sink::noop_sink::NoopStore;
use tracing_docstore_sink::record::LogLevel;

#[tokio::main]
async fn main() {
    let sink_config = SinkConfig::default()
        .with_batch_posting_limit(1_000)
        .with_period(Duration::from_millis(200))
        .with_max_buffered_events(50_000, OverflowPolicy::DropOldest)
        .with_shutdown_timeout(Duration::from_secs(5));

    let layer_config = LayerConfig {
        min_level: LogLevel::Error,
        enable_stdout: false,
    };

    let guard = init_tracing_with_config(Arc::new(NoopStore), sink_config, layer_config)
        .expect("install log pipeline");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(target: "load", iteration = i, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: enqueued {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let stats = guard.scheduler().stats();
    println!("before shutdown: {:?}", stats);
    println!("shutdown: {:?}", guard.shutdown().await);
}
