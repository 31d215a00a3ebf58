use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use tracing_docstore_sink::config::SinkConfig;
use tracing_docstore_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_docstore_sink::noop_sink::NoopStore;

#[tokio::main]
async fn main() {
    let layer_config = LayerConfig {
        enable_stdout: false,
        ..LayerConfig::default()
    };
    let guard = init_tracing_with_config(Arc::new(NoopStore), SinkConfig::default(), layer_config)
        .expect("install log pipeline");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(target: "load", iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: enqueued {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let report = guard.shutdown().await;
    println!("shutdown: {:?}", report);
}
