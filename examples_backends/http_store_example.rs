use tracing::{error, info};
use tracing_docstore_sink::{config::SinkConfig, init::init_tracing};

#[tokio::main]
async fn main() {
    // Example DSN: docstore://localhost:9200/logs
    if std::env::var("LOG_SINK_DSN").is_err() {
        std::env::set_var("LOG_SINK_DSN", "docstore://localhost:9200/logs");
    }

    let config = SinkConfig::from_env().expect("invalid LOG_SINK_* configuration");
    let guard = init_tracing(config).expect("failed to install document store sink");

    info!(target: "example", "document store example started");
    error!(target: "example", collection = "logs", "simulated error for {{collection}}");

    let report = guard.shutdown().await;
    println!("delivered {} document(s), dropped {}", report.delivered, report.dropped);
}
