use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use tracing_docstore_sink::{
    config::SinkConfig,
    document::OutboundDocument,
    init::{init_tracing_with_config, LayerConfig},
    sink::{DeliveryError, DocumentStore},
};

/// Example of integrating a completely custom store by implementing
/// the `DocumentStore` trait directly. Imagine this talks to some
/// proprietary database for which this crate does not provide a client.
struct MyCustomDbStore;

#[async_trait]
impl DocumentStore for MyCustomDbStore {
    async fn write_one(&self, key: &str, document: &OutboundDocument) -> Result<(), DeliveryError> {
        // Here you would call your own client library for the target DB.
        // For the sake of example we just print the document.
        println!("[my-custom-db] {} => {}", key, serde_json::to_string(document)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let store: Arc<dyn DocumentStore> = Arc::new(MyCustomDbStore);

    let guard = init_tracing_with_config(store, SinkConfig::default(), LayerConfig::default())
        .expect("install log pipeline");

    info!(target: "example", "custom store example started");
    error!(target: "example", db = "my-custom-db", "simulated error sent via {{db}}");

    guard.shutdown().await;
}
