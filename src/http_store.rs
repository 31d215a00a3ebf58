use crate::config::{validate_target, ConfigError, SinkConfig, DEFAULT_REQUEST_TIMEOUT};
use crate::document::OutboundDocument;
use crate::sink::{DeliveryError, DocumentStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use std::time::Duration;

/// Document store reached over its REST interface.
///
/// Each document is written with `PUT {base}/{collection}/_doc/{key}`,
/// where `base` is the first configured server address.
pub struct HttpDocumentStore {
    /// `None` once closed; dropping the client releases its pooled
    /// connections.
    client: Mutex<Option<Client>>,
    /// Base URL of the store, e.g. "http://localhost:9200".
    base_url: String,
    /// Target collection name.
    collection: String,
}

impl HttpDocumentStore {
    /// Build a client for `collection` on the first of `servers`.
    ///
    /// Fails with a [`ConfigError`] if `servers` is empty, its first entry
    /// is blank, or `collection` is blank. No request is made here.
    pub fn connect<S: AsRef<str>>(servers: &[S], collection: &str) -> Result<Self, ConfigError> {
        Self::build(servers, collection, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Same as [`connect`](Self::connect) using the servers, collection and
    /// request timeout of `config`.
    pub fn from_config(config: &SinkConfig) -> Result<Self, ConfigError> {
        Self::build(&config.servers, &config.collection, config.request_timeout)
    }

    fn build<S: AsRef<str>>(servers: &[S], collection: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let first = validate_target(servers, collection)?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(HttpDocumentStore {
            client: Mutex::new(Some(client)),
            base_url: base_url(first),
            collection: collection.trim().to_string(),
        })
    }

    fn document_url(&self, key: &str) -> String {
        format!(
            "{}/{}/_doc/{}",
            self.base_url,
            urlencoding::encode(&self.collection),
            urlencoding::encode(key)
        )
    }
}

fn base_url(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn write_one(&self, key: &str, document: &OutboundDocument) -> Result<(), DeliveryError> {
        let client = self.client.lock().clone().ok_or(DeliveryError::Closed)?;

        let body = serde_json::to_vec(document)?;
        let resp = client
            .put(self.document_url(key))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(Box::new(e)))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(DeliveryError::Rejected { status, body })
        }
    }

    async fn close(&self) {
        self.client.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{LogEvent, LogLevel};
    use mockito::{Matcher, Server};
    use uuid::Uuid;

    fn document() -> OutboundDocument {
        let event = LogEvent::new(LogLevel::Error, "disk {disk} full").with_property("disk", "sda1");
        OutboundDocument::from_event(Uuid::new_v4(), event, "disk sda1 full".to_string())
    }

    #[test]
    fn construction_validates_without_network() {
        let none: [&str; 0] = [];
        assert_eq!(HttpDocumentStore::connect(&none, "logs").err(), Some(ConfigError::NoServers));
        assert_eq!(
            HttpDocumentStore::connect(&["", "127.0.0.1:9"], "logs").err(),
            Some(ConfigError::BlankServerAddress)
        );
        assert_eq!(
            HttpDocumentStore::connect(&["127.0.0.1:9"], "").err(),
            Some(ConfigError::MissingCollection)
        );
    }

    #[test]
    fn base_url_gets_a_scheme() {
        assert_eq!(base_url("localhost:9200"), "http://localhost:9200");
        assert_eq!(base_url("https://store:443/"), "https://store:443");
    }

    #[tokio::test]
    async fn writes_document_under_key() {
        let mut server = Server::new_async().await;
        let doc = document();
        let key = doc.key();

        let mock = server
            .mock("PUT", format!("/app-logs/_doc/{}", key).as_str())
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "rendered_message": "disk sda1 full",
                "level": "ERROR",
                "properties": { "disk": "sda1" }
            })))
            .with_status(201)
            .create_async()
            .await;

        let store = HttpDocumentStore::connect(&[server.url()], "app-logs").unwrap();
        store.write_one(&key, &doc).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_a_rejection() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("PUT", Matcher::Any)
            .with_status(503)
            .with_body("shard unavailable")
            .create_async()
            .await;

        let store = HttpDocumentStore::connect(&[server.url()], "logs").unwrap();
        let doc = document();
        let err = store.write_one(&doc.key(), &doc).await.unwrap_err();

        match err {
            DeliveryError::Rejected { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "shard unavailable");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!DeliveryError::Rejected { status: 503, body: String::new() }.is_fatal());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_writes() {
        let mut server = Server::new_async().await;
        let mock = server.mock("PUT", Matcher::Any).expect(0).create_async().await;

        let store = HttpDocumentStore::connect(&[server.url()], "logs").unwrap();
        store.close().await;
        assert!(store.client.lock().is_none());
        store.close().await;

        let doc = document();
        let err = store.write_one(&doc.key(), &doc).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Closed));
        assert!(err.is_fatal());
        mock.assert_async().await;
    }
}
