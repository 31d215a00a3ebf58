use crate::document::OutboundDocument;
use crate::sink::{DeliveryError, DocumentStore};
use async_trait::async_trait;

/// A store that accepts and drops every document.
///
/// Useful for measuring the overhead of the pipeline itself without any
/// external I/O.
#[derive(Clone, Default)]
pub struct NoopStore;

#[async_trait]
impl DocumentStore for NoopStore {
    async fn write_one(&self, _key: &str, _document: &OutboundDocument) -> Result<(), DeliveryError> {
        Ok(())
    }
}
