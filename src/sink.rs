use crate::document::OutboundDocument;
use async_trait::async_trait;
use std::error::Error;

/// Connection to a remote document store.
///
/// Implementations transport one [`OutboundDocument`] per call. The
/// scheduler only ever calls `write_one` from its single background task,
/// one document at a time, so implementations need no internal locking
/// for the sake of the pipeline.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write a single document under `key`.
    ///
    /// **Returns**
    /// - `Ok(())` if the store accepted the document.
    /// - `Err(..)` if the write failed. Failures are never retried; the
    ///   deliver step logs them and moves on to the next event, unless
    ///   [`DeliveryError::is_fatal`] says the connection itself is gone.
    async fn write_one(&self, key: &str, document: &OutboundDocument) -> Result<(), DeliveryError>;

    /// Release the underlying connection.
    ///
    /// Must be idempotent and safe to call when nothing was written.
    /// Default implementation is a no-op.
    async fn close(&self) {}
}

/// Outcome of a failed [`DocumentStore::write_one`].
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("store rejected document with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn Error + Send + Sync>),

    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store connection is closed")]
    Closed,
}

impl DeliveryError {
    /// Whether the failure concerns the connection rather than a single
    /// document. Fatal errors abort the rest of the batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeliveryError::Closed)
    }
}
