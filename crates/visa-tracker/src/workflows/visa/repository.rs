use serde_json::Value;
use tokio::sync::watch;

use super::domain::{ApplicationPatch, TrackingId};

/// Document store holding one JSON document per application.
///
/// `write` is a merge of the patch into the stored document and must land as one write:
/// readers either see the previous document or the fully patched one.
pub trait ApplicationRepository: Send + Sync {
    fn fetch(&self, id: &TrackingId) -> Result<Option<Value>, RepositoryError>;
    fn write(&self, id: &TrackingId, patch: &ApplicationPatch) -> Result<(), RepositoryError>;
}

/// Live feed pushed by the store whenever a document changes.
///
/// The receiver holds the latest document (`None` while it does not exist) and is marked
/// changed on every write; a closed sender means the feed dropped.
pub trait ApplicationFeed: Send + Sync {
    fn subscribe(&self, id: &TrackingId) -> Result<watch::Receiver<Option<Value>>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("document could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}
