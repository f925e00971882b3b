// Error types shared across the engine and its collaborators.

use std::path::PathBuf;

use thiserror::Error;

use crate::reconcile::MessageId;

/// Failure talking to the identity or ranked-standing service. "Not found"
/// is not an error: lookups return `Ok(None)` / an unranked standing.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("ranking service request failed: {0}")]
    Transport(String),

    #[error("ranking service returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode ranking service response: {0}")]
    Decode(String),

    #[error("ranking service request timed out")]
    Timeout,
}

/// Failure of one operation against the publish surface.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The referenced page was removed out-of-band.
    #[error("published page {0} no longer exists")]
    Missing(MessageId),

    #[error("publish request failed: {0}")]
    Transport(String),

    #[error("publish surface rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl PublishError {
    pub fn is_missing(&self) -> bool {
        matches!(self, PublishError::Missing(_))
    }
}

/// Failure reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("state store unavailable: {0}")]
    Unavailable(String),
}
