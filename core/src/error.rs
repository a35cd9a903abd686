use crate::types::ArtifactKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error in relation '{relation}': {detail}")]
    Schema {
        relation: &'static str,
        detail: String,
    },

    #[error("Data quality error: {0}")]
    DataQuality(String),

    #[error("Artifact '{kind}' has not been computed yet")]
    NotComputed { kind: ArtifactKind },

    #[error("Artifact '{kind}' requires '{requires}', which has not been computed")]
    StaleDependency {
        kind: ArtifactKind,
        requires: ArtifactKind,
    },

    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnalyticsError {
    /// A cache miss is recoverable: the caller should report "no data yet".
    pub fn is_not_computed(&self) -> bool {
        matches!(self, Self::NotComputed { .. })
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
