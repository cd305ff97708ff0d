//! Error types for felt parsing and artifact loading

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while canonicalizing felts or reading prover artifacts
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// Value could not be interpreted as a field element
    #[error("malformed felt: {0}")]
    MalformedFelt(String),

    /// Artifact file does not exist
    #[error("artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Artifact file exists but could not be read
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Artifact file is not valid JSON
    #[error("invalid JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON document has no recognizable felt array
    #[error("unrecognized artifact schema in {}: {reason}", .path.display())]
    Schema { path: PathBuf, reason: String },

    /// Proof file matches none of the accepted proof shapes
    #[error("unsupported proof format in {}: {reason}", .path.display())]
    UnsupportedProofFormat { path: PathBuf, reason: String },

    /// Tool output could not be parsed as a felt list
    #[error("malformed felt list: {0}")]
    MalformedList(String),
}

impl ArtifactError {
    /// True for errors describing the shape of a document rather than I/O
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            ArtifactError::Schema { .. } | ArtifactError::UnsupportedProofFormat { .. }
        )
    }
}
