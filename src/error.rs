//! Error types for the retrieval subsystem.
//!
//! The chat glue propagates `Box<dyn Error>`; indexing and embedding keep typed errors so
//! callers can tell a bad cache from a failed remote call.

use std::path::PathBuf;

/// Failures of a single embedding request.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Transport-level failure (connection refused, timeout, TLS).
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("embedding API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response body did not contain an embedding.
    #[error("embedding response malformed: {0}")]
    Malformed(String),

    /// Embedding an empty string is rejected by every provider.
    #[error("cannot embed empty text")]
    EmptyInput,
}

impl EmbedError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            EmbedError::Status { status, .. } => {
                *status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            EmbedError::Malformed(_) | EmbedError::EmptyInput => false,
        }
    }
}

/// Errors raised while building, loading or querying a codebase index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("index serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unsupported index format version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("embedding dimension mismatch: query has {query}, chunk has {chunk}")]
    DimensionMismatch { query: usize, chunk: usize },
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
