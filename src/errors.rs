use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for remote operations and local file access.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP call never completed (DNS, TLS, timeout).
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote answered outside the 2xx range.
    #[error("remote returned {status}: {body}")]
    Remote {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The remote answered 2xx but the body did not decode.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A local file or directory could not be read.
    #[error("local io on {path}: {source}")]
    LocalIo {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::LocalIo {
            path: path.into(),
            source,
        }
    }
}
