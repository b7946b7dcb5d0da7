//! Error taxonomy shared by the library.
//!
//! Binaries wrap these in `anyhow` for reporting. The variants map onto how a
//! batch reacts: configuration problems abort before any work starts,
//! malformed records and failed external calls skip one item, and storage
//! failures abort (and roll back) the whole batch.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed track payload: {0}")]
    MalformedInput(String),

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("unreadable response from {url}: {source}")]
    BadResponse {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("batch of {size} identifiers exceeds the catalog limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn http(url: &str, source: ureq::Error) -> Self {
        Error::Http {
            url: url.to_string(),
            source: Box::new(source),
        }
    }

    /// A response body that could not be read or decoded. Skips one item like
    /// any other failed external call.
    pub(crate) fn bad_response(url: &str, source: std::io::Error) -> Self {
        Error::BadResponse {
            url: url.to_string(),
            source,
        }
    }

    /// True for errors that should abort the whole batch rather than skip one item.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Storage(_) | Error::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_external_failures_are_not_batch_fatal() {
        let body = io::Error::new(io::ErrorKind::InvalidData, "expected value at line 1");
        assert!(!Error::bad_response("https://api.spotify.com/v1/search", body).is_batch_fatal());
        assert!(!Error::Catalog("playlist not found".to_string()).is_batch_fatal());
        assert!(!Error::MalformedInput("no title".to_string()).is_batch_fatal());
    }

    #[test]
    fn test_local_failures_are_batch_fatal() {
        assert!(Error::Io(io::Error::new(io::ErrorKind::NotFound, "db")).is_batch_fatal());
        assert!(Error::Config("DATABASE_PATH is not set".to_string()).is_batch_fatal());
    }
}
