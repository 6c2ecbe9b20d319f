use std::path::PathBuf;
use thiserror::Error;

/// Network-layer failures, below the level of an HTTP status code
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out")]
    TimedOut,

    #[error("server ignored the byte range request starting at {offset}")]
    RangeNotSupported { offset: u64 },

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("connection interrupted: {0}")]
    Interrupted(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::TimedOut
        } else {
            Self::Request(error.without_url())
        }
    }
}

/// Errors that can occur during a single file transfer
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Access denied (HTTP 403) for {url}")]
    PermissionDenied { url: String },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Transfer of {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open file {path}: {source}")]
    FileOpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to rename {from} to {to}: {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Whether this error must abort the whole run instead of skipping a part
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CreateDirectory { .. })
    }

    /// Whether a retry without resuming may succeed
    pub fn is_resume_unsupported(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                source: TransportError::RangeNotSupported { .. },
                ..
            }
        )
    }
}

/// Errors reported by a media catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Catalog request to {url} failed: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to decode catalog response from {url}: {source}")]
    DecodeFailed {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid catalog URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Top-level errors that end a sync run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Destination unusable: {0}")]
    Destination(#[source] TransferError),
}

impl SyncError {
    /// Conventional sysexits status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Catalog(e) if e.is_not_found() => 65,
            Self::Catalog(_) => 1,
            Self::Destination(_) => 73,
        }
    }
}
