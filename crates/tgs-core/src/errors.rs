use std::time::Duration;

use serde::Serialize;

use crate::domain::StoryId;

/// Ambient error type (configuration, I/O, external libraries).
///
/// Pipeline failures have their own typed taxonomy below; this one covers the
/// process-level plumbing around it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by an implementation of the remote ports.
///
/// Adapter crates map their library errors into this type. The core only ever
/// asks two questions of it: did the connection die, and did a file reference
/// go stale.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("rpc error {code}: {name}")]
    Rpc { code: i32, name: String },

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    pub fn rpc(code: i32, name: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            name: name.into(),
        }
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::ConnectionLost(_) => true,
            // Revoked or unregistered authorization keys make the session unusable.
            Self::Rpc { code, .. } => *code == 401,
            Self::Other(_) => false,
        }
    }

    pub fn is_file_reference_expired(&self) -> bool {
        matches!(self, Self::Rpc { name, .. } if name.starts_with("FILE_REFERENCE_"))
    }
}

/// The remote session could not be established or was lost mid-request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("telegram session unavailable: {message}")]
pub struct ConnectionError {
    pub message: String,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<RemoteError> for ConnectionError {
    fn from(e: RemoteError) -> Self {
        Self::new(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("user or channel not found: {peer}")]
    NotFound { peer: String },

    #[error("{peer} is a group; only users and channels publish stories")]
    UnsupportedPeerKind { peer: String },

    #[error("failed to resolve {peer}: {source}")]
    Lookup {
        peer: String,
        #[source]
        source: RemoteError,
    },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("story {story_id} not found")]
    NotFound { story_id: StoryId },

    #[error("story {story_id} has no downloadable media")]
    NoMedia { story_id: StoryId },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("all download methods failed: {}", .attempts.join("; "))]
    AllMethodsFailed { attempts: Vec<String> },

    #[error("download timed out after {}s", .waited.as_secs())]
    Timeout { waited: Duration },

    #[error("media is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// The optional file host rejected or failed an upload.
#[derive(Clone, Debug, thiserror::Error)]
#[error("upload failed: {0}")]
pub struct UploadError(pub String);

/// Everything a single story request can fail with.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("request cancelled")]
    Cancelled,

    #[error("request exceeded its {}s deadline", .0.as_secs())]
    DeadlineExceeded(Duration),
}

/// Machine-readable failure kind carried by every error envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Connection,
    Resolution,
    UnsupportedPeerKind,
    NotFound,
    NoMedia,
    AllMethodsFailed,
    Timeout,
    TooLarge,
    UploadFailed,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Connection => "connection",
            ErrorKind::Resolution => "resolution",
            ErrorKind::UnsupportedPeerKind => "unsupported_peer_kind",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoMedia => "no_media",
            ErrorKind::AllMethodsFailed => "all_methods_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::UploadFailed => "upload_failed",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::InvalidInput(_) => ErrorKind::InvalidInput,
            FetchError::Connection(_)
            | FetchError::Resolution(ResolutionError::Connection(_))
            | FetchError::Locate(LocateError::Connection(_))
            | FetchError::Acquisition(AcquisitionError::Connection(_)) => ErrorKind::Connection,
            FetchError::Resolution(ResolutionError::UnsupportedPeerKind { .. }) => {
                ErrorKind::UnsupportedPeerKind
            }
            FetchError::Resolution(_) => ErrorKind::Resolution,
            FetchError::Locate(LocateError::NotFound { .. }) => ErrorKind::NotFound,
            FetchError::Locate(LocateError::NoMedia { .. }) => ErrorKind::NoMedia,
            FetchError::Acquisition(AcquisitionError::AllMethodsFailed { .. }) => {
                ErrorKind::AllMethodsFailed
            }
            FetchError::Acquisition(AcquisitionError::Timeout { .. })
            | FetchError::DeadlineExceeded(_) => ErrorKind::Timeout,
            FetchError::Acquisition(AcquisitionError::TooLarge { .. }) => ErrorKind::TooLarge,
            FetchError::Upload(_) => ErrorKind::UploadFailed,
            FetchError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
