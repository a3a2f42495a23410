use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoursewareError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Offline and nothing cached for the requested resource.
    #[error("No cached data available offline")]
    NoCachedData,

    #[error("Invalid username or password")]
    InvalidGrant,

    #[error("User account is not active")]
    UserNotActive,

    #[error("{0}")]
    Validation(String),

    #[error("Not authorized (HTTP {0})")]
    Unauthorized(StatusCode),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Course not found: {0}")]
    CourseNotFound(String),

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Download not found: {0}")]
    DownloadNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Unknown(String),
}

impl CoursewareError {
    /// True when the failure is a connectivity problem rather than a server answer.
    pub fn is_internet_error(&self) -> bool {
        match self {
            CoursewareError::Http(e) => e.is_connect() || e.is_timeout(),
            CoursewareError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoursewareError>;
