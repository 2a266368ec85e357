use thiserror::Error;

/// Unified error type for img-upgr operations
#[derive(Error, Debug)]
pub enum ImgUpgrError {
    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No tag found in image: {0}")]
    NoTagFound(String),

    #[error("Tag not version-like: {0}")]
    NotVersionLike(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected status code {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("GitLab API error (status {status}): {}", describe_body(.body))]
    Api {
        status: u16,
        body: Option<serde_json::Value>,
    },

    #[error("No changes to commit")]
    NothingToCommit,

    #[error("{operation} failed: {message}")]
    Vcs { operation: String, message: String },

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_body(body: &Option<serde_json::Value>) -> String {
    match body {
        Some(value) => value.to_string(),
        None => "failed to decode error response".to_string(),
    }
}

/// Convenience type alias for Results in img-upgr
pub type Result<T> = std::result::Result<T, ImgUpgrError>;

impl ImgUpgrError {
    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        ImgUpgrError::Config(msg.into())
    }

    /// Create a decode error with context
    pub fn decode(msg: impl Into<String>) -> Self {
        ImgUpgrError::Decode(msg.into())
    }

    /// Create a manifest error with context
    pub fn manifest(msg: impl Into<String>) -> Self {
        ImgUpgrError::Manifest(msg.into())
    }

    /// Create a version-control error naming the failed operation
    pub fn vcs(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ImgUpgrError::Vcs {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Errors that only mean "this image cannot be tracked", never a real failure
    pub fn is_skip_worthy(&self) -> bool {
        matches!(
            self,
            ImgUpgrError::NoTagFound(_) | ImgUpgrError::NotVersionLike(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ImgUpgrError::Cancelled)
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ImgUpgrError::Http { status, .. } | ImgUpgrError::Api { status, .. } => Some(*status),
            ImgUpgrError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ImgUpgrError {
    fn from(err: serde_json::Error) -> Self {
        ImgUpgrError::Decode(err.to_string())
    }
}
