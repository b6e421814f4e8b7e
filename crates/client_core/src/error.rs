use shared::error::ApiError;
use thiserror::Error;

/// Rejections raised before any network call is made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("at least one source url is required")]
    NoSources,
    #[error("a classification label is required")]
    MissingClassification,
    #[error("clip times must be finite numbers")]
    NonFiniteTime,
    #[error("clip start {start} must not be negative")]
    NegativeStart { start: f64 },
    #[error("clip start {start} must be before clip end {end}")]
    CrossedRange { start: f64, end: f64 },
    #[error("clip end {end} exceeds artifact duration {duration}")]
    BeyondDuration { end: f64, duration: f64 },
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend rejected request: {0}")]
    Backend(#[from] ApiError),
    #[error("malformed backend payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("event stream failure: {0}")]
    Stream(String),
    #[error("duplicate check failed: {0}")]
    DuplicateCheck(Box<ClientError>),
    #[error("invalid server url '{0}': expected http:// or https://")]
    InvalidServerUrl(String),
}

impl ClientError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
