//! Error types for Newscast

use thiserror::Error;

use crate::quota::QuotaKind;

pub type Result<T> = std::result::Result<T, NewscastError>;

#[derive(Error, Debug)]
pub enum NewscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl NewscastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            NewscastError::Config(_) => 2,
            NewscastError::Classifier(ClassifierError::RateLimitExhausted { .. }) => 3,
            NewscastError::InvalidInput(_) => 2,
            _ => 1,
        }
    }

    /// Whether the daemon must stop instead of waiting for the next cycle
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NewscastError::Config(_)
                | NewscastError::Classifier(ClassifierError::RateLimitExhausted { .. })
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger IO failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone)]
pub enum FeedError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to parse {url}: {reason}")]
    Parse { url: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("Rate limited by text generation service: {0}")]
    RateLimited(String),

    #[error("Request to text generation service failed: {0}")]
    Transport(String),

    #[error("Unusable response from text generation service: {0}")]
    Response(String),

    #[error("Local {0} quota reached")]
    QuotaBlocked(QuotaKind),

    #[error("Still rate limited after {attempts} attempts ({rate_limited} rate-limit responses)")]
    RateLimitExhausted { attempts: u32, rate_limited: u32 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}
