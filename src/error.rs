//! Error types for the clustering tool

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the clustering tool
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Missing Etherscan API key (set ETHERSCAN_API_KEY or etherscan.api_key)")]
    MissingApiKey,

    // Explorer API errors
    #[error("Explorer API error: {0}")]
    Api(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    // Input validation errors
    #[error("Invalid Ethereum address: {0}")]
    InvalidAddress(String),

    // Reference data errors
    #[error("Exchange list error: {0}")]
    ExchangeList(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Api(_) | Error::Http(_) | Error::Timeout(_) | Error::Serialization(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
