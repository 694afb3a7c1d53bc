/// Error handling for the Navigator control plane
use thiserror::Error;

/// Result type for Navigator operations
pub type Result<T> = std::result::Result<T, NavigatorError>;

/// Error types spanning the DNS/LB/certificate control plane
#[derive(Error, Debug)]
pub enum NavigatorError {
    /// Protocol-level error from the ACME server
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Account-related error
    #[error("Account error: {0}")]
    Account(String),

    /// Order creation or processing error
    #[error("Order error: {status}, detail: {detail}")]
    Order { status: String, detail: String },

    /// Challenge verification failed
    #[error("Challenge failed: {challenge_type}, error: {error}")]
    Challenge {
        challenge_type: String,
        error: String,
    },

    /// Certificate-related error
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Cryptographic operation error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Provider gateway error (DNS/LB backend)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Inventory client error
    #[error("Inventory error: {0}")]
    Inventory(String),

    /// HTTP transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Rate limited by server
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<std::time::Duration>),

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// PEM encoding/decoding error
    #[error("PEM error: {0}")]
    Pem(String),
}

impl NavigatorError {
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        NavigatorError::Protocol(msg.into())
    }

    pub fn account<S: Into<String>>(msg: S) -> Self {
        NavigatorError::Account(msg.into())
    }

    pub fn order<S: Into<String>>(status: S, detail: S) -> Self {
        NavigatorError::Order {
            status: status.into(),
            detail: detail.into(),
        }
    }

    pub fn challenge<S: Into<String>>(challenge_type: S, error: S) -> Self {
        NavigatorError::Challenge {
            challenge_type: challenge_type.into(),
            error: error.into(),
        }
    }

    pub fn certificate<S: Into<String>>(msg: S) -> Self {
        NavigatorError::Certificate(msg.into())
    }

    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        NavigatorError::Crypto(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        NavigatorError::Storage(msg.into())
    }

    pub fn provider<S: Into<String>>(msg: S) -> Self {
        NavigatorError::Provider(msg.into())
    }

    pub fn inventory<S: Into<String>>(msg: S) -> Self {
        NavigatorError::Inventory(msg.into())
    }

    pub fn transport<S: Into<String>>(msg: S) -> Self {
        NavigatorError::Transport(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        NavigatorError::InvalidInput(msg.into())
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        NavigatorError::Timeout(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        NavigatorError::NotFound(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        NavigatorError::Configuration(msg.into())
    }

    pub fn pem<S: Into<String>>(msg: S) -> Self {
        NavigatorError::Pem(msg.into())
    }

    /// Whether this failure is worth retrying (used by the renewal worker).
    ///
    /// Classification is a substring match against the rendered message, since
    /// neither the ACME client nor the provider gateway expose a structured
    /// retryable/fatal distinction.
    pub fn is_retryable(&self) -> bool {
        const RETRYABLE_MARKERS: &[&str] = &[
            "timeout",
            "temporar",
            "rate limit",
            "429",
            "connection reset",
            "connection refused",
            "service unavailable",
            "server error",
        ];
        let msg = self.to_string().to_lowercase();
        RETRYABLE_MARKERS.iter().any(|m| msg.contains(m))
    }
}
