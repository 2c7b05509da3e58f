// Error types for the change feed

use thiserror::Error;

/// Result type alias for change-feed operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors that can occur while operating a change feed
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport-level failure (network, HTTP status, or malformed response body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Inbound ping body is missing required fields
    #[error("Malformed ping body")]
    MalformedPing,

    /// Source-options JSON supplied at creation could not be parsed
    #[error("Invalid filter configuration: {0}")]
    InvalidFilterConfig(String),

    /// Payload log retrieval failed; the cursor is left unchanged
    #[error("Payload fetch error: {0}")]
    Fetch(String),

    /// The service rejected the subscription specification
    #[error("Subscription creation error: {0}")]
    Creation(String),

    /// Durable subscription store error
    #[error("Subscription store error: {0}")]
    Store(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl FeedError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        FeedError::Transport(msg.into())
    }

    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        FeedError::Fetch(msg.into())
    }

    /// Create a creation error
    pub fn creation(msg: impl Into<String>) -> Self {
        FeedError::Creation(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        FeedError::Store(msg.into())
    }

    /// Create an invalid-filter-configuration error
    pub fn filter_config(msg: impl Into<String>) -> Self {
        FeedError::InvalidFilterConfig(msg.into())
    }
}
