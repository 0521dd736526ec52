//! Error types for the settlement bridge

use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Bridge errors
#[derive(Debug, Error)]
pub enum Error {
    /// Sink rejected the notice after all retry attempts
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The engine's distribution feed closed
    #[error("Distribution feed closed")]
    FeedClosed,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}
