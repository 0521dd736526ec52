//! Error types for the rotation engine

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
///
/// Business-rule rejections carry a specific kind so callers can render a
/// precise message; infrastructure faults are distinguished via [`Error::is_fatal`].
/// Only [`Error::Busy`] is retryable.
#[derive(Error, Debug)]
pub enum Error {
    /// Group parameters failed validation
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Caller lacks administrative rights for the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is not a member of the group
    #[error("Not a member of group {0}")]
    NotAMember(String),

    /// User already holds a membership in the group
    #[error("Already a member of group {0}")]
    DuplicateMember(String),

    /// Group is at capacity
    #[error("Group {0} is full")]
    GroupFull(String),

    /// Group does not exist (or has been deleted)
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    /// Member does not exist in the group
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    /// Draw number is outside the group's pool
    #[error("Number {number} is outside the pool 1..={max}")]
    NumberNotInPool {
        /// The requested number
        number: u32,
        /// Pool upper bound (`max_members`)
        max: u32,
    },

    /// Draw number is held by another member
    #[error("Number {0} is already taken by another member")]
    NumberTaken(u32),

    /// Recipient was already paid the pot this cycle
    #[error("Member {0} has already received the pot this cycle")]
    AlreadyReceived(String),

    /// The creator must delete the group rather than leave it
    #[error("The group creator cannot leave; delete the group instead")]
    CreatorCannotLeave,

    /// Contribution targeted a cycle other than the active one
    #[error("Contribution cycle {submitted} does not match current cycle {current}")]
    CycleMismatch {
        /// Cycle the caller submitted
        submitted: u32,
        /// The group's active cycle
        current: u32,
    },

    /// Contribution amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Group lock acquisition timed out; retry with backoff
    #[error("Group {0} is busy, retry with backoff")]
    Busy(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Audit chain or stored state failed an integrity check
    #[error("Integrity check failed: {0}")]
    Corrupted(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Concurrency error (feed closed, task failure)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller may retry the operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Busy(_))
    }

    /// Whether this is an infrastructure fault rather than a business rejection
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Storage(_)
                | Error::Serialization(_)
                | Error::Corrupted(_)
                | Error::Config(_)
                | Error::Concurrency(_)
                | Error::Io(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_busy_is_retryable() {
        assert!(Error::Busy("g".to_string()).is_retryable());
        assert!(!Error::GroupFull("g".to_string()).is_retryable());
        assert!(!Error::Storage("disk".to_string()).is_retryable());
    }

    #[test]
    fn test_fatal_excludes_business_rejections() {
        assert!(Error::Corrupted("chain".to_string()).is_fatal());
        assert!(!Error::CreatorCannotLeave.is_fatal());
        assert!(!Error::NumberTaken(3).is_fatal());
    }
}
