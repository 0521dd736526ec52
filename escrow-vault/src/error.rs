//! Error types for the escrow vault

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for vault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Vault errors
#[derive(Debug, Error)]
pub enum Error {
    /// No pool provisioned for the group
    #[error("No escrow pool for group {0}")]
    PoolNotFound(String),

    /// A pool already exists for the group
    #[error("Escrow pool already exists for group {0}")]
    PoolExists(String),

    /// Target amount must be positive
    #[error("Invalid target amount: {0}")]
    InvalidTarget(Decimal),

    /// Contribution amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Pool no longer accepts contributions
    #[error("Escrow pool for group {0} is closed")]
    PoolClosed(String),

    /// Withdrawal requires completion or an expired deadline
    #[error("Escrow pool for group {0} is still open")]
    PoolStillOpen(String),

    /// The account holds no balance to withdraw
    #[error("Nothing to withdraw for account {0}")]
    NothingToWithdraw(String),
}
