//! Escrow Vault
//!
//! Contract-style contribution backend: each group gets a pool with a fixed
//! target amount and a deadline, per-account balances accumulate until the
//! pool completes, and accounts withdraw their own balance after completion.
//! This is a simpler, non-rotating escrow; the rotation engine consumes it
//! through the [`ContributionLedger`] seam instead of fusing the two.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod vault;

pub use error::{Error, Result};
pub use vault::{EscrowVault, PoolInfo, PoolStatus};
