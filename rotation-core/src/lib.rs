//! SusuRail Rotation Core
//!
//! Group savings ledger and rotation engine for rotating savings (susu)
//! groups: members pool fixed periodic contributions into a shared pot that
//! is paid out in full to one member per cycle until everyone has received
//! it once, after which the cycle resets.
//!
//! # Architecture
//!
//! - **Per-group serialization**: the group is the unit of exclusive-access
//!   locking; operations across groups run in parallel
//! - **Atomic commits**: every mutation lands in one storage write, so
//!   readers never observe a partially-applied mutation
//! - **Append-only audit**: every state transition is recorded in a
//!   hash-chained trail for reconstruction and dispute resolution
//! - **Pluggable contribution ledger**: escrow backends substitute through
//!   the [`ContributionLedger`] trait
//!
//! # Invariants
//!
//! - `member_count == |members| <= max_members` after every operation
//! - Claimed draw numbers are unique per group and drawn from `1..=max_members`
//! - At most one completed distribution per (group, cycle, recipient)
//! - Cycle rollover (flag reset + cycle increment + schedule advance) is
//!   atomic with the payout or removal that completed the cycle

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod metrics;
pub mod pool;
pub mod rotation;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use engine::RotationEngine;
pub use error::{Error, Result};
pub use ledger::{ContributionLedger, StorageLedger};
pub use types::{
    ContributionRecord, Currency, CycleType, Distribution, DistributionStatus, Group, GroupId,
    GroupInfo, GroupMember, GroupParams, GroupStatus, GroupUpdate, MemberId, UserId,
};
