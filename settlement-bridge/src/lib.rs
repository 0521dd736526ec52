//! Settlement Bridge
//!
//! The engine's output boundary toward money movement: consumes the
//! completed-distribution feed and delivers settlement notices to a
//! pluggable sink (payment processor adapter, on-chain escrow relay) with
//! bounded retry. The engine records payouts; this bridge is how a
//! settlement collaborator learns it must move real funds.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bridge;
pub mod error;
pub mod metrics;
pub mod notice;

pub use bridge::{BridgeConfig, MemorySink, SettlementBridge, SettlementSink};
pub use error::{Error, Result};
pub use notice::SettlementNotice;
