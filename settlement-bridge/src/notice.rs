//! Settlement notice envelope

use chrono::{DateTime, Utc};
use rotation_core::Distribution;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notice envelope handed to the settlement collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementNotice {
    /// Notice ID (UUIDv7 for ordering)
    pub id: Uuid,

    /// The completed distribution to settle
    pub distribution: Distribution,

    /// Issue timestamp
    pub issued_at: DateTime<Utc>,

    /// Correlation ID (for tracing)
    pub correlation_id: Option<String>,
}

impl SettlementNotice {
    /// Wrap a completed distribution
    pub fn new(distribution: Distribution) -> Self {
        Self {
            id: Uuid::now_v7(),
            distribution,
            issued_at: Utc::now(),
            correlation_id: None,
        }
    }

    /// Set correlation ID
    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}
