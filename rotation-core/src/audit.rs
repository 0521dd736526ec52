//! Append-only audit log
//!
//! Every state transition appends one record per group with a gapless
//! sequence number and a SHA-256 hash chain for tamper detection. The trail
//! is the source of truth for dispute resolution and state reconstruction.

use crate::types::{GroupId, UserId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Audit event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Group created with the creator as sole member
    GroupCreated,
    /// Creator added a member
    MemberAdded,
    /// User joined on their own
    MemberJoined,
    /// Member left (self-removal)
    MemberLeft,
    /// Creator patched group settings
    GroupUpdated,
    /// Creator deleted the group (terminal)
    GroupDeleted,
    /// Member claimed a draw number
    NumberSelected,
    /// Contribution recorded toward the active cycle
    ContributionRecorded,
    /// Pot paid out to a member
    DistributionExecuted,
    /// All members paid; receipt flags reset and cycle advanced
    CycleRolledOver,
}

/// One immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Record ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Group the transition belongs to
    pub group_id: GroupId,

    /// Per-group sequence number, gapless from 0
    pub seq: u64,

    /// Identity that triggered the transition
    pub actor: UserId,

    /// Transition kind
    pub kind: AuditKind,

    /// Recording timestamp
    pub recorded_at: DateTime<Utc>,

    /// Structured transition details
    pub details: serde_json::Value,

    /// Hash of the previous record ([0u8; 32] for seq 0)
    pub prev_hash: [u8; 32],

    /// Hash of this record's contents
    pub hash: [u8; 32],
}

impl AuditRecord {
    /// Build a record chained onto `prev_hash`, computing its hash
    pub fn build(
        group_id: GroupId,
        seq: u64,
        actor: UserId,
        kind: AuditKind,
        details: serde_json::Value,
        prev_hash: [u8; 32],
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            event_id: Uuid::now_v7(),
            group_id,
            seq,
            actor,
            kind,
            recorded_at,
            details,
            prev_hash,
            hash: [0u8; 32],
        };
        record.hash = record.compute_hash();
        record
    }

    /// Compute the record hash over its chained contents
    pub fn compute_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.group_id.as_bytes());
        hasher.update(self.seq.to_be_bytes());
        hasher.update(self.actor.as_str().as_bytes());
        hasher.update(
            serde_json::to_string(&self.kind)
                .expect("audit kind serialization cannot fail")
                .as_bytes(),
        );
        hasher.update(
            self.recorded_at
                .timestamp_nanos_opt()
                .unwrap_or(0)
                .to_be_bytes(),
        );
        hasher.update(self.details.to_string().as_bytes());
        hasher.update(self.prev_hash);
        hasher.finalize().into()
    }
}

/// Verify a group's trail: gapless sequence, intact chain, matching hashes
pub fn verify_chain(records: &[AuditRecord]) -> Result<()> {
    let mut prev_hash = [0u8; 32];

    for (i, record) in records.iter().enumerate() {
        if record.seq != i as u64 {
            return Err(Error::Corrupted(format!(
                "audit sequence gap: expected {}, found {}",
                i, record.seq
            )));
        }
        if record.prev_hash != prev_hash {
            return Err(Error::Corrupted(format!(
                "audit chain broken at seq {}",
                record.seq
            )));
        }
        if record.hash != record.compute_hash() {
            return Err(Error::Corrupted(format!(
                "audit record hash mismatch at seq {}",
                record.seq
            )));
        }
        prev_hash = record.hash;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain(len: u64) -> Vec<AuditRecord> {
        let group_id = GroupId::generate();
        let mut prev_hash = [0u8; 32];
        let mut records = Vec::new();

        for seq in 0..len {
            let record = AuditRecord::build(
                group_id,
                seq,
                UserId::new("user-1"),
                AuditKind::ContributionRecorded,
                json!({ "amount": "100.00", "cycle": 1 }),
                prev_hash,
                Utc::now(),
            );
            prev_hash = record.hash;
            records.push(record);
        }

        records
    }

    #[test]
    fn test_empty_chain_verifies() {
        verify_chain(&[]).unwrap();
    }

    #[test]
    fn test_intact_chain_verifies() {
        verify_chain(&chain(5)).unwrap();
    }

    #[test]
    fn test_tampered_details_detected() {
        let mut records = chain(3);
        records[1].details = json!({ "amount": "999.00", "cycle": 1 });

        let err = verify_chain(&records).unwrap_err();
        assert!(matches!(err, Error::Corrupted(_)));
    }

    #[test]
    fn test_sequence_gap_detected() {
        let mut records = chain(3);
        records.remove(1);

        let err = verify_chain(&records).unwrap_err();
        assert!(matches!(err, Error::Corrupted(_)));
    }

    #[test]
    fn test_reordered_chain_detected() {
        let mut records = chain(3);
        records.swap(0, 1);

        let err = verify_chain(&records).unwrap_err();
        assert!(matches!(err, Error::Corrupted(_)));
    }
}
