//! Contribution ledger
//!
//! The ledger is the seam between the rotation engine and whatever actually
//! holds the money view: the default backend records into the engine's own
//! storage, while an escrow backend (fixed target, per-account balances,
//! withdraw-after-completion) can substitute through the same trait.

use crate::storage::Storage;
use crate::types::{ContributionRecord, GroupId, MemberId};
use crate::Result;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Capability the engine depends on for contribution accounting
pub trait ContributionLedger: Send + Sync {
    /// Append one contribution record
    fn append(&self, record: &ContributionRecord) -> Result<()>;

    /// Sum of a member's contributions in a cycle
    fn member_total(&self, group_id: GroupId, member_id: MemberId, cycle: u32) -> Result<Decimal>;

    /// Sum of all contributions toward a cycle
    fn cycle_total(&self, group_id: GroupId, cycle: u32) -> Result<Decimal>;

    /// All records for a cycle
    fn records(&self, group_id: GroupId, cycle: u32) -> Result<Vec<ContributionRecord>>;
}

/// Default ledger backed by the engine's RocksDB storage
pub struct StorageLedger {
    storage: Arc<Storage>,
}

impl StorageLedger {
    /// Create a ledger over the given storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl ContributionLedger for StorageLedger {
    fn append(&self, record: &ContributionRecord) -> Result<()> {
        self.storage.put_contribution(record)
    }

    fn member_total(&self, group_id: GroupId, member_id: MemberId, cycle: u32) -> Result<Decimal> {
        self.storage.member_total(group_id, member_id, cycle)
    }

    fn cycle_total(&self, group_id: GroupId, cycle: u32) -> Result<Decimal> {
        self.storage.cycle_total(group_id, cycle)
    }

    fn records(&self, group_id: GroupId, cycle: u32) -> Result<Vec<ContributionRecord>> {
        self.storage.contributions(group_id, cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_ledger() -> (StorageLedger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        (StorageLedger::new(storage), temp_dir)
    }

    #[test]
    fn test_append_and_total() {
        let (ledger, _temp) = test_ledger();
        let group_id = GroupId::generate();
        let member_id = MemberId::generate();

        for cents in [2500, 7500] {
            ledger
                .append(&ContributionRecord {
                    record_id: Uuid::now_v7(),
                    group_id,
                    member_id,
                    cycle: 1,
                    amount: Decimal::new(cents, 2),
                    recorded_at: Utc::now(),
                })
                .unwrap();
        }

        assert_eq!(
            ledger.member_total(group_id, member_id, 1).unwrap(),
            Decimal::new(10000, 2)
        );
        assert_eq!(
            ledger.cycle_total(group_id, 1).unwrap(),
            Decimal::new(10000, 2)
        );
        assert_eq!(ledger.records(group_id, 1).unwrap().len(), 2);
        assert_eq!(ledger.records(group_id, 2).unwrap().len(), 0);
    }
}
