//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `groups` - Group records with embedded members (key: group_id)
//! - `contributions` - Append-only contribution log (key: group || cycle || member || record_id)
//! - `distributions` - Payouts (key: group || cycle || recipient)
//! - `audit` - Hash-chained audit trail (key: group || seq)
//! - `indices` - Audit heads and user-to-group index
//!
//! Group mutations commit through a single `WriteBatch` so readers never
//! observe a partially-applied mutation.

use crate::{
    audit::AuditRecord,
    error::{Error, Result},
    types::{ContributionRecord, Distribution, Group, GroupId, MemberId, UserId},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Column family names
const CF_GROUPS: &str = "groups";
const CF_CONTRIBUTIONS: &str = "contributions";
const CF_DISTRIBUTIONS: &str = "distributions";
const CF_AUDIT: &str = "audit";
const CF_INDICES: &str = "indices";

/// Index key prefixes
const IDX_AUDIT_HEAD: &[u8] = b"ah";
const IDX_USER_GROUP: &[u8] = b"ug";

/// Audit chain head, stored per group for O(1) appends
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuditHead {
    next_seq: u64,
    head_hash: [u8; 32],
}

impl Default for AuditHead {
    fn default() -> Self {
        Self {
            next_seq: 0,
            head_hash: [0u8; 32],
        }
    }
}

/// Index maintenance requested alongside a group commit
#[derive(Debug, Clone, Copy)]
pub enum UserIndexOp<'a> {
    /// Add a user→group mapping (join/add/create)
    Add(&'a UserId),
    /// Remove a user→group mapping (leave)
    Remove(&'a UserId),
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy contribution/audit load
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_GROUPS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_CONTRIBUTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_DISTRIBUTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_AUDIT, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // Group state is frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Group operations

    /// Get group by ID
    ///
    /// Deleted (tombstoned) groups answer `GroupNotFound`, matching the
    /// "deleted" semantics of the public API.
    pub fn get_group(&self, group_id: GroupId) -> Result<Group> {
        let cf = self.cf_handle(CF_GROUPS)?;

        let value = self
            .db
            .get_cf(cf, group_id.as_bytes())?
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;

        let group: Group = bincode::deserialize(&value)?;
        if group.deleted_at.is_some() {
            return Err(Error::GroupNotFound(group_id.to_string()));
        }
        Ok(group)
    }

    /// Commit a group mutation atomically
    ///
    /// Writes the group, its new audit records (and chain head), an optional
    /// distribution, and any user-index maintenance in one `WriteBatch`.
    pub fn commit_group(
        &self,
        group: &Group,
        audit: &[AuditRecord],
        distribution: Option<&Distribution>,
        index_ops: &[UserIndexOp<'_>],
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_groups = self.cf_handle(CF_GROUPS)?;
        batch.put_cf(cf_groups, group.id.as_bytes(), bincode::serialize(group)?);

        self.stage_audit(&mut batch, group.id, audit)?;

        if let Some(dist) = distribution {
            let cf_dist = self.cf_handle(CF_DISTRIBUTIONS)?;
            let key = Self::distribution_key(dist.group_id, dist.cycle, dist.recipient);
            batch.put_cf(cf_dist, &key, bincode::serialize(dist)?);
        }

        if !index_ops.is_empty() {
            let cf_indices = self.cf_handle(CF_INDICES)?;
            for op in index_ops {
                match op {
                    UserIndexOp::Add(user) => {
                        batch.put_cf(cf_indices, Self::user_group_key(user, group.id), []);
                    }
                    UserIndexOp::Remove(user) => {
                        batch.delete_cf(cf_indices, Self::user_group_key(user, group.id));
                    }
                }
            }
        }

        self.db.write(batch)?;

        tracing::debug!(
            group_id = %group.id,
            audit_records = audit.len(),
            "Group mutation committed"
        );

        Ok(())
    }

    // Contribution operations

    /// Append a contribution record (single atomic put)
    pub fn put_contribution(&self, record: &ContributionRecord) -> Result<()> {
        let cf = self.cf_handle(CF_CONTRIBUTIONS)?;
        let key = Self::contribution_key(
            record.group_id,
            record.cycle,
            record.member_id,
            record.record_id,
        );
        self.db.put_cf(cf, &key, bincode::serialize(record)?)?;

        tracing::debug!(
            group_id = %record.group_id,
            member_id = %record.member_id,
            cycle = record.cycle,
            amount = %record.amount,
            "Contribution appended"
        );

        Ok(())
    }

    /// Sum of a member's contributions in a cycle
    pub fn member_total(&self, group_id: GroupId, member_id: MemberId, cycle: u32) -> Result<Decimal> {
        let mut prefix = Vec::with_capacity(36);
        prefix.extend_from_slice(group_id.as_bytes());
        prefix.extend_from_slice(&cycle.to_be_bytes());
        prefix.extend_from_slice(member_id.as_bytes());

        let mut total = Decimal::ZERO;
        for record in self.scan_contributions(&prefix)? {
            total += record.amount;
        }
        Ok(total)
    }

    /// Sum of all contributions toward a cycle
    pub fn cycle_total(&self, group_id: GroupId, cycle: u32) -> Result<Decimal> {
        let mut prefix = Vec::with_capacity(20);
        prefix.extend_from_slice(group_id.as_bytes());
        prefix.extend_from_slice(&cycle.to_be_bytes());

        let mut total = Decimal::ZERO;
        for record in self.scan_contributions(&prefix)? {
            total += record.amount;
        }
        Ok(total)
    }

    /// All contribution records for a cycle, in key order
    pub fn contributions(&self, group_id: GroupId, cycle: u32) -> Result<Vec<ContributionRecord>> {
        let mut prefix = Vec::with_capacity(20);
        prefix.extend_from_slice(group_id.as_bytes());
        prefix.extend_from_slice(&cycle.to_be_bytes());

        self.scan_contributions(&prefix)
    }

    fn scan_contributions(&self, prefix: &[u8]) -> Result<Vec<ContributionRecord>> {
        let cf = self.cf_handle(CF_CONTRIBUTIONS)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut records = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    // Distribution operations

    /// Get the completed distribution for (group, cycle, recipient), if any
    pub fn get_distribution(
        &self,
        group_id: GroupId,
        cycle: u32,
        recipient: MemberId,
    ) -> Result<Option<Distribution>> {
        let cf = self.cf_handle(CF_DISTRIBUTIONS)?;
        let key = Self::distribution_key(group_id, cycle, recipient);

        match self.db.get_cf(cf, &key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// All distributions for a group, in (cycle, recipient) order
    pub fn distributions(&self, group_id: GroupId) -> Result<Vec<Distribution>> {
        let cf = self.cf_handle(CF_DISTRIBUTIONS)?;
        let prefix: &[u8] = group_id.as_bytes();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut distributions = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            distributions.push(bincode::deserialize(&value)?);
        }
        Ok(distributions)
    }

    // Audit operations

    /// Current chain head: (next sequence number, hash of the last record)
    pub fn audit_head(&self, group_id: GroupId) -> Result<(u64, [u8; 32])> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::audit_head_key(group_id);

        let head = match self.db.get_cf(cf, &key)? {
            Some(value) => bincode::deserialize::<AuditHead>(&value)?,
            None => AuditHead::default(),
        };
        Ok((head.next_seq, head.head_hash))
    }

    /// Append audit records (and advance the chain head) atomically
    pub fn append_audit(&self, group_id: GroupId, records: &[AuditRecord]) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_audit(&mut batch, group_id, records)?;
        self.db.write(batch)?;
        Ok(())
    }

    fn stage_audit(
        &self,
        batch: &mut WriteBatch,
        group_id: GroupId,
        records: &[AuditRecord],
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let cf_audit = self.cf_handle(CF_AUDIT)?;
        for record in records {
            let key = Self::audit_key(group_id, record.seq);
            batch.put_cf(cf_audit, &key, bincode::serialize(record)?);
        }

        let last = records.last().expect("records is non-empty");
        let head = AuditHead {
            next_seq: last.seq + 1,
            head_hash: last.hash,
        };
        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::audit_head_key(group_id),
            bincode::serialize(&head)?,
        );

        Ok(())
    }

    /// Full audit trail for a group, in sequence order
    pub fn audit_trail(&self, group_id: GroupId) -> Result<Vec<AuditRecord>> {
        let cf = self.cf_handle(CF_AUDIT)?;
        let prefix: &[u8] = group_id.as_bytes();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut records = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    // User index

    /// Group IDs the user belongs to (via index)
    pub fn groups_for_user(&self, user: &UserId) -> Result<Vec<GroupId>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let mut prefix = IDX_USER_GROUP.to_vec();
        prefix.extend_from_slice(user.as_str().as_bytes());
        prefix.push(b'|');

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut groups = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id_bytes: [u8; 16] = key[prefix.len()..]
                .try_into()
                .map_err(|_| Error::Corrupted("malformed user-group index key".to_string()))?;
            groups.push(GroupId::from_uuid(uuid::Uuid::from_bytes(id_bytes)));
        }
        Ok(groups)
    }

    // Key helpers

    fn contribution_key(
        group_id: GroupId,
        cycle: u32,
        member_id: MemberId,
        record_id: uuid::Uuid,
    ) -> Vec<u8> {
        let mut key = Vec::with_capacity(52);
        key.extend_from_slice(group_id.as_bytes());
        key.extend_from_slice(&cycle.to_be_bytes());
        key.extend_from_slice(member_id.as_bytes());
        key.extend_from_slice(record_id.as_bytes());
        key
    }

    fn distribution_key(group_id: GroupId, cycle: u32, recipient: MemberId) -> Vec<u8> {
        let mut key = Vec::with_capacity(36);
        key.extend_from_slice(group_id.as_bytes());
        key.extend_from_slice(&cycle.to_be_bytes());
        key.extend_from_slice(recipient.as_bytes());
        key
    }

    fn audit_key(group_id: GroupId, seq: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(group_id.as_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn audit_head_key(group_id: GroupId) -> Vec<u8> {
        let mut key = IDX_AUDIT_HEAD.to_vec();
        key.extend_from_slice(group_id.as_bytes());
        key
    }

    fn user_group_key(user: &UserId, group_id: GroupId) -> Vec<u8> {
        let mut key = IDX_USER_GROUP.to_vec();
        key.extend_from_slice(user.as_str().as_bytes());
        key.push(b'|');
        key.extend_from_slice(group_id.as_bytes());
        key
    }
}
