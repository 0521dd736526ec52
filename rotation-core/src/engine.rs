//! Main engine orchestration layer
//!
//! Ties together storage, locking, the contribution ledger, and the rotation
//! state machine into the request/response API consumed by the presentation
//! layer.
//!
//! Every mutation follows the same shape: validate → acquire the group's
//! exclusive lock → read the group → mutate a private copy → commit through
//! one atomic write. There is no await between the reads and the commit, so
//! an abandoned request leaves no partial state.
//!
//! # Example
//!
//! ```no_run
//! use rotation_core::{Config, RotationEngine};
//!
//! #[tokio::main]
//! async fn main() -> rotation_core::Result<()> {
//!     let config = Config::default();
//!     let engine = RotationEngine::open(config)?;
//!
//!     // let group = engine.create_group(&creator, params).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    audit::{self, AuditKind, AuditRecord},
    ledger::{ContributionLedger, StorageLedger},
    lock::LockTable,
    metrics::Metrics,
    pool::{self, SelectionOutcome},
    rotation,
    storage::{Storage, UserIndexOp},
    types::{
        ContributionRecord, Distribution, Group, GroupId, GroupInfo, GroupMember, GroupParams,
        GroupStatus, GroupUpdate, MemberId, UserId,
    },
    Config, Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::time::Duration;
use uuid::Uuid;

/// The group savings ledger and rotation engine
pub struct RotationEngine {
    /// Storage backend
    storage: Arc<Storage>,

    /// Contribution accounting backend
    ledger: Arc<dyn ContributionLedger>,

    /// Per-group exclusive locks
    locks: LockTable,

    /// Metrics collector
    metrics: Metrics,

    /// Completed-distribution feed toward the settlement collaborator
    feed: broadcast::Sender<Distribution>,
}

impl RotationEngine {
    /// Open the engine with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let ledger = Arc::new(StorageLedger::new(storage.clone()));
        let locks = LockTable::new(Duration::from_millis(config.lock.acquire_timeout_ms));
        let metrics = Metrics::new().map_err(|e| Error::Config(e.to_string()))?;
        let (feed, _) = broadcast::channel(config.feed.capacity);

        Ok(Self {
            storage,
            ledger,
            locks,
            metrics,
            feed,
        })
    }

    /// Substitute the contribution accounting backend
    pub fn with_ledger(mut self, ledger: Arc<dyn ContributionLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Metrics collector for this engine
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Subscribe to completed distributions
    ///
    /// Every completed payout is published exactly once; this is the
    /// engine's only output boundary toward money movement.
    pub fn distribution_feed(&self) -> broadcast::Receiver<Distribution> {
        self.feed.subscribe()
    }

    // Membership store

    /// Create a group with the creator as sole member
    pub async fn create_group(&self, creator: &UserId, params: GroupParams) -> Result<Group> {
        let started = Instant::now();

        if params.name.trim().is_empty() {
            return Err(Error::InvalidParams("name must not be empty".to_string()));
        }
        if params.max_members < 2 {
            return Err(Error::InvalidParams(
                "a group needs a capacity of at least 2".to_string(),
            ));
        }
        if params.contribution_amount <= Decimal::ZERO {
            return Err(Error::InvalidParams(
                "contribution amount must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        let group = Group {
            id: GroupId::generate(),
            name: params.name,
            description: params.description,
            creator: creator.clone(),
            created_at: now,
            max_members: params.max_members,
            contribution_amount: params.contribution_amount,
            currency: params.currency,
            cycle_type: params.cycle_type,
            next_distribution_date: params
                .first_distribution_date
                .unwrap_or(now + params.cycle_type.interval()),
            status: GroupStatus::Active,
            current_cycle: 1,
            members: vec![GroupMember::new(creator.clone(), now)],
            deleted_at: None,
        };

        let record = AuditRecord::build(
            group.id,
            0,
            creator.clone(),
            AuditKind::GroupCreated,
            json!({
                "name": group.name,
                "max_members": group.max_members,
                "contribution_amount": group.contribution_amount.to_string(),
                "currency": group.currency.code(),
                "cycle_type": group.cycle_type.code(),
            }),
            [0u8; 32],
            now,
        );

        self.storage
            .commit_group(&group, &[record], None, &[UserIndexOp::Add(creator)])?;
        self.metrics.record_group_created();
        self.observe(started);

        tracing::info!(
            group_id = %group.id,
            creator = %creator,
            max_members = group.max_members,
            "Group created"
        );

        Ok(group)
    }

    /// Add a member (creator-only)
    pub async fn add_member(
        &self,
        group_id: GroupId,
        actor: &UserId,
        user: UserId,
    ) -> Result<GroupMember> {
        let started = Instant::now();
        let _guard = self.lock_group(group_id).await?;
        let mut group = self.storage.get_group(group_id)?;

        if group.creator != *actor {
            return Err(Error::Unauthorized(
                "only the group creator can add members".to_string(),
            ));
        }
        if group.is_full() {
            return Err(Error::GroupFull(group_id.to_string()));
        }
        if group.is_member(&user) {
            return Err(Error::DuplicateMember(group_id.to_string()));
        }

        let now = Utc::now();
        let member = GroupMember::new(user.clone(), now);
        group.members.push(member.clone());

        let record = self.next_audit(
            group_id,
            actor.clone(),
            AuditKind::MemberAdded,
            json!({ "member_id": member.id.to_string(), "user": user.as_str() }),
        )?;
        self.storage
            .commit_group(&group, &[record], None, &[UserIndexOp::Add(&user)])?;
        self.observe(started);

        tracing::info!(group_id = %group_id, user = %user, "Member added");

        Ok(member)
    }

    /// Join a group as the caller (self-join)
    pub async fn join_group(&self, group_id: GroupId, actor: &UserId) -> Result<GroupMember> {
        let started = Instant::now();
        let _guard = self.lock_group(group_id).await?;
        let mut group = self.storage.get_group(group_id)?;

        if group.is_full() {
            return Err(Error::GroupFull(group_id.to_string()));
        }
        if group.is_member(actor) {
            return Err(Error::DuplicateMember(group_id.to_string()));
        }

        let now = Utc::now();
        let member = GroupMember::new(actor.clone(), now);
        group.members.push(member.clone());

        let record = self.next_audit(
            group_id,
            actor.clone(),
            AuditKind::MemberJoined,
            json!({ "member_id": member.id.to_string() }),
        )?;
        self.storage
            .commit_group(&group, &[record], None, &[UserIndexOp::Add(actor)])?;
        self.observe(started);

        tracing::info!(group_id = %group_id, user = %actor, "Member joined");

        Ok(member)
    }

    /// Leave a group (self-removal)
    ///
    /// Frees the member's draw number back to availability. Completed
    /// distributions are unaffected. If the removal leaves every remaining
    /// member paid, the cycle rolls over in the same commit.
    pub async fn remove_member(&self, group_id: GroupId, actor: &UserId) -> Result<()> {
        let started = Instant::now();
        let _guard = self.lock_group(group_id).await?;
        let mut group = self.storage.get_group(group_id)?;

        if group.creator == *actor {
            return Err(Error::CreatorCannotLeave);
        }
        let member = group
            .member_by_user(actor)
            .ok_or_else(|| Error::NotAMember(group_id.to_string()))?;
        let member_id = member.id;
        let freed_number = member.selected_number;

        group.members.retain(|m| m.id != member_id);

        let now = Utc::now();
        let rollover = rotation::roll_over_if_complete(&mut group, now);

        let mut records = vec![self.next_audit(
            group_id,
            actor.clone(),
            AuditKind::MemberLeft,
            json!({ "member_id": member_id.to_string(), "freed_number": freed_number }),
        )?];
        if let Some(roll) = &rollover {
            records.push(self.chain_audit(
                &records[0],
                actor.clone(),
                AuditKind::CycleRolledOver,
                json!({
                    "completed_cycle": roll.completed_cycle,
                    "next_cycle": roll.next_cycle,
                    "next_distribution_date": roll.next_distribution_date.to_rfc3339(),
                }),
            ));
        }

        self.storage
            .commit_group(&group, &records, None, &[UserIndexOp::Remove(actor)])?;
        if rollover.is_some() {
            self.metrics.record_rollover();
        }
        self.observe(started);

        tracing::info!(group_id = %group_id, user = %actor, "Member left");

        Ok(())
    }

    /// Patch group settings (creator-only)
    pub async fn update_group(
        &self,
        group_id: GroupId,
        actor: &UserId,
        update: GroupUpdate,
    ) -> Result<Group> {
        let started = Instant::now();
        let _guard = self.lock_group(group_id).await?;
        let mut group = self.storage.get_group(group_id)?;

        if group.creator != *actor {
            return Err(Error::Unauthorized(
                "only the group creator can update group settings".to_string(),
            ));
        }

        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(Error::InvalidParams("name must not be empty".to_string()));
            }
        }
        if let Some(amount) = update.contribution_amount {
            if amount <= Decimal::ZERO {
                return Err(Error::InvalidParams(
                    "contribution amount must be positive".to_string(),
                ));
            }
        }
        if update.status == Some(GroupStatus::Completed) {
            return Err(Error::InvalidParams(
                "status cannot be set to completed; delete the group instead".to_string(),
            ));
        }

        let mut changed: Vec<&str> = Vec::new();
        if let Some(name) = update.name {
            group.name = name;
            changed.push("name");
        }
        if let Some(description) = update.description {
            group.description = Some(description);
            changed.push("description");
        }
        if let Some(status) = update.status {
            group.status = status;
            changed.push("status");
        }
        if let Some(amount) = update.contribution_amount {
            group.contribution_amount = amount;
            changed.push("contribution_amount");
        }
        if let Some(cycle_type) = update.cycle_type {
            group.cycle_type = cycle_type;
            changed.push("cycle_type");
        }
        if let Some(date) = update.next_distribution_date {
            group.next_distribution_date = date;
            changed.push("next_distribution_date");
        }

        let record = self.next_audit(
            group_id,
            actor.clone(),
            AuditKind::GroupUpdated,
            json!({ "changed": changed }),
        )?;
        self.storage.commit_group(&group, &[record], None, &[])?;
        self.observe(started);

        tracing::info!(group_id = %group_id, fields = ?changed, "Group updated");

        Ok(group)
    }

    /// Delete a group (creator-only, terminal)
    ///
    /// The group is marked completed and tombstoned; every later operation
    /// on the id answers `GroupNotFound`. The audit trail stays readable
    /// for dispute resolution.
    pub async fn delete_group(&self, group_id: GroupId, actor: &UserId) -> Result<()> {
        let started = Instant::now();
        let _guard = self.lock_group(group_id).await?;
        let mut group = self.storage.get_group(group_id)?;

        if group.creator != *actor {
            return Err(Error::Unauthorized(
                "only the group creator can delete the group".to_string(),
            ));
        }

        let now = Utc::now();
        group.status = GroupStatus::Completed;
        group.deleted_at = Some(now);

        let record = self.next_audit(
            group_id,
            actor.clone(),
            AuditKind::GroupDeleted,
            json!({ "member_count": group.member_count() }),
        )?;

        let users: Vec<UserId> = group.members.iter().map(|m| m.user.clone()).collect();
        let index_ops: Vec<UserIndexOp<'_>> =
            users.iter().map(UserIndexOp::Remove).collect();

        self.storage
            .commit_group(&group, &[record], None, &index_ops)?;
        self.observe(started);

        tracing::info!(group_id = %group_id, "Group deleted");

        Ok(())
    }

    // Number pool allocator

    /// Claim a draw number from the group's pool
    ///
    /// Idempotent when the caller already holds the exact number.
    pub async fn select_number(
        &self,
        group_id: GroupId,
        actor: &UserId,
        number: u32,
    ) -> Result<()> {
        let started = Instant::now();
        let _guard = self.lock_group(group_id).await?;
        let mut group = self.storage.get_group(group_id)?;

        let member_id = group
            .member_by_user(actor)
            .ok_or_else(|| Error::NotAMember(group_id.to_string()))?
            .id;

        match pool::select(&mut group, member_id, number)? {
            SelectionOutcome::NoOp => return Ok(()),
            SelectionOutcome::Applied => {}
        }

        let record = self.next_audit(
            group_id,
            actor.clone(),
            AuditKind::NumberSelected,
            json!({ "member_id": member_id.to_string(), "number": number }),
        )?;
        self.storage.commit_group(&group, &[record], None, &[])?;
        self.observe(started);

        tracing::info!(group_id = %group_id, user = %actor, number, "Number selected");

        Ok(())
    }

    /// Draw numbers still unclaimed
    pub fn available_numbers(&self, group_id: GroupId) -> Result<Vec<u32>> {
        let group = self.storage.get_group(group_id)?;
        Ok(pool::available_numbers(&group))
    }

    // Contribution ledger

    /// Record a contribution toward the active cycle
    ///
    /// Called by the settlement collaborator after funds are confirmed
    /// received. Does not trigger distribution.
    pub async fn record_contribution(
        &self,
        group_id: GroupId,
        actor: &UserId,
        amount: Decimal,
        cycle: u32,
    ) -> Result<ContributionRecord> {
        let started = Instant::now();
        let _guard = self.lock_group(group_id).await?;
        let group = self.storage.get_group(group_id)?;

        let member_id = group
            .member_by_user(actor)
            .ok_or_else(|| Error::NotAMember(group_id.to_string()))?
            .id;
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(amount));
        }
        if cycle != group.current_cycle {
            return Err(Error::CycleMismatch {
                submitted: cycle,
                current: group.current_cycle,
            });
        }

        let record = ContributionRecord {
            record_id: Uuid::now_v7(),
            group_id,
            member_id,
            cycle,
            amount,
            recorded_at: Utc::now(),
        };

        self.ledger.append(&record)?;

        let audit_record = self.next_audit(
            group_id,
            actor.clone(),
            AuditKind::ContributionRecorded,
            json!({
                "member_id": member_id.to_string(),
                "amount": amount.to_string(),
                "cycle": cycle,
            }),
        )?;
        self.storage.append_audit(group_id, &[audit_record])?;
        self.metrics.record_contribution();
        self.observe(started);

        tracing::info!(
            group_id = %group_id,
            member_id = %member_id,
            amount = %amount,
            cycle,
            "Contribution recorded"
        );

        Ok(record)
    }

    /// Sum of a member's contributions in a cycle
    pub fn contribution_total(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        cycle: u32,
    ) -> Result<Decimal> {
        self.storage.get_group(group_id)?;
        self.ledger.member_total(group_id, member_id, cycle)
    }

    /// Total collected toward a cycle, for escrow reconciliation
    pub fn cycle_total(&self, group_id: GroupId, cycle: u32) -> Result<Decimal> {
        self.storage.get_group(group_id)?;
        self.ledger.cycle_total(group_id, cycle)
    }

    // Rotation / distribution state machine

    /// Pay the pot to an eligible member (creator-only)
    ///
    /// At most one completed distribution can exist per (group, cycle,
    /// recipient): the `AlreadyReceived` check and the payout write commit
    /// as one atomic unit inside the group's exclusive section. When the
    /// payout completes the cycle, the rollover commits in the same unit.
    pub async fn distribute(
        &self,
        group_id: GroupId,
        actor: &UserId,
        recipient: MemberId,
    ) -> Result<Distribution> {
        let started = Instant::now();
        let _guard = self.lock_group(group_id).await?;
        let mut group = self.storage.get_group(group_id)?;

        if group.creator != *actor {
            return Err(Error::Unauthorized(
                "only the group creator can manage distributions".to_string(),
            ));
        }

        let now = Utc::now();
        let payout = rotation::execute_payout(&mut group, recipient, now)?;
        let distribution = &payout.distribution;

        // Pot size is membership-derived; surface the gap against the
        // ledger instead of resolving it (reconciliation happens outside).
        let collected = self.ledger.cycle_total(group_id, distribution.cycle)?;
        let shortfall = (distribution.amount - collected).max(Decimal::ZERO);
        if shortfall > Decimal::ZERO {
            tracing::warn!(
                group_id = %group_id,
                cycle = distribution.cycle,
                pot = %distribution.amount,
                collected = %collected,
                shortfall = %shortfall,
                "Distributing an under-collected cycle"
            );
        }

        let mut records = vec![self.next_audit(
            group_id,
            actor.clone(),
            AuditKind::DistributionExecuted,
            json!({
                "distribution_id": distribution.id.to_string(),
                "recipient": recipient.to_string(),
                "amount": distribution.amount.to_string(),
                "cycle": distribution.cycle,
                "collected": collected.to_string(),
                "shortfall": shortfall.to_string(),
            }),
        )?];
        if let Some(roll) = &payout.rollover {
            records.push(self.chain_audit(
                &records[0],
                actor.clone(),
                AuditKind::CycleRolledOver,
                json!({
                    "completed_cycle": roll.completed_cycle,
                    "next_cycle": roll.next_cycle,
                    "next_distribution_date": roll.next_distribution_date.to_rfc3339(),
                }),
            ));
        }

        self.storage
            .commit_group(&group, &records, Some(distribution), &[])?;

        self.metrics.record_distribution();
        if payout.rollover.is_some() {
            self.metrics.record_rollover();
        }
        self.observe(started);

        // Hand-off toward money movement; send fails only with no
        // subscribers, which is fine.
        let _ = self.feed.send(distribution.clone());

        tracing::info!(
            group_id = %group_id,
            recipient = %recipient,
            amount = %distribution.amount,
            cycle = distribution.cycle,
            rolled_over = payout.rollover.is_some(),
            "Distribution completed"
        );

        Ok(payout.distribution)
    }

    // Reads (consistent snapshots, no lock)

    /// Snapshot of a group plus derived facts
    pub fn group_info(&self, group_id: GroupId) -> Result<GroupInfo> {
        let group = self.storage.get_group(group_id)?;
        let cycle_collected = self.ledger.cycle_total(group_id, group.current_cycle)?;

        Ok(GroupInfo {
            pot_amount: group.pot_amount(),
            available_numbers: pool::available_numbers(&group),
            members_paid: group.members_paid(),
            cycle_collected,
            group,
        })
    }

    /// Groups the user currently belongs to
    pub fn groups_for_user(&self, user: &UserId) -> Result<Vec<Group>> {
        let mut groups = Vec::new();
        for group_id in self.storage.groups_for_user(user)? {
            match self.storage.get_group(group_id) {
                Ok(group) => groups.push(group),
                Err(Error::GroupNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(groups)
    }

    /// All distributions for a group
    pub fn distributions(&self, group_id: GroupId) -> Result<Vec<Distribution>> {
        self.storage.distributions(group_id)
    }

    /// Full audit trail for a group
    ///
    /// Remains readable after deletion, for dispute resolution.
    pub fn audit_trail(&self, group_id: GroupId) -> Result<Vec<AuditRecord>> {
        self.storage.audit_trail(group_id)
    }

    /// Verify the group's audit hash chain
    pub fn verify_audit_chain(&self, group_id: GroupId) -> Result<()> {
        let trail = self.storage.audit_trail(group_id)?;
        audit::verify_chain(&trail)
    }

    // Internals

    async fn lock_group(&self, group_id: GroupId) -> Result<tokio::sync::OwnedMutexGuard<()>> {
        match self.locks.acquire(group_id).await {
            Ok(guard) => Ok(guard),
            Err(e) => {
                self.metrics.record_lock_timeout();
                Err(e)
            }
        }
    }

    fn next_audit(
        &self,
        group_id: GroupId,
        actor: UserId,
        kind: AuditKind,
        details: serde_json::Value,
    ) -> Result<AuditRecord> {
        let (seq, prev_hash) = self.storage.audit_head(group_id)?;
        Ok(AuditRecord::build(
            group_id, seq, actor, kind, details, prev_hash, Utc::now(),
        ))
    }

    fn chain_audit(
        &self,
        previous: &AuditRecord,
        actor: UserId,
        kind: AuditKind,
        details: serde_json::Value,
    ) -> AuditRecord {
        AuditRecord::build(
            previous.group_id,
            previous.seq + 1,
            actor,
            kind,
            details,
            previous.hash,
            Utc::now(),
        )
    }

    fn observe(&self, started: Instant) {
        self.metrics
            .record_operation_duration(started.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Currency, CycleType, DistributionStatus};
    use tempfile::TempDir;

    fn engine() -> (Arc<RotationEngine>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.lock.acquire_timeout_ms = 500;
        (Arc::new(RotationEngine::open(config).unwrap()), temp_dir)
    }

    fn params(max_members: u32) -> GroupParams {
        GroupParams {
            name: "Adenta Traders Susu".to_string(),
            description: Some("Monthly pot for the stall owners".to_string()),
            max_members,
            contribution_amount: Decimal::new(10000, 2),
            currency: Currency::USD,
            cycle_type: CycleType::Monthly,
            first_distribution_date: None,
        }
    }

    #[tokio::test]
    async fn test_create_group_validations() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");

        let mut bad = params(1);
        let err = engine.create_group(&creator, bad.clone()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));

        bad = params(3);
        bad.contribution_amount = Decimal::ZERO;
        let err = engine.create_group(&creator, bad).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));

        let group = engine.create_group(&creator, params(3)).await.unwrap();
        assert_eq!(group.member_count(), 1);
        assert_eq!(group.current_cycle, 1);
        assert_eq!(group.status, GroupStatus::Active);
        assert!(group.is_member(&creator));
    }

    #[tokio::test]
    async fn test_membership_limits() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let group = engine.create_group(&creator, params(2)).await.unwrap();

        // Non-creator cannot add
        let err = engine
            .add_member(group.id, &UserId::new("bob"), UserId::new("carol"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        engine
            .add_member(group.id, &creator, UserId::new("bob"))
            .await
            .unwrap();

        // Capacity check precedes the duplicate check
        let err = engine
            .add_member(group.id, &creator, UserId::new("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GroupFull(_)));

        let info = engine.group_info(group.id).unwrap();
        assert_eq!(info.group.member_count(), 2);
    }

    #[tokio::test]
    async fn test_join_group_duplicate_member() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let group = engine.create_group(&creator, params(3)).await.unwrap();

        engine.join_group(group.id, &UserId::new("bob")).await.unwrap();
        let err = engine
            .join_group(group.id, &UserId::new("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateMember(_)));
    }

    #[tokio::test]
    async fn test_creator_cannot_leave_and_non_member_cannot_select() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let group = engine.create_group(&creator, params(3)).await.unwrap();

        let err = engine.remove_member(group.id, &creator).await.unwrap_err();
        assert!(matches!(err, Error::CreatorCannotLeave));

        let err = engine
            .select_number(group.id, &UserId::new("mallory"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAMember(_)));
    }

    #[tokio::test]
    async fn test_number_selection_scenario() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let bob = UserId::new("bob");
        let group = engine.create_group(&creator, params(5)).await.unwrap();
        engine.join_group(group.id, &bob).await.unwrap();

        engine.select_number(group.id, &creator, 2).await.unwrap();

        let err = engine.select_number(group.id, &bob, 2).await.unwrap_err();
        assert!(matches!(err, Error::NumberTaken(2)));

        // Re-selecting the held number is a no-op success
        engine.select_number(group.id, &creator, 2).await.unwrap();

        let err = engine.select_number(group.id, &bob, 6).await.unwrap_err();
        assert!(matches!(err, Error::NumberNotInPool { number: 6, max: 5 }));

        assert_eq!(engine.available_numbers(group.id).unwrap(), vec![1, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_leave_frees_number() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let bob = UserId::new("bob");
        let group = engine.create_group(&creator, params(3)).await.unwrap();
        engine.join_group(group.id, &bob).await.unwrap();
        engine.select_number(group.id, &bob, 3).await.unwrap();

        engine.remove_member(group.id, &bob).await.unwrap();

        assert_eq!(engine.available_numbers(group.id).unwrap(), vec![1, 2, 3]);
        let info = engine.group_info(group.id).unwrap();
        assert_eq!(info.group.member_count(), 1);
    }

    #[tokio::test]
    async fn test_contribution_validation_and_totals() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let group = engine.create_group(&creator, params(3)).await.unwrap();

        let err = engine
            .record_contribution(group.id, &UserId::new("mallory"), Decimal::ONE, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAMember(_)));

        let err = engine
            .record_contribution(group.id, &creator, Decimal::ZERO, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));

        let err = engine
            .record_contribution(group.id, &creator, Decimal::ONE, 2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CycleMismatch {
                submitted: 2,
                current: 1
            }
        ));

        let record = engine
            .record_contribution(group.id, &creator, Decimal::new(4000, 2), 1)
            .await
            .unwrap();
        engine
            .record_contribution(group.id, &creator, Decimal::new(6000, 2), 1)
            .await
            .unwrap();

        assert_eq!(
            engine
                .contribution_total(group.id, record.member_id, 1)
                .unwrap(),
            Decimal::new(10000, 2)
        );
        assert_eq!(engine.cycle_total(group.id, 1).unwrap(), Decimal::new(10000, 2));
    }

    #[tokio::test]
    async fn test_full_rotation_scenario() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let group = engine.create_group(&creator, params(3)).await.unwrap();
        let b = engine
            .add_member(group.id, &creator, UserId::new("bob"))
            .await
            .unwrap();
        let c = engine
            .add_member(group.id, &creator, UserId::new("carol"))
            .await
            .unwrap();
        let a = engine
            .group_info(group.id)
            .unwrap()
            .group
            .member_by_user(&creator)
            .unwrap()
            .id;

        let dist = engine.distribute(group.id, &creator, a).await.unwrap();
        assert_eq!(dist.amount, Decimal::new(30000, 2));
        assert_eq!(dist.cycle, 1);
        let info = engine.group_info(group.id).unwrap();
        assert_eq!(info.members_paid, 1);
        assert_eq!(info.group.current_cycle, 1);

        engine.distribute(group.id, &creator, b.id).await.unwrap();
        assert_eq!(engine.group_info(group.id).unwrap().group.current_cycle, 1);

        let before = Utc::now();
        engine.distribute(group.id, &creator, c.id).await.unwrap();

        let info = engine.group_info(group.id).unwrap();
        assert_eq!(info.group.current_cycle, 2);
        assert_eq!(info.members_paid, 0);
        let advance = info.group.next_distribution_date - before;
        assert!(advance >= chrono::Duration::days(30) - chrono::Duration::seconds(60));
        assert!(advance <= chrono::Duration::days(30) + chrono::Duration::seconds(60));

        // The new cycle accepts a fresh round of payouts
        engine.distribute(group.id, &creator, a).await.unwrap();
        assert_eq!(engine.distributions(group.id).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_distribute_rejections() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let group = engine.create_group(&creator, params(3)).await.unwrap();
        let bob = engine
            .add_member(group.id, &creator, UserId::new("bob"))
            .await
            .unwrap();

        let err = engine
            .distribute(group.id, &UserId::new("bob"), bob.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let err = engine
            .distribute(group.id, &creator, MemberId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MemberNotFound(_)));

        engine.distribute(group.id, &creator, bob.id).await.unwrap();
        let err = engine
            .distribute(group.id, &creator, bob.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyReceived(_)));

        // Exactly one completed distribution exists for (group, cycle, bob)
        let completed: Vec<_> = engine
            .distributions(group.id)
            .unwrap()
            .into_iter()
            .filter(|d| d.recipient == bob.id && d.cycle == 1)
            .collect();
        assert_eq!(completed.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_distribute_exactly_one_succeeds() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let group = engine.create_group(&creator, params(3)).await.unwrap();
        let bob = engine
            .add_member(group.id, &creator, UserId::new("bob"))
            .await
            .unwrap();

        let first = {
            let engine = engine.clone();
            let creator = creator.clone();
            tokio::spawn(async move { engine.distribute(group.id, &creator, bob.id).await })
        };
        let second = {
            let engine = engine.clone();
            let creator = creator.clone();
            tokio::spawn(async move { engine.distribute(group.id, &creator, bob.id).await })
        };

        let (first, second) = (first.await.unwrap(), second.await.unwrap());
        let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);

        let failure = if first.is_err() { first } else { second };
        assert!(matches!(failure.unwrap_err(), Error::AlreadyReceived(_)));
    }

    #[tokio::test]
    async fn test_delete_group_is_terminal() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let group = engine.create_group(&creator, params(3)).await.unwrap();

        let err = engine
            .delete_group(group.id, &UserId::new("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        engine.delete_group(group.id, &creator).await.unwrap();

        let err = engine.group_info(group.id).unwrap_err();
        assert!(matches!(err, Error::GroupNotFound(_)));
        let err = engine.join_group(group.id, &UserId::new("bob")).await.unwrap_err();
        assert!(matches!(err, Error::GroupNotFound(_)));
        assert!(engine.groups_for_user(&creator).unwrap().is_empty());

        // The trail survives for dispute resolution
        let trail = engine.audit_trail(group.id).unwrap();
        assert_eq!(trail.last().unwrap().kind, AuditKind::GroupDeleted);
        engine.verify_audit_chain(group.id).unwrap();
    }

    #[tokio::test]
    async fn test_update_group_auth_and_validation() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let group = engine.create_group(&creator, params(3)).await.unwrap();

        let err = engine
            .update_group(group.id, &UserId::new("bob"), GroupUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let err = engine
            .update_group(
                group.id,
                &creator,
                GroupUpdate {
                    status: Some(GroupStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));

        let updated = engine
            .update_group(
                group.id,
                &creator,
                GroupUpdate {
                    name: Some("Adenta Traders Susu II".to_string()),
                    status: Some(GroupStatus::Paused),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Adenta Traders Susu II");
        assert_eq!(updated.status, GroupStatus::Paused);
    }

    #[tokio::test]
    async fn test_removal_of_last_unpaid_member_rolls_over() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let bob = UserId::new("bob");
        let group = engine.create_group(&creator, params(3)).await.unwrap();
        engine.join_group(group.id, &bob).await.unwrap();
        let a = engine
            .group_info(group.id)
            .unwrap()
            .group
            .member_by_user(&creator)
            .unwrap()
            .id;

        engine.distribute(group.id, &creator, a).await.unwrap();
        engine.remove_member(group.id, &bob).await.unwrap();

        let info = engine.group_info(group.id).unwrap();
        assert_eq!(info.group.current_cycle, 2);
        assert_eq!(info.members_paid, 0);
    }

    #[tokio::test]
    async fn test_distribution_feed_delivers_completed_payouts() {
        let (engine, _temp) = engine();
        let mut feed = engine.distribution_feed();
        let creator = UserId::new("alice");
        let group = engine.create_group(&creator, params(3)).await.unwrap();
        let bob = engine
            .add_member(group.id, &creator, UserId::new("bob"))
            .await
            .unwrap();

        let dist = engine.distribute(group.id, &creator, bob.id).await.unwrap();

        let received = feed.recv().await.unwrap();
        assert_eq!(received.id, dist.id);
        assert_eq!(received.amount, dist.amount);
        assert_eq!(received.status, DistributionStatus::Completed);
    }

    #[tokio::test]
    async fn test_shortfall_recorded_in_audit_details() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let group = engine.create_group(&creator, params(3)).await.unwrap();
        let bob = engine
            .add_member(group.id, &creator, UserId::new("bob"))
            .await
            .unwrap();

        engine
            .record_contribution(group.id, &creator, Decimal::new(10000, 2), 1)
            .await
            .unwrap();
        engine.distribute(group.id, &creator, bob.id).await.unwrap();

        let trail = engine.audit_trail(group.id).unwrap();
        let executed = trail
            .iter()
            .find(|r| r.kind == AuditKind::DistributionExecuted)
            .unwrap();
        assert_eq!(executed.details["collected"], "100.00");
        assert_eq!(executed.details["shortfall"], "100.00");
    }

    #[tokio::test]
    async fn test_audit_chain_verifies_after_mixed_operations() {
        let (engine, _temp) = engine();
        let creator = UserId::new("alice");
        let bob = UserId::new("bob");
        let group = engine.create_group(&creator, params(4)).await.unwrap();
        engine.join_group(group.id, &bob).await.unwrap();
        engine.select_number(group.id, &bob, 4).await.unwrap();
        engine
            .record_contribution(group.id, &bob, Decimal::new(10000, 2), 1)
            .await
            .unwrap();
        let bob_member = engine
            .group_info(group.id)
            .unwrap()
            .group
            .member_by_user(&bob)
            .unwrap()
            .id;
        engine.distribute(group.id, &creator, bob_member).await.unwrap();

        engine.verify_audit_chain(group.id).unwrap();

        let trail = engine.audit_trail(group.id).unwrap();
        let seqs: Vec<u64> = trail.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, (0..trail.len() as u64).collect::<Vec<_>>());
    }
}
