//! Escrow pools with per-account balances
//!
//! A pool opens with a fixed target and deadline, accepts contributions
//! until it completes (target reached) or expires (deadline passed), and
//! then lets each account withdraw exactly what it put in.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rotation_core::{ContributionLedger, ContributionRecord, GroupId, MemberId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pool lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolStatus {
    /// Accepting contributions
    Open,
    /// Target reached; balances are withdrawable
    Completed,
}

/// Pool snapshot for reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolInfo {
    /// Owning group
    pub group_id: GroupId,
    /// Fixed funding target
    pub target_amount: Decimal,
    /// Contribution deadline
    pub deadline: DateTime<Utc>,
    /// Sum of current balances
    pub total: Decimal,
    /// Lifecycle status
    pub status: PoolStatus,
    /// Accounts holding a balance
    pub contributor_count: usize,
}

/// Per-group escrow state
struct PoolState {
    target_amount: Decimal,
    deadline: DateTime<Utc>,
    balances: HashMap<String, Decimal>,
    records: Vec<ContributionRecord>,
    total: Decimal,
    status: PoolStatus,
}

impl PoolState {
    fn new(target_amount: Decimal, deadline: DateTime<Utc>) -> Self {
        Self {
            target_amount,
            deadline,
            balances: HashMap::new(),
            records: Vec::new(),
            total: Decimal::ZERO,
            status: PoolStatus::Open,
        }
    }

    fn credit(&mut self, account: &str, amount: Decimal) -> Decimal {
        let balance = self.balances.entry(account.to_string()).or_insert(Decimal::ZERO);
        *balance += amount;
        self.total += amount;

        if self.total >= self.target_amount {
            self.status = PoolStatus::Completed;
        }
        *balance
    }
}

/// Escrow vault holding one pool per group
pub struct EscrowVault {
    pools: DashMap<GroupId, PoolState>,
}

impl EscrowVault {
    /// Create an empty vault
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
        }
    }

    /// Provision a pool for a group
    pub fn open_pool(
        &self,
        group_id: GroupId,
        target_amount: Decimal,
        deadline: DateTime<Utc>,
    ) -> Result<()> {
        if target_amount <= Decimal::ZERO {
            return Err(Error::InvalidTarget(target_amount));
        }
        if self.pools.contains_key(&group_id) {
            return Err(Error::PoolExists(group_id.to_string()));
        }

        self.pools
            .insert(group_id, PoolState::new(target_amount, deadline));

        tracing::info!(
            group_id = %group_id,
            target = %target_amount,
            "Escrow pool opened"
        );

        Ok(())
    }

    /// Credit a contribution to an account's balance
    ///
    /// Returns the account's new balance. The pool completes the moment the
    /// running total reaches the target.
    pub fn contribute(
        &self,
        group_id: GroupId,
        account: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(amount));
        }

        let mut entry = self
            .pools
            .get_mut(&group_id)
            .ok_or_else(|| Error::PoolNotFound(group_id.to_string()))?;
        let pool = entry.value_mut();

        if pool.status != PoolStatus::Open || now > pool.deadline {
            return Err(Error::PoolClosed(group_id.to_string()));
        }

        let balance = pool.credit(account, amount);
        let completed = pool.status == PoolStatus::Completed;

        tracing::debug!(
            group_id = %group_id,
            account,
            amount = %amount,
            balance = %balance,
            "Escrow contribution credited"
        );
        if completed {
            tracing::info!(group_id = %group_id, total = %pool.total, "Escrow pool completed");
        }

        Ok(balance)
    }

    /// Withdraw the caller's full balance
    ///
    /// Allowed once the pool has completed, or after the deadline passes
    /// without completion (refund path). Returns the withdrawn amount.
    pub fn withdraw(&self, group_id: GroupId, account: &str, now: DateTime<Utc>) -> Result<Decimal> {
        let mut entry = self
            .pools
            .get_mut(&group_id)
            .ok_or_else(|| Error::PoolNotFound(group_id.to_string()))?;
        let pool = entry.value_mut();

        if pool.status != PoolStatus::Completed && now <= pool.deadline {
            return Err(Error::PoolStillOpen(group_id.to_string()));
        }

        let balance = pool
            .balances
            .get_mut(account)
            .filter(|b| **b > Decimal::ZERO)
            .ok_or_else(|| Error::NothingToWithdraw(account.to_string()))?;

        let withdrawn = *balance;
        *balance = Decimal::ZERO;
        pool.total -= withdrawn;

        tracing::info!(
            group_id = %group_id,
            account,
            amount = %withdrawn,
            "Escrow withdrawal"
        );

        Ok(withdrawn)
    }

    /// Snapshot of a pool
    pub fn pool_info(&self, group_id: GroupId) -> Result<PoolInfo> {
        let entry = self
            .pools
            .get(&group_id)
            .ok_or_else(|| Error::PoolNotFound(group_id.to_string()))?;
        let pool = entry.value();

        Ok(PoolInfo {
            group_id,
            target_amount: pool.target_amount,
            deadline: pool.deadline,
            total: pool.total,
            status: pool.status,
            contributor_count: pool
                .balances
                .values()
                .filter(|b| **b > Decimal::ZERO)
                .count(),
        })
    }

    /// Current balance of an account
    pub fn balance(&self, group_id: GroupId, account: &str) -> Result<Decimal> {
        let entry = self
            .pools
            .get(&group_id)
            .ok_or_else(|| Error::PoolNotFound(group_id.to_string()))?;
        Ok(entry
            .value()
            .balances
            .get(account)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}

impl Default for EscrowVault {
    fn default() -> Self {
        Self::new()
    }
}

impl ContributionLedger for EscrowVault {
    fn append(&self, record: &ContributionRecord) -> rotation_core::Result<()> {
        let account = record.member_id.to_string();
        self.contribute(record.group_id, &account, record.amount, record.recorded_at)
            .map_err(|e| match e {
                Error::PoolNotFound(g) => rotation_core::Error::GroupNotFound(g),
                Error::InvalidAmount(a) => rotation_core::Error::InvalidAmount(a),
                other => rotation_core::Error::InvalidParams(other.to_string()),
            })?;

        let mut entry = self
            .pools
            .get_mut(&record.group_id)
            .expect("pool existence checked by contribute");
        entry.value_mut().records.push(record.clone());
        Ok(())
    }

    fn member_total(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        cycle: u32,
    ) -> rotation_core::Result<Decimal> {
        Ok(self
            .records_matching(group_id, |r| r.member_id == member_id && r.cycle == cycle)
            .iter()
            .map(|r| r.amount)
            .sum())
    }

    fn cycle_total(&self, group_id: GroupId, cycle: u32) -> rotation_core::Result<Decimal> {
        Ok(self
            .records_matching(group_id, |r| r.cycle == cycle)
            .iter()
            .map(|r| r.amount)
            .sum())
    }

    fn records(&self, group_id: GroupId, cycle: u32) -> rotation_core::Result<Vec<ContributionRecord>> {
        Ok(self.records_matching(group_id, |r| r.cycle == cycle))
    }
}

impl EscrowVault {
    fn records_matching(
        &self,
        group_id: GroupId,
        predicate: impl Fn(&ContributionRecord) -> bool,
    ) -> Vec<ContributionRecord> {
        self.pools
            .get(&group_id)
            .map(|entry| {
                entry
                    .value()
                    .records
                    .iter()
                    .filter(|r| predicate(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
