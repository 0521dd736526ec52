//! Rotation / distribution state machine
//!
//! A group cycles through `Accepting` → `Distributing` → `Accepting`, and
//! once every current member has been paid, through `CycleComplete`: receipt
//! flags reset, the cycle counter increments, and the schedule advances by
//! one cadence interval. `Distributing` and `CycleComplete` only ever exist
//! inside a group's exclusive section; the persisted state is always
//! `Accepting` because the rollover commits atomically with the payout that
//! caused it.
//!
//! The payout amount is membership-derived (`contribution_amount ×
//! member_count`), not ledger-derived. The engine surfaces the gap against
//! collected contributions instead of resolving it.

use crate::types::{Distribution, DistributionStatus, Group, MemberId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Cycle rollover facts, for audit and scheduling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rollover {
    /// The cycle that just completed
    pub completed_cycle: u32,
    /// The newly opened cycle
    pub next_cycle: u32,
    /// The advanced schedule date
    pub next_distribution_date: DateTime<Utc>,
}

/// Result of a payout transition
#[derive(Debug, Clone)]
pub struct Payout {
    /// The completed distribution
    pub distribution: Distribution,
    /// Present when this payout completed the cycle
    pub rollover: Option<Rollover>,
}

/// Execute a payout against a group copy
///
/// Marks the recipient as paid, creates the completed distribution, and
/// performs the rollover when this was the last unpaid member. The caller
/// commits the mutated group and the distribution in one atomic write.
pub fn execute_payout(group: &mut Group, recipient: MemberId, now: DateTime<Utc>) -> Result<Payout> {
    let member = group
        .member(recipient)
        .ok_or_else(|| Error::MemberNotFound(recipient.to_string()))?;

    if member.has_received_pot {
        return Err(Error::AlreadyReceived(recipient.to_string()));
    }

    let amount = group.pot_amount();
    let cycle = group.current_cycle;

    let distribution = Distribution {
        id: Uuid::now_v7(),
        group_id: group.id,
        recipient,
        amount,
        currency: group.currency,
        cycle,
        status: DistributionStatus::Completed,
        executed_at: now,
    };

    group
        .member_mut(recipient)
        .expect("recipient existence checked above")
        .has_received_pot = true;

    let rollover = roll_over_if_complete(group, now);

    Ok(Payout {
        distribution,
        rollover,
    })
}

/// Perform the cycle-rollover transition if every current member is paid
///
/// Cycle completion is a condition on current members, so this also fires
/// when a removal leaves only paid members behind.
pub fn roll_over_if_complete(group: &mut Group, now: DateTime<Utc>) -> Option<Rollover> {
    if !group.all_received() {
        return None;
    }

    let completed_cycle = group.current_cycle;
    for member in &mut group.members {
        member.has_received_pot = false;
    }
    group.current_cycle += 1;
    group.next_distribution_date = now + group.cycle_type.interval();

    Some(Rollover {
        completed_cycle,
        next_cycle: group.current_cycle,
        next_distribution_date: group.next_distribution_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Currency, CycleType, GroupId, GroupMember, GroupStatus, UserId};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn group_of(n: usize, cycle_type: CycleType) -> Group {
        let members = (0..n)
            .map(|i| GroupMember::new(UserId::new(format!("user-{}", i)), Utc::now()))
            .collect();
        Group {
            id: GroupId::generate(),
            name: "Rotation Test".to_string(),
            description: None,
            creator: UserId::new("user-0"),
            created_at: Utc::now(),
            max_members: n as u32,
            contribution_amount: Decimal::new(10000, 2),
            currency: Currency::USD,
            cycle_type,
            next_distribution_date: Utc::now() + cycle_type.interval(),
            status: GroupStatus::Active,
            current_cycle: 1,
            members,
            deleted_at: None,
        }
    }

    #[test]
    fn test_payout_marks_recipient_and_prices_pot() {
        let mut group = group_of(3, CycleType::Monthly);
        let recipient = group.members[0].id;

        let payout = execute_payout(&mut group, recipient, Utc::now()).unwrap();

        assert_eq!(payout.distribution.amount, Decimal::new(30000, 2));
        assert_eq!(payout.distribution.cycle, 1);
        assert_eq!(payout.distribution.status, DistributionStatus::Completed);
        assert!(payout.rollover.is_none());
        assert!(group.members[0].has_received_pot);
        assert_eq!(group.current_cycle, 1);
    }

    #[test]
    fn test_second_payout_same_cycle_rejected() {
        let mut group = group_of(3, CycleType::Monthly);
        let recipient = group.members[0].id;

        execute_payout(&mut group, recipient, Utc::now()).unwrap();
        let err = execute_payout(&mut group, recipient, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::AlreadyReceived(_)));
    }

    #[test]
    fn test_unknown_recipient_rejected() {
        let mut group = group_of(2, CycleType::Weekly);
        let err = execute_payout(&mut group, MemberId::generate(), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::MemberNotFound(_)));
    }

    #[test]
    fn test_last_payout_rolls_cycle_over() {
        let mut group = group_of(3, CycleType::Monthly);
        let ids: Vec<MemberId> = group.members.iter().map(|m| m.id).collect();
        let now = Utc::now();

        execute_payout(&mut group, ids[0], now).unwrap();
        execute_payout(&mut group, ids[1], now).unwrap();
        assert_eq!(group.current_cycle, 1);

        let payout = execute_payout(&mut group, ids[2], now).unwrap();
        let rollover = payout.rollover.expect("last payout completes the cycle");

        assert_eq!(rollover.completed_cycle, 1);
        assert_eq!(rollover.next_cycle, 2);
        assert_eq!(group.current_cycle, 2);
        assert!(group.members.iter().all(|m| !m.has_received_pot));
        assert_eq!(group.next_distribution_date, now + Duration::days(30));
    }

    #[test]
    fn test_schedule_advance_per_cycle_type() {
        for (cycle_type, days) in [
            (CycleType::Weekly, 7),
            (CycleType::BiWeekly, 14),
            (CycleType::Monthly, 30),
        ] {
            let mut group = group_of(1, cycle_type);
            let recipient = group.members[0].id;
            let now = Utc::now();

            let payout = execute_payout(&mut group, recipient, now).unwrap();
            assert!(payout.rollover.is_some());
            assert_eq!(group.next_distribution_date, now + Duration::days(days));
        }
    }

    #[test]
    fn test_non_rollover_payout_leaves_schedule_untouched() {
        let mut group = group_of(2, CycleType::Weekly);
        let scheduled = group.next_distribution_date;
        let recipient = group.members[0].id;

        execute_payout(&mut group, recipient, Utc::now()).unwrap();
        assert_eq!(group.next_distribution_date, scheduled);
    }

    #[test]
    fn test_rollover_fires_on_removal_of_last_unpaid() {
        let mut group = group_of(3, CycleType::Weekly);
        let ids: Vec<MemberId> = group.members.iter().map(|m| m.id).collect();
        let now = Utc::now();

        execute_payout(&mut group, ids[0], now).unwrap();
        execute_payout(&mut group, ids[1], now).unwrap();

        // The last unpaid member leaves; everyone remaining is paid
        group.members.retain(|m| m.id != ids[2]);
        let rollover = roll_over_if_complete(&mut group, now).expect("cycle condition holds");

        assert_eq!(rollover.next_cycle, 2);
        assert!(group.members.iter().all(|m| !m.has_received_pot));
    }

    #[test]
    fn test_empty_group_never_rolls_over() {
        let mut group = group_of(1, CycleType::Weekly);
        group.members.clear();
        assert!(roll_over_if_complete(&mut group, Utc::now()).is_none());
    }
}
