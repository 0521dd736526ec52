//! Number pool allocation
//!
//! Each group owns the fixed pool `1..=max_members`. A member may claim one
//! unclaimed number; re-selecting the number they already hold is a no-op.
//! Numbers are advisory identity, not an enforced payout order: the rotation
//! state machine never requires a number before a member is eligible.

use crate::types::{Group, MemberId};
use crate::{Error, Result};

/// Outcome of a validated selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// The number was assigned to the member
    Applied,
    /// The member already held this exact number
    NoOp,
}

/// Validate a selection and apply it to the group copy
pub fn select(group: &mut Group, member_id: MemberId, number: u32) -> Result<SelectionOutcome> {
    if !group.number_in_pool(number) {
        return Err(Error::NumberNotInPool {
            number,
            max: group.max_members,
        });
    }

    if group
        .members
        .iter()
        .any(|m| m.selected_number == Some(number) && m.id != member_id)
    {
        return Err(Error::NumberTaken(number));
    }

    let member = group
        .member_mut(member_id)
        .ok_or_else(|| Error::MemberNotFound(member_id.to_string()))?;

    if member.selected_number == Some(number) {
        return Ok(SelectionOutcome::NoOp);
    }

    member.selected_number = Some(number);
    Ok(SelectionOutcome::Applied)
}

/// Numbers still unclaimed, in ascending order
pub fn available_numbers(group: &Group) -> Vec<u32> {
    (1..=group.max_members)
        .filter(|n| {
            !group
                .members
                .iter()
                .any(|m| m.selected_number == Some(*n))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Currency, CycleType, GroupId, GroupMember, GroupStatus, UserId};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn group_of(n: usize, max_members: u32) -> Group {
        let members = (0..n)
            .map(|i| GroupMember::new(UserId::new(format!("user-{}", i)), Utc::now()))
            .collect();
        Group {
            id: GroupId::generate(),
            name: "Pool Test".to_string(),
            description: None,
            creator: UserId::new("user-0"),
            created_at: Utc::now(),
            max_members,
            contribution_amount: Decimal::ONE,
            currency: Currency::USD,
            cycle_type: CycleType::Weekly,
            next_distribution_date: Utc::now(),
            status: GroupStatus::Active,
            current_cycle: 1,
            members,
            deleted_at: None,
        }
    }

    #[test]
    fn test_select_assigns_number() {
        let mut group = group_of(2, 5);
        let member = group.members[0].id;

        assert_eq!(select(&mut group, member, 2).unwrap(), SelectionOutcome::Applied);
        assert_eq!(group.members[0].selected_number, Some(2));
    }

    #[test]
    fn test_select_out_of_pool() {
        let mut group = group_of(1, 5);
        let member = group.members[0].id;

        let err = select(&mut group, member, 6).unwrap_err();
        assert!(matches!(err, Error::NumberNotInPool { number: 6, max: 5 }));

        let err = select(&mut group, member, 0).unwrap_err();
        assert!(matches!(err, Error::NumberNotInPool { .. }));
    }

    #[test]
    fn test_taken_number_rejected_but_reselection_is_noop() {
        let mut group = group_of(2, 5);
        let first = group.members[0].id;
        let second = group.members[1].id;

        select(&mut group, first, 2).unwrap();

        let err = select(&mut group, second, 2).unwrap_err();
        assert!(matches!(err, Error::NumberTaken(2)));

        assert_eq!(select(&mut group, first, 2).unwrap(), SelectionOutcome::NoOp);
    }

    #[test]
    fn test_member_can_switch_numbers() {
        let mut group = group_of(2, 5);
        let member = group.members[0].id;

        select(&mut group, member, 2).unwrap();
        assert_eq!(select(&mut group, member, 4).unwrap(), SelectionOutcome::Applied);
        assert_eq!(group.members[0].selected_number, Some(4));
        assert_eq!(available_numbers(&group), vec![1, 2, 3, 5]);
    }

    #[test]
    fn test_available_numbers_full_pool() {
        let group = group_of(0, 3);
        assert_eq!(available_numbers(&group), vec![1, 2, 3]);
    }
}
