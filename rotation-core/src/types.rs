//! Core types for the rotation engine
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque caller identity, supplied by the external auth collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Group identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Generate a fresh group ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Raw bytes for storage keys
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Group member identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    /// Generate a fresh member ID (UUIDv7 for join-time ordering)
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Raw bytes for storage keys
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code for a group's ledger currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
    /// Nigerian Naira
    NGN,
    /// Ghanaian Cedi
    GHS,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::NGN => "NGN",
            Currency::GHS => "GHS",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "NGN" => Some(Currency::NGN),
            "GHS" => Some(Currency::GHS),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Contribution/payout cadence of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleType {
    /// Every 7 days
    Weekly,
    /// Every 14 days
    BiWeekly,
    /// Every 30 days
    Monthly,
}

impl CycleType {
    /// Schedule advance applied at cycle rollover
    pub fn interval(&self) -> Duration {
        match self {
            CycleType::Weekly => Duration::days(7),
            CycleType::BiWeekly => Duration::days(14),
            CycleType::Monthly => Duration::days(30),
        }
    }

    /// Wire/config name
    pub fn code(&self) -> &'static str {
        match self {
            CycleType::Weekly => "weekly",
            CycleType::BiWeekly => "bi-weekly",
            CycleType::Monthly => "monthly",
        }
    }
}

impl fmt::Display for CycleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Group lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum GroupStatus {
    /// Accepting contributions and distributions
    Active = 1,
    /// Administratively paused (advisory)
    Paused = 2,
    /// Terminal (set on deletion)
    Completed = 3,
}

/// A member of a savings group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    /// Member ID (UUIDv7, join-time ordered)
    pub id: MemberId,

    /// User identity behind this membership
    pub user: UserId,

    /// Draw number claimed from the group's pool, if any
    pub selected_number: Option<u32>,

    /// Whether this member has been paid the pot in the current cycle
    pub has_received_pot: bool,

    /// Join timestamp
    pub joined_at: DateTime<Utc>,
}

impl GroupMember {
    /// Create a fresh member record with no number and no payout
    pub fn new(user: UserId, joined_at: DateTime<Utc>) -> Self {
        Self {
            id: MemberId::generate(),
            user,
            selected_number: None,
            has_received_pot: false,
            joined_at,
        }
    }
}

/// A rotating savings group
///
/// The group is the unit of exclusive-access locking: its members, number
/// pool, and cycle counters mutate together in one atomic commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Group ID
    pub id: GroupId,

    /// Display name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Creator identity (owns administrative rights, always a member)
    pub creator: UserId,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Capacity; also the size of the number pool `1..=max_members`
    pub max_members: u32,

    /// Fixed per-member, per-cycle contribution
    pub contribution_amount: Decimal,

    /// Ledger currency
    pub currency: Currency,

    /// Contribution/payout cadence
    pub cycle_type: CycleType,

    /// Next scheduled distribution date; advanced only at rollover
    pub next_distribution_date: DateTime<Utc>,

    /// Lifecycle status
    pub status: GroupStatus,

    /// Current cycle, starting at 1, monotonically increasing
    pub current_cycle: u32,

    /// Members, in join order
    pub members: Vec<GroupMember>,

    /// Tombstone timestamp; a deleted group answers `GroupNotFound`
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Group {
    /// Number of current members
    pub fn member_count(&self) -> u32 {
        self.members.len() as u32
    }

    /// Whether the group is at capacity
    pub fn is_full(&self) -> bool {
        self.member_count() >= self.max_members
    }

    /// Find a member by member ID
    pub fn member(&self, id: MemberId) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Find a member by member ID (mutable)
    pub fn member_mut(&mut self, id: MemberId) -> Option<&mut GroupMember> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    /// Find a member by user identity
    pub fn member_by_user(&self, user: &UserId) -> Option<&GroupMember> {
        self.members.iter().find(|m| &m.user == user)
    }

    /// Find a member by user identity (mutable)
    pub fn member_by_user_mut(&mut self, user: &UserId) -> Option<&mut GroupMember> {
        self.members.iter_mut().find(|m| &m.user == user)
    }

    /// Whether the user holds a membership
    pub fn is_member(&self, user: &UserId) -> bool {
        self.member_by_user(user).is_some()
    }

    /// Pot size at payout time: `contribution_amount × member_count`
    ///
    /// Membership-derived, not ledger-derived; the gap against collected
    /// contributions is surfaced at distribution time.
    pub fn pot_amount(&self) -> Decimal {
        self.contribution_amount * Decimal::from(self.member_count())
    }

    /// Whether `number` belongs to the group's pool `1..=max_members`
    pub fn number_in_pool(&self, number: u32) -> bool {
        (1..=self.max_members).contains(&number)
    }

    /// Whether every current member has been paid this cycle
    pub fn all_received(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|m| m.has_received_pot)
    }

    /// Count of members already paid this cycle
    pub fn members_paid(&self) -> u32 {
        self.members.iter().filter(|m| m.has_received_pot).count() as u32
    }
}

/// Parameters for creating a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupParams {
    /// Display name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Capacity (`>= 2`)
    pub max_members: u32,

    /// Fixed per-member, per-cycle contribution (`> 0`)
    pub contribution_amount: Decimal,

    /// Ledger currency
    pub currency: Currency,

    /// Cadence
    pub cycle_type: CycleType,

    /// First distribution date; defaults to creation time plus one interval
    pub first_distribution_date: Option<DateTime<Utc>>,
}

/// Creator-only partial update of group settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupUpdate {
    /// New display name
    pub name: Option<String>,

    /// New description
    pub description: Option<String>,

    /// New status (`Active` or `Paused` only)
    pub status: Option<GroupStatus>,

    /// New per-cycle contribution amount (`> 0`)
    pub contribution_amount: Option<Decimal>,

    /// New cadence (applies from the next rollover)
    pub cycle_type: Option<CycleType>,

    /// Reschedule the next distribution
    pub next_distribution_date: Option<DateTime<Utc>>,
}

/// One contribution toward the current cycle's pot
///
/// Multiple records may exist per member per cycle; the ledger total is the
/// sum of the records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionRecord {
    /// Record ID (UUIDv7 for time-ordering)
    pub record_id: Uuid,

    /// Group
    pub group_id: GroupId,

    /// Contributing member
    pub member_id: MemberId,

    /// Cycle the contribution funds
    pub cycle: u32,

    /// Amount contributed
    pub amount: Decimal,

    /// Recording timestamp
    pub recorded_at: DateTime<Utc>,
}

/// Payout status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DistributionStatus {
    /// Awaiting settlement confirmation
    Pending = 1,
    /// Paid out (never rewritten)
    Completed = 2,
    /// Settlement failed
    Failed = 3,
}

/// A pot payout to one member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    /// Distribution ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Group
    pub group_id: GroupId,

    /// Recipient member
    pub recipient: MemberId,

    /// Pot amount at payout time
    pub amount: Decimal,

    /// Ledger currency of the group
    pub currency: Currency,

    /// Cycle the payout belongs to
    pub cycle: u32,

    /// Payout status
    pub status: DistributionStatus,

    /// Execution timestamp
    pub executed_at: DateTime<Utc>,
}

/// Read-model snapshot of a group plus derived facts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInfo {
    /// The group, with embedded members
    pub group: Group,

    /// Pot size if distributed now
    pub pot_amount: Decimal,

    /// Draw numbers still unclaimed
    pub available_numbers: Vec<u32>,

    /// Members already paid this cycle
    pub members_paid: u32,

    /// Total collected toward the current cycle
    pub cycle_collected: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_group(max_members: u32) -> Group {
        Group {
            id: GroupId::generate(),
            name: "Market Women Susu".to_string(),
            description: None,
            creator: UserId::new("user-1"),
            created_at: Utc::now(),
            max_members,
            contribution_amount: Decimal::new(10000, 2),
            currency: Currency::GHS,
            cycle_type: CycleType::Monthly,
            next_distribution_date: Utc::now() + Duration::days(30),
            status: GroupStatus::Active,
            current_cycle: 1,
            members: vec![GroupMember::new(UserId::new("user-1"), Utc::now())],
            deleted_at: None,
        }
    }

    #[test]
    fn test_cycle_type_intervals() {
        assert_eq!(CycleType::Weekly.interval(), Duration::days(7));
        assert_eq!(CycleType::BiWeekly.interval(), Duration::days(14));
        assert_eq!(CycleType::Monthly.interval(), Duration::days(30));
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!(Currency::from_str("USD"), Some(Currency::USD));
        assert_eq!(Currency::from_str("GHS"), Some(Currency::GHS));
        assert_eq!(Currency::from_str("INVALID"), None);
    }

    #[test]
    fn test_pot_amount_tracks_membership() {
        let mut group = test_group(5);
        assert_eq!(group.pot_amount(), Decimal::new(10000, 2));

        group
            .members
            .push(GroupMember::new(UserId::new("user-2"), Utc::now()));
        group
            .members
            .push(GroupMember::new(UserId::new("user-3"), Utc::now()));
        assert_eq!(group.pot_amount(), Decimal::new(30000, 2));
    }

    #[test]
    fn test_number_in_pool_bounds() {
        let group = test_group(5);
        assert!(!group.number_in_pool(0));
        assert!(group.number_in_pool(1));
        assert!(group.number_in_pool(5));
        assert!(!group.number_in_pool(6));
    }

    #[test]
    fn test_all_received_requires_members() {
        let mut group = test_group(3);
        assert!(!group.all_received());

        group.members[0].has_received_pot = true;
        assert!(group.all_received());

        group.members.clear();
        assert!(!group.all_received());
    }
}
