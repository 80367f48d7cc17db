//! Core types for the points ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Integer point arithmetic (no floating point)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Points are divided by this to derive a membership level.
pub const LEVEL_DIVISOR: i64 = 10;

/// User role on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum UserRole {
    /// Reports and collects waste, earns points
    Volunteer = 1,
    /// Hosts collection drives
    Organization = 2,
}

impl UserRole {
    /// Stable string form (persisted in the original schema)
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Volunteer => "volunteer",
            UserRole::Organization => "organization",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "volunteer" => Some(UserRole::Volunteer),
            "organization" => Some(UserRole::Organization),
            _ => None,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registered platform user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Surrogate id
    pub id: u64,

    /// Login email (unique)
    pub email: String,

    /// Display name
    pub name: String,

    /// Volunteer or organization
    pub role: UserRole,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

/// Per-user point balance and level state
///
/// Created lazily on first ledger interaction. The balance is the
/// authoritative current state; it must always equal the fold over the
/// user's transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardAccount {
    /// Owning user
    pub user_id: u64,

    /// Current spendable points (never negative)
    pub balance: i64,

    /// Total points ever earned (never decreases)
    pub lifetime_earned: i64,

    /// Availability flag
    pub is_available: bool,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl RewardAccount {
    /// Fresh account with zero balance
    pub fn new(user_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: 0,
            lifetime_earned: 0,
            is_available: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Membership level, a pure function of lifetime earned points.
    ///
    /// Spending points never lowers the level.
    pub fn level(&self) -> i64 {
        self.lifetime_earned / LEVEL_DIVISOR
    }
}

/// Transaction kind (closed set, validated at the boundary)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionKind {
    /// Points granted for a verified waste report
    EarnedReport = 1,
    /// Points granted for collecting waste
    EarnedCollect = 2,
    /// One-off grant (organization sign-up bonus)
    EarnedBonus = 3,
    /// Points spent on a redemption or report submission
    Redeemed = 4,
}

impl TransactionKind {
    /// True for kinds that increase the balance
    pub fn is_earning(&self) -> bool {
        matches!(
            self,
            TransactionKind::EarnedReport
                | TransactionKind::EarnedCollect
                | TransactionKind::EarnedBonus
        )
    }

    /// True for kinds counted in the leaderboard (bonus grants excluded)
    pub fn counts_for_leaderboard(&self) -> bool {
        matches!(
            self,
            TransactionKind::EarnedReport | TransactionKind::EarnedCollect
        )
    }

    /// Stable string form (persisted in the original schema)
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::EarnedReport => "earned_report",
            TransactionKind::EarnedCollect => "earned_collect",
            TransactionKind::EarnedBonus => "earned_bonus",
            TransactionKind::Redeemed => "redeemed",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "earned_report" => Some(TransactionKind::EarnedReport),
            "earned_collect" => Some(TransactionKind::EarnedCollect),
            "earned_bonus" => Some(TransactionKind::EarnedBonus),
            "redeemed" => Some(TransactionKind::Redeemed),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record of a point-affecting event
///
/// Append-only: transactions are never modified or deleted. Ids are
/// allocated from a monotonic counter, so id order is append order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Surrogate id (monotonic)
    pub id: u64,

    /// User whose balance this affects
    pub user_id: u64,

    /// Kind of event
    pub kind: TransactionKind,

    /// Point amount (always positive; the kind carries the sign)
    pub amount: i64,

    /// Human-readable description
    pub description: String,

    /// Event timestamp
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Signed effect of this transaction on a balance
    pub fn signed_amount(&self) -> i64 {
        if self.kind.is_earning() {
            self.amount
        } else {
            -self.amount
        }
    }
}

/// Report lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReportStatus {
    /// Submitted, awaiting verification
    Pending = 1,
    /// Verified, awaiting collection
    Verified = 2,
    /// Rejected by verification (terminal)
    Rejected = 3,
    /// Collected by a volunteer (terminal)
    Collected = 4,
}

impl ReportStatus {
    /// Whether the report can move to `next`
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (ReportStatus::Pending, ReportStatus::Verified)
                | (ReportStatus::Pending, ReportStatus::Rejected)
                | (ReportStatus::Verified, ReportStatus::Collected)
        )
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Rejected | ReportStatus::Collected)
    }

    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Verified => "verified",
            ReportStatus::Rejected => "rejected",
            ReportStatus::Collected => "collected",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A waste report submitted by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Surrogate id
    pub id: u64,

    /// Reporting user
    pub user_id: u64,

    /// Free-text location
    pub location: String,

    /// Waste category ("plastic", "mixed", ...)
    pub waste_type: String,

    /// Reported quantity (free text, e.g. "2 bags")
    pub amount: String,

    /// Lifecycle status
    pub status: ReportStatus,

    /// Assigned collector, set on collection
    pub collector_id: Option<u64>,

    /// Submission timestamp
    pub created_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,
}

/// Record of a completed collection against a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedWaste {
    /// Surrogate id
    pub id: u64,

    /// Report that was collected
    pub report_id: u64,

    /// Collecting user
    pub collector_id: u64,

    /// Collection timestamp
    pub collected_at: DateTime<Utc>,
}

/// A redeemable item in the reward catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Surrogate id (0 is reserved for the synthetic "all points" entry)
    pub id: u64,

    /// Display name
    pub name: String,

    /// Points required to redeem
    pub point_cost: i64,

    /// Display description
    pub description: String,

    /// Hidden from the catalog when false
    pub is_available: bool,
}

/// Id reserved for the synthetic "redeem all current points" catalog entry.
pub const ALL_POINTS_ENTRY_ID: u64 = 0;

/// Redemption target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemTarget {
    /// Redeem a specific catalog entry
    CatalogEntry(u64),
    /// Redeem the entire current balance
    AllPoints,
}

/// User-facing notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Surrogate id (monotonic)
    pub id: u64,

    /// Recipient
    pub user_id: u64,

    /// Message text
    pub message: String,

    /// Notification category ("reward", ...)
    pub kind: String,

    /// Read flag
    pub is_read: bool,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// One leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Ranked user
    pub user_id: u64,

    /// Display name
    pub user_name: String,

    /// Lifetime points from reports and collections
    pub total_earned: i64,

    /// Level derived from `total_earned`
    pub level: i64,
}

/// Platform-wide aggregates for the home page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImpactStats {
    /// Sum of all report/collect earnings
    pub total_points_earned: i64,

    /// Number of volunteer users
    pub volunteers_engaged: u64,

    /// Number of organization users
    pub organizations_engaged: u64,

    /// Number of reports ever submitted
    pub reports_submitted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_round_trip() {
        for kind in [
            TransactionKind::EarnedReport,
            TransactionKind::EarnedCollect,
            TransactionKind::EarnedBonus,
            TransactionKind::Redeemed,
        ] {
            assert_eq!(TransactionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TransactionKind::parse("earned"), None);
    }

    #[test]
    fn test_signed_amount() {
        let mut txn = Transaction {
            id: 1,
            user_id: 1,
            kind: TransactionKind::EarnedCollect,
            amount: 25,
            description: String::new(),
            created_at: Utc::now(),
        };
        assert_eq!(txn.signed_amount(), 25);

        txn.kind = TransactionKind::Redeemed;
        assert_eq!(txn.signed_amount(), -25);
    }

    #[test]
    fn test_level_from_lifetime_earned() {
        let mut account = RewardAccount::new(1, Utc::now());
        account.lifetime_earned = 25;
        account.balance = 5; // 20 already spent
        assert_eq!(account.level(), 2);
    }

    #[test]
    fn test_report_transitions() {
        assert!(ReportStatus::Pending.can_transition_to(ReportStatus::Verified));
        assert!(ReportStatus::Pending.can_transition_to(ReportStatus::Rejected));
        assert!(ReportStatus::Verified.can_transition_to(ReportStatus::Collected));

        assert!(!ReportStatus::Pending.can_transition_to(ReportStatus::Collected));
        assert!(!ReportStatus::Verified.can_transition_to(ReportStatus::Rejected));
        assert!(!ReportStatus::Rejected.can_transition_to(ReportStatus::Verified));
        assert!(!ReportStatus::Collected.can_transition_to(ReportStatus::Pending));

        assert!(ReportStatus::Rejected.is_terminal());
        assert!(ReportStatus::Collected.is_terminal());
        assert!(!ReportStatus::Pending.is_terminal());
        assert!(!ReportStatus::Verified.is_terminal());
    }

    #[test]
    fn test_leaderboard_kinds() {
        assert!(TransactionKind::EarnedReport.counts_for_leaderboard());
        assert!(TransactionKind::EarnedCollect.counts_for_leaderboard());
        assert!(!TransactionKind::EarnedBonus.counts_for_leaderboard());
        assert!(!TransactionKind::Redeemed.counts_for_leaderboard());
    }
}
