//! Typed records for every persisted entity.
//!
//! Rows are validated into these structs at the boundary by the `row_to_*`
//! mappers; nothing above the store handles raw column values.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ember_shared::{
    AbuseSeverity, AccountStatus, ContentSafetyLevel, Decision, Gender, GeoPoint, MatchId,
    MatchStatus, SubscriptionTier, UserId,
};

// ---------------------------------------------------------------------------
// SwipeQuota
// ---------------------------------------------------------------------------

/// Per-user swipe allowance state.  Created lazily, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwipeQuota {
    pub user_id: UserId,
    /// Viewer-local calendar date the counter belongs to.
    pub period_date: NaiveDate,
    /// Decisions consumed in `period_date`.  Never decreases within a period.
    pub consumed_count: u32,
    pub last_consumed_at: Option<DateTime<Utc>>,
    /// Anchor from which hourly refills accrue; set when the period opens.
    pub last_refill_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// CandidateProfile
// ---------------------------------------------------------------------------

/// Snapshot of a swipeable profile as indexed for discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateProfile {
    pub user_id: UserId,
    pub gender: Gender,
    /// Genders this user wants to be shown.
    pub orientation_preference: Vec<Gender>,
    pub age: u8,
    pub location: GeoPoint,
    /// Identity verified (selfie / document check).
    pub verified: bool,
    /// Age verified by the identity service.
    pub age_verified: bool,
    /// 0..=100
    pub quality_score: u8,
    pub content_safety_level: ContentSafetyLevel,
    /// 0..=100, higher is riskier.
    pub risk_score: u8,
    pub account_status: AccountStatus,
    /// Incognito profiles are only shown when a filter asks for them.
    pub hidden: bool,
    pub last_active_at: DateTime<Utc>,
    pub subscription_tier: SubscriptionTier,
    /// Offset used for the viewer-local calendar when a request omits one.
    pub utc_offset_minutes: i32,
}

// ---------------------------------------------------------------------------
// SwipeDecision
// ---------------------------------------------------------------------------

/// A viewer's verdict on a target.  At most one per ordered pair, ever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwipeDecision {
    pub viewer_id: UserId,
    pub target_id: UserId,
    pub decision: Decision,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// A mutual like.  `user_a < user_b` always holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Match {
    pub match_id: MatchId,
    pub user_a: UserId,
    pub user_b: UserId,
    pub created_at: DateTime<Utc>,
    pub status: MatchStatus,
    pub blocked_by: Option<UserId>,
    pub blocked_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn involves(&self, user: &UserId) -> bool {
        self.user_a == *user || self.user_b == *user
    }

    /// The other participant, from `me`'s point of view.
    pub fn peer_of(&self, me: &UserId) -> &UserId {
        if self.user_a == *me {
            &self.user_b
        } else {
            &self.user_a
        }
    }
}

// ---------------------------------------------------------------------------
// AbuseSignal
// ---------------------------------------------------------------------------

/// Evidence that a user exceeded the decision velocity threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbuseSignal {
    pub id: Uuid,
    pub user_id: UserId,
    pub window_start: DateTime<Utc>,
    pub decision_count: u32,
    pub severity: AbuseSeverity,
    pub created_at: DateTime<Utc>,
}
