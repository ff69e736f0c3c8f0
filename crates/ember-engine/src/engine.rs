//! [`SwipeEngine`]: the client-facing operations.
//!
//! Every method is synchronous and does blocking SQLite I/O; async callers
//! run them on a blocking thread.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ember_shared::calendar::fixed_offset;
use ember_shared::constants::{MAX_AGE, MIN_AGE};
use ember_shared::{
    AccountStatus, Decision, Gender, GeoPoint, MatchId, MatchStatus, SubscriptionTier, UserId,
    UserPair,
};
use ember_store::codec::ts_to_sql;
use ember_store::matches::{self, MatchCursor};
use ember_store::{decisions, profiles, CandidateProfile, Match, Store};

use crate::abuse::AbuseMonitor;
use crate::analytics::{AnalyticsSink, LogAnalytics, SwipeEvent};
use crate::candidates::CandidateStore;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::decisions::DecisionRecorder;
use crate::eligibility::EligibilityGate;
use crate::error::{EngineError, Result};
use crate::matching::{MatchDetector, MatchOutcome};
use crate::notify::{LogNotifier, MatchNotifier};
use crate::queue::{Preferences, QueueBuilder, Viewer};
use crate::quota::QuotaLedger;
use crate::scoring::{ScoredCandidate, Scorer};

const DEFAULT_MATCH_PAGE: u32 = 20;
const MAX_MATCH_PAGE: u32 = 100;

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRequest {
    pub location: GeoPoint,
    pub radius_km: f64,
    pub min_age: u8,
    pub max_age: u8,
    pub genders: Vec<Gender>,
    pub limit: u32,
    /// Viewer's UTC offset; falls back to the stored profile.
    #[serde(default)]
    pub tz_offset_minutes: Option<i32>,
}

/// What a viewer sees of a candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    pub user_id: UserId,
    pub gender: Gender,
    pub age: u8,
    pub verified: bool,
    pub distance_km: f64,
    pub score: f64,
}

impl From<ScoredCandidate> for QueueEntry {
    fn from(c: ScoredCandidate) -> Self {
        Self {
            user_id: c.profile.user_id,
            gender: c.profile.gender,
            age: c.profile.age,
            verified: c.profile.verified,
            distance_km: (c.distance_km * 10.0).round() / 10.0,
            score: c.score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueResponse {
    pub candidates: Vec<QueueEntry>,
    pub quota_remaining: u32,
    pub next_refill_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionResponse {
    pub was_new: bool,
    /// The stored decision; differs from the submitted one on a resubmission
    /// that changed its mind.
    pub decision: Decision,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<MatchId>,
    pub quota_remaining: u32,
    pub next_refill_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub consumed_today: u32,
    pub available: u32,
    pub remaining: u32,
    pub next_refill_at: DateTime<Utc>,
    pub next_daily_reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub peer_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchPage {
    pub matches: Vec<MatchSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Profile snapshot pushed by profile-update code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub gender: Gender,
    pub orientation_preference: Vec<Gender>,
    pub age: u8,
    pub location: GeoPoint,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub age_verified: bool,
    #[serde(default)]
    pub quality_score: u8,
    #[serde(default = "default_content_level")]
    pub content_safety_level: ember_shared::ContentSafetyLevel,
    #[serde(default)]
    pub risk_score: u8,
    pub account_status: AccountStatus,
    #[serde(default)]
    pub hidden: bool,
    pub last_active_at: DateTime<Utc>,
    #[serde(default = "default_tier")]
    pub subscription_tier: SubscriptionTier,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_content_level() -> ember_shared::ContentSafetyLevel {
    ember_shared::ContentSafetyLevel::Safe
}

fn default_tier() -> SubscriptionTier {
    SubscriptionTier::Free
}

impl ProfileUpdate {
    pub fn into_profile(self, user_id: UserId) -> Result<CandidateProfile> {
        if self.age > MAX_AGE {
            return Err(EngineError::InvalidArgument(format!("age above {MAX_AGE}")));
        }
        if self.quality_score > 100 || self.risk_score > 100 {
            return Err(EngineError::InvalidArgument(
                "quality and risk scores are 0-100".into(),
            ));
        }
        if self.orientation_preference.is_empty() {
            return Err(EngineError::InvalidArgument(
                "orientation preference must name at least one gender".into(),
            ));
        }
        fixed_offset(self.utc_offset_minutes)?;
        let location = GeoPoint::new(self.location.lat, self.location.lng)?;

        Ok(CandidateProfile {
            user_id,
            gender: self.gender,
            orientation_preference: self.orientation_preference,
            age: self.age,
            location,
            verified: self.verified,
            age_verified: self.age_verified,
            quality_score: self.quality_score,
            content_safety_level: self.content_safety_level,
            risk_score: self.risk_score,
            account_status: self.account_status,
            hidden: self.hidden,
            last_active_at: self.last_active_at,
            subscription_tier: self.subscription_tier,
            utc_offset_minutes: self.utc_offset_minutes,
        })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SwipeEngine {
    store: Arc<Store>,
    candidates: Arc<dyn CandidateStore>,
    gate: Arc<dyn EligibilityGate>,
    analytics: Arc<dyn AnalyticsSink>,
    clock: Arc<dyn Clock>,
    queue: QueueBuilder,
    recorder: DecisionRecorder,
    detector: MatchDetector,
    abuse: AbuseMonitor,
    config: EngineConfig,
}

impl SwipeEngine {
    /// An engine backed entirely by `store`, logging its events, on the
    /// system clock.
    pub fn new(store: Arc<Store>, config: EngineConfig) -> Self {
        Self {
            candidates: store.clone(),
            gate: store.clone(),
            store,
            analytics: Arc::new(LogAnalytics),
            clock: Arc::new(SystemClock),
            queue: QueueBuilder::new(Scorer::new(config.scoring), config.queue.clone()),
            recorder: DecisionRecorder::new(QuotaLedger::new(config.quota)),
            detector: MatchDetector::new(Arc::new(LogNotifier)),
            abuse: AbuseMonitor::new(config.abuse),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn MatchNotifier>) -> Self {
        self.detector = MatchDetector::new(notifier);
        self
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn with_candidates(mut self, candidates: Arc<dyn CandidateStore>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn EligibilityGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Build a ranked queue.  Consumes no quota.
    pub fn get_queue(&self, viewer_id: &UserId, req: &QueueRequest) -> Result<QueueResponse> {
        self.gate.is_eligible(viewer_id)?.require()?;

        let prefs = Preferences {
            genders: req.genders.clone(),
            min_age: req.min_age.max(MIN_AGE),
            max_age: req.max_age,
            radius_km: req.radius_km,
        };
        prefs.validate()?;

        // Deserialized points skip the range check.
        let location = GeoPoint::new(req.location.lat, req.location.lng)?;
        let me = self.viewer_profile(viewer_id)?;
        let offset = self.resolve_offset(req.tz_offset_minutes, Some(&me))?;
        let viewer = Viewer {
            id: viewer_id.clone(),
            gender: me.gender,
            location,
        };

        let now = self.clock.now();
        let ranked = self
            .queue
            .build(&self.store, self.candidates.as_ref(), &viewer, &prefs, req.limit, now)?;
        let allowance = self
            .recorder
            .ledger()
            .check_allowance(&self.store, viewer_id, now, &offset)?;

        Ok(QueueResponse {
            candidates: ranked.into_iter().map(QueueEntry::from).collect(),
            quota_remaining: allowance.remaining,
            next_refill_at: allowance.next_refill_at,
        })
    }

    /// Record a like or dislike, debit quota and detect a mutual like.
    ///
    /// Gates run in order: eligibility, argument validation, abuse.  A
    /// resubmission of an already-decided pair skips the abuse count and
    /// returns the original outcome.
    pub fn submit_decision(
        &self,
        viewer_id: &UserId,
        target_id: &UserId,
        decision: Decision,
        tz_offset_minutes: Option<i32>,
    ) -> Result<DecisionResponse> {
        self.gate.is_eligible(viewer_id)?.require()?;

        if viewer_id == target_id {
            return Err(EngineError::InvalidArgument(
                "cannot decide on your own profile".into(),
            ));
        }
        if self.candidates.profile(target_id)?.is_none() {
            return Err(EngineError::NotFound(format!("profile {target_id}")));
        }
        let me = self.candidates.profile(viewer_id)?;
        let offset = self.resolve_offset(tz_offset_minutes, me.as_ref())?;
        let now = self.clock.now();

        let already_decided = self
            .store
            .with_db(|db| decisions::find(db.conn(), viewer_id, target_id))?
            .is_some();
        if !already_decided {
            self.abuse.inspect(&self.store, viewer_id, now)?.into_result()?;
        }

        let result = self.store.with_db(|db| {
            let tx = db.immediate_transaction()?;
            let recorded = self
                .recorder
                .record_in(&tx, viewer_id, target_id, decision, now, &offset)?;

            let matched = if recorded.was_new {
                if recorded.decision.decision == Decision::Like {
                    self.detector.detect_in(&tx, viewer_id, target_id, now)?
                } else {
                    MatchOutcome::default()
                }
            } else {
                existing_match(&tx, viewer_id, target_id)?
            };

            tx.commit()?;
            Ok::<_, EngineError>((recorded, matched))
        });

        let (recorded, matched) = match result {
            Ok(done) => done,
            Err(EngineError::QuotaExceeded {
                reason,
                next_refill_at,
            }) => {
                self.emit(SwipeEvent::LimitHit {
                    user_id: viewer_id.clone(),
                    next_refill_at,
                    at: now,
                });
                return Err(EngineError::QuotaExceeded {
                    reason,
                    next_refill_at,
                });
            }
            Err(e) => return Err(e),
        };

        if recorded.was_new {
            self.emit(SwipeEvent::Swipe {
                viewer_id: viewer_id.clone(),
                target_id: target_id.clone(),
                decision,
                remaining: recorded.allowance.remaining,
                at: now,
            });
        }
        if let Some(created) = &matched.created {
            self.detector.publish(created);
            self.emit(SwipeEvent::Match {
                match_id: created.match_id.clone(),
                user_a: created.user_a.clone(),
                user_b: created.user_b.clone(),
                at: now,
            });
        }

        Ok(DecisionResponse {
            was_new: recorded.was_new,
            decision: recorded.decision.decision,
            matched: matched.matched,
            match_id: matched.match_id,
            quota_remaining: recorded.allowance.remaining,
            next_refill_at: recorded.allowance.next_refill_at,
        })
    }

    pub fn quota_status(
        &self,
        viewer_id: &UserId,
        tz_offset_minutes: Option<i32>,
    ) -> Result<QuotaStatus> {
        let me = self.candidates.profile(viewer_id)?;
        let offset = self.resolve_offset(tz_offset_minutes, me.as_ref())?;
        let a = self
            .recorder
            .ledger()
            .check_allowance(&self.store, viewer_id, self.clock.now(), &offset)?;

        Ok(QuotaStatus {
            consumed_today: a.consumed,
            available: a.available,
            remaining: a.remaining,
            next_refill_at: a.next_refill_at,
            next_daily_reset_at: a.next_daily_reset_at,
        })
    }

    /// Active matches, newest first.
    pub fn list_matches(
        &self,
        viewer_id: &UserId,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<MatchPage> {
        let limit = limit.unwrap_or(DEFAULT_MATCH_PAGE).clamp(1, MAX_MATCH_PAGE);
        let cursor = cursor.map(decode_cursor).transpose()?;

        let mut rows = self.store.with_db(|db| {
            matches::list_for_user(
                db.conn(),
                viewer_id,
                MatchStatus::Active,
                cursor.as_ref(),
                limit + 1,
            )
        })?;

        let next_cursor = if rows.len() > limit as usize {
            rows.truncate(limit as usize);
            rows.last().map(encode_cursor)
        } else {
            None
        };

        Ok(MatchPage {
            matches: rows
                .iter()
                .map(|m| MatchSummary {
                    match_id: m.match_id.clone(),
                    peer_id: m.peer_of(viewer_id).clone(),
                    created_at: m.created_at,
                })
                .collect(),
            next_cursor,
        })
    }

    /// Block a match the viewer takes part in.  Blocking twice is fine.
    pub fn block_match(&self, viewer_id: &UserId, match_id: &MatchId) -> Result<Match> {
        let now = self.clock.now();
        self.store.with_db(|db| {
            let tx = db.immediate_transaction()?;
            let Some(existing) = matches::get(&tx, match_id)? else {
                return Err(EngineError::NotFound(format!("match {match_id}")));
            };
            // Non-participants learn nothing about the match.
            if !existing.involves(viewer_id) {
                return Err(EngineError::NotFound(format!("match {match_id}")));
            }

            if matches::set_blocked(&tx, match_id, viewer_id, now)? {
                info!(match_id = %match_id, by = %viewer_id, "match blocked");
            }
            let updated = matches::get(&tx, match_id)?
                .ok_or_else(|| EngineError::Internal(format!("match {match_id} vanished")))?;
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Refresh one profile in the candidate index.
    pub fn upsert_profile(&self, user_id: UserId, update: ProfileUpdate) -> Result<()> {
        let profile = update.into_profile(user_id)?;
        let now = self.clock.now();
        self.store
            .with_db(|db| profiles::upsert(db.conn(), &profile, now))?;
        debug!(user = %profile.user_id, status = %profile.account_status, "profile resynced");
        Ok(())
    }

    fn viewer_profile(&self, viewer_id: &UserId) -> Result<CandidateProfile> {
        self.candidates
            .profile(viewer_id)?
            .ok_or_else(|| EngineError::NotFound(format!("profile {viewer_id}")))
    }

    fn resolve_offset(
        &self,
        requested: Option<i32>,
        profile: Option<&CandidateProfile>,
    ) -> Result<FixedOffset> {
        let minutes = requested
            .or_else(|| profile.map(|p| p.utc_offset_minutes))
            .unwrap_or(0);
        Ok(fixed_offset(minutes)?)
    }

    fn emit(&self, event: SwipeEvent) {
        let kind = event.kind();
        if let Err(e) = self.analytics.emit(event) {
            warn!(kind, error = %e, "analytics event dropped");
        }
    }
}

/// Match state for a resubmitted decision, without re-running detection.
fn existing_match(
    conn: &rusqlite::Connection,
    viewer_id: &UserId,
    target_id: &UserId,
) -> Result<MatchOutcome> {
    let Some(pair) = UserPair::new(viewer_id, target_id) else {
        return Ok(MatchOutcome::default());
    };
    let found = matches::get(conn, &MatchId::for_pair(&pair))?
        .filter(|m| m.status == MatchStatus::Active);
    Ok(MatchOutcome {
        matched: found.is_some(),
        match_id: found.map(|m| m.match_id),
        created: None,
    })
}

fn encode_cursor(m: &Match) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}|{}", ts_to_sql(&m.created_at), m.match_id))
}

fn decode_cursor(raw: &str) -> Result<MatchCursor> {
    let invalid = || EngineError::InvalidArgument("malformed cursor".into());

    let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    let (ts, id) = text.split_once('|').ok_or_else(invalid)?;
    let created_at = DateTime::parse_from_rfc3339(ts)
        .map_err(|_| invalid())?
        .with_timezone(&Utc);
    if id.is_empty() {
        return Err(invalid());
    }

    Ok(MatchCursor {
        created_at,
        match_id: MatchId(id.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cursor_survives_encoding() {
        let m = Match {
            match_id: MatchId("abc123".into()),
            user_a: UserId::parse("a").unwrap(),
            user_b: UserId::parse("b").unwrap(),
            created_at: Utc.with_ymd_and_hms(2026, 2, 3, 4, 5, 6).unwrap(),
            status: MatchStatus::Active,
            blocked_by: None,
            blocked_at: None,
        };
        let cursor = decode_cursor(&encode_cursor(&m)).unwrap();
        assert_eq!(cursor.created_at, m.created_at);
        assert_eq!(cursor.match_id, m.match_id);
    }

    #[test]
    fn garbage_cursor_is_invalid_argument() {
        for raw in ["!!!", "bm8tc2VwYXJhdG9y", ""] {
            assert!(matches!(
                decode_cursor(raw),
                Err(EngineError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn profile_update_is_validated() {
        let update = ProfileUpdate {
            gender: Gender::Female,
            orientation_preference: vec![],
            age: 30,
            location: GeoPoint::new(0.0, 0.0).unwrap(),
            verified: false,
            age_verified: true,
            quality_score: 10,
            content_safety_level: ember_shared::ContentSafetyLevel::Safe,
            risk_score: 0,
            account_status: AccountStatus::Active,
            hidden: false,
            last_active_at: Utc::now(),
            subscription_tier: SubscriptionTier::Free,
            utc_offset_minutes: 0,
        };
        let user = UserId::parse("u").unwrap();
        assert!(update.clone().into_profile(user.clone()).is_err());

        let mut bad_tz = update.clone();
        bad_tz.orientation_preference = vec![Gender::Male];
        bad_tz.utc_offset_minutes = 15 * 60;
        assert!(bad_tz.into_profile(user.clone()).is_err());

        let mut ok = update;
        ok.orientation_preference = vec![Gender::Male];
        assert!(ok.into_profile(user).is_ok());
    }
}
