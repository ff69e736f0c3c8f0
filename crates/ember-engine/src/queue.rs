//! Builds a viewer's swipe queue.
//!
//! 1. Load every target the viewer already decided on; those never resurface.
//! 2. Oversample the candidate store.
//! 3. Drop self, decided, mutually incompatible, out-of-radius and
//!    ineligible candidates.
//! 4. Score, sort and truncate.
//!
//! Building a queue never touches the quota.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ember_shared::constants::{MAX_AGE, MAX_RADIUS_KM, MIN_AGE};
use ember_shared::{AccountStatus, Gender, GeoPoint, UserId};
use ember_store::{decisions, CandidateProfile, Store};

use crate::candidates::{CandidateFilter, CandidateStore};
use crate::config::QueueSettings;
use crate::error::{EngineError, Result};
use crate::scoring::{ScoredCandidate, Scorer};

/// What the viewer is looking for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub genders: Vec<Gender>,
    pub min_age: u8,
    pub max_age: u8,
    pub radius_km: f64,
}

impl Preferences {
    pub fn validate(&self) -> Result<()> {
        if self.genders.is_empty() {
            return Err(EngineError::InvalidArgument(
                "at least one gender preference is required".into(),
            ));
        }
        if self.min_age < MIN_AGE || self.max_age > MAX_AGE || self.min_age > self.max_age {
            return Err(EngineError::InvalidArgument(format!(
                "age range {}-{} must lie within {MIN_AGE}-{MAX_AGE}",
                self.min_age, self.max_age
            )));
        }
        if !self.radius_km.is_finite() || self.radius_km <= 0.0 || self.radius_km > MAX_RADIUS_KM {
            return Err(EngineError::InvalidArgument(format!(
                "radius must be in (0, {MAX_RADIUS_KM}] km"
            )));
        }
        Ok(())
    }
}

/// The viewer as the queue builder needs to see them.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub id: UserId,
    pub gender: Gender,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    SelfProfile,
    Decided,
    Incompatible,
    OutOfRadius,
    Ineligible,
    AgeOutOfRange,
}

#[derive(Debug, Clone)]
pub struct QueueBuilder {
    scorer: Scorer,
    settings: QueueSettings,
}

impl QueueBuilder {
    pub fn new(scorer: Scorer, settings: QueueSettings) -> Self {
        Self { scorer, settings }
    }

    pub fn build(
        &self,
        store: &Store,
        candidates: &dyn CandidateStore,
        viewer: &Viewer,
        prefs: &Preferences,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredCandidate>> {
        prefs.validate()?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit.min(self.settings.max_limit);

        let decided = store.with_db(|db| decisions::decided_targets(db.conn(), &viewer.id))?;

        let filter = CandidateFilter {
            viewer_id: viewer.id.clone(),
            min_age: prefs.min_age,
            max_age: prefs.max_age,
            genders: prefs.genders.clone(),
            viewer_gender: viewer.gender,
            center: viewer.location,
            radius_km: prefs.radius_km,
            statuses: vec![AccountStatus::Active],
            max_content_level: self.settings.max_content_level,
            include_hidden: self.settings.include_hidden,
            skip_decided: true,
            limit: limit.saturating_mul(self.settings.oversample_factor.max(1)),
        };
        let fetched = candidates.find_candidates(&filter)?;
        let fetched_count = fetched.len();

        let mut seen = HashSet::new();
        let mut skipped = 0usize;
        let survivors: Vec<CandidateProfile> = fetched
            .into_iter()
            .filter(|candidate| match self.skip_reason(viewer, prefs, &decided, candidate) {
                Some(reason) => {
                    debug!(viewer = %viewer.id, candidate = %candidate.user_id, ?reason, "candidate skipped");
                    skipped += 1;
                    false
                }
                None => seen.insert(candidate.user_id.clone()),
            })
            .collect();

        let mut ranked = self.scorer.rank(survivors, &viewer.location, now);
        ranked.truncate(limit as usize);

        debug!(
            viewer = %viewer.id,
            fetched = fetched_count,
            skipped,
            returned = ranked.len(),
            "queue built"
        );
        Ok(ranked)
    }

    fn skip_reason(
        &self,
        viewer: &Viewer,
        prefs: &Preferences,
        decided: &HashSet<UserId>,
        candidate: &CandidateProfile,
    ) -> Option<Skip> {
        if candidate.user_id == viewer.id {
            return Some(Skip::SelfProfile);
        }
        if decided.contains(&candidate.user_id) {
            return Some(Skip::Decided);
        }
        if !is_mutually_compatible(viewer.gender, &prefs.genders, candidate) {
            return Some(Skip::Incompatible);
        }
        if candidate.age < prefs.min_age || candidate.age > prefs.max_age {
            return Some(Skip::AgeOutOfRange);
        }
        if viewer.location.distance_km(&candidate.location) > prefs.radius_km {
            return Some(Skip::OutOfRadius);
        }
        if !candidate.account_status.is_eligible() {
            return Some(Skip::Ineligible);
        }
        None
    }
}

/// The viewer wants the candidate's gender and the candidate wants the
/// viewer's.
pub fn is_mutually_compatible(
    viewer_gender: Gender,
    viewer_seeks: &[Gender],
    candidate: &CandidateProfile,
) -> bool {
    viewer_seeks.contains(&candidate.gender)
        && candidate.orientation_preference.contains(&viewer_gender)
}
