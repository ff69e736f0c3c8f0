//! Relative desirability of a candidate for one viewer.
//!
//! [`Scorer::score`] is a pure function of the candidate snapshot, the
//! viewer's location and `now`; the same inputs always give the same
//! score.  Components are additive and the total is clamped at zero.
//! Ineligible accounts are filtered out before scoring, never penalized
//! here.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use ember_shared::GeoPoint;
use ember_store::CandidateProfile;

use crate::config::ScoringWeights;

#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoringWeights,
}

/// A candidate with its computed score and distance.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub profile: CandidateProfile,
    pub score: f64,
    pub distance_km: f64,
}

impl Scorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn score(
        &self,
        candidate: &CandidateProfile,
        viewer_location: &GeoPoint,
        now: DateTime<Utc>,
    ) -> f64 {
        let distance_km = viewer_location.distance_km(&candidate.location);
        self.score_at_distance(candidate, distance_km, now)
    }

    fn score_at_distance(
        &self,
        candidate: &CandidateProfile,
        distance_km: f64,
        now: DateTime<Utc>,
    ) -> f64 {
        let w = &self.weights;

        let mut score = w.base;
        score -= self.distance_penalty(distance_km);
        score += self.recency_bonus(candidate.last_active_at, now);
        if candidate.verified {
            score += w.verified_bonus;
        }
        score += f64::from(candidate.quality_score.min(100)) / 100.0 * w.max_quality_bonus;
        if candidate.subscription_tier.is_premium() {
            score += w.premium_boost;
        }
        if candidate.risk_score > w.risk_threshold {
            score -= w.risk_penalty;
        }

        score.max(0.0)
    }

    /// Non-decreasing in distance, never above `max_distance_penalty`.
    pub fn distance_penalty(&self, distance_km: f64) -> f64 {
        (distance_km.max(0.0) * self.weights.distance_penalty_per_km)
            .min(self.weights.max_distance_penalty)
    }

    /// Step function over hours since last activity.  Activity reported in
    /// the future counts as "now".
    pub fn recency_bonus(&self, last_active_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let idle_secs = (now - last_active_at).num_seconds().max(0);
        self.weights
            .recency_tiers
            .iter()
            .find(|(max_hours, _)| idle_secs <= max_hours * 3600)
            .map(|(_, bonus)| *bonus)
            .unwrap_or(0.0)
    }

    /// Score and order candidates: score descending, then user id ascending.
    pub fn rank(
        &self,
        candidates: Vec<CandidateProfile>,
        viewer_location: &GeoPoint,
        now: DateTime<Utc>,
    ) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|profile| {
                let distance_km = viewer_location.distance_km(&profile.location);
                let score = self.score_at_distance(&profile, distance_km, now);
                ScoredCandidate {
                    profile,
                    score,
                    distance_km,
                }
            })
            .collect();

        scored.sort_by(compare_ranked);
        scored
    }
}

fn compare_ranked(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.profile.user_id.cmp(&b.profile.user_id))
}
