//! Engine tunables.
//!
//! All settings have defaults matching the product rules, so an engine can
//! be built with `EngineConfig::default()` in tests and local development.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use ember_shared::ContentSafetyLevel;

/// Swipe allowance: a daily base plus hourly top-ups.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    /// Decisions available at the start of each viewer-local day.
    pub base_daily_limit: u32,
    /// Extra decisions granted per full hour since the period opened.
    pub hourly_refill: u32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            base_daily_limit: 50,
            hourly_refill: 10,
        }
    }
}

/// Trailing-window velocity limit on decisions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbusePolicy {
    pub window_secs: i64,
    /// Decisions allowed inside one window; the next one is rejected.
    pub threshold: u32,
}

impl AbusePolicy {
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs)
    }
}

impl Default for AbusePolicy {
    fn default() -> Self {
        Self {
            window_secs: 5 * 60,
            threshold: 50,
        }
    }
}

/// Weights for the additive desirability score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Starting score every candidate receives.
    pub base: f64,
    pub distance_penalty_per_km: f64,
    pub max_distance_penalty: f64,
    /// Recency tiers as (max hours since last active, bonus), most recent first.
    pub recency_tiers: [(i64, f64); 3],
    pub verified_bonus: f64,
    /// Quality score 0..=100 maps linearly onto 0..=max_quality_bonus.
    pub max_quality_bonus: f64,
    /// Visibility-only boost for paid tiers.
    pub premium_boost: f64,
    /// Risk scores strictly above this are penalized.
    pub risk_threshold: u8,
    pub risk_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base: 50.0,
            distance_penalty_per_km: 0.5,
            max_distance_penalty: 30.0,
            recency_tiers: [(1, 20.0), (24, 10.0), (24 * 7, 5.0)],
            verified_bonus: 15.0,
            max_quality_bonus: 25.0,
            premium_boost: 5.0,
            risk_threshold: 70,
            risk_penalty: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Candidates fetched per requested slot, to absorb post-filter attrition.
    pub oversample_factor: u32,
    /// Largest queue a client may ask for.
    pub max_limit: u32,
    /// Most explicit content shown in discovery.
    pub max_content_level: ContentSafetyLevel,
    pub include_hidden: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            oversample_factor: 3,
            max_limit: 50,
            max_content_level: ContentSafetyLevel::Suggestive,
            include_hidden: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub quota: QuotaPolicy,
    pub abuse: AbusePolicy,
    pub scoring: ScoringWeights,
    pub queue: QueueSettings,
}
