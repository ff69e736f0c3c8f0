//! Decision velocity check.
//!
//! A windowed count of the acting user's own decisions, run before every
//! new decision.  The count reads committed rows without locking, so two
//! racing requests may both slip under the threshold; that slack is
//! acceptable here, unlike quota debits.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use ember_shared::{AbuseSeverity, UserId};
use ember_store::{abuse, decisions, AbuseSignal, Store};

use crate::config::AbusePolicy;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbuseVerdict {
    pub flagged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<AbuseSeverity>,
    /// Decisions in the window, counting the one being inspected.
    pub decision_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_allowed_at: Option<DateTime<Utc>>,
}

impl AbuseVerdict {
    /// `Err(AbuseDetected)` for a flagged verdict.
    pub fn into_result(self) -> Result<Self> {
        match (self.flagged, self.severity, self.next_allowed_at) {
            (true, Some(severity), Some(next_allowed_at)) => Err(EngineError::AbuseDetected {
                severity,
                next_allowed_at,
            }),
            _ => Ok(self),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AbuseMonitor {
    policy: AbusePolicy,
}

impl AbuseMonitor {
    pub fn new(policy: AbusePolicy) -> Self {
        Self { policy }
    }

    /// Count recent decisions and, when one more would cross the threshold,
    /// persist an [`AbuseSignal`] and return a flagged verdict.
    pub fn inspect(&self, store: &Store, user_id: &UserId, now: DateTime<Utc>) -> Result<AbuseVerdict> {
        let window_start = now - self.policy.window();
        let recent = store.with_db(|db| decisions::times_since(db.conn(), user_id, window_start))?;

        let verdict = self.evaluate(&recent, now);
        if let Some(severity) = verdict.severity {
            let signal = AbuseSignal {
                id: Uuid::new_v4(),
                user_id: user_id.clone(),
                window_start,
                decision_count: verdict.decision_count,
                severity,
                created_at: now,
            };
            store.with_db(|db| abuse::insert_signal(db.conn(), &signal))?;

            warn!(
                user = %user_id,
                count = verdict.decision_count,
                threshold = self.policy.threshold,
                severity = %severity,
                "decision velocity flagged"
            );
        }
        Ok(verdict)
    }

    /// Pure part of [`Self::inspect`]: `recent` holds in-window decision
    /// times, oldest first.
    pub fn evaluate(&self, recent: &[DateTime<Utc>], now: DateTime<Utc>) -> AbuseVerdict {
        let threshold = self.policy.threshold as usize;
        let attempted = recent.len() + 1;
        let decision_count = u32::try_from(attempted).unwrap_or(u32::MAX);

        // Zero disables the monitor.
        if threshold == 0 || attempted <= threshold {
            return AbuseVerdict {
                flagged: false,
                severity: None,
                decision_count,
                next_allowed_at: None,
            };
        }

        let severity = if attempted >= threshold.saturating_mul(2) {
            AbuseSeverity::Severe
        } else {
            AbuseSeverity::Elevated
        };

        // Once this one ages out, `threshold - 1` remain and one more fits.
        // Rows at exactly the window edge still count, hence the extra second.
        let pivot = recent[recent.len() - threshold];
        let next_allowed_at = (pivot + self.policy.window() + Duration::seconds(1)).max(now);

        AbuseVerdict {
            flagged: true,
            severity: Some(severity),
            decision_count,
            next_allowed_at: Some(next_allowed_at),
        }
    }
}
