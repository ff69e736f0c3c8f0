//! Quota ledger: how many swipe decisions a user may still make.
//!
//! A period is one viewer-local calendar day.  The period opens lazily on
//! the first touch after midnight; from that instant every full hour adds
//! `hourly_refill` decisions on top of `base_daily_limit`:
//!
//! ```text
//! available = base_daily_limit + floor(hours since period opened) * hourly_refill
//! remaining = available - consumed_count
//! ```
//!
//! [`QuotaLedger::check_allowance`] is a read-only projection for display.
//! Only [`QuotaLedger::consume`] / [`QuotaLedger::consume_in`] may debit,
//! and they do so inside an immediate transaction.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use ember_shared::calendar::{local_date, next_local_midnight};
use ember_shared::UserId;
use ember_store::{quotas, Store, SwipeQuota};

use crate::config::QuotaPolicy;
use crate::error::{EngineError, Result};

/// Snapshot of a user's allowance at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allowance {
    /// Whether one more decision would be accepted.
    pub allowed: bool,
    pub consumed: u32,
    pub available: u32,
    pub remaining: u32,
    /// Next instant `remaining` grows: the next hourly refill or the daily
    /// reset, whichever comes first.
    pub next_refill_at: DateTime<Utc>,
    pub next_daily_reset_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QuotaLedger {
    policy: QuotaPolicy,
}

impl QuotaLedger {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self { policy }
    }

    /// Project the allowance from a stored record without touching storage.
    pub fn project(
        &self,
        user_id: &UserId,
        stored: Option<&SwipeQuota>,
        now: DateTime<Utc>,
        offset: &FixedOffset,
    ) -> Allowance {
        let quota = current_period(user_id, stored, now, offset);
        let anchor = quota.last_refill_at;
        let hours = (now - anchor).num_hours().max(0);
        let hours = u32::try_from(hours).unwrap_or(u32::MAX);

        let available = self
            .policy
            .base_daily_limit
            .saturating_add(hours.saturating_mul(self.policy.hourly_refill));
        let remaining = available.saturating_sub(quota.consumed_count);

        let next_daily_reset_at = next_local_midnight(now, offset);
        let next_hourly = anchor + Duration::hours(i64::from(hours) + 1);
        let next_refill_at = if self.policy.hourly_refill > 0 {
            next_hourly.min(next_daily_reset_at)
        } else {
            next_daily_reset_at
        };

        let reason = (remaining == 0).then(|| {
            format!(
                "all {available} decisions for today are used; more at {}",
                next_refill_at.to_rfc3339()
            )
        });

        Allowance {
            allowed: remaining > 0,
            consumed: quota.consumed_count,
            available,
            remaining,
            next_refill_at,
            next_daily_reset_at,
            reason,
        }
    }

    /// Read-only allowance check.  Never a substitute for [`Self::consume`].
    pub fn check_allowance(
        &self,
        store: &Store,
        user_id: &UserId,
        now: DateTime<Utc>,
        offset: &FixedOffset,
    ) -> Result<Allowance> {
        let stored = store.with_db(|db| quotas::load(db.conn(), user_id))?;
        Ok(self.project(user_id, stored.as_ref(), now, offset))
    }

    /// Debit one decision in a transaction of its own.
    pub fn consume(
        &self,
        store: &Store,
        user_id: &UserId,
        now: DateTime<Utc>,
        offset: &FixedOffset,
    ) -> Result<Allowance> {
        store.with_db(|db| {
            let tx = db.immediate_transaction()?;
            let allowance = self.consume_in(&tx, user_id, now, offset)?;
            tx.commit()?;
            Ok(allowance)
        })
    }

    /// Debit one decision inside the caller's immediate transaction.
    ///
    /// On `QuotaExceeded` nothing has been written; the caller drops the
    /// transaction.  The returned allowance reflects the debit.
    pub fn consume_in(
        &self,
        conn: &Connection,
        user_id: &UserId,
        now: DateTime<Utc>,
        offset: &FixedOffset,
    ) -> Result<Allowance> {
        let stored = quotas::load(conn, user_id)?;
        let mut quota = current_period(user_id, stored.as_ref(), now, offset);
        let before = self.project(user_id, Some(&quota), now, offset);

        if !before.allowed {
            warn!(
                user = %user_id,
                consumed = before.consumed,
                available = before.available,
                next_refill_at = %before.next_refill_at,
                "swipe quota exhausted"
            );
            return Err(EngineError::QuotaExceeded {
                reason: before.reason.unwrap_or_else(|| "quota exhausted".to_string()),
                next_refill_at: before.next_refill_at,
            });
        }

        quota.consumed_count += 1;
        quota.last_consumed_at = Some(now);
        quotas::save(conn, &quota)?;

        let after = self.project(user_id, Some(&quota), now, offset);
        debug!(user = %user_id, remaining = after.remaining, "swipe quota debited");
        Ok(after)
    }
}

/// The record for the period containing `now`.
///
/// A stored period older than today is replaced by a fresh one opening at
/// `now`.  A stored period *newer* than today (the viewer moved to an
/// earlier offset) is kept, so periods only ever advance.
fn current_period(
    user_id: &UserId,
    stored: Option<&SwipeQuota>,
    now: DateTime<Utc>,
    offset: &FixedOffset,
) -> SwipeQuota {
    let today: NaiveDate = local_date(now, offset);
    match stored {
        Some(q) if q.period_date >= today => q.clone(),
        Some(q) => SwipeQuota {
            user_id: user_id.clone(),
            period_date: today,
            consumed_count: 0,
            last_consumed_at: q.last_consumed_at,
            last_refill_at: now,
        },
        None => SwipeQuota {
            user_id: user_id.clone(),
            period_date: today,
            consumed_count: 0,
            last_consumed_at: None,
            last_refill_at: now,
        },
    }
}
