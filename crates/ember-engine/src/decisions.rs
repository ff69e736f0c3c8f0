//! Exactly-once persistence of swipe decisions.
//!
//! The decision row and its quota debit are written in one immediate
//! transaction: a quota failure drops the transaction and with it the
//! decision.  A resubmitted pair returns the first decision untouched and
//! debits nothing.

use chrono::{DateTime, FixedOffset, Utc};
use rusqlite::Connection;
use tracing::debug;

use ember_shared::{Decision, UserId};
use ember_store::{decisions, quotas, Store, SwipeDecision};

use crate::error::{EngineError, Result};
use crate::quota::{Allowance, QuotaLedger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    /// `false` for a resubmission of an already-recorded pair.
    pub was_new: bool,
    /// The stored decision.  For a resubmission this is the original one,
    /// which may differ from what was just sent.
    pub decision: SwipeDecision,
    /// Allowance after this call.
    pub allowance: Allowance,
}

#[derive(Debug, Clone)]
pub struct DecisionRecorder {
    ledger: QuotaLedger,
}

impl DecisionRecorder {
    pub fn new(ledger: QuotaLedger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    /// Record inside the caller's immediate transaction.  On error the
    /// caller must drop the transaction uncommitted.
    pub fn record_in(
        &self,
        conn: &Connection,
        viewer_id: &UserId,
        target_id: &UserId,
        decision: Decision,
        now: DateTime<Utc>,
        offset: &FixedOffset,
    ) -> Result<RecordOutcome> {
        if viewer_id == target_id {
            return Err(EngineError::InvalidArgument(
                "cannot decide on your own profile".into(),
            ));
        }

        if let Some(existing) = decisions::find(conn, viewer_id, target_id)? {
            debug!(viewer = %viewer_id, target = %target_id, "decision resubmitted");
            let stored = quotas::load(conn, viewer_id)?;
            return Ok(RecordOutcome {
                was_new: false,
                decision: existing,
                allowance: self.ledger.project(viewer_id, stored.as_ref(), now, offset),
            });
        }

        let row = SwipeDecision {
            viewer_id: viewer_id.clone(),
            target_id: target_id.clone(),
            decision,
            created_at: now,
        };
        if !decisions::insert(conn, &row)? {
            // The immediate transaction holds the write lock, so the find
            // above cannot have missed a committed row.
            return Err(EngineError::Conflict(format!(
                "decision {viewer_id} -> {target_id} appeared mid-transaction"
            )));
        }

        let allowance = self.ledger.consume_in(conn, viewer_id, now, offset)?;
        debug!(
            viewer = %viewer_id,
            target = %target_id,
            decision = %decision,
            remaining = allowance.remaining,
            "decision recorded"
        );

        Ok(RecordOutcome {
            was_new: true,
            decision: row,
            allowance,
        })
    }

    /// Record in a transaction of its own.
    pub fn record(
        &self,
        store: &Store,
        viewer_id: &UserId,
        target_id: &UserId,
        decision: Decision,
        now: DateTime<Utc>,
        offset: &FixedOffset,
    ) -> Result<RecordOutcome> {
        store.with_db(|db| {
            let tx = db.immediate_transaction()?;
            let outcome = self.record_in(&tx, viewer_id, target_id, decision, now, offset)?;
            tx.commit()?;
            Ok(outcome)
        })
    }
}
