//! Mutual-like detection.
//!
//! The match id is derived from the canonical pair and the pair is unique
//! in storage, so detection racing from both sides converges on one row.
//! Only the call whose insert actually created the row reports `created`,
//! and only that call publishes the event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use ember_shared::{MatchId, MatchStatus, UserId, UserPair};
use ember_store::{decisions, matches, Match, Store};

use crate::error::{EngineError, Result};
use crate::notify::{MatchEvent, MatchNotifier};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<MatchId>,
    /// The match this call created, if any.  `None` when the pair was
    /// already matched.
    #[serde(skip)]
    pub created: Option<Match>,
}

pub struct MatchDetector {
    notifier: Arc<dyn MatchNotifier>,
}

impl MatchDetector {
    pub fn new(notifier: Arc<dyn MatchNotifier>) -> Self {
        Self { notifier }
    }

    /// Detect inside the caller's immediate transaction.  Does not publish;
    /// call [`Self::publish`] once the transaction has committed.
    pub fn detect_in(
        &self,
        conn: &Connection,
        user_id: &UserId,
        target_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome> {
        let pair = UserPair::new(user_id, target_id)
            .ok_or_else(|| EngineError::InvalidArgument("cannot match with yourself".into()))?;

        if !decisions::has_like(conn, user_id, target_id)?
            || !decisions::has_like(conn, target_id, user_id)?
        {
            return Ok(MatchOutcome::default());
        }

        let match_id = MatchId::for_pair(&pair);
        let candidate = Match {
            match_id: match_id.clone(),
            user_a: pair.low,
            user_b: pair.high,
            created_at: now,
            status: MatchStatus::Active,
            blocked_by: None,
            blocked_at: None,
        };

        if matches::insert_if_absent(conn, &candidate)? {
            info!(match_id = %match_id, user = %user_id, target = %target_id, "match created");
            return Ok(MatchOutcome {
                matched: true,
                match_id: Some(match_id),
                created: Some(candidate),
            });
        }

        // Already matched. A blocked pair stays blocked.
        match matches::get(conn, &match_id)? {
            Some(existing) if existing.status == MatchStatus::Active => Ok(MatchOutcome {
                matched: true,
                match_id: Some(existing.match_id),
                created: None,
            }),
            Some(_) => Ok(MatchOutcome::default()),
            None => Err(EngineError::Conflict(format!(
                "match for pair {} / {} exists under another id",
                user_id, target_id
            ))),
        }
    }

    /// Standalone check-and-create in a transaction of its own.
    pub fn check_and_create(
        &self,
        store: &Store,
        user_id: &UserId,
        target_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome> {
        let outcome = store.with_db(|db| {
            let tx = db.immediate_transaction()?;
            let outcome = self.detect_in(&tx, user_id, target_id, now)?;
            tx.commit()?;
            Ok::<_, EngineError>(outcome)
        })?;

        if let Some(created) = &outcome.created {
            self.publish(created);
        }
        Ok(outcome)
    }

    /// Fire-and-forget notification.  Failures are logged, never returned.
    pub fn publish(&self, created: &Match) {
        let event = MatchEvent::from(created);
        if let Err(e) = self.notifier.publish_match(&event) {
            warn!(match_id = %event.match_id, error = %e, "match notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use ember_shared::Decision;
    use ember_store::{Database, SwipeDecision};

    use crate::error::SinkError;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<MatchEvent>>);

    impl MatchNotifier for Recorder {
        fn publish_match(&self, event: &MatchEvent) -> std::result::Result<(), SinkError> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Failing;

    impl MatchNotifier for Failing {
        fn publish_match(&self, _: &MatchEvent) -> std::result::Result<(), SinkError> {
            Err(SinkError::Other("down".into()))
        }
    }

    fn uid(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    fn like(conn: &Connection, viewer: &str, target: &str) {
        decisions::insert(
            conn,
            &SwipeDecision {
                viewer_id: uid(viewer),
                target_id: uid(target),
                decision: Decision::Like,
                created_at: Utc::now(),
            },
        )
        .unwrap();
    }

    #[test]
    fn one_sided_like_is_not_a_match() {
        let db = Database::open_in_memory().unwrap();
        let detector = MatchDetector::new(Arc::new(Recorder::default()));
        like(db.conn(), "ann", "ben");

        let out = detector.detect_in(db.conn(), &uid("ann"), &uid("ben"), Utc::now()).unwrap();
        assert!(!out.matched);
        assert!(out.match_id.is_none());
    }

    #[test]
    fn both_directions_converge_on_one_match() {
        let db = Database::open_in_memory().unwrap();
        let detector = MatchDetector::new(Arc::new(Recorder::default()));
        like(db.conn(), "ann", "ben");
        like(db.conn(), "ben", "ann");

        let first = detector.detect_in(db.conn(), &uid("ben"), &uid("ann"), Utc::now()).unwrap();
        let second = detector.detect_in(db.conn(), &uid("ann"), &uid("ben"), Utc::now()).unwrap();

        assert!(first.matched && second.matched);
        assert_eq!(first.match_id, second.match_id);
        assert!(first.created.is_some());
        assert!(second.created.is_none());
        assert_eq!(matches::count_for_pair(db.conn(), &uid("ann"), &uid("ben")).unwrap(), 1);
    }

    #[test]
    fn self_match_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let detector = MatchDetector::new(Arc::new(Recorder::default()));
        let err = detector.detect_in(db.conn(), &uid("ann"), &uid("ann"), Utc::now());
        assert!(matches!(err, Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn check_and_create_publishes_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("m.db")).unwrap();
        store
            .with_db(|db| {
                like(db.conn(), "ann", "ben");
                like(db.conn(), "ben", "ann");
                Ok::<_, EngineError>(())
            })
            .unwrap();

        let recorder = Arc::new(Recorder::default());
        let detector = MatchDetector::new(recorder.clone());
        detector.check_and_create(&store, &uid("ann"), &uid("ben"), Utc::now()).unwrap();
        detector.check_and_create(&store, &uid("ben"), &uid("ann"), Utc::now()).unwrap();

        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn notifier_failure_does_not_undo_the_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("m.db")).unwrap();
        store
            .with_db(|db| {
                like(db.conn(), "ann", "ben");
                like(db.conn(), "ben", "ann");
                Ok::<_, EngineError>(())
            })
            .unwrap();

        let detector = MatchDetector::new(Arc::new(Failing));
        let out = detector.check_and_create(&store, &uid("ann"), &uid("ben"), Utc::now()).unwrap();
        assert!(out.matched);

        let stored = store
            .with_db(|db| matches::get(db.conn(), out.match_id.as_ref().unwrap()))
            .unwrap();
        assert!(stored.is_some());
    }
}
