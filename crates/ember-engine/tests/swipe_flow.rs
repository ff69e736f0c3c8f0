mod common;

use std::sync::Arc;

use chrono::Duration;

use common::*;
use ember_engine::analytics::{ChannelAnalytics, SwipeEvent};
use ember_engine::clock::Clock;
use ember_engine::config::{AbusePolicy, EngineConfig, QuotaPolicy};
use ember_engine::EngineError;
use ember_shared::{AbuseSeverity, AccountStatus, Decision, Gender, MatchStatus};
use ember_store::{abuse, decisions, matches};

#[test]
fn quota_exhaustion_then_hourly_refill() {
    let h = harness_with(EngineConfig {
        quota: QuotaPolicy {
            base_daily_limit: 50,
            hourly_refill: 10,
        },
        abuse: AbusePolicy {
            window_secs: 300,
            threshold: 1_000,
        },
        ..EngineConfig::default()
    });
    let viewer = h.man("viewer");
    let targets: Vec<_> = (0..62).map(|i| h.woman(&format!("t{i:02}"))).collect();

    for target in &targets[..50] {
        h.engine
            .submit_decision(&viewer, target, Decision::Dislike, None)
            .unwrap();
    }

    let denied = h
        .engine
        .submit_decision(&viewer, &targets[50], Decision::Dislike, None)
        .unwrap_err();
    match denied {
        EngineError::QuotaExceeded { next_refill_at, .. } => {
            assert_eq!(next_refill_at, start() + Duration::hours(1));
        }
        other => panic!("expected QuotaExceeded, got {other:?}"),
    }
    // the denied decision left nothing behind
    let stray = h
        .store
        .with_db(|db| decisions::find(db.conn(), &viewer, &targets[50]))
        .unwrap();
    assert!(stray.is_none());

    h.clock.advance(Duration::hours(1));
    let status = h.engine.quota_status(&viewer, None).unwrap();
    assert_eq!(status.available, 60);
    assert_eq!(status.remaining, 10);

    let mut last = None;
    for target in &targets[50..60] {
        last = Some(
            h.engine
                .submit_decision(&viewer, target, Decision::Dislike, None)
                .unwrap(),
        );
    }
    assert_eq!(last.unwrap().quota_remaining, 0);
    assert!(matches!(
        h.engine
            .submit_decision(&viewer, &targets[60], Decision::Dislike, None),
        Err(EngineError::QuotaExceeded { .. })
    ));
}

#[test]
fn resubmission_is_idempotent_and_first_write_wins() {
    let h = harness();
    let viewer = h.man("viewer");
    let target = h.woman("target");

    let first = h
        .engine
        .submit_decision(&viewer, &target, Decision::Dislike, None)
        .unwrap();
    assert!(first.was_new);

    let retry = h
        .engine
        .submit_decision(&viewer, &target, Decision::Like, None)
        .unwrap();
    assert!(!retry.was_new);
    assert_eq!(retry.decision, Decision::Dislike);
    assert_eq!(retry.quota_remaining, first.quota_remaining);

    let status = h.engine.quota_status(&viewer, None).unwrap();
    assert_eq!(status.consumed_today, 1);
}

#[test]
fn decided_targets_never_resurface() {
    let h = harness_with(relaxed());
    let viewer = h.man("viewer");
    let liked = h.woman("liked");
    let passed = h.woman("passed");
    let fresh = h.woman("fresh");

    let before = h.engine.get_queue(&viewer, &queue_for(&[Gender::Female])).unwrap();
    assert_eq!(before.candidates.len(), 3);

    h.engine.submit_decision(&viewer, &liked, Decision::Like, None).unwrap();
    h.engine.submit_decision(&viewer, &passed, Decision::Dislike, None).unwrap();

    for _ in 0..3 {
        let queue = h.engine.get_queue(&viewer, &queue_for(&[Gender::Female])).unwrap();
        let ids: Vec<_> = queue.candidates.iter().map(|c| c.user_id.clone()).collect();
        assert_eq!(ids, vec![fresh.clone()]);
        h.clock.advance(Duration::days(2));
    }
}

#[test]
fn building_a_queue_consumes_no_quota() {
    let h = harness();
    let viewer = h.man("viewer");
    h.woman("w1");

    for _ in 0..5 {
        let q = h.engine.get_queue(&viewer, &queue_for(&[Gender::Female])).unwrap();
        assert_eq!(q.quota_remaining, 50);
    }
    assert_eq!(h.engine.quota_status(&viewer, None).unwrap().consumed_today, 0);
}

#[test]
fn orientation_mismatch_is_excluded() {
    let h = harness();
    let viewer = h.add("viewer", person(Gender::Female, &[Gender::Female], 0.0, 0.0));
    // seeks men only, right next door, verified and high quality
    let mut close = person(Gender::Female, &[Gender::Male], 0.0001, 0.0);
    close.verified = true;
    close.quality_score = 100;
    h.add("straight", close);
    let compatible = h.add("compatible", person(Gender::Female, &[Gender::Female], 0.1, 0.1));

    let queue = h.engine.get_queue(&viewer, &queue_for(&[Gender::Female])).unwrap();
    let ids: Vec<_> = queue.candidates.iter().map(|c| c.user_id.clone()).collect();
    assert_eq!(ids, vec![compatible]);
}

#[test]
fn one_sided_candidates_do_not_crowd_out_compatible_ones() {
    let h = harness();
    let viewer = h.man("viewer");
    // more recently active than anyone compatible, and all seeking women
    for i in 0..3 {
        let mut p = person(Gender::Female, &[Gender::Female], 0.002, 0.002);
        p.last_active_at = start() - Duration::minutes(1);
        h.add(&format!("lesbian{i}"), p);
    }
    let mut seeks_men = person(Gender::Female, &[Gender::Male], 0.002, 0.002);
    seeks_men.last_active_at = start() - Duration::hours(2);
    let compatible = h.add("compatible", seeks_men);

    let mut req = queue_for(&[Gender::Female]);
    req.limit = 1;
    let queue = h.engine.get_queue(&viewer, &req).unwrap();
    let ids: Vec<_> = queue.candidates.iter().map(|c| c.user_id.clone()).collect();
    assert_eq!(ids, vec![compatible]);
}

#[test]
fn queue_is_ranked_deterministically() {
    let h = harness();
    let viewer = h.man("viewer");
    let mut verified = person(Gender::Female, &[Gender::Male], 0.01, 0.0);
    verified.verified = true;
    h.add("b-verified", verified);
    h.add("a-plain", person(Gender::Female, &[Gender::Male], 0.01, 0.0));
    h.add("c-plain", person(Gender::Female, &[Gender::Male], 0.01, 0.0));
    let mut suspended = person(Gender::Female, &[Gender::Male], 0.01, 0.0);
    suspended.account_status = AccountStatus::Suspended;
    h.add("d-suspended", suspended);

    let first = h.engine.get_queue(&viewer, &queue_for(&[Gender::Female])).unwrap();
    let ids: Vec<&str> = first.candidates.iter().map(|c| c.user_id.as_str()).collect();
    assert_eq!(ids, vec!["b-verified", "a-plain", "c-plain"]);

    let second = h.engine.get_queue(&viewer, &queue_for(&[Gender::Female])).unwrap();
    assert_eq!(first.candidates, second.candidates);
}

#[test]
fn mutual_like_creates_exactly_one_match() {
    let h = harness();
    let ann = h.woman("ann");
    let bob = h.man("bob");

    let one_sided = h.engine.submit_decision(&ann, &bob, Decision::Like, None).unwrap();
    assert!(!one_sided.matched);

    let mutual = h.engine.submit_decision(&bob, &ann, Decision::Like, None).unwrap();
    assert!(mutual.matched);
    let match_id = mutual.match_id.clone().unwrap();

    // a retry from either side reports the match without creating another
    let retry = h.engine.submit_decision(&ann, &bob, Decision::Like, None).unwrap();
    assert!(!retry.was_new);
    assert_eq!(retry.match_id, Some(match_id.clone()));

    assert_eq!(h.notifier.count(), 1);
    let count = h
        .store
        .with_db(|db| matches::count_for_pair(db.conn(), &ann, &bob))
        .unwrap();
    assert_eq!(count, 1);

    for user in [&ann, &bob] {
        let page = h.engine.list_matches(user, None, None).unwrap();
        assert_eq!(page.matches.len(), 1);
        assert_eq!(page.matches[0].match_id, match_id);
    }
    let page = h.engine.list_matches(&ann, None, None).unwrap();
    assert_eq!(page.matches[0].peer_id, bob);
}

#[test]
fn like_then_dislike_is_no_match() {
    let h = harness();
    let ann = h.woman("ann");
    let bob = h.man("bob");

    h.engine.submit_decision(&ann, &bob, Decision::Like, None).unwrap();
    let out = h.engine.submit_decision(&bob, &ann, Decision::Dislike, None).unwrap();
    assert!(!out.matched);
    assert_eq!(h.notifier.count(), 0);
}

#[test]
fn abuse_threshold_rejects_the_51st_decision() {
    let h = harness_with(EngineConfig {
        quota: QuotaPolicy {
            base_daily_limit: 1_000,
            hourly_refill: 0,
        },
        ..EngineConfig::default()
    });
    let viewer = h.man("viewer");
    let targets: Vec<_> = (0..51).map(|i| h.woman(&format!("t{i:02}"))).collect();

    for target in &targets[..50] {
        h.engine
            .submit_decision(&viewer, target, Decision::Dislike, None)
            .unwrap();
        h.clock.advance(Duration::seconds(2));
    }

    let err = h
        .engine
        .submit_decision(&viewer, &targets[50], Decision::Dislike, None)
        .unwrap_err();
    match err {
        EngineError::AbuseDetected {
            severity,
            next_allowed_at,
        } => {
            assert_eq!(severity, AbuseSeverity::Elevated);
            assert!(next_allowed_at > h.clock.now());
        }
        other => panic!("expected AbuseDetected, got {other:?}"),
    }

    let signals = h
        .store
        .with_db(|db| abuse::signals_for(db.conn(), &viewer, 10))
        .unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].decision_count, 51);

    // nothing was recorded or debited for the rejected decision
    assert_eq!(h.engine.quota_status(&viewer, None).unwrap().consumed_today, 50);

    // once the window has passed the user may continue
    h.clock.advance(Duration::minutes(6));
    assert!(h
        .engine
        .submit_decision(&viewer, &targets[50], Decision::Dislike, None)
        .is_ok());
}

#[test]
fn gates_reject_before_any_write() {
    let h = harness();
    let viewer = h.man("viewer");
    let target = h.woman("target");

    let mut unverified = person(Gender::Male, &[Gender::Female], 0.0, 0.0);
    unverified.age_verified = false;
    let minor = h.add("unverified", unverified);

    assert!(matches!(
        h.engine.submit_decision(&minor, &target, Decision::Like, None),
        Err(EngineError::NotEligible { .. })
    ));
    assert!(matches!(
        h.engine.get_queue(&minor, &queue_for(&[Gender::Female])),
        Err(EngineError::NotEligible { .. })
    ));
    assert!(matches!(
        h.engine.submit_decision(&uid("stranger"), &target, Decision::Like, None),
        Err(EngineError::NotEligible { .. })
    ));
    assert!(matches!(
        h.engine.submit_decision(&viewer, &viewer, Decision::Like, None),
        Err(EngineError::InvalidArgument(_))
    ));
    assert!(matches!(
        h.engine.submit_decision(&viewer, &uid("ghost"), Decision::Like, None),
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        h.engine.submit_decision(&viewer, &target, Decision::Like, Some(24 * 60)),
        Err(EngineError::InvalidArgument(_))
    ));

    assert_eq!(h.engine.quota_status(&viewer, None).unwrap().consumed_today, 0);
}

#[test]
fn blocking_hides_the_match_and_is_participant_only() {
    let h = harness();
    let ann = h.woman("ann");
    let bob = h.man("bob");
    let eve = h.man("eve");

    h.engine.submit_decision(&ann, &bob, Decision::Like, None).unwrap();
    let m = h.engine.submit_decision(&bob, &ann, Decision::Like, None).unwrap();
    let match_id = m.match_id.unwrap();

    assert!(matches!(
        h.engine.block_match(&eve, &match_id),
        Err(EngineError::NotFound(_))
    ));

    let blocked = h.engine.block_match(&ann, &match_id).unwrap();
    assert_eq!(blocked.status, MatchStatus::Blocked);
    assert_eq!(blocked.blocked_by, Some(ann.clone()));

    // second block, from the other side, changes nothing
    let again = h.engine.block_match(&bob, &match_id).unwrap();
    assert_eq!(again.blocked_by, Some(ann.clone()));

    assert!(h.engine.list_matches(&ann, None, None).unwrap().matches.is_empty());
    assert!(h.engine.list_matches(&bob, None, None).unwrap().matches.is_empty());

    // a retried like no longer reports the blocked match
    let retry = h.engine.submit_decision(&bob, &ann, Decision::Like, None).unwrap();
    assert!(!retry.matched);
}

#[test]
fn match_list_pages_newest_first() {
    let h = harness_with(relaxed());
    let me = h.man("me");
    let mut expected = Vec::new();
    for i in 0..5 {
        let w = h.woman(&format!("w{i}"));
        h.engine.submit_decision(&w, &me, Decision::Like, None).unwrap();
        let out = h.engine.submit_decision(&me, &w, Decision::Like, None).unwrap();
        expected.push(out.match_id.unwrap());
        h.clock.advance(Duration::minutes(1));
    }
    expected.reverse();

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = h.engine.list_matches(&me, Some(2), cursor.as_deref()).unwrap();
        assert!(page.matches.len() <= 2);
        seen.extend(page.matches.iter().map(|m| m.match_id.clone()));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(seen, expected);

    assert!(matches!(
        h.engine.list_matches(&me, None, Some("not a cursor")),
        Err(EngineError::InvalidArgument(_))
    ));
}

#[test]
fn analytics_sees_swipes_limits_and_matches() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ember_store::Store::open(dir.path().join("a.db")).unwrap());
    let clock = Arc::new(ember_engine::clock::ManualClock::new(start()));
    let (sink, mut rx) = ChannelAnalytics::channel(64);
    let engine = ember_engine::SwipeEngine::new(
        store,
        EngineConfig {
            quota: QuotaPolicy {
                base_daily_limit: 2,
                hourly_refill: 0,
            },
            ..EngineConfig::default()
        },
    )
    .with_clock(clock)
    .with_analytics(Arc::new(sink));

    for (id, p) in [
        ("ann", person(Gender::Female, &[Gender::Male], 0.0, 0.0)),
        ("bob", person(Gender::Male, &[Gender::Female], 0.0, 0.0)),
        ("cat", person(Gender::Female, &[Gender::Male], 0.0, 0.0)),
        ("dee", person(Gender::Female, &[Gender::Male], 0.0, 0.0)),
    ] {
        engine.upsert_profile(uid(id), p).unwrap();
    }

    engine.submit_decision(&uid("ann"), &uid("bob"), Decision::Like, None).unwrap();
    engine.submit_decision(&uid("bob"), &uid("ann"), Decision::Like, None).unwrap();
    engine.submit_decision(&uid("bob"), &uid("cat"), Decision::Dislike, None).unwrap();
    assert!(engine
        .submit_decision(&uid("bob"), &uid("dee"), Decision::Like, None)
        .is_err());

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind());
        if let SwipeEvent::Match { user_a, user_b, .. } = &event {
            assert_eq!((user_a.as_str(), user_b.as_str()), ("ann", "bob"));
        }
    }
    assert_eq!(kinds, vec!["swipe", "swipe", "match", "swipe", "limit_hit"]);
}

#[test]
fn viewer_local_midnight_resets_quota() {
    let h = harness_with(EngineConfig {
        quota: QuotaPolicy {
            base_daily_limit: 3,
            hourly_refill: 0,
        },
        ..EngineConfig::default()
    });
    // UTC+10: 09:00 UTC is 19:00 local, midnight local is 14:00 UTC
    let mut east = person(Gender::Male, &[Gender::Female], 0.0, 0.0);
    east.utc_offset_minutes = 600;
    let viewer = h.add("viewer", east);
    let targets: Vec<_> = (0..4).map(|i| h.woman(&format!("t{i}"))).collect();

    for t in &targets[..3] {
        h.engine.submit_decision(&viewer, t, Decision::Dislike, None).unwrap();
    }
    let status = h.engine.quota_status(&viewer, None).unwrap();
    assert_eq!(status.remaining, 0);
    assert_eq!(status.next_daily_reset_at, start() + Duration::hours(5));

    h.clock.advance(Duration::hours(5));
    let out = h
        .engine
        .submit_decision(&viewer, &targets[3], Decision::Dislike, None)
        .unwrap();
    assert_eq!(out.quota_remaining, 2);
}
