#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use ember_engine::clock::ManualClock;
use ember_engine::config::{AbusePolicy, EngineConfig, QuotaPolicy};
use ember_engine::notify::{MatchEvent, MatchNotifier};
use ember_engine::{ProfileUpdate, QueueRequest, SinkError, SwipeEngine};
use ember_shared::{AccountStatus, ContentSafetyLevel, Gender, GeoPoint, SubscriptionTier, UserId};
use ember_store::Store;

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<MatchEvent>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl MatchNotifier for RecordingNotifier {
    fn publish_match(&self, event: &MatchEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    _dir: TempDir,
    pub store: Arc<Store>,
    pub engine: Arc<SwipeEngine>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

/// Quota and abuse limits far out of the way, for tests about something else.
pub fn relaxed() -> EngineConfig {
    EngineConfig {
        quota: QuotaPolicy {
            base_daily_limit: 10_000,
            hourly_refill: 0,
        },
        abuse: AbusePolicy {
            window_secs: 300,
            threshold: 10_000,
        },
        ..EngineConfig::default()
    }
}

pub fn harness_with(config: EngineConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("engine.db")).unwrap());
    let clock = Arc::new(ManualClock::new(start()));
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = SwipeEngine::new(store.clone(), config)
        .with_clock(clock.clone())
        .with_notifier(notifier.clone());

    Harness {
        _dir: dir,
        store,
        engine: Arc::new(engine),
        clock,
        notifier,
    }
}

pub fn uid(raw: &str) -> UserId {
    UserId::parse(raw).unwrap()
}

pub fn person(gender: Gender, seeks: &[Gender], lat: f64, lng: f64) -> ProfileUpdate {
    ProfileUpdate {
        gender,
        orientation_preference: seeks.to_vec(),
        age: 30,
        location: GeoPoint::new(lat, lng).unwrap(),
        verified: false,
        age_verified: true,
        quality_score: 50,
        content_safety_level: ContentSafetyLevel::Safe,
        risk_score: 0,
        account_status: AccountStatus::Active,
        hidden: false,
        last_active_at: start() - Duration::minutes(30),
        subscription_tier: SubscriptionTier::Free,
        utc_offset_minutes: 0,
    }
}

impl Harness {
    pub fn add(&self, id: &str, profile: ProfileUpdate) -> UserId {
        let user = uid(id);
        self.engine.upsert_profile(user.clone(), profile).unwrap();
        user
    }

    /// A man seeking women, at the origin.
    pub fn man(&self, id: &str) -> UserId {
        self.add(id, person(Gender::Male, &[Gender::Female], 0.0, 0.0))
    }

    /// A woman seeking men, a few hundred metres from the origin.
    pub fn woman(&self, id: &str) -> UserId {
        self.add(id, person(Gender::Female, &[Gender::Male], 0.002, 0.002))
    }
}

pub fn queue_for(genders: &[Gender]) -> QueueRequest {
    QueueRequest {
        location: GeoPoint::new(0.0, 0.0).unwrap(),
        radius_km: 25.0,
        min_age: 18,
        max_age: 99,
        genders: genders.to_vec(),
        limit: 20,
        tz_offset_minutes: None,
    }
}
