//! v001 -- Initial schema creation.
//!
//! Creates the five core tables: `profiles`, `swipe_quotas`,
//! `swipe_decisions`, `matches`, and `abuse_signals`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles (candidate index, resynced by profile-update code)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    user_id            TEXT PRIMARY KEY NOT NULL,
    gender             TEXT NOT NULL,
    orientation        TEXT NOT NULL,             -- comma list of genders sought
    age                INTEGER NOT NULL,
    lat                REAL NOT NULL,
    lng                REAL NOT NULL,
    verified           INTEGER NOT NULL DEFAULT 0, -- identity verified, boolean 0/1
    age_verified       INTEGER NOT NULL DEFAULT 0,
    quality_score      INTEGER NOT NULL DEFAULT 0, -- 0..=100
    content_safety     TEXT NOT NULL DEFAULT 'safe',
    risk_score         INTEGER NOT NULL DEFAULT 0, -- 0..=100
    account_status     TEXT NOT NULL,
    hidden             INTEGER NOT NULL DEFAULT 0, -- incognito
    last_active_at     TEXT NOT NULL,              -- RFC-3339, UTC, micros
    subscription_tier  TEXT NOT NULL DEFAULT 'free',
    utc_offset_minutes INTEGER NOT NULL DEFAULT 0,
    updated_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_profiles_discovery
    ON profiles(account_status, lat, lng);

-- ----------------------------------------------------------------
-- Swipe quotas (one row per user, never deleted)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS swipe_quotas (
    user_id          TEXT PRIMARY KEY NOT NULL,
    period_date      TEXT NOT NULL,               -- viewer-local YYYY-MM-DD
    consumed_count   INTEGER NOT NULL DEFAULT 0,
    last_consumed_at TEXT,
    last_refill_at   TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Swipe decisions (first write wins per ordered pair)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS swipe_decisions (
    viewer_id  TEXT NOT NULL,
    target_id  TEXT NOT NULL,
    decision   TEXT NOT NULL CHECK (decision IN ('like', 'dislike')),
    created_at TEXT NOT NULL,

    PRIMARY KEY (viewer_id, target_id)
);

CREATE INDEX IF NOT EXISTS idx_decisions_viewer_ts
    ON swipe_decisions(viewer_id, created_at);

-- ----------------------------------------------------------------
-- Matches (unordered pair stored canonically, user_a < user_b)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS matches (
    match_id   TEXT PRIMARY KEY NOT NULL,         -- derived from the pair
    user_a     TEXT NOT NULL,
    user_b     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'active',

    CHECK (user_a < user_b),
    UNIQUE (user_a, user_b)
);

CREATE INDEX IF NOT EXISTS idx_matches_user_a ON matches(user_a, created_at DESC);

-- ----------------------------------------------------------------
-- Abuse signals (append-only evidence)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS abuse_signals (
    id             TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    user_id        TEXT NOT NULL,
    window_start   TEXT NOT NULL,
    decision_count INTEGER NOT NULL,
    severity       TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_abuse_user_ts ON abuse_signals(user_id, created_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
