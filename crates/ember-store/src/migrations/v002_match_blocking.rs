//! v002 -- Match blocking.
//!
//! Records which participant blocked a match and when, and indexes
//! `user_b` for match listing.

use rusqlite::Connection;

/// SQL executed when upgrading from version 1 to version 2.
const UP_SQL: &str = r#"
-- Who blocked a match, and when
ALTER TABLE matches ADD COLUMN blocked_by TEXT;
ALTER TABLE matches ADD COLUMN blocked_at TEXT;

CREATE INDEX IF NOT EXISTS idx_matches_user_b ON matches(user_b, created_at DESC);
"#;

/// Apply the match-blocking migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
