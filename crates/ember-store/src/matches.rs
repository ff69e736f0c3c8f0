//! CRUD for [`Match`] records.
//!
//! The primary key is derived from the canonical pair, and `(user_a,
//! user_b)` is unique, so racing inserts for one pair collapse into a
//! single row.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use ember_shared::{MatchId, MatchStatus, UserId};

use crate::codec::{parse_col, ts_from_sql, ts_to_sql};
use crate::error::Result;
use crate::models::Match;

const COLUMNS: &str = "match_id, user_a, user_b, created_at, status, blocked_by, blocked_at";

/// Keyset position for paging through a user's matches, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCursor {
    pub created_at: DateTime<Utc>,
    pub match_id: MatchId,
}

/// Insert the match unless the pair already has one.  Returns `true` only
/// for the call that created the row.
pub fn insert_if_absent(conn: &Connection, m: &Match) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO matches (match_id, user_a, user_b, created_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            m.match_id.as_str(),
            m.user_a.as_str(),
            m.user_b.as_str(),
            ts_to_sql(&m.created_at),
            m.status.as_str(),
        ],
    )?;
    Ok(affected > 0)
}

pub fn get(conn: &Connection, match_id: &MatchId) -> Result<Option<Match>> {
    let sql = format!("SELECT {COLUMNS} FROM matches WHERE match_id = ?1");
    Ok(conn
        .query_row(&sql, params![match_id.as_str()], row_to_match)
        .optional()?)
}

/// A page of `user`'s matches with the given status, strictly after `cursor`.
pub fn list_for_user(
    conn: &Connection,
    user: &UserId,
    status: MatchStatus,
    cursor: Option<&MatchCursor>,
    limit: u32,
) -> Result<Vec<Match>> {
    let keyset = if cursor.is_some() {
        "AND (created_at < ?3 OR (created_at = ?3 AND match_id < ?4))"
    } else {
        "AND ?3 IS NULL AND ?4 IS NULL"
    };
    let sql = format!(
        "SELECT {COLUMNS} FROM matches
         WHERE (user_a = ?1 OR user_b = ?1) AND status = ?2 {keyset}
         ORDER BY created_at DESC, match_id DESC
         LIMIT ?5"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            user.as_str(),
            status.as_str(),
            cursor.map(|c| ts_to_sql(&c.created_at)),
            cursor.map(|c| c.match_id.as_str()),
            limit,
        ],
        row_to_match,
    )?;

    let mut matches = Vec::new();
    for row in rows {
        matches.push(row?);
    }
    Ok(matches)
}

/// Mark a match blocked.  Returns `false` when it was already blocked.
pub fn set_blocked(
    conn: &Connection,
    match_id: &MatchId,
    blocked_by: &UserId,
    at: DateTime<Utc>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE matches SET status = ?1, blocked_by = ?2, blocked_at = ?3
         WHERE match_id = ?4 AND status != ?1",
        params![
            MatchStatus::Blocked.as_str(),
            blocked_by.as_str(),
            ts_to_sql(&at),
            match_id.as_str(),
        ],
    )?;
    Ok(affected > 0)
}

pub fn count_for_pair(conn: &Connection, a: &UserId, b: &UserId) -> Result<u32> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM matches
         WHERE (user_a = ?1 AND user_b = ?2) OR (user_a = ?2 AND user_b = ?1)",
        params![a.as_str(), b.as_str()],
        |row| row.get(0),
    )?)
}

fn row_to_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<Match> {
    let match_id: String = row.get(0)?;
    let user_a: String = row.get(1)?;
    let user_b: String = row.get(2)?;
    let created: String = row.get(3)?;
    let status: String = row.get(4)?;
    let blocked_by: Option<String> = row.get(5)?;
    let blocked_at: Option<String> = row.get(6)?;

    Ok(Match {
        match_id: MatchId(match_id),
        user_a: parse_col(1, &user_a)?,
        user_b: parse_col(2, &user_b)?,
        created_at: ts_from_sql(3, &created)?,
        status: parse_col(4, &status)?,
        blocked_by: blocked_by.map(|s| parse_col(5, &s)).transpose()?,
        blocked_at: blocked_at.map(|s| ts_from_sql(6, &s)).transpose()?,
    })
}
