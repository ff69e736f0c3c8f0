use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use ember_shared::{Decision, UserId};

use crate::codec::{parse_col, ts_from_sql, ts_to_sql};
use crate::error::Result;
use crate::models::SwipeDecision;

pub fn find(
    conn: &Connection,
    viewer_id: &UserId,
    target_id: &UserId,
) -> Result<Option<SwipeDecision>> {
    Ok(conn
        .query_row(
            "SELECT viewer_id, target_id, decision, created_at
             FROM swipe_decisions WHERE viewer_id = ?1 AND target_id = ?2",
            params![viewer_id.as_str(), target_id.as_str()],
            row_to_decision,
        )
        .optional()?)
}

/// Insert unless the ordered pair already has a decision.  Returns whether
/// this call wrote the row; an existing decision is never overwritten.
pub fn insert(conn: &Connection, decision: &SwipeDecision) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO swipe_decisions (viewer_id, target_id, decision, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            decision.viewer_id.as_str(),
            decision.target_id.as_str(),
            decision.decision.as_str(),
            ts_to_sql(&decision.created_at),
        ],
    )?;
    Ok(affected > 0)
}

pub fn has_like(conn: &Connection, viewer_id: &UserId, target_id: &UserId) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM swipe_decisions
             WHERE viewer_id = ?1 AND target_id = ?2 AND decision = ?3",
            params![viewer_id.as_str(), target_id.as_str(), Decision::Like.as_str()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Every target this viewer has ever decided on.
pub fn decided_targets(conn: &Connection, viewer_id: &UserId) -> Result<HashSet<UserId>> {
    let mut stmt =
        conn.prepare("SELECT target_id FROM swipe_decisions WHERE viewer_id = ?1")?;
    let rows = stmt.query_map(params![viewer_id.as_str()], |row| {
        let raw: String = row.get(0)?;
        parse_col::<UserId>(0, &raw)
    })?;

    let mut targets = HashSet::new();
    for row in rows {
        targets.insert(row?);
    }
    Ok(targets)
}

/// Creation times of this viewer's decisions at or after `since`, oldest first.
pub fn times_since(
    conn: &Connection,
    viewer_id: &UserId,
    since: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>> {
    let mut stmt = conn.prepare(
        "SELECT created_at FROM swipe_decisions
         WHERE viewer_id = ?1 AND created_at >= ?2
         ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![viewer_id.as_str(), ts_to_sql(&since)], |row| {
        let raw: String = row.get(0)?;
        ts_from_sql(0, &raw)
    })?;

    let mut times = Vec::new();
    for row in rows {
        times.push(row?);
    }
    Ok(times)
}

fn row_to_decision(row: &rusqlite::Row<'_>) -> rusqlite::Result<SwipeDecision> {
    let viewer: String = row.get(0)?;
    let target: String = row.get(1)?;
    let decision: String = row.get(2)?;
    let created: String = row.get(3)?;

    Ok(SwipeDecision {
        viewer_id: parse_col(0, &viewer)?,
        target_id: parse_col(1, &target)?,
        decision: parse_col(2, &decision)?,
        created_at: ts_from_sql(3, &created)?,
    })
}
