use rusqlite::{params, Connection};
use uuid::Uuid;

use ember_shared::UserId;

use crate::codec::{parse_col, ts_from_sql, ts_to_sql};
use crate::error::Result;
use crate::models::AbuseSignal;

/// Append an abuse signal.  Signals are evidence and are never updated.
pub fn insert_signal(conn: &Connection, signal: &AbuseSignal) -> Result<()> {
    conn.execute(
        "INSERT INTO abuse_signals (id, user_id, window_start, decision_count, severity, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            signal.id.to_string(),
            signal.user_id.as_str(),
            ts_to_sql(&signal.window_start),
            signal.decision_count,
            signal.severity.as_str(),
            ts_to_sql(&signal.created_at),
        ],
    )?;
    Ok(())
}

/// Most recent signals for a user, newest first.
pub fn signals_for(conn: &Connection, user_id: &UserId, limit: u32) -> Result<Vec<AbuseSignal>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, window_start, decision_count, severity, created_at
         FROM abuse_signals WHERE user_id = ?1
         ORDER BY created_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id.as_str(), limit], row_to_signal)?;

    let mut signals = Vec::new();
    for row in rows {
        signals.push(row?);
    }
    Ok(signals)
}

fn row_to_signal(row: &rusqlite::Row<'_>) -> rusqlite::Result<AbuseSignal> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let window_start: String = row.get(2)?;
    let severity: String = row.get(4)?;
    let created: String = row.get(5)?;

    Ok(AbuseSignal {
        id: parse_col::<Uuid>(0, &id)?,
        user_id: parse_col(1, &user_id)?,
        window_start: ts_from_sql(2, &window_start)?,
        decision_count: row.get(3)?,
        severity: parse_col(4, &severity)?,
        created_at: ts_from_sql(5, &created)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::test_support::uid;
    use chrono::{Duration, TimeZone, Utc};
    use ember_shared::AbuseSeverity;

    #[test]
    fn signals_are_appended() {
        let db = Database::open_in_memory().unwrap();
        let at = Utc.with_ymd_and_hms(2026, 2, 2, 2, 2, 2).unwrap();

        for i in 0..3 {
            insert_signal(
                db.conn(),
                &AbuseSignal {
                    id: Uuid::new_v4(),
                    user_id: uid("spammer"),
                    window_start: at - Duration::minutes(5),
                    decision_count: 51 + i,
                    severity: AbuseSeverity::Elevated,
                    created_at: at + Duration::seconds(i.into()),
                },
            )
            .unwrap();
        }

        let signals = signals_for(db.conn(), &uid("spammer"), 10).unwrap();
        assert_eq!(signals.len(), 3);
        assert_eq!(signals[0].decision_count, 53);
        assert!(signals_for(db.conn(), &uid("someone"), 10).unwrap().is_empty());
    }
}
