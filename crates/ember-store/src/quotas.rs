//! Swipe quota rows.  The arithmetic lives with the quota ledger; this
//! module only loads and stores the record, normally inside an immediate
//! transaction opened by the caller.

use rusqlite::{params, Connection, OptionalExtension};

use ember_shared::UserId;

use crate::codec::{date_from_sql, parse_col, ts_from_sql, ts_to_sql};
use crate::error::Result;
use crate::models::SwipeQuota;

pub fn load(conn: &Connection, user_id: &UserId) -> Result<Option<SwipeQuota>> {
    Ok(conn
        .query_row(
            "SELECT user_id, period_date, consumed_count, last_consumed_at, last_refill_at
             FROM swipe_quotas WHERE user_id = ?1",
            params![user_id.as_str()],
            row_to_quota,
        )
        .optional()?)
}

pub fn save(conn: &Connection, quota: &SwipeQuota) -> Result<()> {
    conn.execute(
        "INSERT INTO swipe_quotas (user_id, period_date, consumed_count, last_consumed_at, last_refill_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
             period_date = excluded.period_date,
             consumed_count = excluded.consumed_count,
             last_consumed_at = excluded.last_consumed_at,
             last_refill_at = excluded.last_refill_at",
        params![
            quota.user_id.as_str(),
            quota.period_date.format("%Y-%m-%d").to_string(),
            quota.consumed_count,
            quota.last_consumed_at.as_ref().map(ts_to_sql),
            ts_to_sql(&quota.last_refill_at),
        ],
    )?;
    Ok(())
}

fn row_to_quota(row: &rusqlite::Row<'_>) -> rusqlite::Result<SwipeQuota> {
    let user_id: String = row.get(0)?;
    let period: String = row.get(1)?;
    let last_consumed: Option<String> = row.get(3)?;
    let last_refill: String = row.get(4)?;

    Ok(SwipeQuota {
        user_id: parse_col(0, &user_id)?,
        period_date: date_from_sql(1, &period)?,
        consumed_count: row.get(2)?,
        last_consumed_at: last_consumed
            .map(|s| ts_from_sql(3, &s))
            .transpose()?,
        last_refill_at: ts_from_sql(4, &last_refill)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::test_support::uid;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn save_and_load() {
        let db = Database::open_in_memory().unwrap();
        let user = uid("dave");
        assert_eq!(load(db.conn(), &user).unwrap(), None);

        let mut quota = SwipeQuota {
            user_id: user.clone(),
            period_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            consumed_count: 0,
            last_consumed_at: None,
            last_refill_at: Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap(),
        };
        save(db.conn(), &quota).unwrap();
        assert_eq!(load(db.conn(), &user).unwrap(), Some(quota.clone()));

        quota.consumed_count = 7;
        quota.last_consumed_at = Some(Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap());
        save(db.conn(), &quota).unwrap();
        assert_eq!(load(db.conn(), &user).unwrap(), Some(quota));
    }
}
