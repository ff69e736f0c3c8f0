//! The candidate index: one row per discoverable profile.
//!
//! Profiles are owned by the profile subsystem; this table is a read model
//! it refreshes through [`upsert`].

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use ember_shared::geo::BoundingBox;
use ember_shared::types::{format_gender_list, parse_gender_list};
use ember_shared::{AccountStatus, ContentSafetyLevel, Gender, GeoPoint, UserId};

use crate::codec::{parse_col, ts_from_sql, ts_to_sql};
use crate::error::Result;
use crate::models::CandidateProfile;

const COLUMNS: &str = "p.user_id, p.gender, p.orientation, p.age, p.lat, p.lng, p.verified, \
     p.age_verified, p.quality_score, p.content_safety, p.risk_score, p.account_status, \
     p.hidden, p.last_active_at, p.subscription_tier, p.utc_offset_minutes";

/// Storage-level selection over the candidate index.
#[derive(Debug, Clone)]
pub struct ProfileQuery {
    /// Never return this user (the viewer).
    pub exclude_user: UserId,
    /// Skip targets this viewer already decided on.
    pub exclude_decided_by: Option<UserId>,
    pub min_age: u8,
    pub max_age: u8,
    /// Candidate gender must be one of these.
    pub genders: Vec<Gender>,
    /// Candidate's orientation must include this gender (the viewer's).
    pub seeking: Option<Gender>,
    /// Rectangular prefilter only: rows in the corners lie outside the
    /// radius and still count against `limit`, so callers oversample and
    /// re-check distance.
    pub bbox: BoundingBox,
    pub statuses: Vec<AccountStatus>,
    pub content_levels: Vec<ContentSafetyLevel>,
    pub include_hidden: bool,
    pub limit: u32,
}

pub fn upsert(conn: &Connection, profile: &CandidateProfile, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO profiles (user_id, gender, orientation, age, lat, lng, verified,
             age_verified, quality_score, content_safety, risk_score, account_status, hidden,
             last_active_at, subscription_tier, utc_offset_minutes, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
         ON CONFLICT(user_id) DO UPDATE SET
             gender = excluded.gender,
             orientation = excluded.orientation,
             age = excluded.age,
             lat = excluded.lat,
             lng = excluded.lng,
             verified = excluded.verified,
             age_verified = excluded.age_verified,
             quality_score = excluded.quality_score,
             content_safety = excluded.content_safety,
             risk_score = excluded.risk_score,
             account_status = excluded.account_status,
             hidden = excluded.hidden,
             last_active_at = excluded.last_active_at,
             subscription_tier = excluded.subscription_tier,
             utc_offset_minutes = excluded.utc_offset_minutes,
             updated_at = excluded.updated_at",
        params![
            profile.user_id.as_str(),
            profile.gender.as_str(),
            format_gender_list(&profile.orientation_preference),
            profile.age,
            profile.location.lat,
            profile.location.lng,
            profile.verified,
            profile.age_verified,
            profile.quality_score,
            profile.content_safety_level.as_str(),
            profile.risk_score,
            profile.account_status.as_str(),
            profile.hidden,
            ts_to_sql(&profile.last_active_at),
            profile.subscription_tier.as_str(),
            profile.utc_offset_minutes,
            ts_to_sql(&now),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, user_id: &UserId) -> Result<Option<CandidateProfile>> {
    let sql = format!("SELECT {COLUMNS} FROM profiles p WHERE p.user_id = ?1");
    Ok(conn
        .query_row(&sql, params![user_id.as_str()], row_to_profile)
        .optional()?)
}

/// Run a discovery query.  Rows come back most recently active first.
pub fn query(conn: &Connection, q: &ProfileQuery) -> Result<Vec<CandidateProfile>> {
    let mut sql = format!("SELECT {COLUMNS} FROM profiles p WHERE p.user_id != ?");
    let mut args: Vec<Value> = vec![Value::Text(q.exclude_user.to_string())];

    sql.push_str(" AND p.age BETWEEN ? AND ?");
    args.push(Value::Integer(q.min_age.into()));
    args.push(Value::Integer(q.max_age.into()));

    sql.push_str(" AND p.lat BETWEEN ? AND ?");
    args.push(Value::Real(q.bbox.min_lat));
    args.push(Value::Real(q.bbox.max_lat));

    if q.bbox.wraps_antimeridian() {
        sql.push_str(" AND (p.lng >= ? OR p.lng <= ?)");
    } else {
        sql.push_str(" AND p.lng BETWEEN ? AND ?");
    }
    args.push(Value::Real(q.bbox.min_lng));
    args.push(Value::Real(q.bbox.max_lng));

    if !q.include_hidden {
        sql.push_str(" AND p.hidden = 0");
    }

    push_in(&mut sql, &mut args, "p.account_status", q.statuses.iter().map(|s| s.as_str()));
    push_in(&mut sql, &mut args, "p.gender", q.genders.iter().map(|g| g.as_str()));
    push_in(
        &mut sql,
        &mut args,
        "p.content_safety",
        q.content_levels.iter().map(|c| c.as_str()),
    );

    if let Some(gender) = q.seeking {
        sql.push_str(" AND instr(',' || p.orientation || ',', ?) > 0");
        args.push(Value::Text(format!(",{},", gender.as_str())));
    }

    if let Some(viewer) = &q.exclude_decided_by {
        sql.push_str(
            " AND NOT EXISTS (SELECT 1 FROM swipe_decisions d
                              WHERE d.viewer_id = ? AND d.target_id = p.user_id)",
        );
        args.push(Value::Text(viewer.to_string()));
    }

    sql.push_str(" ORDER BY p.last_active_at DESC, p.user_id ASC LIMIT ?");
    args.push(Value::Integer(q.limit.into()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), row_to_profile)?;

    let mut profiles = Vec::new();
    for row in rows {
        profiles.push(row?);
    }
    Ok(profiles)
}

/// Append `AND column IN (?, ...)`.  An empty set matches nothing.
fn push_in<'a>(
    sql: &mut String,
    args: &mut Vec<Value>,
    column: &str,
    values: impl Iterator<Item = &'a str>,
) {
    let values: Vec<&str> = values.collect();
    if values.is_empty() {
        sql.push_str(" AND 0");
        return;
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    sql.push_str(&format!(" AND {column} IN ({placeholders})"));
    args.extend(values.into_iter().map(|v| Value::Text(v.to_string())));
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<CandidateProfile> {
    let user_id: String = row.get(0)?;
    let gender: String = row.get(1)?;
    let orientation: String = row.get(2)?;
    let lat: f64 = row.get(4)?;
    let lng: f64 = row.get(5)?;
    let content_safety: String = row.get(9)?;
    let account_status: String = row.get(11)?;
    let last_active: String = row.get(13)?;
    let tier: String = row.get(14)?;

    let location = GeoPoint::new(lat, lng).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Real, Box::new(e))
    })?;
    let orientation_preference = parse_gender_list(&orientation).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(CandidateProfile {
        user_id: parse_col(0, &user_id)?,
        gender: parse_col(1, &gender)?,
        orientation_preference,
        age: row.get(3)?,
        location,
        verified: row.get(6)?,
        age_verified: row.get(7)?,
        quality_score: row.get(8)?,
        content_safety_level: parse_col(9, &content_safety)?,
        risk_score: row.get(10)?,
        account_status: parse_col(11, &account_status)?,
        hidden: row.get(12)?,
        last_active_at: ts_from_sql(13, &last_active)?,
        subscription_tier: parse_col(14, &tier)?,
        utc_offset_minutes: row.get(15)?,
    })
}
