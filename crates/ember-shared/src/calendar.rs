//! Viewer-local calendar arithmetic on fixed UTC offsets.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, TimeZone, Utc};

use crate::constants::MAX_UTC_OFFSET_MINUTES;
use crate::error::ParseError;

pub fn fixed_offset(minutes: i32) -> Result<FixedOffset, ParseError> {
    if minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        return Err(ParseError::InvalidUtcOffset(minutes));
    }
    FixedOffset::east_opt(minutes * 60).ok_or(ParseError::InvalidUtcOffset(minutes))
}

/// Calendar date of `now` as seen by a viewer at `offset`.
pub fn local_date(now: DateTime<Utc>, offset: &FixedOffset) -> NaiveDate {
    now.with_timezone(offset).date_naive()
}

/// The next viewer-local midnight strictly after `now`, expressed in UTC.
pub fn next_local_midnight(now: DateTime<Utc>, offset: &FixedOffset) -> DateTime<Utc> {
    let tomorrow = local_date(now, offset)
        .checked_add_days(Days::new(1))
        .unwrap_or(NaiveDate::MAX);
    let midnight = tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default();
    offset
        .from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
