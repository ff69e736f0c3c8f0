/// Application name
pub const APP_NAME: &str = "Ember";

/// Minimum age for taking part in discovery
pub const MIN_AGE: u8 = 18;

/// Upper bound accepted for ages in profiles and filters
pub const MAX_AGE: u8 = 120;

/// Longest accepted user identifier
pub const MAX_USER_ID_LEN: usize = 128;

/// Mean Earth radius in kilometres (IUGG)
pub const EARTH_RADIUS_KM: f64 = 6_371.0088;

/// Largest discovery radius a client may request
pub const MAX_RADIUS_KM: f64 = 500.0;

/// Largest accepted UTC offset for a viewer-local calendar (+/- 14h)
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Key derivation contexts (BLAKE3)
pub const MATCH_ID_CONTEXT: &str = "ember-match-id-v1";
pub const SESSION_CACHE_CONTEXT: &str = "ember-session-cache-v1";
