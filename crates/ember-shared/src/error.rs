use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("user id is empty")]
    EmptyUserId,

    #[error("user id is too long ({0} chars)")]
    UserIdTooLong(usize),

    #[error("user id contains invalid character {0:?}")]
    InvalidUserIdChar(char),

    #[error("unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("latitude/longitude out of range: ({lat}, {lng})")]
    InvalidCoordinates { lat: f64, lng: f64 },

    #[error("UTC offset out of range: {0} minutes")]
    InvalidUtcOffset(i32),
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("missing bearer token")]
    Missing,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token expired")]
    Expired,

    #[error("invalid token signature")]
    BadSignature,

    #[error("invalid verifying key")]
    InvalidKey,
}
