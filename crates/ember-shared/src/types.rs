use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{MATCH_ID_CONTEXT, MAX_USER_ID_LEN};
use crate::error::ParseError;

// Opaque account identifier issued by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a raw identifier.
    ///
    /// Accepted ids are 1..=128 characters of `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ParseError::EmptyUserId);
        }
        if raw.len() > MAX_USER_ID_LEN {
            return Err(ParseError::UserIdTooLong(raw.len()));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(ParseError::InvalidUserIdChar(bad));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl FromStr for UserId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// An unordered pair of users in canonical (lexicographic) order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserPair {
    pub low: UserId,
    pub high: UserId,
}

impl UserPair {
    /// Canonicalize `{a, b}`. Returns `None` when both sides are the same user.
    pub fn new(a: &UserId, b: &UserId) -> Option<Self> {
        match a.cmp(b) {
            std::cmp::Ordering::Less => Some(Self {
                low: a.clone(),
                high: b.clone(),
            }),
            std::cmp::Ordering::Greater => Some(Self {
                low: b.clone(),
                high: a.clone(),
            }),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// The other member of the pair, if `me` is part of it.
    pub fn peer_of(&self, me: &UserId) -> Option<&UserId> {
        if *me == self.low {
            Some(&self.high)
        } else if *me == self.high {
            Some(&self.low)
        } else {
            None
        }
    }
}

// Deterministic id derived from the canonical pair, so both directions of
// detection always address the same row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MatchId(pub String);

impl MatchId {
    pub fn for_pair(pair: &UserPair) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(MATCH_ID_CONTEXT);
        hasher.update(pair.low.as_str().as_bytes());
        hasher.update(&[0u8]);
        hasher.update(pair.high.as_str().as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest.as_bytes()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Defines a closed string-backed enum with `as_str` / `FromStr` that match
/// its serde representation. Used for every enum persisted as TEXT.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseError::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum! {
    /// A viewer's verdict on a candidate.
    Decision {
        Like => "like",
        Dislike => "dislike",
    }
}

text_enum! {
    Gender {
        Male => "male",
        Female => "female",
        NonBinary => "non_binary",
    }
}

text_enum! {
    /// Lifecycle state of an account. Only `Active` accounts are swipeable.
    AccountStatus {
        Active => "active",
        Suspended => "suspended",
        Banned => "banned",
        Deleted => "deleted",
    }
}

text_enum! {
    SubscriptionTier {
        Free => "free",
        Plus => "plus",
        Premium => "premium",
    }
}

text_enum! {
    /// Moderation rating of a profile's public content, least to most explicit.
    ContentSafetyLevel {
        Safe => "safe",
        Suggestive => "suggestive",
        Explicit => "explicit",
    }
}

text_enum! {
    MatchStatus {
        Active => "active",
        Blocked => "blocked",
    }
}

text_enum! {
    AbuseSeverity {
        Elevated => "elevated",
        Severe => "severe",
    }
}

impl AccountStatus {
    pub fn is_eligible(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

impl SubscriptionTier {
    pub fn is_premium(&self) -> bool {
        !matches!(self, SubscriptionTier::Free)
    }
}

impl ContentSafetyLevel {
    fn rank(&self) -> u8 {
        match self {
            ContentSafetyLevel::Safe => 0,
            ContentSafetyLevel::Suggestive => 1,
            ContentSafetyLevel::Explicit => 2,
        }
    }

    /// Levels at or below `self`.
    pub fn at_most(&self) -> Vec<ContentSafetyLevel> {
        Self::ALL
            .iter()
            .copied()
            .filter(|level| level.rank() <= self.rank())
            .collect()
    }
}

/// Parse a comma-separated gender list such as `"female,non_binary"`.
pub fn parse_gender_list(raw: &str) -> Result<Vec<Gender>, ParseError> {
    let mut genders = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let gender: Gender = part.parse()?;
        if !genders.contains(&gender) {
            genders.push(gender);
        }
    }
    Ok(genders)
}

pub fn format_gender_list(genders: &[Gender]) -> String {
    genders
        .iter()
        .map(Gender::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_bad_input() {
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("has space").is_err());
        assert!(UserId::parse(&"a".repeat(MAX_USER_ID_LEN + 1)).is_err());
        assert_eq!(UserId::parse(" alice_01 ").unwrap().as_str(), "alice_01");
    }

    #[test]
    fn pair_is_canonical_in_both_directions() {
        let a = UserId::parse("alice").unwrap();
        let b = UserId::parse("bob").unwrap();
        let ab = UserPair::new(&a, &b).unwrap();
        let ba = UserPair::new(&b, &a).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.low, a);
        assert_eq!(ab.peer_of(&b), Some(&a));
        assert!(UserPair::new(&a, &a).is_none());
        assert_eq!(MatchId::for_pair(&ab), MatchId::for_pair(&ba));
        assert_eq!(MatchId::for_pair(&ab).as_str().len(), 32);
    }

    #[test]
    fn text_enums_match_serde() {
        for decision in Decision::ALL {
            let json = serde_json::to_string(decision).unwrap();
            assert_eq!(json, format!("\"{}\"", decision.as_str()));
            assert_eq!(decision.as_str().parse::<Decision>().unwrap(), *decision);
        }
        assert!("maybe".parse::<Decision>().is_err());
    }

    #[test]
    fn gender_list_round_trips_and_dedups() {
        let genders = parse_gender_list("female, male,female").unwrap();
        assert_eq!(genders, vec![Gender::Female, Gender::Male]);
        assert_eq!(format_gender_list(&genders), "female,male");
        assert!(parse_gender_list("robot").is_err());
    }

    #[test]
    fn content_levels_are_cumulative() {
        assert_eq!(ContentSafetyLevel::Safe.at_most(), vec![ContentSafetyLevel::Safe]);
        assert_eq!(ContentSafetyLevel::Explicit.at_most().len(), 3);
    }
}
