//! Identity / age verification gate.

use serde::Serialize;

use ember_shared::constants::MIN_AGE;
use ember_shared::{AccountStatus, UserId};
use ember_store::{profiles, Store};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Eligibility {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }

    /// `NotEligible` carrying the gate's reason when denied.
    pub fn require(self) -> Result<()> {
        if self.allowed {
            Ok(())
        } else {
            Err(EngineError::NotEligible {
                reason: self
                    .reason
                    .unwrap_or_else(|| "verification required".to_string()),
            })
        }
    }
}

pub trait EligibilityGate: Send + Sync {
    fn is_eligible(&self, user_id: &UserId) -> Result<Eligibility>;
}

/// Eligible when the profile exists, is adult and age-verified, and the
/// account is active.
impl EligibilityGate for Store {
    fn is_eligible(&self, user_id: &UserId) -> Result<Eligibility> {
        let Some(profile) = self.with_db(|db| profiles::get(db.conn(), user_id))? else {
            return Ok(Eligibility::denied("no profile on record"));
        };

        Ok(if profile.age < MIN_AGE {
            Eligibility::denied(format!("must be at least {MIN_AGE}"))
        } else if !profile.age_verified {
            Eligibility::denied("age verification pending")
        } else if profile.account_status != AccountStatus::Active {
            Eligibility::denied(format!("account is {}", profile.account_status))
        } else {
            Eligibility::allowed()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ember_shared::{ContentSafetyLevel, Gender, GeoPoint, SubscriptionTier};
    use ember_store::CandidateProfile;

    fn profile(id: &str) -> CandidateProfile {
        CandidateProfile {
            user_id: UserId::parse(id).unwrap(),
            gender: Gender::Male,
            orientation_preference: vec![Gender::Female],
            age: 25,
            location: GeoPoint::new(0.0, 0.0).unwrap(),
            verified: true,
            age_verified: true,
            quality_score: 50,
            content_safety_level: ContentSafetyLevel::Safe,
            risk_score: 0,
            account_status: AccountStatus::Active,
            hidden: false,
            last_active_at: Utc::now(),
            subscription_tier: SubscriptionTier::Free,
            utc_offset_minutes: 0,
        }
    }

    #[test]
    fn store_gate_checks_profile_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("e.db")).unwrap();

        let mut unverified = profile("unverified");
        unverified.age_verified = false;
        let mut banned = profile("banned");
        banned.account_status = AccountStatus::Banned;

        store
            .with_db(|db| {
                for p in [profile("ok"), unverified, banned] {
                    profiles::upsert(db.conn(), &p, Utc::now())?;
                }
                Ok::<_, EngineError>(())
            })
            .unwrap();

        let check = |id: &str| store.is_eligible(&UserId::parse(id).unwrap()).unwrap();
        assert!(check("ok").allowed);
        assert!(!check("unverified").allowed);
        assert_eq!(check("banned").reason.as_deref(), Some("account is banned"));
        assert!(matches!(
            check("ghost").require(),
            Err(EngineError::NotEligible { .. })
        ));
    }
}
