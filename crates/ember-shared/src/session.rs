use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::types::UserId;

// Token signed by the identity service, presented by clients as a bearer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub user_id: UserId,
    pub valid_until: DateTime<Utc>,
    pub signature: Vec<u8>,
}

impl SessionToken {
    /// Encode as the opaque string clients put after `Bearer `.
    pub fn to_bearer(&self) -> String {
        // serializing a struct of plain fields cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn from_bearer(raw: &str) -> Result<Self, TokenError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(e.to_string()))
    }
}

// payload = user_id || 0x00 || valid_until (rfc3339)
fn signing_payload(user_id: &UserId, valid_until: &DateTime<Utc>) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(user_id.as_str().as_bytes());
    payload.push(0);
    payload.extend_from_slice(valid_until.to_rfc3339().as_bytes());
    payload
}

pub fn verify_session_token(
    token: &SessionToken,
    issuer_pubkey: &[u8; 32],
    now: DateTime<Utc>,
) -> Result<UserId, TokenError> {
    if now > token.valid_until {
        return Err(TokenError::Expired);
    }

    let verifying_key =
        VerifyingKey::from_bytes(issuer_pubkey).map_err(|_| TokenError::InvalidKey)?;
    let signature =
        Signature::from_slice(&token.signature).map_err(|_| TokenError::BadSignature)?;

    verifying_key
        .verify(&signing_payload(&token.user_id, &token.valid_until), &signature)
        .map_err(|_| TokenError::BadSignature)?;

    Ok(token.user_id.clone())
}

pub fn create_session_token(
    user_id: &UserId,
    valid_until: DateTime<Utc>,
    issuer_signing_key: &ed25519_dalek::SigningKey,
) -> SessionToken {
    use ed25519_dalek::Signer;

    let signature = issuer_signing_key.sign(&signing_payload(user_id, &valid_until));

    SessionToken {
        user_id: user_id.clone(),
        valid_until,
        signature: signature.to_bytes().to_vec(),
    }
}
