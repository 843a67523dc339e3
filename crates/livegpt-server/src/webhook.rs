//! SFU webhook parsing and signature verification.
//!
//! Webhook requests carry a JWT in the `Authorization` header, signed
//! with the API secret; its `sha256` claim is the base64 digest of the
//! request body. The payload itself is the JSON event.

use base64::Engine as _;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const EVENT_PARTICIPANT_JOINED: &str = "participant_joined";
pub const EVENT_PARTICIPANT_LEFT: &str = "participant_left";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing authorization header")]
    MissingAuth,

    #[error("invalid webhook token: {0}")]
    InvalidToken(String),

    #[error("body digest does not match the token")]
    DigestMismatch,

    #[error("invalid webhook payload: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One webhook event; only the fields the supervisor acts on.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub room: Option<RoomPayload>,
    #[serde(default)]
    pub participant: Option<ParticipantPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomPayload {
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "numParticipants")]
    pub num_participants: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantPayload {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: String,
}

#[derive(Deserialize)]
struct TokenClaims {
    sha256: String,
    #[serde(default)]
    iss: Option<String>,
}

/// Verifies the request signature and parses the event payload.
pub fn receive(
    body: &[u8],
    auth_header: Option<&str>,
    api_key: &str,
    api_secret: &str,
) -> Result<WebhookEvent, WebhookError> {
    let token = auth_header.ok_or(WebhookError::MissingAuth)?.trim();

    let decoded = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(api_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| WebhookError::InvalidToken(e.to_string()))?;

    if let Some(iss) = decoded.claims.iss.as_deref() {
        if iss != api_key {
            return Err(WebhookError::InvalidToken(format!(
                "unknown issuer {iss}"
            )));
        }
    }

    let digest = base64::engine::general_purpose::STANDARD.encode(Sha256::digest(body));
    if digest != decoded.claims.sha256 {
        return Err(WebhookError::DigestMismatch);
    }

    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;
    use std::time::{SystemTime, UNIX_EPOCH};

    const API_KEY: &str = "devkey";
    const API_SECRET: &str = "devsecret";

    #[derive(Serialize)]
    struct SignClaims<'a> {
        sha256: String,
        iss: &'a str,
        exp: u64,
    }

    fn sign(body: &[u8]) -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 600;
        let claims = SignClaims {
            sha256: base64::engine::general_purpose::STANDARD.encode(Sha256::digest(body)),
            iss: API_KEY,
            exp,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(API_SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn joined_body(room: &str, identity: &str) -> Vec<u8> {
        serde_json::json!({
            "event": EVENT_PARTICIPANT_JOINED,
            "room": { "sid": format!("RM_{room}"), "name": room, "numParticipants": 1 },
            "participant": { "identity": identity, "name": identity, "metadata": "" },
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn accepts_a_signed_event() {
        let body = joined_body("demo", "alice");
        let token = sign(&body);

        let event = receive(&body, Some(&token), API_KEY, API_SECRET).unwrap();
        assert_eq!(event.event, EVENT_PARTICIPANT_JOINED);
        assert_eq!(event.room.unwrap().name, "demo");
        assert_eq!(event.participant.unwrap().identity, "alice");
    }

    #[test]
    fn rejects_missing_auth() {
        let body = joined_body("demo", "alice");
        assert!(matches!(
            receive(&body, None, API_KEY, API_SECRET),
            Err(WebhookError::MissingAuth)
        ));
    }

    #[test]
    fn rejects_tampered_bodies() {
        let body = joined_body("demo", "alice");
        let token = sign(&body);
        let mut tampered = body.clone();
        tampered[0] ^= 1;

        assert!(matches!(
            receive(&tampered, Some(&token), API_KEY, API_SECRET),
            Err(WebhookError::DigestMismatch) | Err(WebhookError::Parse(_))
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = joined_body("demo", "alice");
        let token = sign(&body);
        assert!(matches!(
            receive(&body, Some(&token), API_KEY, "other-secret"),
            Err(WebhookError::InvalidToken(_))
        ));
    }

    #[test]
    fn rejects_unknown_issuer() {
        let body = joined_body("demo", "alice");
        let token = sign(&body);
        assert!(matches!(
            receive(&body, Some(&token), "another-key", API_SECRET),
            Err(WebhookError::InvalidToken(_))
        ));
    }
}
