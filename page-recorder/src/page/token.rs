//! Recorder access tokens for templated rooms.
//!
//! The recorder joins a room as a hidden, subscribe-only participant. The
//! token is an HS256 JWT signed with the API secret, carrying the API key as
//! issuer and a video grant scoped to one room.

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{Error, Result};

/// Default token validity.
const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Room capabilities granted to the recorder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    pub room_join: bool,
    pub room: String,
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub hidden: bool,
}

impl VideoGrant {
    /// Join-only, subscribe-only, invisible to other participants.
    pub fn recorder(room: impl Into<String>) -> Self {
        Self {
            room_join: true,
            room: room.into(),
            can_publish: false,
            can_subscribe: true,
            hidden: true,
        }
    }
}

/// JWT claims of a recorder token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecorderClaims {
    /// API key.
    pub iss: String,
    /// Participant identity.
    pub sub: String,
    pub jti: String,
    pub nbf: u64,
    pub exp: u64,
    pub video: VideoGrant,
}

/// Signs recorder tokens with a fixed API key/secret pair.
pub struct TokenIssuer {
    api_key: String,
    encoding_key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            encoding_key: EncodingKey::from_secret(api_secret.as_bytes()),
            ttl: DEFAULT_TTL,
        }
    }

    /// Set the token validity.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Mint a token that lets a fresh recorder identity join `room`.
    pub fn recorder_token(&self, room: &str) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::page(format!("system clock before epoch: {e}")))?
            .as_secs();

        let identity = format!("recorder-{}", uuid::Uuid::new_v4().simple());
        let claims = RecorderClaims {
            iss: self.api_key.clone(),
            sub: identity.clone(),
            jti: identity,
            nbf: now,
            exp: now + self.ttl.as_secs(),
            video: VideoGrant::recorder(room),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::page(format!("failed to sign recorder token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    fn decode_claims(token: &str, secret: &str) -> jsonwebtoken::errors::Result<RecorderClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&["api-key"]);
        decode::<RecorderClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
    }

    #[test]
    fn token_grants_hidden_subscribe_only_join() {
        let token = TokenIssuer::new("api-key", "api-secret")
            .recorder_token("standup")
            .unwrap();
        let claims = decode_claims(&token, "api-secret").unwrap();

        assert_eq!(claims.iss, "api-key");
        assert!(claims.sub.starts_with("recorder-"));
        assert_eq!(claims.video, VideoGrant::recorder("standup"));
        assert!(claims.video.hidden);
        assert!(!claims.video.can_publish);
        assert_eq!(claims.exp - claims.nbf, DEFAULT_TTL.as_secs());
    }

    #[test]
    fn token_is_bound_to_secret() {
        let token = TokenIssuer::new("api-key", "api-secret")
            .recorder_token("standup")
            .unwrap();
        assert!(decode_claims(&token, "other-secret").is_err());
    }

    #[test]
    fn every_token_gets_a_fresh_identity() {
        let issuer = TokenIssuer::new("api-key", "api-secret").with_ttl(Duration::from_secs(60));
        let a = decode_claims(&issuer.recorder_token("r").unwrap(), "api-secret").unwrap();
        let b = decode_claims(&issuer.recorder_token("r").unwrap(), "api-secret").unwrap();
        assert_ne!(a.sub, b.sub);
        assert_eq!(a.exp - a.nbf, 60);
    }
}
