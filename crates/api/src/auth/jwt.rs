//! JWT token generation and validation
//!
//! Tokens are issued by the storefront's identity service; this server only
//! verifies them. `generate_token` exists for tests and local tooling.

use chatdesk_shared::{AuthenticatedUser, Participant, ParticipantRole};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// JWT claims carried by storefront and admin console tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user or admin id)
    pub sub: String,
    /// Display name
    pub name: String,
    pub role: ParticipantRole,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// JWT ID (jti)
    pub jti: String,
}

impl Claims {
    pub fn participant(&self) -> Participant {
        Participant {
            id: self.sub.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }

    /// Customer identity for `start`. Admin tokens carry no customer identity.
    pub fn authenticated_user(&self) -> Option<AuthenticatedUser> {
        match self.role {
            ParticipantRole::Customer => Some(AuthenticatedUser {
                id: self.sub.clone(),
                name: self.name.clone(),
                phone: self.phone.clone(),
                email: self.email.clone(),
            }),
            ParticipantRole::Admin => None,
        }
    }
}

/// JWT manager for token operations
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
}

impl JwtManager {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    /// Generate a token for a participant
    pub fn generate_token(
        &self,
        participant: &Participant,
        email: Option<&str>,
    ) -> Result<String, JwtError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + Duration::hours(self.expiry_hours);

        let claims = Claims {
            sub: participant.id.clone(),
            name: participant.name.clone(),
            role: participant.role,
            email: email.map(str::to_string),
            phone: None,
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Validate and decode a token.
    /// The algorithm is pinned to HS256.
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}
