//! HS256 JWT issuing and verification.

use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// User id.
    sub: String,
    iat: u64,
    exp: u64,
}

/// Signs and checks bearer tokens with one shared secret.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `user_id` expiring after the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if signing fails.
    pub fn issue(&self, user_id: &str) -> Result<String, ApiError> {
        let now = jsonwebtoken::get_current_timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.ttl.as_secs(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("token signing failed: {e}")))
    }

    /// Returns the user id carried by a valid, unexpired token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] for a bad signature, malformed
    /// token, or expired token.
    pub fn verify(&self, token: &str) -> Result<String, ApiError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims.sub)
            .map_err(|e| ApiError::Unauthorized(format!("invalid token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let issuer = TokenIssuer::new(b"secret", Duration::from_secs(3600));
        let token = issuer.issue("user-1").unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), "user-1");
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = TokenIssuer::new(b"one", Duration::from_secs(60))
            .issue("user-1")
            .unwrap();
        let err = TokenIssuer::new(b"two", Duration::from_secs(60))
            .verify(&token)
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = TokenIssuer::new(b"secret", Duration::from_secs(60));
        let now = jsonwebtoken::get_current_timestamp();
        let claims = Claims {
            sub: "user-1".to_string(),
            iat: now - 120,
            exp: now - 60,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &issuer.encoding).unwrap();
        assert!(matches!(issuer.verify(&token), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        let issuer = TokenIssuer::new(b"secret", Duration::from_secs(60));
        assert!(matches!(issuer.verify("not.a.jwt"), Err(ApiError::Unauthorized(_))));
    }
}
