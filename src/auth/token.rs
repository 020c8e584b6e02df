//! Bearer token issuing and verification (HMAC-signed JWT)

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Claims carried by our access tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Username the token was issued to
    pub sub: String,
    /// Expiry as a unix timestamp (seconds)
    pub exp: i64,
}

/// Signs and verifies access tokens with a shared secret
#[derive(Clone)]
pub struct TokenService {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.algorithm)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str, algorithm: &str, expiration_minutes: u64) -> Result<Self> {
        let algorithm = Algorithm::from_str(algorithm)
            .with_context(|| format!("Unsupported JWT algorithm '{algorithm}'"))?;
        let minutes = i64::try_from(expiration_minutes).context("JWT expiration too large")?;

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration: Duration::minutes(minutes),
        })
    }

    /// Issue a token for `username` that expires after the configured lifetime
    pub fn issue(&self, username: &str) -> Result<String> {
        let claims = Claims {
            sub: username.to_string(),
            exp: (Utc::now() + self.expiration).timestamp(),
        };
        self.sign(&claims)
    }

    /// Sign arbitrary claims with this service's key
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .context("Failed to sign access token")
    }

    /// Verify signature and expiry, returning the token subject
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::TOKEN_EXPIRED),
                _ => {
                    tracing::debug!(error = %err, "token rejected");
                    Err(AuthError::INVALID_TOKEN)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret", "HS256", 30).unwrap()
    }

    #[test]
    fn test_issue_then_verify() {
        let tokens = service();
        let token = tokens.issue("alice").unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), "alice");
    }

    #[test]
    fn test_expired_token() {
        let tokens = service();
        let token = tokens
            .sign(&Claims {
                sub: "alice".into(),
                exp: (Utc::now() - Duration::minutes(5)).timestamp(),
            })
            .unwrap();
        assert_eq!(tokens.verify(&token).unwrap_err(), AuthError::TOKEN_EXPIRED);
    }

    #[test]
    fn test_garbage_token() {
        assert_eq!(service().verify("invalid-token").unwrap_err(), AuthError::INVALID_TOKEN);
    }

    #[test]
    fn test_wrong_secret() {
        let other = TokenService::new("other-secret", "HS256", 30).unwrap();
        let token = other.issue("mallory").unwrap();
        assert_eq!(service().verify(&token).unwrap_err(), AuthError::INVALID_TOKEN);
    }

    #[test]
    fn test_wrong_algorithm() {
        let other = TokenService::new("test-secret", "HS512", 30).unwrap();
        let token = other.issue("alice").unwrap();
        assert_eq!(service().verify(&token).unwrap_err(), AuthError::INVALID_TOKEN);
    }
}
