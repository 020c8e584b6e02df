//! Request authentication
//!
//! Two static schemes: a shared API key sent in `X-API-Key`, and an HMAC-signed
//! bearer token obtained from `POST /auth/login`. The active combination is
//! fixed at startup as an [`AuthMode`].

pub mod password;
pub mod token;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use crate::config::AuthConfig;
use crate::error::AuthError;

pub use password::{UserStore, hash_password, read_password};
pub use token::{Claims, TokenService};

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Who an admitted request belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Authentication is disabled
    Anonymous,
    /// Subject of a valid bearer token
    User(String),
    /// A configured API key
    ApiKey(String),
}

impl Identity {
    /// Log-safe description: usernames as-is, API keys shortened to 8 characters
    #[must_use]
    pub fn log_label(&self) -> String {
        match self {
            Identity::Anonymous => "anonymous".to_string(),
            Identity::User(user) => format!("user:{user}"),
            Identity::ApiKey(key) => format!("key:{}", mask_api_key(key)),
        }
    }
}

/// First 8 characters of an API key followed by `...`
#[must_use]
pub fn mask_api_key(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    format!("{prefix}...")
}

/// Credentials extracted from a request; either may be absent
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    pub bearer: Option<&'a str>,
    pub api_key: Option<&'a str>,
}

/// Which schemes are switched on, decided once at startup
#[derive(Debug, Clone)]
pub enum AuthMode {
    Disabled,
    ApiKeyOnly(Arc<HashSet<String>>),
    BearerOnly(TokenService),
    Both {
        tokens: TokenService,
        api_keys: Arc<HashSet<String>>,
    },
}

/// Admits or rejects requests according to the configured [`AuthMode`]
#[derive(Debug, Clone)]
pub struct AuthGate {
    mode: AuthMode,
}

impl AuthGate {
    #[must_use]
    pub fn new(mode: AuthMode) -> Self {
        Self { mode }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let api_keys = || -> Arc<HashSet<String>> {
            Arc::new(config.api_key_set().map(str::to_string).collect())
        };
        let tokens = || {
            TokenService::new(
                &config.jwt_secret,
                &config.jwt_algorithm,
                config.jwt_expiration_minutes,
            )
        };

        let mode = match (config.jwt_enabled, config.api_key_enabled) {
            (false, false) => AuthMode::Disabled,
            (false, true) => AuthMode::ApiKeyOnly(api_keys()),
            (true, false) => AuthMode::BearerOnly(tokens()?),
            (true, true) => AuthMode::Both {
                tokens: tokens()?,
                api_keys: api_keys(),
            },
        };

        Ok(Self::new(mode))
    }

    #[must_use]
    pub fn mode(&self) -> &AuthMode {
        &self.mode
    }

    /// Token service when bearer tokens are enabled
    #[must_use]
    pub fn tokens(&self) -> Option<&TokenService> {
        match &self.mode {
            AuthMode::BearerOnly(tokens) | AuthMode::Both { tokens, .. } => Some(tokens),
            AuthMode::Disabled | AuthMode::ApiKeyOnly(_) => None,
        }
    }

    fn api_keys(&self) -> Option<&HashSet<String>> {
        match &self.mode {
            AuthMode::ApiKeyOnly(keys) | AuthMode::Both { api_keys: keys, .. } => Some(keys),
            AuthMode::Disabled | AuthMode::BearerOnly(_) => None,
        }
    }

    /// Decide whether to admit a request.
    ///
    /// A presented bearer token is checked first and settles the outcome on its
    /// own: the API key is never consulted once a token has been seen.
    pub fn authenticate(&self, credentials: Credentials<'_>) -> Result<Identity, AuthError> {
        if let (Some(tokens), Some(bearer)) = (self.tokens(), credentials.bearer) {
            return tokens.verify(bearer).map(Identity::User);
        }

        if let (Some(keys), Some(api_key)) = (self.api_keys(), credentials.api_key) {
            return if keys.contains(api_key) {
                Ok(Identity::ApiKey(api_key.to_string()))
            } else {
                Err(AuthError::INVALID_API_KEY)
            };
        }

        match self.mode {
            AuthMode::Disabled => Ok(Identity::Anonymous),
            _ => Err(AuthError::MISSING),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";
    const KEY: &str = "test-api-key-123";

    fn tokens() -> TokenService {
        TokenService::new(SECRET, "HS256", 30).unwrap()
    }

    fn keys() -> Arc<HashSet<String>> {
        Arc::new(HashSet::from([KEY.to_string()]))
    }

    fn both() -> AuthGate {
        AuthGate::new(AuthMode::Both {
            tokens: tokens(),
            api_keys: keys(),
        })
    }

    #[test]
    fn test_disabled_admits_anonymous() {
        let gate = AuthGate::new(AuthMode::Disabled);
        assert_eq!(gate.authenticate(Credentials::default()), Ok(Identity::Anonymous));

        // Credentials are ignored when nothing is enabled
        let creds = Credentials {
            bearer: Some("junk"),
            api_key: Some("junk"),
        };
        assert_eq!(gate.authenticate(creds), Ok(Identity::Anonymous));
    }

    #[test]
    fn test_api_key_only() {
        let gate = AuthGate::new(AuthMode::ApiKeyOnly(keys()));

        let ok = gate.authenticate(Credentials {
            bearer: None,
            api_key: Some(KEY),
        });
        assert_eq!(ok, Ok(Identity::ApiKey(KEY.to_string())));

        let bad = gate.authenticate(Credentials {
            bearer: None,
            api_key: Some("wrong"),
        });
        assert_eq!(bad, Err(AuthError::INVALID_API_KEY));

        assert_eq!(gate.authenticate(Credentials::default()), Err(AuthError::MISSING));
    }

    #[test]
    fn test_api_key_only_ignores_bearer() {
        let gate = AuthGate::new(AuthMode::ApiKeyOnly(keys()));
        let creds = Credentials {
            bearer: Some("invalid-token"),
            api_key: None,
        };
        assert_eq!(gate.authenticate(creds), Err(AuthError::MISSING));
    }

    #[test]
    fn test_bearer_only() {
        let gate = AuthGate::new(AuthMode::BearerOnly(tokens()));
        let token = tokens().issue("alice").unwrap();

        let ok = gate.authenticate(Credentials {
            bearer: Some(&token),
            api_key: None,
        });
        assert_eq!(ok, Ok(Identity::User("alice".to_string())));

        let bad = gate.authenticate(Credentials {
            bearer: Some("invalid-token"),
            api_key: None,
        });
        assert_eq!(bad, Err(AuthError::INVALID_TOKEN));

        // A key is not accepted when only tokens are enabled
        let key_only = gate.authenticate(Credentials {
            bearer: None,
            api_key: Some(KEY),
        });
        assert_eq!(key_only, Err(AuthError::MISSING));
    }

    #[test]
    fn test_invalid_token_wins_over_valid_key() {
        let creds = Credentials {
            bearer: Some("invalid-token"),
            api_key: Some(KEY),
        };
        assert_eq!(both().authenticate(creds), Err(AuthError::INVALID_TOKEN));
    }

    #[test]
    fn test_valid_token_skips_invalid_key() {
        let token = tokens().issue("alice").unwrap();
        let creds = Credentials {
            bearer: Some(&token),
            api_key: Some("not-a-key"),
        };
        assert_eq!(both().authenticate(creds), Ok(Identity::User("alice".to_string())));
    }

    #[test]
    fn test_falls_back_to_api_key() {
        let creds = Credentials {
            bearer: None,
            api_key: Some(KEY),
        };
        assert_eq!(both().authenticate(creds), Ok(Identity::ApiKey(KEY.to_string())));
    }

    #[test]
    fn test_both_missing() {
        assert_eq!(both().authenticate(Credentials::default()), Err(AuthError::MISSING));
    }

    #[test]
    fn test_from_config_modes() {
        let mut config = AuthConfig::default();
        assert!(matches!(AuthGate::from_config(&config).unwrap().mode(), AuthMode::Disabled));

        config.api_key_enabled = true;
        config.api_keys = vec![" key-1 ".into(), String::new()];
        let gate = AuthGate::from_config(&config).unwrap();
        let AuthMode::ApiKeyOnly(keys) = gate.mode() else {
            panic!("expected api key mode");
        };
        assert_eq!(keys.len(), 1);
        assert!(keys.contains("key-1"));

        config.jwt_enabled = true;
        assert!(matches!(AuthGate::from_config(&config).unwrap().mode(), AuthMode::Both { .. }));
    }

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("abcdefghijkl"), "abcdefgh...");
        assert_eq!(mask_api_key("abc"), "abc...");
        assert_eq!(Identity::ApiKey("abcdefghijkl".into()).log_label(), "key:abcdefgh...");
    }
}
