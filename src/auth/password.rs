//! Username / password-hash table for the login endpoint

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

/// Users allowed to exchange a password for a token
#[derive(Debug, Clone, Default)]
pub struct UserStore {
    users: Arc<HashMap<String, String>>,
}

impl UserStore {
    #[must_use]
    pub fn new(users: HashMap<String, String>) -> Self {
        Self {
            users: Arc::new(users),
        }
    }

    /// Check a password against the stored bcrypt hash.
    ///
    /// Unknown users and malformed hashes both count as a mismatch.
    pub async fn verify(&self, username: &str, password: &str) -> bool {
        let Some(hash) = self.users.get(username).cloned() else {
            return false;
        };
        let password = password.to_string();

        match tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(err)) => {
                tracing::warn!(username, error = %err, "stored password hash is invalid");
                false
            }
            Err(err) => {
                tracing::error!(error = %err, "password verification task failed");
                false
            }
        }
    }
}

/// Hash a password for the `auth.users` table
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).context("Failed to hash password")
}

/// Read a password from the first line of `reader`, without its line ending
pub fn read_password(mut reader: impl BufRead) -> Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line).context("Failed to read password")?;

    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("No password given on stdin");
    }
    Ok(password.to_string())
}
