use crate::config;
use crate::error::{AppError, AppResult};
use std::fmt;

/// Session material attached to every request. Acquiring it is someone else's job; the
/// harvester only reads it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub anti_forgery_token: String,
    pub session_cookie: String,
    pub search_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("anti_forgery_token", &"<redacted>")
            .field("session_cookie", &"<redacted>")
            .field("search_token", &self.search_token)
            .finish()
    }
}

/// Read on every attempt, so a source backed by something rotatable is picked up mid-run.
pub trait CredentialSource: Send + Sync {
    fn credentials(&self) -> AppResult<Credentials>;
}

pub struct EnvCredentials {
    lookup: fn(&str) -> Option<String>,
}

impl Default for EnvCredentials {
    fn default() -> Self {
        EnvCredentials {
            lookup: |key| std::env::var(key).ok(),
        }
    }
}

impl EnvCredentials {
    pub fn with_lookup(lookup: fn(&str) -> Option<String>) -> Self {
        EnvCredentials { lookup }
    }

    fn required(&self, key: &str) -> AppResult<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Credentials(format!("environment variable {} is not set", key)))
    }
}

impl CredentialSource for EnvCredentials {
    fn credentials(&self) -> AppResult<Credentials> {
        Ok(Credentials {
            anti_forgery_token: self.required(config::ENV_ANTI_FORGERY_TOKEN)?,
            session_cookie: self.required(config::ENV_SESSION_COOKIE)?,
            search_token: (self.lookup)(config::ENV_SEARCH_TOKEN).unwrap_or_default(),
        })
    }
}

pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        StaticCredentials(credentials)
    }
}

impl CredentialSource for StaticCredentials {
    fn credentials(&self) -> AppResult<Credentials> {
        Ok(self.0.clone())
    }
}
