//! Credential record and origin normalization

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use url::Url;
use zeroize::Zeroize;

use crate::error::VaultError;
use crate::Result;

/// A saved login. The secret is wiped from memory when the value is dropped.
#[derive(Clone, Serialize)]
pub struct Credential {
    pub domain: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .finish()
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Username and secret as a backend returns them.
pub struct StoredSecret {
    pub username: String,
    pub secret: String,
}

impl Drop for StoredSecret {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Reduce an origin or url to the lower-cased host credentials are keyed by.
/// A bare host such as `example.com` is accepted as well.
pub fn extract_domain(origin: &str) -> Result<String> {
    let origin = origin.trim();
    if origin.is_empty() {
        return Err(VaultError::InvalidOrigin(origin.to_string()));
    }

    let parsed = match Url::parse(origin) {
        Ok(url) if url.has_host() => url,
        _ => Url::parse(&format!("https://{}", origin))
            .map_err(|_| VaultError::InvalidOrigin(origin.to_string()))?,
    };

    parsed
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| VaultError::InvalidOrigin(origin.to_string()))
}
