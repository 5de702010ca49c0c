//! Mailbox token storage
//!
//! Handles saving and loading OAuth2 tokens from ~/.gmail-chat/token.json

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::Result;

/// OAuth2 credentials with access and refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// OAuth client these tokens were issued to
    pub client_id: String,

    /// The access token for API requests
    pub access_token: String,

    /// The refresh token for obtaining new access tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// When the access token expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Scopes granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credentials {
    /// Create new credentials from token response
    pub fn new(
        client_id: impl Into<String>,
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        let expires_at = expires_in_secs.map(|secs| {
            Utc::now() + chrono::Duration::seconds(secs)
        });

        Self {
            client_id: client_id.into(),
            access_token,
            refresh_token,
            token_type: default_token_type(),
            expires_at,
            scope: None,
        }
    }

    /// Check if the access token is expired or about to expire
    ///
    /// Returns true if the token expires within the next 5 minutes
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => {
                let buffer = chrono::Duration::minutes(5);
                Utc::now() + buffer >= expires
            }
            None => false,
        }
    }

    /// Check if we have a refresh token
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Get the default token file path
pub fn token_path() -> PathBuf {
    crate::config::config_dir().join("token.json")
}

/// Load credentials from file
pub fn load_credentials(path: &Path) -> Result<Option<Credentials>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let creds: Credentials = serde_json::from_str(&content)?;
    Ok(Some(creds))
}

/// Save credentials to file
pub fn save_credentials(path: &Path, credentials: &Credentials) -> Result<()> {
    // Create parent directory
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(credentials)?;
    std::fs::write(path, content)?;

    // Set restrictive permissions on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }

    Ok(())
}

/// Delete stored credentials
pub fn delete_credentials(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
