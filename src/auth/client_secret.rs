//! Credential intake for OAuth client-secret documents
//!
//! Google issues client secrets as JSON with either an `installed` (desktop
//! app) or `web` top-level section. Intake only checks for that shape; the
//! fields inside are read later, when a mailbox token is first needed.

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use crate::Result;
use crate::error::Error;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Which client-secret shape was uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Installed,
    Web,
}

impl ClientKind {
    fn key(self) -> &'static str {
        match self {
            ClientKind::Installed => "installed",
            ClientKind::Web => "web",
        }
    }
}

/// A validated client-secret document
#[derive(Debug, Clone)]
pub struct ClientSecret {
    kind: ClientKind,
    document: Value,
}

/// The OAuth client fields the consent flow needs
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,

    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,

    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ClientSecret {
    /// Validate an uploaded document
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let document: Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedCredentials(format!("not valid JSON: {}", e)))?;
        Self::from_value(document)
    }

    /// Validate an already-parsed document
    pub fn from_value(document: Value) -> Result<Self> {
        let Some(object) = document.as_object() else {
            return Err(Error::MalformedCredentials(
                "Client secrets is not in the correct format.".to_string(),
            ));
        };

        let kind = if object.contains_key("installed") {
            ClientKind::Installed
        } else if object.contains_key("web") {
            ClientKind::Web
        } else {
            return Err(Error::MalformedCredentials(
                "Client secrets is not in the correct format.".to_string(),
            ));
        };

        Ok(Self { kind, document })
    }

    /// Load and validate a client-secret file from disk
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn kind(&self) -> ClientKind {
        self.kind
    }

    /// Read the OAuth client fields from the recognized section
    pub fn oauth_client(&self) -> Result<OAuthClient> {
        let section = self.document
            .get(self.kind.key())
            .cloned()
            .unwrap_or(Value::Null);

        serde_json::from_value(section).map_err(|e| {
            Error::OAuth(format!(
                "'{}' section of the client secrets is unusable: {}",
                self.kind.key(),
                e
            ))
        })
    }

    /// Stable hex digest of the document, used to key memoized agents
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.document.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_installed_accepted() {
        let secret = ClientSecret::parse(br#"{"installed": {"client_id": "abc"}}"#).unwrap();
        assert_eq!(secret.kind(), ClientKind::Installed);
    }

    #[test]
    fn test_web_accepted() {
        let secret = ClientSecret::parse(br#"{"web": {}}"#).unwrap();
        assert_eq!(secret.kind(), ClientKind::Web);
    }

    #[test]
    fn test_empty_object_rejected() {
        let err = ClientSecret::parse(b"{}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedCredentials);
    }

    #[test]
    fn test_rejected_shapes() {
        let cases: [&[u8]; 6] = [
            b"",
            b"not json",
            b"[]",
            b"\"installed\"",
            br#"{"other": {"installed": {}}}"#,
            br#"{"Installed": {}}"#,
        ];
        for case in cases {
            let err = ClientSecret::parse(case).unwrap_err();
            assert!(
                matches!(err, Error::MalformedCredentials(_)),
                "accepted {:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_oauth_client_defaults() {
        let secret = ClientSecret::parse(
            br#"{"installed": {"client_id": "id-1", "client_secret": "s3cret"}}"#,
        )
        .unwrap();
        let client = secret.oauth_client().unwrap();
        assert_eq!(client.client_id, "id-1");
        assert_eq!(client.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(client.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_oauth_client_missing_id_is_oauth_error() {
        let secret = ClientSecret::parse(br#"{"web": {}}"#).unwrap();
        assert!(matches!(secret.oauth_client(), Err(Error::OAuth(_))));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = ClientSecret::parse(br#"{"web": {"client_id": "a"}}"#).unwrap();
        let a2 = ClientSecret::parse(br#"{"web": {"client_id": "a"}}"#).unwrap();
        let b = ClientSecret::parse(br#"{"web": {"client_id": "b"}}"#).unwrap();
        assert_eq!(a.fingerprint(), a2.fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
