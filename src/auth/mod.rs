//! Authentication module for the uploaded client secret and mailbox tokens
//!
//! This module provides:
//! - Credential intake (client-secret document validation)
//! - PKCE code generation for the consent flow
//! - Token storage and retrieval
//! - OAuth2 loopback callback server
//! - GmailAuthProvider for managing mailbox access tokens

mod pkce;
mod credentials;
mod callback_server;
mod client_secret;
mod provider;

pub use client_secret::{ClientKind, ClientSecret, OAuthClient};
pub use credentials::{Credentials, delete_credentials, load_credentials, save_credentials, token_path};
pub use provider::{GMAIL_SCOPES, GmailAuthProvider};


use async_trait::async_trait;
use crate::Result;

/// Anything that can hand out a bearer token for the mailbox API
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Fixed token, for tests
#[cfg(test)]
pub struct StaticToken(pub &'static str);

#[cfg(test)]
#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.to_string())
    }
}
