//! GmailAuthProvider - OAuth2 access tokens for the mailbox API
//!
//! Manages the installed-app PKCE flow for an uploaded client secret:
//! - Token caching (memory and token.json)
//! - Refresh of expired tokens
//! - Browser-based consent when nothing usable is cached

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use url::Url;
use crate::Result;
use crate::error::Error;
use crate::ui;
use super::TokenSource;
use super::callback_server::{bind, redirect_uri, wait_for_callback};
use super::client_secret::{ClientSecret, OAuthClient};
use super::credentials::{Credentials, load_credentials, save_credentials};
use super::pkce::{PkcePair, generate_state};

/// Full mailbox access: read, search, send and draft
pub const GMAIL_SCOPES: &[&str] = &["https://mail.google.com/"];

/// Google OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Token refresh request
#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
    refresh_token: &'a str,
    grant_type: &'a str,
}

/// Token exchange request
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
    code: &'a str,
    code_verifier: &'a str,
    redirect_uri: &'a str,
    grant_type: &'a str,
}

/// OAuth2 provider bound to one uploaded client secret
pub struct GmailAuthProvider {
    client: OAuthClient,
    token_path: PathBuf,
    callback_port: u16,
    http_client: Client,
    cached: Mutex<Option<Credentials>>,
}

impl GmailAuthProvider {
    /// Create a provider for a validated client secret
    pub fn new(secret: &ClientSecret, token_path: PathBuf, callback_port: u16) -> Result<Self> {
        Ok(Self {
            client: secret.oauth_client()?,
            token_path,
            callback_port,
            http_client: Client::new(),
            cached: Mutex::new(None),
        })
    }

    /// Get a valid access token, refreshing or re-authenticating as needed
    pub async fn get_valid_token(&self) -> Result<String> {
        // Held across the whole flow so concurrent tool calls share one consent
        let mut cached = self.cached.lock().await;

        if cached.is_none() {
            *cached = load_credentials(&self.token_path)?
                .filter(|c| c.client_id == self.client.client_id);
        }

        if let Some(creds) = cached.as_ref() {
            if !creds.is_expired() {
                tracing::debug!("Using cached mailbox access token");
                return Ok(creds.access_token.clone());
            }

            if let Some(refresh) = creds.refresh_token.clone() {
                tracing::info!("Mailbox access token expired, refreshing");
                match self.refresh_token(&refresh).await {
                    Ok(new_creds) => {
                        save_credentials(&self.token_path, &new_creds)?;
                        let token = new_creds.access_token.clone();
                        *cached = Some(new_creds);
                        return Ok(token);
                    }
                    Err(e) => {
                        tracing::warn!("Token refresh failed: {}, re-authenticating", e);
                    }
                }
            }
        }

        tracing::info!("No valid mailbox token found, starting OAuth2 consent flow");
        let creds = self.authorize().await?;
        save_credentials(&self.token_path, &creds)?;
        let token = creds.access_token.clone();
        *cached = Some(creds);
        Ok(token)
    }

    /// Run the browser consent flow
    pub async fn authorize(&self) -> Result<Credentials> {
        let pkce = PkcePair::generate();
        let state = generate_state();
        let listener = bind(self.callback_port).await?;
        let auth_url = self.build_auth_url(&pkce.challenge, &state)?;

        ui::print_step("Opening browser for Gmail authorization");
        ui::print_step(&format!("If the browser doesn't open, visit:\n{}", auth_url));

        if let Err(e) = open::that(&auth_url) {
            tracing::warn!("Failed to open browser: {}", e);
        }

        ui::print_thinking("Waiting for authorization");
        let auth_result = wait_for_callback(listener, Some(&state)).await?;

        ui::print_success("Authorization received");
        self.exchange_code(&auth_result.code, &pkce.verifier).await
    }

    /// Build the authorization URL
    fn build_auth_url(&self, code_challenge: &str, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.client.auth_uri)
            .map_err(|e| Error::OAuth(format!("Invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client.client_id)
            .append_pair("redirect_uri", &redirect_uri(self.callback_port))
            .append_pair("response_type", "code")
            .append_pair("scope", &GMAIL_SCOPES.join(" "))
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        Ok(url.to_string())
    }

    /// Exchange authorization code for tokens
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Credentials> {
        let redirect = redirect_uri(self.callback_port);
        let request = TokenExchangeRequest {
            client_id: &self.client.client_id,
            client_secret: self.client.client_secret.as_deref(),
            code,
            code_verifier,
            redirect_uri: &redirect,
            grant_type: "authorization_code",
        };

        let token_response = self.post_token_request(&request, "Token exchange").await?;

        let mut creds = Credentials::new(
            self.client.client_id.clone(),
            token_response.access_token,
            token_response.refresh_token,
            token_response.expires_in,
        );
        creds.scope = token_response.scope;
        Ok(creds)
    }

    /// Refresh an expired access token
    async fn refresh_token(&self, refresh_token: &str) -> Result<Credentials> {
        let request = RefreshRequest {
            client_id: &self.client.client_id,
            client_secret: self.client.client_secret.as_deref(),
            refresh_token,
            grant_type: "refresh_token",
        };

        let token_response = self.post_token_request(&request, "Token refresh").await?;

        // Google omits the refresh token on refresh responses
        let refresh = token_response.refresh_token
            .or_else(|| Some(refresh_token.to_string()));

        let mut creds = Credentials::new(
            self.client.client_id.clone(),
            token_response.access_token,
            refresh,
            token_response.expires_in,
        );
        creds.scope = token_response.scope;
        Ok(creds)
    }

    async fn post_token_request<T: Serialize>(&self, form: &T, what: &str) -> Result<TokenResponse> {
        let response = self.http_client
            .post(&self.client.token_uri)
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(Error::OAuth(format!("{} failed: {}", what, error_text)));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TokenSource for GmailAuthProvider {
    async fn access_token(&self) -> Result<String> {
        self.get_valid_token().await
    }
}
