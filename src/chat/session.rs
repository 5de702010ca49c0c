//! Per-user chat session: intake state, memoized agent, transcript

use std::fmt;
use std::sync::Arc;
use chrono::Utc;
use tracing::{debug, info, warn};
use crate::Result;
use crate::agent::{Agent, AgentFactory, AgentSpec};
use crate::auth::ClientSecret;
use crate::config::Config;
use crate::error::Error;
use super::transcript::Transcript;

/// What happened to the last credential upload
#[derive(Debug, Clone, Default)]
pub enum CredentialStatus {
    #[default]
    Missing,
    Loaded(ClientSecret),
    /// Last upload failed validation; holds the user-facing message
    Rejected(String),
}

impl CredentialStatus {
    pub fn secret(&self) -> Option<&ClientSecret> {
        match self {
            CredentialStatus::Loaded(secret) => Some(secret),
            _ => None,
        }
    }
}

/// Chat loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingInput,
    ProcessingTurn,
}

/// State for one browser session or one terminal run
pub struct ChatSession {
    credentials: CredentialStatus,
    api_key: Option<String>,
    model: String,
    transcript: Transcript,
    agent: Option<(String, Arc<dyn Agent>)>,
    state: TurnState,
    flash: Option<String>,
    draft: Option<String>,
}

impl fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let credentials = match &self.credentials {
            CredentialStatus::Missing => "missing",
            CredentialStatus::Loaded(_) => "loaded",
            CredentialStatus::Rejected(_) => "rejected",
        };
        f.debug_struct("ChatSession")
            .field("credentials", &credentials)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("turns", &self.transcript.len())
            .field("has_agent", &self.agent.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl ChatSession {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            credentials: CredentialStatus::Missing,
            api_key: None,
            model: model.into(),
            transcript: Transcript::new(),
            agent: None,
            state: TurnState::AwaitingInput,
            flash: None,
            draft: None,
        }
    }

    /// Validate an uploaded client-secret document
    ///
    /// A rejected upload replaces any credential accepted earlier.
    pub fn upload_credentials(&mut self, bytes: &[u8]) -> Result<()> {
        match ClientSecret::parse(bytes) {
            Ok(secret) => {
                info!("Accepted {:?} client secret", secret.kind());
                self.credentials = CredentialStatus::Loaded(secret);
                Ok(())
            }
            Err(e) => {
                warn!("Rejected credential upload: {}", e);
                self.credentials = CredentialStatus::Rejected(e.to_string());
                self.agent = None;
                Err(e)
            }
        }
    }

    pub fn credentials(&self) -> &CredentialStatus {
        &self.credentials
    }

    /// Store the key from the sidebar; blank clears it
    pub fn set_api_key(&mut self, key: &str) {
        let key = key.trim();
        self.api_key = (!key.is_empty()).then(|| key.to_string());
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn select_model(&mut self, config: &Config, model: &str) -> Result<()> {
        if !config.is_known_model(model) {
            return Err(Error::Config(format!("unknown model '{}'", model)));
        }
        self.model = model.to_string();
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn has_agent(&self) -> bool {
        self.agent.is_some()
    }

    /// Keep a message for the next render
    pub fn flash(&mut self, message: impl Into<String>) {
        self.flash = Some(message.into());
    }

    pub fn take_flash(&mut self) -> Option<String> {
        self.flash.take()
    }

    /// Keep the text of a failed turn so it can be offered again
    pub fn keep_draft(&mut self, text: impl Into<String>) {
        self.draft = Some(text.into());
    }

    pub fn take_draft(&mut self) -> Option<String> {
        self.draft.take()
    }

    /// Everything needed to build an agent, or what is missing
    ///
    /// The sidebar key wins over `env_key`.
    pub fn readiness(&self, env_key: Option<&str>) -> Result<AgentSpec> {
        let api_key = self.api_key.as_deref().or(env_key).filter(|k| !k.trim().is_empty());

        let mut missing = Vec::new();
        if self.credentials.secret().is_none() {
            missing.push("credentials.json");
        }
        if api_key.is_none() {
            missing.push("OpenAI API key");
        }

        match (self.credentials.secret(), api_key) {
            (Some(secret), Some(key)) => Ok(AgentSpec {
                credentials: secret.clone(),
                api_key: key.to_string(),
                model: self.model.clone(),
            }),
            _ => Err(Error::MissingConfiguration(missing)),
        }
    }

    /// Build the agent for the current configuration, reusing the last one
    /// while credential, key and model are unchanged
    ///
    /// Failed builds are not cached.
    pub async fn ensure_agent(
        &mut self,
        factory: &dyn AgentFactory,
        env_key: Option<&str>,
    ) -> Result<Arc<dyn Agent>> {
        let spec = match self.readiness(env_key) {
            Ok(spec) => spec,
            Err(e) => {
                self.agent = None;
                return Err(e);
            }
        };
        let fingerprint = spec.fingerprint();

        if let Some((current, agent)) = &self.agent {
            if *current == fingerprint {
                return Ok(agent.clone());
            }
        }

        self.agent = None;
        debug!("Building agent for {:?}", spec);
        let agent = factory.build(&spec).await?;
        self.agent = Some((fingerprint, agent.clone()));
        Ok(agent)
    }

    /// Run one chat turn
    ///
    /// On success the transcript gains the user turn and the answer. On
    /// failure, or if the future is dropped mid-turn, it is left as it was
    /// before the call.
    pub async fn submit(
        &mut self,
        factory: &dyn AgentFactory,
        env_key: Option<&str>,
        text: &str,
    ) -> Result<String> {
        let agent = self.ensure_agent(factory, env_key).await?;

        let asked_at = Utc::now();
        let outcome = {
            let _turn = TurnGuard::begin(&mut self.state);
            agent.invoke(text).await
        };

        match outcome {
            Ok(answer) => {
                self.transcript.push_exchange(asked_at, text, answer.clone());
                info!("Turn complete, transcript has {} entries", self.transcript.len());
                Ok(answer)
            }
            Err(e) => {
                warn!("Agent invocation failed: {}", e);
                Err(e)
            }
        }
    }
}

/// Holds `ProcessingTurn` for the life of one invocation
struct TurnGuard<'a> {
    state: &'a mut TurnState,
}

impl<'a> TurnGuard<'a> {
    fn begin(state: &'a mut TurnState) -> Self {
        *state = TurnState::ProcessingTurn;
        Self { state }
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        *self.state = TurnState::AwaitingInput;
    }
}
