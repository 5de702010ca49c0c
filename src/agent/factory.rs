//! Agent construction from a complete configuration

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::info;
use crate::Result;
use crate::auth::ClientSecret;
use crate::config::Config;
use crate::prompt::TemplateRegistry;
use crate::tools::GmailToolkit;
use super::executor::AgentExecutor;
use super::llm::OpenAiClient;

/// A callable agent: one user input in, one assistant answer out
#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(&self, input: &str) -> Result<String>;
}

/// Everything needed to build an agent
#[derive(Clone)]
pub struct AgentSpec {
    pub credentials: ClientSecret,
    pub api_key: String,
    pub model: String,
}

impl AgentSpec {
    /// Digest of (credential, key, model); equal specs build equal agents
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.credentials.fingerprint().as_bytes());
        hasher.update([0]);
        hasher.update(self.api_key.as_bytes());
        hasher.update([0]);
        hasher.update(self.model.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Debug for AgentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSpec")
            .field("credentials", &self.credentials.kind())
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

/// Builds agents; swapped for a fake in session and router tests
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn build(&self, spec: &AgentSpec) -> Result<Arc<dyn Agent>>;
}

/// Builds the Gmail tool agent: mailbox toolkit, registry prompt, OpenAI model
pub struct GmailAgentFactory {
    config: Arc<Config>,
    registry: Arc<dyn TemplateRegistry>,
    token_path: PathBuf,
}

impl GmailAgentFactory {
    pub fn new(config: Arc<Config>, registry: Arc<dyn TemplateRegistry>, token_path: PathBuf) -> Self {
        Self {
            config,
            registry,
            token_path,
        }
    }
}

#[async_trait]
impl AgentFactory for GmailAgentFactory {
    async fn build(&self, spec: &AgentSpec) -> Result<Arc<dyn Agent>> {
        let tools = GmailToolkit::new(&spec.credentials, &self.config, self.token_path.clone())?
            .into_runner();

        let prompt = self.registry
            .pull(&self.config.prompt_template)
            .await?
            .partial("instructions", self.config.instructions.clone());

        let client = OpenAiClient::new(&spec.api_key, &spec.model, &self.config.openai_base_url);

        info!(
            "Constructed agent: model={}, template={}, tools={}",
            spec.model,
            self.config.prompt_template,
            tools.tool_names().join(",")
        );

        Ok(Arc::new(AgentExecutor::new(client, tools, prompt, self.config.max_iterations)))
    }
}
