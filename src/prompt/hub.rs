//! Remote prompt-template registry
//!
//! Templates are pulled by `owner/repo` name (optionally `owner/repo:commit`)
//! from `GET {hub}/commits/{owner}/{repo}/{commit}` and decoded from the
//! serialized chat-prompt manifest the registry stores.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use crate::Result;
use crate::error::Error;
use super::{PromptPart, PromptTemplate};

/// Source of prompt templates
#[async_trait]
pub trait TemplateRegistry: Send + Sync {
    async fn pull(&self, name: &str) -> Result<PromptTemplate>;
}

/// HTTP registry client
#[derive(Clone)]
pub struct HubClient {
    base_url: String,
    client: Client,
}

impl HubClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn commit_url(&self, name: &str) -> Result<String> {
        let (repo_path, commit) = match name.split_once(':') {
            Some((path, commit)) if !commit.is_empty() => (path, commit),
            _ => (name, "latest"),
        };

        let (owner, repo) = repo_path
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
            .ok_or_else(|| {
                Error::Template(format!("template name '{}' must look like owner/repo", name))
            })?;

        Ok(format!("{}/commits/{}/{}/{}", self.base_url, owner, repo, commit))
    }
}

#[async_trait]
impl TemplateRegistry for HubClient {
    async fn pull(&self, name: &str) -> Result<PromptTemplate> {
        let url = self.commit_url(name)?;
        debug!("Pulling prompt template {} from {}", name, url);

        let response = self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Template(format!("failed to fetch '{}': {}", name, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Template(format!(
                "registry returned {} for '{}': {}",
                status, name, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Template(format!("invalid registry response for '{}': {}", name, e)))?;

        let manifest = body
            .get("manifest")
            .ok_or_else(|| Error::Template(format!("registry response for '{}' has no manifest", name)))?;

        parse_manifest(manifest)
    }
}

/// Last element of a serialized object's `id` path, e.g. `HumanMessagePromptTemplate`
fn class_name(node: &Value) -> Option<&str> {
    node.get("id")?.as_array()?.last()?.as_str()
}

fn prompt_text(message: &Value) -> Result<String> {
    message
        .pointer("/kwargs/prompt/kwargs/template")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Template("message template has no text".to_string()))
}

/// Decode a serialized chat prompt
pub fn parse_manifest(manifest: &Value) -> Result<PromptTemplate> {
    match class_name(manifest) {
        Some("ChatPromptTemplate") => {}
        other => {
            return Err(Error::Template(format!(
                "unsupported template type {:?}, expected ChatPromptTemplate",
                other
            )))
        }
    }

    let messages = manifest
        .pointer("/kwargs/messages")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Template("chat template has no messages".to_string()))?;

    let mut parts = Vec::with_capacity(messages.len());
    for message in messages {
        let part = match class_name(message) {
            Some("SystemMessagePromptTemplate") => PromptPart::System(prompt_text(message)?),
            Some("HumanMessagePromptTemplate") => PromptPart::Human(prompt_text(message)?),
            Some("AIMessagePromptTemplate") => PromptPart::Ai(prompt_text(message)?),
            Some("MessagesPlaceholder") => {
                let kwargs = message.get("kwargs");
                let variable = kwargs
                    .and_then(|k| k.get("variable_name"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Template("placeholder has no variable_name".to_string()))?;
                let optional = kwargs
                    .and_then(|k| k.get("optional"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                PromptPart::Placeholder { variable: variable.to_string(), optional }
            }
            other => {
                return Err(Error::Template(format!("unsupported message type {:?}", other)));
            }
        };
        parts.push(part);
    }

    Ok(PromptTemplate::new(parts))
}

/// Registry serving fixed templates, for tests
#[cfg(test)]
pub(crate) struct StaticRegistry(pub Option<PromptTemplate>);

#[cfg(test)]
#[async_trait]
impl TemplateRegistry for StaticRegistry {
    async fn pull(&self, name: &str) -> Result<PromptTemplate> {
        self.0
            .clone()
            .ok_or_else(|| Error::Template(format!("registry unavailable for '{}'", name)))
    }
}

#[cfg(test)]
pub(crate) fn functions_manifest() -> Value {
    fn message(class: &str, template: &str) -> Value {
        serde_json::json!({
            "lc": 1, "type": "constructor",
            "id": ["langchain", "prompts", "chat", class],
            "kwargs": {"prompt": {
                "lc": 1, "type": "constructor",
                "id": ["langchain", "prompts", "prompt", "PromptTemplate"],
                "kwargs": {"template": template, "template_format": "f-string"}
            }}
        })
    }
    fn placeholder(name: &str, optional: bool) -> Value {
        serde_json::json!({
            "lc": 1, "type": "constructor",
            "id": ["langchain", "prompts", "chat", "MessagesPlaceholder"],
            "kwargs": {"variable_name": name, "optional": optional}
        })
    }

    serde_json::json!({
        "lc": 1, "type": "constructor",
        "id": ["langchain", "prompts", "chat", "ChatPromptTemplate"],
        "kwargs": {
            "input_variables": ["agent_scratchpad", "input", "instructions"],
            "messages": [
                message("SystemMessagePromptTemplate", "{instructions}"),
                placeholder("chat_history", true),
                message("HumanMessagePromptTemplate", "{input}"),
                placeholder("agent_scratchpad", false)
            ]
        }
    })
}
