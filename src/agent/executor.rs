//! Agent executor - the model/tool loop behind a single `invoke`

use async_trait::async_trait;
use tracing::{debug, info};
use crate::Result;
use crate::prompt::PromptTemplate;
use crate::tools::ToolRunner;
use super::Agent;
use super::llm::LlmClient;
use super::message::{Message, ToolCallRequest};

/// Output returned when the loop runs out of iterations
pub const STOPPED_OUTPUT: &str = "Agent stopped due to iteration limit or time limit.";

/// Runs a prompt, the model and the bound tools until the model answers
pub struct AgentExecutor<C: LlmClient> {
    client: C,
    tools: ToolRunner,
    prompt: PromptTemplate,
    max_iterations: usize,
}

impl<C: LlmClient> AgentExecutor<C> {
    /// `prompt` must already carry every variable except `input`.
    pub fn new(client: C, tools: ToolRunner, prompt: PromptTemplate, max_iterations: usize) -> Self {
        Self {
            client,
            tools,
            prompt,
            max_iterations,
        }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Run one tool call; an unknown name becomes an observation for the model
    async fn observe(&self, call: &ToolCallRequest) -> Result<String> {
        if !self.tools.has(&call.name) {
            debug!("Model requested unknown tool {}", call.name);
            return Ok(format!(
                "{} is not a valid tool, try one of [{}].",
                call.name,
                self.tools.tool_names().join(", ")
            ));
        }

        debug!("Executing tool: {}", call.name);
        let result = self.tools.execute(&call.name, call.arguments.clone()).await?;
        debug!("Tool {} returned {} chars", call.name, result.len());
        Ok(result)
    }
}

#[async_trait]
impl<C: LlmClient> Agent for AgentExecutor<C> {
    async fn invoke(&self, input: &str) -> Result<String> {
        let mut messages = self.prompt.format(input)?;
        let definitions = self.tools.definitions();

        for iteration in 0..self.max_iterations {
            debug!("Iteration {}/{}", iteration + 1, self.max_iterations);

            let response = self.client.chat(&messages, &definitions).await?;

            if !response.has_tool_calls() {
                let content = response.content.unwrap_or_default();
                info!("Agent answered in {} iteration(s), {} chars", iteration + 1, content.len());
                return Ok(content);
            }

            messages.push(Message::assistant_with_tools(
                response.content.clone().unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let observation = self.observe(call).await?;
                messages.push(Message::tool_result(&call.id, observation));
            }
        }

        info!("Agent hit the {} iteration limit", self.max_iterations);
        Ok(STOPPED_OUTPUT.to_string())
    }
}
