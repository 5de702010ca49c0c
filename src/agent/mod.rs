//! Agent module - core agent logic.
//!
//! This module contains:
//! - Message types exchanged with the model
//! - LLM client trait and the OpenAI implementation
//! - The executor loop that runs model and tool calls
//! - Agent construction from a credential, key and model

mod executor;
mod factory;
mod message;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use executor::{AgentExecutor, STOPPED_OUTPUT};
pub use factory::{Agent, AgentFactory, AgentSpec, GmailAgentFactory};
pub use llm::{LlmClient, LlmResponse, OpenAiClient, Usage};
pub use message::{Message, Role, ToolCallRequest};

#[cfg(test)]
pub(crate) use factory::fake::FakeAgentFactory;
