//! Adapters module - front-ends that drive the chat loop.
//!
//! # Supported Channels
//!
//! - **Web** - browser UI served by axum (primary)
//! - **CLI** - interactive terminal REPL
//!
//! Both hold a [`ChatSession`](crate::chat::ChatSession) per user and build
//! agents through an [`AgentFactory`](crate::agent::AgentFactory).

pub mod cli;
pub mod web;

/// Channel trait for chat front-ends.
///
/// All channel implementations must be [`Send`] + [`Sync`] for async compatibility.
pub trait Channel: Send + Sync {
    /// Channel name (e.g., "web", "cli").
    fn name(&self) -> &str;

    /// Run until the user or process ends the channel.
    fn start(&self) -> impl std::future::Future<Output = crate::Result<()>> + Send;
}
