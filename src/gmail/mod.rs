//! Gmail REST API access.
//!
//! This module provides:
//! - [`GmailApi`] trait, the seam the mailbox tools call through
//! - [`GmailClient`], the reqwest implementation
//! - MIME helpers for outgoing messages and payload decoding

mod client;
pub mod mime;

pub use client::GmailClient;

use async_trait::async_trait;
use serde::Serialize;
use crate::Result;

/// A message as handed back to the agent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MailMessage {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
    pub snippet: String,
    pub subject: String,
    pub sender: String,
    pub to: String,
    pub cc: String,
    pub date: String,
    pub body: String,
}

/// One search hit when searching threads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSummary {
    pub id: String,
    pub snippet: String,
}

/// A thread and the snippets of its messages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailThread {
    pub id: String,
    pub messages: Vec<ThreadSummary>,
}

/// A message to send or save as a draft
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Mailbox operations the toolset is built from
#[async_trait]
pub trait GmailApi: Send + Sync {
    /// Search messages with Gmail query syntax
    async fn search_messages(&self, query: &str, max_results: u32) -> Result<Vec<MailMessage>>;

    /// Search threads with Gmail query syntax
    async fn search_threads(&self, query: &str, max_results: u32) -> Result<Vec<ThreadSummary>>;

    async fn get_message(&self, id: &str) -> Result<MailMessage>;

    async fn get_thread(&self, id: &str) -> Result<MailThread>;

    /// Send a message, returning its id
    async fn send_message(&self, message: &OutgoingMessage) -> Result<String>;

    /// Save a draft, returning the draft id
    async fn create_draft(&self, message: &OutgoingMessage) -> Result<String>;
}
