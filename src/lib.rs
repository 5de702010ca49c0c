//! gmail-chat - chat with your Gmail inbox through an LLM agent
//!
//! This library provides credential intake, the mailbox toolset, agent
//! construction and the chat loop, plus the browser and terminal front-ends
//! that drive it.

pub mod agent;
pub mod adapters;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod gmail;
pub mod prompt;
pub mod tools;
pub mod ui;

pub use error::{Error, Result};
