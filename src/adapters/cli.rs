//! CLI adapter - terminal REPL over the same chat session the browser uses.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, PasswordDisplayMode, Select};
use tokio::sync::Mutex;

use crate::agent::AgentFactory;
use crate::chat::ChatSession;
use crate::config::Config;
use crate::error::Error;
use crate::{ui, Result};

use super::Channel;

/// Build a ready session from a credential file, prompting for what is missing
///
/// The key prompt is skipped when the environment already supplies one; the
/// model prompt is skipped when `model` is given.
pub fn prepare_session(config: &Config, credentials: &Path, model: Option<&str>) -> Result<ChatSession> {
    let mut session = ChatSession::new(config.default_model.clone());

    let bytes = std::fs::read(credentials)?;
    session.upload_credentials(&bytes)?;
    ui::print_success("credentials.json uploaded successfully");

    let model = match model {
        Some(model) => model.to_string(),
        None => {
            let start = config.models.iter().position(|m| *m == config.default_model).unwrap_or(0);
            Select::new("Choose OpenAI model", config.models.clone())
                .with_starting_cursor(start)
                .prompt()
                .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?
        }
    };
    session.select_model(config, &model)?;

    if config.env_api_key.is_none() {
        let key = Password::new("Enter your OPENAI_API_KEY")
            .without_confirmation()
            .with_display_mode(PasswordDisplayMode::Masked)
            .prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
        session.set_api_key(&key);
    }

    Ok(session)
}

/// CLI channel for interactive chat sessions.
pub struct CliChannel {
    session: Mutex<ChatSession>,
    factory: Arc<dyn AgentFactory>,
    env_key: Option<String>,
}

impl CliChannel {
    /// Create a new CLI channel.
    pub fn new(session: ChatSession, factory: Arc<dyn AgentFactory>, env_key: Option<String>) -> Self {
        Self {
            session: Mutex::new(session),
            factory,
            env_key,
        }
    }

    /// Run a single chat turn and return the answer.
    pub async fn run_once(&self, message: &str) -> Result<String> {
        let mut session = self.session.lock().await;
        session.submit(self.factory.as_ref(), self.env_key.as_deref(), message).await
    }

    /// Build the agent up front so configuration errors show before the prompt
    pub async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session.ensure_agent(self.factory.as_ref(), self.env_key.as_deref()).await?;
        Ok(())
    }

    /// Number of transcript entries so far.
    pub async fn transcript_len(&self) -> usize {
        self.session.lock().await.transcript().len()
    }

    /// Run interactive REPL loop.
    pub async fn run_interactive(&self) -> Result<()> {
        self.connect().await?;
        println!("  {}\n", "Chat to your Gmail (type 'exit' to leave)".bold());

        loop {
            print!("{}: ", "You".blue().bold());
            io::stdout().flush()?;

            let mut line = String::new();
            if io::stdin().read_line(&mut line)? == 0 {
                break;
            }

            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
                println!("👋 Bye!");
                break;
            }

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("  {spinner:.magenta} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.set_message("Thinking...");
            spinner.enable_steady_tick(Duration::from_millis(100));

            let outcome = self.run_once(input).await;
            spinner.finish_and_clear();

            match outcome {
                Ok(answer) => println!("\n{}: {}\n", "Gmail".green().bold(), answer),
                Err(e) => ui::print_error(&e.to_string()),
            }
        }

        Ok(())
    }
}

impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<()> {
        self.run_interactive().await
    }
}
