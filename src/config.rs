//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::Result;
use crate::error::Error;

/// Environment variable that may carry the OpenAI API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the web UI binds to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port the web UI listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Models offered in the model dropdown
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Preselected model (must be one of `models`)
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Instructions partially applied to the prompt template
    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// Prompt template pulled from the registry at agent construction
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,

    /// Prompt template registry base URL
    #[serde(default = "default_hub_url")]
    pub hub_url: String,

    /// OpenAI-compatible API base URL
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Gmail REST base URL for the authenticated user
    #[serde(default = "default_gmail_base_url")]
    pub gmail_base_url: String,

    /// Agent executor step limit
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Loopback port used for the OAuth consent redirect
    #[serde(default = "default_oauth_callback_port")]
    pub oauth_callback_port: u16,

    /// Idle browser sessions are torn down after this many seconds
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    /// Upper bound on the configure form body (credential upload)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// API key from the environment, never written to disk
    #[serde(skip)]
    pub env_api_key: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8501
}

fn default_models() -> Vec<String> {
    vec![
        "gpt-3.5-turbo".to_string(),
        "gpt-4-turbo".to_string(),
        "gpt-4o".to_string(),
    ]
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_instructions() -> String {
    "You are an assistant and you are very good at managing my emails.".to_string()
}

fn default_prompt_template() -> String {
    "langchain-ai/openai-functions-template".to_string()
}

fn default_hub_url() -> String {
    "https://api.hub.langchain.com".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_gmail_base_url() -> String {
    "https://gmail.googleapis.com/gmail/v1/users/me".to_string()
}

fn default_max_iterations() -> usize {
    15
}

fn default_oauth_callback_port() -> u16 {
    8085
}

fn default_session_idle_secs() -> u64 {
    60 * 60
}

fn default_max_upload_bytes() -> usize {
    64 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            models: default_models(),
            default_model: default_model(),
            instructions: default_instructions(),
            prompt_template: default_prompt_template(),
            hub_url: default_hub_url(),
            openai_base_url: default_openai_base_url(),
            gmail_base_url: default_gmail_base_url(),
            max_iterations: default_max_iterations(),
            oauth_callback_port: default_oauth_callback_port(),
            session_idle_secs: default_session_idle_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            env_api_key: None,
        }
    }
}

impl Config {
    /// Check that the model list is usable
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(Error::Config("models list cannot be empty".to_string()));
        }
        if !self.models.contains(&self.default_model) {
            return Err(Error::Config(format!(
                "default_model '{}' is not one of {:?}",
                self.default_model, self.models
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Whether `model` is offered in the dropdown
    pub fn is_known_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    /// Apply environment overrides
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.env_api_key = lookup(API_KEY_ENV)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        if let Some(bind) = lookup("GMAIL_CHAT_BIND").filter(|b| !b.is_empty()) {
            self.bind = bind;
        }

        if let Some(port) = lookup("GMAIL_CHAT_PORT") {
            match port.parse() {
                Ok(p) => self.port = p,
                Err(_) => tracing::warn!("ignoring invalid GMAIL_CHAT_PORT '{}'", port),
            }
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gmail-chat")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from file, falling back to defaults when absent
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

/// Load configuration from an explicit path
pub fn load_from(path: &std::path::Path) -> Result<Config> {
    let config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)?
    } else {
        tracing::debug!("No config at {:?}, using defaults", path);
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration once at process start: `.env`, file, then environment
pub fn load_with_env() -> Result<Config> {
    dotenv::dotenv().ok();

    let mut config = load()?;
    config.apply_env(|name| std::env::var(name).ok());
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    let path = config_path();

    // Create parent directory
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(())
}

/// Interactive setup of the default model and web UI address
pub fn init() -> Result<Config> {
    use crate::ui;
    use inquire::{Confirm, Select, Text};

    ui::print_header("Setup Wizard", "init");

    let mut config = load()?;

    let start = config.models.iter().position(|m| *m == config.default_model).unwrap_or(0);
    config.default_model = Select::new("Default OpenAI model:", config.models.clone())
        .with_starting_cursor(start)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    let port = Text::new("Web UI port:")
        .with_default(&config.port.to_string())
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    config.port = port
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("'{}' is not a valid port", port)))?;

    let local_only = Confirm::new("Only accept connections from this machine?")
        .with_default(true)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    config.bind = if local_only { "127.0.0.1" } else { "0.0.0.0" }.to_string();

    ui::print_thinking("Saving configuration");
    save(&config)?;

    println!();
    ui::print_success(&format!("Configuration saved to {:?}", config_path()));
    ui::print_step(&format!("Put {} in .env, or enter the key in the sidebar", API_KEY_ENV));
    ui::print_step("Run 'gmail-chat serve' to start the web UI");

    Ok(config)
}
