//! gmail-chat CLI entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use anyhow::Result;

use gmail_chat::adapters::Channel;
use gmail_chat::agent::{AgentFactory, GmailAgentFactory};
use gmail_chat::config::Config;
use gmail_chat::prompt::HubClient;
use gmail_chat::ui;

#[derive(Parser)]
#[command(name = "gmail-chat")]
#[command(about = "✉️  gmail-chat - Chat to your Gmail through an LLM agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update ~/.gmail-chat/config.json
    Init,

    /// Start the browser UI
    Serve {
        /// Address to bind
        #[arg(short, long)]
        bind: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat in the terminal
    Chat {
        /// OAuth client-secret file (credentials.json)
        #[arg(short, long, default_value = "credentials.json")]
        credentials: PathBuf,

        /// OpenAI model; prompts when omitted
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Validate a credentials.json without contacting anything
    Check {
        /// Client-secret file to validate
        file: PathBuf,
    },

    /// Run the Google consent flow and cache the mailbox token
    Login {
        /// Client-secret file (credentials.json)
        #[arg(default_value = "credentials.json")]
        file: PathBuf,
    },

    /// Remove the cached mailbox token
    Logout,

    /// Show configuration and token status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Setup Global Ctrl+C handler
    let exit_flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let r = exit_flag.clone();

    ctrlc::set_handler(move || {
        if r.load(std::sync::atomic::Ordering::SeqCst) {
            println!("\n👋 Bye!");
            std::process::exit(0);
        } else {
            println!("\n⚠️  Press Ctrl+C again to exit");
            r.store(true, std::sync::atomic::Ordering::SeqCst);

            // Reset flag after 3 seconds
            let r2 = r.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_secs(3));
                r2.store(false, std::sync::atomic::Ordering::SeqCst);
            });
        }
    }).ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            gmail_chat::config::init()?;
        }

        Commands::Serve { bind, port } => {
            let mut config = gmail_chat::config::load_with_env()?;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(port) = port {
                config.port = port;
            }
            run_serve(config).await?;
        }

        Commands::Chat { credentials, model } => {
            let config = gmail_chat::config::load_with_env()?;
            run_chat(config, &credentials, model.as_deref()).await?;
        }

        Commands::Check { file } => {
            run_check(&file)?;
        }

        Commands::Login { file } => {
            let config = gmail_chat::config::load_with_env()?;
            run_login(&config, &file).await?;
        }

        Commands::Logout => {
            gmail_chat::auth::delete_credentials(&gmail_chat::auth::token_path())?;
            println!("✓ Logged out successfully");
        }

        Commands::Status => {
            let config = gmail_chat::config::load_with_env()?;
            print_status(&config)?;
        }
    }

    Ok(())
}

fn build_factory(config: &Arc<Config>) -> Arc<dyn AgentFactory> {
    let registry = Arc::new(HubClient::new(&config.hub_url));
    Arc::new(GmailAgentFactory::new(
        config.clone(),
        registry,
        gmail_chat::auth::token_path(),
    ))
}

async fn run_serve(config: Config) -> Result<()> {
    use gmail_chat::adapters::web::WebServer;

    let config = Arc::new(config);
    let server = WebServer::new(config.clone(), build_factory(&config));

    ui::print_header(&config.default_model, "web");
    ui::print_step(&format!("Open http://{} in your browser", server.addr()));
    if config.env_api_key.is_some() {
        ui::print_step("Using OPENAI_API_KEY from the environment when the sidebar key is blank");
    }

    server.start().await?;
    Ok(())
}

async fn run_chat(config: Config, credentials: &std::path::Path, model: Option<&str>) -> Result<()> {
    use gmail_chat::adapters::cli::{prepare_session, CliChannel};

    let config = Arc::new(config);
    let session = prepare_session(&config, credentials, model)?;
    ui::print_header(session.model(), "terminal");

    let channel = CliChannel::new(session, build_factory(&config), config.env_api_key.clone());
    channel.start().await?;
    Ok(())
}

fn run_check(file: &std::path::Path) -> Result<()> {
    use gmail_chat::auth::ClientSecret;

    match ClientSecret::from_file(file) {
        Ok(secret) => {
            ui::print_success("credentials.json uploaded successfully");
            ui::print_step(&format!("Client type: {:?}", secret.kind()));
            match secret.oauth_client() {
                Ok(client) => ui::print_step(&format!("Client ID: {}", ui::mask(&client.client_id))),
                Err(e) => ui::print_warning(&e.to_string()),
            }
            Ok(())
        }
        Err(e) => {
            ui::print_error(&format!("Error loading credentials.json: {}", e));
            Err(e.into())
        }
    }
}

async fn run_login(config: &Config, file: &std::path::Path) -> Result<()> {
    use gmail_chat::auth::{ClientSecret, GmailAuthProvider};

    println!("🔐 Reading client secret from {:?}...\n", file);

    let secret = ClientSecret::from_file(file)?;
    let client = secret.oauth_client()?;
    println!("✓ Found client_id: {}", ui::mask(&client.client_id));

    let provider = GmailAuthProvider::new(&secret, gmail_chat::auth::token_path(), config.oauth_callback_port)?;
    let _token = provider.get_valid_token().await?;

    println!("\n✓ Authentication successful!");
    println!("  Token saved to {:?}", gmail_chat::auth::token_path());
    println!("\nYou can now run: gmail-chat serve");

    Ok(())
}

fn print_status(config: &Config) -> Result<()> {
    println!("✉️  gmail-chat Status\n");
    println!("Config: {:?}", gmail_chat::config::config_path());
    println!("Web UI: http://{}:{}", config.bind, config.port);
    println!("Default model: {}", config.default_model);
    println!("Prompt template: {}", config.prompt_template);
    println!(
        "OPENAI_API_KEY: {}",
        if config.env_api_key.is_some() { "✓ (environment)" } else { "not set (enter it in the sidebar)" }
    );

    match gmail_chat::auth::load_credentials(&gmail_chat::auth::token_path())? {
        Some(creds) => {
            let state = if !creds.is_expired() {
                "valid"
            } else if creds.can_refresh() {
                "expired, will refresh"
            } else {
                "expired"
            };
            println!("Mailbox token: {} ({})", ui::mask(&creds.client_id), state);
        }
        None => println!("Mailbox token: not set (run 'gmail-chat login')"),
    }

    Ok(())
}
