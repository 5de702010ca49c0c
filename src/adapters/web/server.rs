use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::Result;
use crate::adapters::Channel;
use crate::agent::AgentFactory;
use crate::config::Config;
use super::router::build_router;
use super::sessions::SessionStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<Config>,
    pub factory: Arc<dyn AgentFactory>,
    pub sessions: Arc<SessionStore>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<Config>, factory: Arc<dyn AgentFactory>) -> Self {
        let sessions = SessionStore::new(
            config.default_model.clone(),
            Duration::from_secs(config.session_idle_secs),
        );
        Self {
            config,
            factory,
            sessions: Arc::new(sessions),
            started_at: Instant::now(),
        }
    }
}

/// Browser front-end
pub struct WebServer {
    addr: SocketAddr,
    config: Arc<Config>,
    factory: Arc<dyn AgentFactory>,
}

impl WebServer {
    #[must_use]
    pub fn new(config: Arc<Config>, factory: Arc<dyn AgentFactory>) -> Self {
        let (bind, port) = (config.bind.as_str(), config.port);
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if !addr.ip().is_loopback() {
            tracing::warn!("web UI binding to {} - uploaded credentials and keys travel over plain HTTP", addr);
        }

        Self { addr, config, factory }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until the process exits
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server hits a fatal I/O error.
    pub async fn serve(&self) -> Result<()> {
        let state = AppState::new(self.config.clone(), self.factory.clone());
        spawn_evictor(state.sessions.clone(), Duration::from_secs(self.config.session_idle_secs));

        let router = build_router(state);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("web UI listening on http://{}", self.addr);

        axum::serve(listener, router).await?;
        Ok(())
    }
}

impl Channel for WebServer {
    fn name(&self) -> &str {
        "web"
    }

    async fn start(&self) -> Result<()> {
        self.serve().await
    }
}

/// Periodically tear down idle sessions
fn spawn_evictor(sessions: Arc<SessionStore>, idle: Duration) {
    let period = idle.clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            sessions.evict_idle().await;
        }
    });
}
