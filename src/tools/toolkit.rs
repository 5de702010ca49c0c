//! Gmail toolkit - binds a validated credential to the mailbox tools

use std::path::PathBuf;
use std::sync::Arc;
use crate::Result;
use crate::auth::{ClientSecret, GmailAuthProvider};
use crate::config::Config;
use crate::gmail::{GmailApi, GmailClient};
use super::{MailboxOperation, MailboxTool, ToolRunner};

/// The mailbox toolset for one credential
pub struct GmailToolkit {
    api: Arc<dyn GmailApi>,
}

impl GmailToolkit {
    /// Bind an uploaded credential
    ///
    /// No network traffic happens here; the mailbox token is obtained on the
    /// first tool call.
    pub fn new(secret: &ClientSecret, config: &Config, token_path: PathBuf) -> Result<Self> {
        let provider = GmailAuthProvider::new(secret, token_path, config.oauth_callback_port)?;
        let client = GmailClient::new(&config.gmail_base_url, Arc::new(provider));
        Ok(Self::from_api(Arc::new(client)))
    }

    /// Bind an existing API handle
    pub fn from_api(api: Arc<dyn GmailApi>) -> Self {
        Self { api }
    }

    /// One tool per mailbox operation
    pub fn get_tools(&self) -> Vec<MailboxTool> {
        MailboxOperation::ALL
            .iter()
            .map(|op| MailboxTool::new(*op, self.api.clone()))
            .collect()
    }

    /// Register every tool with a fresh runner
    pub fn into_runner(self) -> ToolRunner {
        let mut runner = ToolRunner::new();
        for tool in self.get_tools() {
            runner.register(tool);
        }
        runner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FakeMailbox;
    use crate::tools::Tool;

    #[test]
    fn test_toolkit_exposes_fixed_set() {
        let toolkit = GmailToolkit::from_api(Arc::new(FakeMailbox::default()));
        let names: Vec<String> = toolkit.get_tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "create_gmail_draft",
                "send_gmail_message",
                "search_gmail",
                "get_gmail_message",
                "get_gmail_thread"
            ]
        );

        let runner = toolkit.into_runner();
        assert!(runner.has("search_gmail"));
        assert_eq!(runner.definitions().len(), 5);
    }

    #[test]
    fn test_toolkit_from_credential_is_offline() {
        let secret = ClientSecret::parse(br#"{"installed": {"client_id": "abc"}}"#).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toolkit = GmailToolkit::new(&secret, &Config::default(), dir.path().join("token.json")).unwrap();
        assert_eq!(toolkit.get_tools().len(), 5);
        assert!(!dir.path().join("token.json").exists());
    }
}
