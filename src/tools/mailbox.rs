//! Mailbox tools - the fixed operations the agent may run against Gmail

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use crate::Result;
use crate::error::Error;
use crate::gmail::{GmailApi, OutgoingMessage};
use super::Tool;

const DEFAULT_MAX_RESULTS: u32 = 10;

/// Every mailbox operation a toolkit binds, in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailboxOperation {
    CreateDraft,
    SendMessage,
    Search,
    GetMessage,
    GetThread,
}

impl MailboxOperation {
    pub const ALL: [MailboxOperation; 5] = [
        MailboxOperation::CreateDraft,
        MailboxOperation::SendMessage,
        MailboxOperation::Search,
        MailboxOperation::GetMessage,
        MailboxOperation::GetThread,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MailboxOperation::CreateDraft => "create_gmail_draft",
            MailboxOperation::SendMessage => "send_gmail_message",
            MailboxOperation::Search => "search_gmail",
            MailboxOperation::GetMessage => "get_gmail_message",
            MailboxOperation::GetThread => "get_gmail_thread",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            MailboxOperation::CreateDraft => {
                "Use this tool to create a draft email with the provided message fields."
            }
            MailboxOperation::SendMessage => {
                "Use this tool to send email messages. The input is the message, recipients"
            }
            MailboxOperation::Search => {
                "Use this tool to search for email messages or threads. The input must be a valid \
                 Gmail query. The output is a JSON list of the requested resource."
            }
            MailboxOperation::GetMessage => {
                "Use this tool to fetch an email by message ID. Returns the thread ID, snippet, \
                 body, subject, and sender."
            }
            MailboxOperation::GetThread => {
                "Use this tool to fetch a thread by thread ID. Returns the thread ID and the \
                 ID and snippet of every message in it."
            }
        }
    }

    fn parameters(self) -> Value {
        match self {
            MailboxOperation::CreateDraft | MailboxOperation::SendMessage => json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string", "description": "The message body to send."},
                    "to": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "The list of recipients."
                    },
                    "subject": {"type": "string", "description": "The subject of the message."},
                    "cc": {"type": "array", "items": {"type": "string"}, "description": "The list of CC recipients."},
                    "bcc": {"type": "array", "items": {"type": "string"}, "description": "The list of BCC recipients."}
                },
                "required": ["message", "to", "subject"]
            }),
            MailboxOperation::Search => json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The Gmail query. Example filters include from:sender, \
                            to:recipient, subject:subject, -filtered_term, in:folder, is:important|read|starred, \
                            after:year/mo/date, before:year/mo/date, label:label_name \"exact phrase\". \
                            Search newer/older than using d (day), m (month), and y (year): newer_than:2d, older_than:1y. \
                            Attachments with extension example: filename:pdf. Multiple term matching example: from:amy OR from:david."
                    },
                    "resource": {
                        "type": "string",
                        "enum": ["messages", "threads"],
                        "description": "Whether to search for threads or messages."
                    },
                    "max_results": {"type": "integer", "description": "The maximum number of results to return."}
                },
                "required": ["query"]
            }),
            MailboxOperation::GetMessage => json!({
                "type": "object",
                "properties": {
                    "message_id": {"type": "string", "description": "The unique ID of the email message, retrieved from a search."}
                },
                "required": ["message_id"]
            }),
            MailboxOperation::GetThread => json!({
                "type": "object",
                "properties": {
                    "thread_id": {"type": "string", "description": "The thread ID."}
                },
                "required": ["thread_id"]
            }),
        }
    }
}

/// Models sometimes send a single address where a list is expected
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => s
                .split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            OneOrMany::Many(v) => v,
        }
    }
}

fn recipients<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<OneOrMany>::deserialize(deserializer)?
        .map(Vec::from)
        .unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct ComposeArgs {
    message: String,
    #[serde(deserialize_with = "recipients")]
    to: Vec<String>,
    subject: String,
    #[serde(default, deserialize_with = "recipients")]
    cc: Vec<String>,
    #[serde(default, deserialize_with = "recipients")]
    bcc: Vec<String>,
}

impl From<ComposeArgs> for OutgoingMessage {
    fn from(args: ComposeArgs) -> Self {
        Self {
            to: args.to,
            cc: args.cc,
            bcc: args.bcc,
            subject: args.subject,
            body: args.message,
        }
    }
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum SearchResource {
    #[default]
    Messages,
    Threads,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    resource: SearchResource,
    #[serde(default)]
    max_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GetMessageArgs {
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct GetThreadArgs {
    thread_id: String,
}

fn parse_args<T: DeserializeOwned>(op: MailboxOperation, params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| Error::Tool(format!("Invalid arguments for {}: {}", op.name(), e)))
}

/// One mailbox operation bound to a Gmail API handle
#[derive(Clone)]
pub struct MailboxTool {
    operation: MailboxOperation,
    api: Arc<dyn GmailApi>,
}

impl MailboxTool {
    pub fn new(operation: MailboxOperation, api: Arc<dyn GmailApi>) -> Self {
        Self { operation, api }
    }
}

#[async_trait]
impl Tool for MailboxTool {
    fn name(&self) -> &str {
        self.operation.name()
    }

    fn description(&self) -> &str {
        self.operation.description()
    }

    fn parameters(&self) -> Value {
        self.operation.parameters()
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let op = self.operation;
        match op {
            MailboxOperation::CreateDraft => {
                let args: ComposeArgs = parse_args(op, params)?;
                let id = self.api.create_draft(&args.into()).await?;
                Ok(format!("Draft created. Draft Id: {}", id))
            }
            MailboxOperation::SendMessage => {
                let args: ComposeArgs = parse_args(op, params)?;
                let id = self.api.send_message(&args.into()).await?;
                Ok(format!("Message sent. Message Id: {}", id))
            }
            MailboxOperation::Search => {
                let args: SearchArgs = parse_args(op, params)?;
                let max = args.max_results.unwrap_or(DEFAULT_MAX_RESULTS).max(1);
                let result = match args.resource {
                    SearchResource::Messages => {
                        serde_json::to_string(&self.api.search_messages(&args.query, max).await?)?
                    }
                    SearchResource::Threads => {
                        serde_json::to_string(&self.api.search_threads(&args.query, max).await?)?
                    }
                };
                Ok(result)
            }
            MailboxOperation::GetMessage => {
                let args: GetMessageArgs = parse_args(op, params)?;
                Ok(serde_json::to_string(&self.api.get_message(&args.message_id).await?)?)
            }
            MailboxOperation::GetThread => {
                let args: GetThreadArgs = parse_args(op, params)?;
                Ok(serde_json::to_string(&self.api.get_thread(&args.thread_id).await?)?)
            }
        }
    }
}
