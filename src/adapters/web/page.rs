//! Server-rendered chat page

use std::fmt::Write;
use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use url::Url;
use crate::chat::{CredentialStatus, Transcript, TurnRole};

/// Whether the main area can take questions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    Ready,
    /// Credential or key absent
    Missing,
    /// Construction failed; holds the error text
    Failed(String),
}

/// Everything one render needs
pub struct PageView<'a> {
    pub credentials: &'a CredentialStatus,
    pub sidebar_key: bool,
    pub env_key: bool,
    pub models: &'a [String],
    pub model: &'a str,
    pub transcript: &'a Transcript,
    pub agent: AgentStatus,
    pub flash: Option<String>,
    pub draft: Option<String>,
}

const STYLE: &str = "\
body{margin:0;font-family:system-ui,sans-serif;display:flex;min-height:100vh;color:#262730}\
aside{width:300px;background:#f0f2f6;padding:1.5rem;box-sizing:border-box}\
main{flex:1;max-width:760px;margin:0 auto;padding:2rem}\
label{display:block;margin:1rem 0 .3rem;font-size:.9rem}\
input,select{width:100%;box-sizing:border-box;padding:.4rem}\
label.inline{display:flex;align-items:center;gap:.4rem;margin:.4rem 0}label.inline input{width:auto}\
.note{padding:.6rem .8rem;border-radius:.4rem;margin:.6rem 0;font-size:.9rem}\
.success{background:#dff5e3;color:#1b5e20}.error{background:#fde2e2;color:#8b1a1a}\
.warning{background:#fff4d6;color:#7a5a00}\
.turn{padding:.6rem 1rem;margin:.5rem 0;border-radius:.5rem}\
.turn.user{background:#f0f2f6}.turn.assistant{background:#fff;border:1px solid #e6e6e6}\
.who{font-size:.75rem;text-transform:uppercase;color:#888}\
form.chat{display:flex;gap:.5rem;margin-top:1rem}form.chat input{flex:1}form.chat button{width:auto}";

/// Escape text for HTML bodies and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Link target an answer may carry; anything but http(s) and mailto is dropped
fn safe_link(dest: &str) -> Option<String> {
    let url = Url::parse(dest).ok()?;
    matches!(url.scheme(), "http" | "https" | "mailto").then(|| url.to_string())
}

/// Markdown to HTML; raw HTML in the source is shown as text
///
/// Answers quote mail content, so link targets are filtered and images are
/// rendered as plain links instead of being fetched.
pub fn render_markdown(text: &str) -> String {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
    let mut kept = Vec::new();
    let parser = Parser::new_ext(text, options).filter_map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Some(Event::Text(raw)),
        Event::Start(Tag::Link { link_type, dest_url, title, id })
        | Event::Start(Tag::Image { link_type, dest_url, title, id }) => {
            let safe = safe_link(&dest_url);
            kept.push(safe.is_some());
            safe.map(|url| Event::Start(Tag::Link { link_type, dest_url: url.into(), title, id }))
        }
        Event::End(TagEnd::Link) | Event::End(TagEnd::Image) => {
            kept.pop().unwrap_or(false).then_some(Event::End(TagEnd::Link))
        }
        other => Some(other),
    });

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn note(out: &mut String, class: &str, text: &str) {
    let _ = write!(out, r#"<div class="note {}">{}</div>"#, class, escape(text));
}

fn sidebar(out: &mut String, view: &PageView<'_>) {
    out.push_str(r#"<aside><h2>Configuration</h2>"#);
    out.push_str(r#"<form method="post" action="/configure" enctype="multipart/form-data">"#);

    out.push_str(r#"<label for="credentials">Upload credentials.json</label>"#);
    out.push_str(r#"<input type="file" id="credentials" name="credentials" accept=".json,application/json">"#);
    match view.credentials {
        CredentialStatus::Loaded(_) => note(out, "success", "credentials.json uploaded successfully"),
        CredentialStatus::Rejected(e) => note(out, "error", &format!("Error loading credentials.json: {}", e)),
        CredentialStatus::Missing => note(out, "error", "Please upload credentials.json"),
    }

    out.push_str(r#"<label for="api_key">Enter your OPENAI_API_KEY</label>"#);
    let placeholder = if view.sidebar_key { "stored, leave blank to keep" } else { "sk-..." };
    let _ = write!(
        out,
        r#"<input type="password" id="api_key" name="api_key" autocomplete="off" placeholder="{}">"#,
        placeholder
    );
    if view.sidebar_key {
        out.push_str(r#"<label class="inline"><input type="checkbox" name="forget_key" value="1"> Forget the stored key</label>"#);
        note(out, "success", "OpenAI API Key provided");
    } else if view.env_key {
        note(out, "success", "OpenAI API Key provided (from environment)");
    } else {
        note(out, "error", "Please provide the OpenAI API Key");
    }

    out.push_str(r#"<label for="model">Choose OpenAI model</label><select id="model" name="model">"#);
    for model in view.models {
        let selected = if model == view.model { " selected" } else { "" };
        let _ = write!(out, r#"<option value="{0}"{1}>{0}</option>"#, escape(model), selected);
    }
    out.push_str(r#"</select><p><button type="submit">Apply</button></p></form></aside>"#);
}

fn chat_area(out: &mut String, view: &PageView<'_>) {
    out.push_str("<main><h1>Chat to your Gmail</h1>");

    if let Some(flash) = &view.flash {
        note(out, "error", flash);
    }

    for turn in view.transcript {
        let _ = write!(
            out,
            r#"<div class="turn {0}"><div class="who">{0}</div>{1}</div>"#,
            turn.role.as_str(),
            render_markdown(&turn.content)
        );
    }

    match &view.agent {
        AgentStatus::Ready => {
            let draft = view.draft.as_deref().map(escape).unwrap_or_default();
            let _ = write!(
                out,
                r#"<form class="chat" method="post" action="/chat"><input type="text" name="text" placeholder="Ask your question:" aria-label="Ask your question:" value="{}" autofocus><button type="submit">Send</button></form>"#,
                draft
            );
        }
        AgentStatus::Missing => note(
            out,
            "warning",
            "Please upload credentials.json and provide the OpenAI API Key to proceed.",
        ),
        AgentStatus::Failed(e) => note(out, "error", e),
    }

    out.push_str("</main>");
}

/// Render the whole page
pub fn render(view: &PageView<'_>) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">");
    out.push_str("<title>Chat to your Gmail</title><style>");
    out.push_str(STYLE);
    out.push_str("</style></head><body>");
    sidebar(&mut out, view);
    chat_area(&mut out, view);
    out.push_str("</body></html>");
    out
}

/// Count of turns of each role, used by the transcript API
pub fn role_counts(transcript: &Transcript) -> (usize, usize) {
    transcript.iter().fold((0, 0), |(u, a), t| match t.role {
        TurnRole::User => (u + 1, a),
        TurnRole::Assistant => (u, a + 1),
    })
}
