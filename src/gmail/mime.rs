//! RFC 2822 message assembly and Gmail payload decoding

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use lettre::message::{header::ContentType, Mailbox, Message};
use serde::Deserialize;
use crate::Result;
use crate::error::Error;
use super::OutgoingMessage;

/// A MIME part as returned by `format=full`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<Payload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

impl Payload {
    /// First header with this name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Best-effort plain text body
    ///
    /// Prefers the first `text/plain` part; falls back to `text/html` with
    /// markup stripped.
    pub fn text_body(&self) -> String {
        if let Some(text) = self.find_part("text/plain") {
            return text;
        }
        if let Some(html) = self.find_part("text/html") {
            return html_to_text(&html);
        }
        String::new()
    }

    fn find_part(&self, mime_type: &str) -> Option<String> {
        if self.mime_type.eq_ignore_ascii_case(mime_type) {
            if let Some(data) = self.body.as_ref().and_then(|b| b.data.as_deref()) {
                return decode_body(data);
            }
        }
        self.parts.iter().find_map(|p| p.find_part(mime_type))
    }
}

/// Decode a base64url part body, padded or not
fn decode_body(data: &str) -> Option<String> {
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Parse one recipient, bare or `Display Name <address>`
pub fn parse_mailbox(address: &str) -> Result<Mailbox> {
    reject_line_breaks("Recipient", address)?;
    address
        .trim()
        .parse()
        .map_err(|e| Error::Tool(format!("Invalid email address '{}': {}", address, e)))
}

fn reject_line_breaks(field: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::Tool(format!("{} must be a single line", field)));
    }
    Ok(())
}

/// Assemble the message and encode it the way `messages.send` expects
///
/// Bcc stays in the headers; Gmail has no separate envelope.
pub fn build_raw(from: &Mailbox, message: &OutgoingMessage) -> Result<String> {
    if message.to.is_empty() {
        return Err(Error::Tool("At least one recipient is required".to_string()));
    }
    reject_line_breaks("Subject", &message.subject)?;

    let mut builder = Message::builder()
        .from(from.clone())
        .subject(message.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .keep_bcc();
    for address in &message.to {
        builder = builder.to(parse_mailbox(address)?);
    }
    for address in &message.cc {
        builder = builder.cc(parse_mailbox(address)?);
    }
    for address in &message.bcc {
        builder = builder.bcc(parse_mailbox(address)?);
    }

    let email = builder
        .body(message.body.clone())
        .map_err(|e| Error::Tool(format!("Could not build message: {}", e)))?;

    Ok(URL_SAFE_NO_PAD.encode(email.formatted()))
}

/// Very basic HTML to text conversion
pub fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();

    for (open, close) in [("<script", "</script>"), ("<style", "</style>")] {
        while let Some(start) = text.find(open) {
            match text[start..].find(close) {
                Some(end) => {
                    text = format!("{}{}", &text[..start], &text[start + end + close.len()..]);
                }
                None => break,
            }
        }
    }

    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(raw: &str) -> String {
        String::from_utf8(URL_SAFE_NO_PAD.decode(raw).unwrap()).unwrap()
    }

    fn message(to: &[&str], subject: &str) -> OutgoingMessage {
        OutgoingMessage {
            to: to.iter().map(|s| s.to_string()).collect(),
            cc: vec![],
            bcc: vec![],
            subject: subject.to_string(),
            body: "Hello there".to_string(),
        }
    }

    fn me() -> Mailbox {
        parse_mailbox("me@example.com").unwrap()
    }

    fn header_line<'a>(raw: &'a str, name: &str) -> &'a str {
        raw.lines()
            .find(|l| l.starts_with(&format!("{}: ", name)))
            .unwrap_or_else(|| panic!("no {} header in {}", name, raw))
    }

    #[test]
    fn test_build_raw_headers() {
        let mut msg = message(&["a@example.com", "Bob <b@example.com>"], "Lunch");
        msg.cc = vec!["c@example.com".to_string()];
        msg.bcc = vec!["hidden@example.com".to_string()];
        let raw = decode(&build_raw(&me(), &msg).unwrap());

        let to = header_line(&raw, "To");
        assert!(to.contains("a@example.com"));
        assert!(to.contains("Bob <b@example.com>"));
        assert!(header_line(&raw, "Cc").contains("c@example.com"));
        assert!(header_line(&raw, "Bcc").contains("hidden@example.com"));
        assert!(header_line(&raw, "From").contains("me@example.com"));
        assert_eq!(header_line(&raw, "Subject"), "Subject: Lunch");
        assert!(raw.contains("\r\n\r\nHello there"));
    }

    #[test]
    fn test_non_ascii_headers_are_encoded() {
        let subject = "Réunion trimestrielle: résultats, prévisions et décisions à prendre";
        let raw = decode(&build_raw(&me(), &message(&["José <j@example.com>"], subject)).unwrap());

        let head = &raw[..raw.find("\r\n\r\n").unwrap()];
        assert!(head.is_ascii());
        assert!(header_line(&raw, "Subject").to_ascii_lowercase().contains("=?utf-8?b?"));
        assert!(header_line(&raw, "To").contains("<j@example.com>"));
    }

    #[test]
    fn test_header_injection_rejected() {
        let msg = message(&["a@example.com"], "Hi\r\nBcc: evil@example.com");
        assert!(matches!(build_raw(&me(), &msg), Err(Error::Tool(_))));

        let msg = message(&["a@example.com\r\nBcc: evil@example.com"], "Hi");
        assert!(matches!(build_raw(&me(), &msg), Err(Error::Tool(_))));
    }

    #[test]
    fn test_invalid_recipients_rejected() {
        assert!(build_raw(&me(), &message(&[], "x")).is_err());
        assert!(build_raw(&me(), &message(&["not-an-address"], "x")).is_err());
        assert!(parse_mailbox("someone@mail.example.org").is_ok());
        assert!(parse_mailbox("Ann Example <ann@example.org>").is_ok());
    }

    #[test]
    fn test_text_body_prefers_plain_part() {
        let payload: Payload = serde_json::from_value(json!({
            "mimeType": "multipart/alternative",
            "headers": [{"name": "Subject", "value": "Report"}],
            "parts": [
                {"mimeType": "text/html", "body": {"data": URL_SAFE_NO_PAD.encode("<p>html</p>")}},
                {"mimeType": "text/plain", "body": {"data": URL_SAFE_NO_PAD.encode("plain text")}}
            ]
        }))
        .unwrap();

        assert_eq!(payload.header("subject"), Some("Report"));
        assert_eq!(payload.text_body(), "plain text");
    }

    #[test]
    fn test_text_body_falls_back_to_html() {
        let payload: Payload = serde_json::from_value(json!({
            "mimeType": "text/html",
            "body": {"data": URL_SAFE_NO_PAD.encode("<style>p{}</style><p>Hi <b>you</b></p>")}
        }))
        .unwrap();
        assert_eq!(payload.text_body(), "Hi you");
    }
}
