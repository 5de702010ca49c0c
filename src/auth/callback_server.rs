//! OAuth2 loopback callback server
//!
//! A one-shot local HTTP listener that captures the authorization code
//! Google redirects to after the user grants mailbox access.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;
use crate::Result;
use crate::error::Error;

const PAGE_STYLE: &str = "body{font-family:system-ui,sans-serif;display:flex;\
justify-content:center;align-items:center;height:100vh;margin:0;text-align:center;\
background:#f8fafc;color:#0f172a}h1{font-size:22px}p{color:#475569}";

/// Authorization code result from the callback
#[derive(Debug, Clone)]
pub struct AuthorizationResult {
    pub code: String,
}

fn result_page(title: &str, detail: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"UTF-8\">\
         <title>gmail-chat | {title}</title><style>{PAGE_STYLE}</style></head>\
         <body><div><h1>{title}</h1><p>{detail}</p></div></body></html>"
    )
}

/// Bind the callback listener
///
/// Bound before the browser is opened so the redirect can never race the
/// listener.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await
        .map_err(|e| Error::OAuth(format!("Failed to start callback server on {}: {}", addr, e)))?;

    tracing::info!("OAuth callback server listening on http://{}", addr);
    Ok(listener)
}

/// Wait for the browser redirect on an already bound listener
pub async fn wait_for_callback(
    listener: TcpListener,
    expected_state: Option<&str>,
) -> Result<AuthorizationResult> {
    loop {
        let (mut socket, _) = listener.accept().await
            .map_err(|e| Error::OAuth(format!("Failed to accept connection: {}", e)))?;

        let mut buffer = vec![0u8; 8192];
        let n = socket.read(&mut buffer).await
            .map_err(|e| Error::OAuth(format!("Failed to read request: {}", e)))?;

        let request = String::from_utf8_lossy(&buffer[..n]);

        // Browsers ask for a favicon alongside the redirect
        if is_favicon_request(&request) {
            let _ = socket
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
            continue;
        }

        let result = parse_callback_request(&request, expected_state);

        let (status, body) = match &result {
            Ok(_) => (
                "200 OK",
                result_page(
                    "Authorization Successful",
                    "Mailbox access granted. You can close this window.",
                ),
            ),
            Err(_) => (
                "400 Bad Request",
                result_page(
                    "Authorization Failed",
                    "Something went wrong. Check the gmail-chat logs and try again.",
                ),
            ),
        };

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;

        return result;
    }
}

fn is_favicon_request(request: &str) -> bool {
    request
        .lines()
        .next()
        .map(|line| line.contains(" /favicon"))
        .unwrap_or(false)
}

/// Parse the callback request to extract authorization code
fn parse_callback_request(request: &str, expected_state: Option<&str>) -> Result<AuthorizationResult> {
    let first_line = request.lines().next()
        .ok_or_else(|| Error::OAuth("Empty request".to_string()))?;

    // GET /?code=xxx&state=yyy HTTP/1.1
    let parts: Vec<&str> = first_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(Error::OAuth("Invalid request format".to_string()));
    }

    let url = Url::parse(&format!("http://localhost{}", parts[1]))
        .map_err(|e| Error::OAuth(format!("Failed to parse callback URL: {}", e)))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => error = Some(value.to_string()),
            "error_description" => error_description = Some(value.to_string()),
            _ => {}
        }
    }

    if let Some(err) = error {
        let description = error_description.unwrap_or_else(|| "Unknown error".to_string());
        return Err(Error::OAuth(format!("Authorization failed: {} - {}", err, description)));
    }

    if let Some(expected) = expected_state {
        match &state {
            Some(s) if s == expected => {}
            Some(s) => return Err(Error::OAuth(format!("State mismatch: expected {}, got {}", expected, s))),
            None => return Err(Error::OAuth("Missing state parameter".to_string())),
        }
    }

    let code = code.ok_or_else(|| Error::OAuth("Missing authorization code".to_string()))?;

    Ok(AuthorizationResult { code })
}

/// Loopback redirect URI for the installed-app flow
pub fn redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{}/", port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callback_success() {
        let request = "GET /?code=abc123&state=xyz789&scope=https://mail.google.com/ HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let result = parse_callback_request(request, Some("xyz789")).unwrap();

        assert_eq!(result.code, "abc123");
    }

    #[test]
    fn test_parse_callback_error() {
        let request = "GET /?error=access_denied&error_description=User+denied HTTP/1.1\r\n\r\n";
        let err = parse_callback_request(request, None).unwrap_err().to_string();
        assert!(err.contains("access_denied"));
    }

    #[test]
    fn test_parse_callback_state_mismatch() {
        let request = "GET /?code=abc&state=wrong HTTP/1.1\r\n\r\n";
        let err = parse_callback_request(request, Some("expected")).unwrap_err().to_string();
        assert!(err.contains("mismatch"));
    }

    #[test]
    fn test_parse_callback_missing_state() {
        let request = "GET /?code=abc HTTP/1.1\r\n\r\n";
        assert!(parse_callback_request(request, Some("expected")).is_err());
    }

    #[test]
    fn test_favicon_detection() {
        assert!(is_favicon_request("GET /favicon.ico HTTP/1.1\r\n"));
        assert!(!is_favicon_request("GET /?code=1 HTTP/1.1\r\n"));
    }

    #[test]
    fn test_redirect_uri() {
        assert_eq!(redirect_uri(8085), "http://127.0.0.1:8085/");
    }

    #[tokio::test]
    async fn test_wait_for_callback_roundtrip() {
        let listener = bind(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move { wait_for_callback(listener, Some("st")).await });

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(b"GET /?code=the-code&state=st HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        let result = server.await.unwrap().unwrap();
        assert_eq!(result.code, "the-code");
    }
}
