use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    chat_handler, configure_handler, health_handler, index_handler, transcript_handler,
};
use super::server::AppState;

pub(crate) fn build_router(state: AppState) -> Router {
    let max_body_size = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(index_handler))
        .route("/configure", post(configure_handler))
        .route("/chat", post(chat_handler))
        .route("/api/transcript", get(transcript_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::agent::FakeAgentFactory;
    use crate::config::Config;

    const BOUNDARY: &str = "gmailchatboundary";

    fn make_router(config: Config) -> (Router, Arc<FakeAgentFactory>) {
        let factory = Arc::new(FakeAgentFactory::default());
        let state = AppState::new(Arc::new(config), factory.clone());
        (build_router(state), factory)
    }

    fn multipart(credentials: Option<&str>, api_key: &str, model: &str) -> Vec<u8> {
        let mut body = String::new();
        if let Some(doc) = credentials {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"credentials\"; filename=\"credentials.json\"\r\nContent-Type: application/json\r\n\r\n{doc}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"api_key\"\r\n\r\n{api_key}\r\n"
        ));
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"model\"\r\n\r\n{model}\r\n--{BOUNDARY}--\r\n"
        ));
        body.into_bytes()
    }

    fn fields(fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body.into_bytes()
    }

    fn configure_request(cookie: Option<&str>, body: Vec<u8>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/configure")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .header("content-length", body.len());
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get_request(uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("cookie", cookie)
            .body(Body::empty())
            .unwrap()
    }

    fn chat_request(cookie: &str, text: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("cookie", cookie)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("text={}", text.replace(' ', "+"))))
            .unwrap()
    }

    fn cookie_of(resp: &axum::response::Response) -> String {
        let set_cookie = resp.headers().get("set-cookie").unwrap().to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Configure a fresh session and return its cookie
    async fn configured(app: &Router, credentials: &str) -> String {
        let resp = app
            .clone()
            .oneshot(configure_request(None, multipart(Some(credentials), "sk-test", "gpt-4o")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get("location").unwrap(), "/");
        cookie_of(&resp)
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (app, _) = make_router(Config::default());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn fresh_session_asks_for_configuration() {
        let (app, factory) = make_router(Config::default());
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), 200);
        let cookie = resp.headers().get("set-cookie").unwrap().to_str().unwrap().to_string();
        assert!(cookie.contains("HttpOnly"));

        let page = body_text(resp).await;
        assert!(page.contains("Please upload credentials.json"));
        assert!(page.contains("Please upload credentials.json and provide the OpenAI API Key to proceed."));
        assert!(!page.contains(r#"action="/chat""#));
        assert_eq!(factory.build_count(), 0);
    }

    #[tokio::test]
    async fn empty_document_never_builds_agent() {
        let (app, factory) = make_router(Config::default());
        let cookie = configured(&app, "{}").await;

        let page = body_text(app.oneshot(get_request("/", &cookie)).await.unwrap()).await;
        assert!(page.contains("Error loading credentials.json"));
        assert!(!page.contains(r#"action="/chat""#));
        assert_eq!(factory.build_count(), 0);
    }

    #[tokio::test]
    async fn chat_round_trip() {
        let (app, factory) = make_router(Config::default());
        let cookie = configured(&app, r#"{"installed": {"client_id": "abc"}}"#).await;

        let page = body_text(app.clone().oneshot(get_request("/", &cookie)).await.unwrap()).await;
        assert!(page.contains("credentials.json uploaded successfully"));
        assert!(page.contains(r#"placeholder="Ask your question:""#));

        let resp = app
            .clone()
            .oneshot(chat_request(&cookie, "What unread emails do I have?"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let resp = app.clone().oneshot(get_request("/api/transcript", &cookie)).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["turns"][0]["role"], "user");
        assert_eq!(json["turns"][0]["content"], "What unread emails do I have?");
        assert_eq!(json["turns"][1]["role"], "assistant");
        assert_eq!(json["turns"][1]["content"], "answer to: What unread emails do I have?");
        assert_eq!(json["assistant_turns"], 1);

        // Renders reuse the memoized agent
        app.oneshot(get_request("/", &cookie)).await.unwrap();
        assert_eq!(factory.build_count(), 1);
    }

    #[tokio::test]
    async fn failed_turn_flashes_and_keeps_transcript() {
        let (app, _) = make_router(Config::default());
        let cookie = configured(&app, r#"{"web": {"client_id": "abc"}}"#).await;

        app.clone().oneshot(chat_request(&cookie, "fail")).await.unwrap();

        let page = body_text(app.clone().oneshot(get_request("/", &cookie)).await.unwrap()).await;
        assert!(page.contains("model unavailable"));
        assert!(page.contains(r#"value="fail""#));

        let resp = app.oneshot(get_request("/api/transcript", &cookie)).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["turns"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn forgetting_key_hides_chat_input() {
        let (app, _) = make_router(Config::default());
        let cookie = configured(&app, r#"{"installed": {"client_id": "abc"}}"#).await;

        // A blank key alone keeps the stored one
        app.clone()
            .oneshot(configure_request(Some(&cookie), fields(&[("api_key", ""), ("model", "gpt-4o")])))
            .await
            .unwrap();
        let page = body_text(app.clone().oneshot(get_request("/", &cookie)).await.unwrap()).await;
        assert!(page.contains(r#"action="/chat""#));

        app.clone()
            .oneshot(configure_request(
                Some(&cookie),
                fields(&[("api_key", ""), ("forget_key", "1"), ("model", "gpt-4o")]),
            ))
            .await
            .unwrap();
        let page = body_text(app.clone().oneshot(get_request("/", &cookie)).await.unwrap()).await;
        assert!(page.contains("Please provide the OpenAI API Key"));
        assert!(page.contains("Please upload credentials.json and provide the OpenAI API Key to proceed."));
        assert!(!page.contains(r#"action="/chat""#));

        let resp = app.oneshot(get_request("/api/transcript", &cookie)).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["agent_ready"], false);
    }

    #[tokio::test]
    async fn prompt_is_stored_as_typed() {
        let (app, _) = make_router(Config::default());
        let cookie = configured(&app, r#"{"installed": {"client_id": "abc"}}"#).await;

        app.clone().oneshot(chat_request(&cookie, "  any news?  ")).await.unwrap();
        app.clone().oneshot(chat_request(&cookie, "   ")).await.unwrap();

        let resp = app.oneshot(get_request("/api/transcript", &cookie)).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["turns"].as_array().unwrap().len(), 2);
        assert_eq!(json["turns"][0]["content"], "  any news?  ");
    }

    #[tokio::test]
    async fn env_key_is_enough() {
        let config = Config {
            env_api_key: Some("sk-env".to_string()),
            ..Config::default()
        };
        let (app, factory) = make_router(config);
        let resp = app
            .clone()
            .oneshot(configure_request(
                None,
                multipart(Some(r#"{"installed": {}}"#), "", "gpt-3.5-turbo"),
            ))
            .await
            .unwrap();
        let cookie = cookie_of(&resp);

        let page = body_text(app.oneshot(get_request("/", &cookie)).await.unwrap()).await;
        assert!(page.contains("OpenAI API Key provided (from environment)"));
        assert_eq!(factory.specs.lock().unwrap()[0].api_key, "sk-env");
    }

    #[tokio::test]
    async fn unknown_model_is_flashed() {
        let (app, _) = make_router(Config::default());
        let resp = app
            .clone()
            .oneshot(configure_request(None, multipart(None, "sk-test", "davinci")))
            .await
            .unwrap();
        let cookie = cookie_of(&resp);

        let page = body_text(app.oneshot(get_request("/", &cookie)).await.unwrap()).await;
        assert!(page.contains("unknown model"));
    }

    #[tokio::test]
    async fn body_size_limit() {
        let config = Config {
            max_upload_bytes: 64,
            ..Config::default()
        };
        let (app, _) = make_router(config);
        let oversized = "x".repeat(512);
        let resp = app
            .oneshot(configure_request(None, multipart(Some(&oversized), "sk", "gpt-4o")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
