use axum::extract::{Form, Multipart, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ErrorKind;
use super::page::{self, AgentStatus, PageView};
use super::server::AppState;
use super::sessions::{session_cookie, session_id};

#[derive(Deserialize)]
pub(crate) struct ChatForm {
    #[serde(default)]
    text: String,
}

/// Attach the session cookie when the session was just started
fn with_cookie(mut response: Response, id: Uuid, created: bool) -> Response {
    if created {
        if let Ok(value) = HeaderValue::from_str(&session_cookie(id)) {
            response.headers_mut().insert(SET_COOKIE, value);
        }
    }
    response
}

pub(crate) async fn index_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = state.sessions.get_or_create(session_id(&headers)).await;
    let mut session = session.lock().await;
    let env_key = state.config.env_api_key.as_deref();

    let agent = match session.ensure_agent(state.factory.as_ref(), env_key).await {
        Ok(_) => AgentStatus::Ready,
        Err(e) if e.kind() == ErrorKind::MissingConfiguration => AgentStatus::Missing,
        Err(e) => {
            warn!("Agent construction failed: {}", e);
            AgentStatus::Failed(e.to_string())
        }
    };

    let flash = session.take_flash();
    let draft = session.take_draft();
    let view = PageView {
        credentials: session.credentials(),
        sidebar_key: session.has_api_key(),
        env_key: env_key.is_some(),
        models: &state.config.models,
        model: session.model(),
        transcript: session.transcript(),
        agent,
        flash,
        draft,
    };

    with_cookie(Html(page::render(&view)).into_response(), id, created)
}

/// Sidebar form: credential file, API key, model
///
/// A blank key field keeps the stored key unless `forget_key` is ticked; a
/// part with no file leaves the credential alone.
pub(crate) async fn configure_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let (id, session, created) = state.sessions.get_or_create(session_id(&headers)).await;
    let mut session = session.lock().await;
    let mut new_key = None;
    let mut forget_key = false;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return with_cookie(e.into_response(), id, created),
        };

        let name = field.name().unwrap_or_default().to_string();
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => return with_cookie(e.into_response(), id, created),
        };

        match name.as_str() {
            "credentials" if data.is_empty() => {}
            "credentials" => {
                // Outcome is rendered from the session's credential status
                let _ = session.upload_credentials(&data);
            }
            "api_key" => {
                let key = String::from_utf8_lossy(&data);
                if !key.trim().is_empty() {
                    new_key = Some(key.into_owned());
                }
            }
            "forget_key" => forget_key = true,
            "model" => {
                let model = String::from_utf8_lossy(&data);
                if let Err(e) = session.select_model(&state.config, model.trim()) {
                    session.flash(e.to_string());
                }
            }
            other => debug!("Ignoring form field {}", other),
        }
    }

    // A newly typed key replaces the stored one even when forget is ticked
    match new_key {
        Some(key) => session.set_api_key(&key),
        None if forget_key => session.set_api_key(""),
        None => {}
    }

    with_cookie(Redirect::to("/").into_response(), id, created)
}

pub(crate) async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> Response {
    let (id, session, created) = state.sessions.get_or_create(session_id(&headers)).await;
    let text = form.text.as_str();

    if !text.trim().is_empty() {
        let mut session = session.lock().await;
        let env_key = state.config.env_api_key.as_deref();
        if let Err(e) = session.submit(state.factory.as_ref(), env_key, text).await {
            session.flash(e.to_string());
            session.keep_draft(text);
        }
    }

    with_cookie(Redirect::to("/").into_response(), id, created)
}

pub(crate) async fn transcript_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = state.sessions.get_or_create(session_id(&headers)).await;
    let session = session.lock().await;
    let (user_turns, assistant_turns) = page::role_counts(session.transcript());

    let body = Json(json!({
        "model": session.model(),
        "agent_ready": session.has_agent(),
        "user_turns": user_turns,
        "assistant_turns": assistant_turns,
        "turns": session.transcript(),
    }));
    with_cookie(body.into_response(), id, created)
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.sessions.len().await,
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
