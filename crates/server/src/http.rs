//! HTTP Endpoints
//!
//! REST API for the appointment assistant.

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::{header, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tower_cookies::{CookieManagerLayer, Cookies};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use bankbot_agent::{
    BookingOutcome, ChatInput, ChatOutcome, ChatStateView, ConfirmationInput, GreetingInput,
    LoginOutcome, RecommendationsOutcome,
};
use bankbot_core::{AppointmentDetails, Error, SessionState};
use bankbot_llm::SuggestionRequest;

use crate::auth::{check_credentials, require_user};
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::{Result, ServerError};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.config.server.cors_origins,
        state.config.server.cors_enabled,
    );
    let timeout = Duration::from_secs(state.config.server.timeout_seconds);

    Router::new()
        // Session lifecycle
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/check-session", get(check_session))
        .route("/api/session-health", get(session_health))
        // Chat
        .route("/api/chat", post(chat))
        .route("/api/chat/state", get(chat_state))
        .route("/api/verify-confirmation", post(verify_confirmation))
        .route("/api/suggestedReplies", post(suggested_replies))
        .route("/api/generate-greeting", post(generate_greeting))
        // CRM passthroughs, login required
        .route(
            "/api/salesforce/appointments",
            get(list_appointments).post(book_appointment),
        )
        .route(
            "/api/salesforce/appointments/reschedule",
            post(reschedule_appointment),
        )
        .route("/api/salesforce/banker-notes", get(banker_notes))
        .route("/api/salesforce/visit-history", post(visit_history))
        .route("/api/chat/recommendations", post(recommendations))
        // Probes
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(CookieManagerLayer::new())
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// Cookies need credentialed requests, which rule out wildcard origins and
/// headers, so the allowed set is always explicit.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let mut parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No valid CORS origins configured, defaulting to localhost:3000");
        parsed_origins.push(HeaderValue::from_static("http://localhost:3000"));
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

/// Unwrap a JSON body, turning malformed input into a 400
fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServerError::InvalidBody(rejection.body_text()))
}

/// Username of the logged-in session, or 401
async fn authenticated(state: &AppState, cookies: &Cookies) -> Result<String> {
    let session = state
        .current_session(cookies)?
        .ok_or_else(|| Error::Unauthorized("Authentication required".to_string()))?;
    let guard = session.lock().await;
    let username = require_user(&guard)?.username.clone();
    Ok(username)
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    message: &'static str,
    #[serde(flatten)]
    outcome: LoginOutcome,
}

async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>> {
    let request = body(payload)?;
    let (Some(username), Some(password)) = (
        request.username.filter(|u| !u.trim().is_empty()),
        request.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(
            Error::MissingParameters("username and password are required".to_string()).into(),
        );
    };

    if !check_credentials(&state.config, &username, &password) {
        ::metrics::counter!("bankbot_logins_total", "result" => "rejected").increment(1);
        tracing::warn!(username = %username.trim(), "Rejected login");
        return Err(Error::Unauthorized("Invalid username or password".to_string()).into());
    }

    // New id on login; the old session, if any, is discarded
    if let Some(old_id) = state.cookie.read(&cookies) {
        state.sessions.remove(&old_id);
    }
    let session = state.start_session(&cookies);
    let mut guard = session.lock().await;
    let outcome = state.orchestrator.login(&mut guard, username.trim()).await;

    ::metrics::counter!("bankbot_logins_total", "result" => "accepted").increment(1);
    tracing::info!(session_id = %session.id, username = %outcome.username, "User logged in");
    Ok(Json(LoginResponse {
        message: "Login successful",
        outcome,
    }))
}

async fn logout(State(state): State<AppState>, cookies: Cookies) -> Json<Value> {
    state.end_session(&cookies);
    Json(json!({ "message": "Logged out successfully" }))
}

async fn check_session(State(state): State<AppState>, cookies: Cookies) -> Json<Value> {
    let session = state.current_session(&cookies).ok().flatten();
    let user = match session {
        Some(session) => {
            let guard = session.lock().await;
            guard.user.clone()
        }
        None => None,
    };
    Json(json!({
        "authenticated": user.is_some(),
        "username": user.map(|u| u.username),
    }))
}

async fn session_health(State(state): State<AppState>, cookies: Cookies) -> Result<Json<Value>> {
    let Some(session) = state.current_session(&cookies)? else {
        return Ok(Json(json!({ "status": "none", "authenticated": false })));
    };

    let guard = session.lock().await;
    let health = json!({
        "status": "active",
        "authenticated": guard.is_authenticated(),
        "messageCount": guard.chat_history.len(),
        "hasSnapshot": guard.sf_chat_id.is_some(),
        "expiresInSeconds": state.sessions.max_age().as_secs(),
    });
    Ok(Json(health))
}

async fn chat(
    State(state): State<AppState>,
    cookies: Cookies,
    payload: std::result::Result<Json<ChatInput>, JsonRejection>,
) -> Result<Json<ChatOutcome>> {
    let input = body(payload)?;
    let session = state.session_or_create(&cookies)?;
    let orchestrator = state.orchestrator.clone();

    // Detached: a request timeout must not split a CRM write from the draft reset
    let turn = tokio::spawn(async move {
        let mut guard = session.lock().await;
        orchestrator.chat(&mut guard, &input).await
    });
    let outcome = turn
        .await
        .map_err(|e| ServerError::Internal(format!("chat turn aborted: {}", e)))??;
    Ok(Json(outcome))
}

async fn chat_state(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<ChatStateView>> {
    let view = match state.current_session(&cookies)? {
        Some(session) => {
            let guard = session.lock().await;
            state.orchestrator.chat_state(&guard)
        }
        None => state.orchestrator.chat_state(&SessionState::default()),
    };
    Ok(Json(view))
}

async fn verify_confirmation(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ConfirmationInput>, JsonRejection>,
) -> Result<Json<Value>> {
    let input = body(payload)?;
    if input.text.trim().is_empty() {
        return Err(Error::MissingParameters("text is required".to_string()).into());
    }
    let confirmed = state.orchestrator.verify_confirmation(&input).await;
    Ok(Json(json!({ "isConfirmed": confirmed })))
}

async fn suggested_replies(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SuggestionRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let request = body(payload)?;
    let suggestions = state.orchestrator.suggested_replies(&request).await;
    Ok(Json(json!({ "suggestions": suggestions })))
}

async fn generate_greeting(
    State(state): State<AppState>,
    cookies: Cookies,
    payload: Option<Json<GreetingInput>>,
) -> Json<Value> {
    let input = payload.map(|Json(input)| input).unwrap_or_default();
    let session = state.current_session(&cookies).ok().flatten();
    let greeting = match &session {
        Some(session) => {
            state
                .orchestrator
                .greeting(&*session.lock().await, &input)
                .await
        }
        None => {
            state
                .orchestrator
                .greeting(&SessionState::default(), &input)
                .await
        }
    };
    Json(json!({ "greeting": greeting }))
}

async fn list_appointments(State(state): State<AppState>, cookies: Cookies) -> Result<Json<Value>> {
    authenticated(&state, &cookies).await?;
    let appointments = state.orchestrator.list_appointments().await?;
    Ok(Json(json!({ "appointments": appointments })))
}

async fn book_appointment(
    State(state): State<AppState>,
    cookies: Cookies,
    payload: std::result::Result<Json<AppointmentDetails>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingOutcome>)> {
    authenticated(&state, &cookies).await?;
    let details = body(payload)?;
    let outcome = state.orchestrator.book_appointment(&details).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn reschedule_appointment(
    State(state): State<AppState>,
    cookies: Cookies,
    payload: std::result::Result<Json<AppointmentDetails>, JsonRejection>,
) -> Result<Json<BookingOutcome>> {
    authenticated(&state, &cookies).await?;
    let details = body(payload)?;
    Ok(Json(state.orchestrator.reschedule_appointment(&details).await?))
}

async fn banker_notes(State(state): State<AppState>, cookies: Cookies) -> Result<Json<Value>> {
    authenticated(&state, &cookies).await?;
    let notes = state.orchestrator.banker_notes().await?;
    Ok(Json(json!({ "notes": notes })))
}

#[derive(Debug, Default, Deserialize)]
struct VisitHistoryRequest {
    #[serde(default)]
    limit: Option<usize>,
}

async fn visit_history(
    State(state): State<AppState>,
    cookies: Cookies,
    payload: Option<Json<VisitHistoryRequest>>,
) -> Result<Json<Value>> {
    authenticated(&state, &cookies).await?;
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let visits = state.orchestrator.visit_history(request.limit).await?;
    Ok(Json(json!({ "visits": visits })))
}

async fn recommendations(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<RecommendationsOutcome>> {
    authenticated(&state, &cookies).await?;
    Ok(Json(state.orchestrator.recommendations().await))
}

/// Liveness probe
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "sessions": state.sessions.count(),
    }))
}
