//! Router tests against a scripted model and the in-memory CRM

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use bankbot_agent::ChatOrchestrator;
use bankbot_config::{CrmMode, DomainCatalog, Settings};
use bankbot_crm::{CrmLayer, InMemoryCrm, VisitRecord};
use bankbot_llm::{
    FinishReason, GenerationOptions, GenerationResult, LlmBackend, LlmError, LlmGateway, Message,
};
use bankbot_server::{create_router, AppState};

const CONTACT: &str = "003XX0000000001";

struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    delay: Duration,
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn generate(
        &self,
        _messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<GenerationResult, LlmError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.replies.lock().pop_front();
        match reply {
            Some(text) => Ok(GenerationResult {
                text,
                tokens: 0,
                total_time_ms: 0,
                finish_reason: FinishReason::Stop,
            }),
            None => Err(LlmError::Network("no scripted reply".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.auth.username = "demo".to_string();
    settings.auth.password = "hunter2".to_string();
    settings.crm.mode = CrmMode::Memory;
    settings.crm.contact_id = CONTACT.to_string();
    settings
}

fn app_with(settings: Settings, crm: Arc<InMemoryCrm>, replies: &[&str]) -> Router {
    slow_app(settings, crm, replies, Duration::ZERO)
}

/// Every model call takes `delay`
fn slow_app(
    settings: Settings,
    crm: Arc<InMemoryCrm>,
    replies: &[&str],
    delay: Duration,
) -> Router {
    let backend = Arc::new(ScriptedBackend {
        replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        delay,
    });
    let catalog = Arc::new(DomainCatalog::default());
    let llm = Arc::new(LlmGateway::new(backend, catalog.clone()));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        llm,
        CrmLayer::from_memory(crm),
        catalog,
        settings.tenant(),
    ));
    let state = AppState::new(settings, orchestrator, None).unwrap();
    create_router(state)
}

fn app(replies: &[&str]) -> Router {
    app_with(settings(), Arc::new(InMemoryCrm::new()), replies)
}

fn post(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, cookie, body)
}

async fn login(app: &Router) -> String {
    let (status, cookie, body) = send(
        app,
        post(
            "/api/auth/login",
            json!({"username": "demo", "password": "hunter2"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    cookie.expect("login sets the session cookie")
}

#[tokio::test]
async fn test_health() {
    let app = app(&[]);
    let (status, _, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let app = app(&[]);
    let (status, cookie, body) = send(
        &app,
        post(
            "/api/auth/login",
            json!({"username": "demo", "password": "wrong"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert!(body.get("recovery").is_none());
    assert!(cookie.is_none());
}

#[tokio::test]
async fn test_login_requires_both_fields() {
    let app = app(&[]);
    let (status, _, body) = send(&app, post("/api/auth/login", json!({"username": "demo"}), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_PARAMETERS");
}

#[tokio::test]
async fn test_login_then_check_session() {
    let app = app(&["Welcome back to Horizon Bank!"]);
    let (status, cookie, body) = send(
        &app,
        post(
            "/api/auth/login",
            json!({"username": "demo", "password": "hunter2"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["username"], "demo");
    assert_eq!(body["greeting"], "Welcome back to Horizon Bank!");
    assert_eq!(body["chatHistory"].as_array().unwrap().len(), 1);

    let cookie = cookie.unwrap();
    assert!(cookie.starts_with("bankbot.sid="));

    let (_, _, body) = send(&app, get("/api/auth/check-session", Some(&cookie))).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["username"], "demo");

    let (_, _, body) = send(&app, get("/api/session-health", Some(&cookie))).await;
    assert_eq!(body["status"], "active");
    assert_eq!(body["messageCount"], 1);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = app(&[]);
    let cookie = login(&app).await;

    let (status, _, body) = send(&app, post("/api/auth/logout", json!({}), Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");

    let (status, _, body) = send(&app, get("/api/salesforce/appointments", Some(&cookie))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "SESSION_EXPIRED");
}

#[tokio::test]
async fn test_tampered_cookie_is_ignored() {
    let app = app(&[]);
    let (_, _, body) = send(
        &app,
        get("/api/auth/check-session", Some("bankbot.sid=forged-session-id")),
    )
    .await;
    assert_eq!(body["authenticated"], false);
}

#[tokio::test]
async fn test_crm_routes_require_login() {
    let app = app(&[]);
    for request in [
        get("/api/salesforce/appointments", None),
        get("/api/salesforce/banker-notes", None),
        post("/api/salesforce/visit-history", json!({}), None),
        post("/api/chat/recommendations", json!({}), None),
    ] {
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }
}

#[tokio::test]
async fn test_chat_missing_query() {
    let app = app(&[]);
    let (status, _, body) = send(&app, post("/api/chat", json!({"customerType": "new"}), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_PARAMETERS");
}

#[tokio::test]
async fn test_chat_malformed_body() {
    let app = app(&[]);
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_chat_model_failure_is_generic_500() {
    let app = app(&[]);
    let (status, _, body) = send(
        &app,
        post(
            "/api/chat",
            json!({"query": "I need an appointment", "customerType": "new"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "UPSTREAM_ERROR");
    assert!(!body["error"].as_str().unwrap().contains("scripted"));
}

#[tokio::test]
async fn test_chat_turn_awaits_confirmation() {
    let app = app(&[
        "Welcome back!",
        r#"{
            "response": "Mortgage consultation at Downtown on March 6th at 3:00 PM.",
            "appointmentDetails": {
                "Reason_for_Visit__c": "Mortgage consultation",
                "Appointment_Date__c": "2025-03-06",
                "Appointment_Time__c": "3:00 PM",
                "Location__c": "Downtown"
            },
            "missingFields": [],
            "action": "book"
        }"#,
        r#"{"isConfirmed": false}"#,
    ]);
    let cookie = login(&app).await;

    let (status, _, body) = send(
        &app,
        post(
            "/api/chat",
            json!({"query": "Mortgage consultation downtown, March 6 at 3 PM", "customerType": "regular"}),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["missingFields"], json!([]));
    assert_eq!(body["stage"], "confirmation");
    assert_eq!(body["appointmentDetails"]["Location__c"], "Downtown");
    assert!(body["response"]
        .as_str()
        .unwrap()
        .ends_with("go ahead with this appointment."));

    let (_, _, state) = send(&app, get("/api/chat/state", Some(&cookie))).await;
    assert_eq!(state["messages"].as_array().unwrap().len(), 3);
    assert_eq!(
        state["appointmentDetails"]["Reason_for_Visit__c"],
        "Mortgage consultation"
    );
}

#[tokio::test]
async fn test_direct_booking_and_invalid_time() {
    let crm = Arc::new(InMemoryCrm::new());
    let app = app_with(settings(), crm.clone(), &[]);
    let cookie = login(&app).await;

    let (status, _, body) = send(
        &app,
        post(
            "/api/salesforce/appointments",
            json!({
                "Reason_for_Visit__c": "Open account",
                "Appointment_Date__c": "2025-05-02",
                "Appointment_Time__c": "10:00 AM",
                "Location__c": "Uptown"
            }),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["appointmentTime"], "2025-05-02T10:00:00.000Z");
    assert_eq!(crm.appointment_writes(), 1);

    let (status, _, body) = send(
        &app,
        post(
            "/api/salesforce/appointments",
            json!({
                "Reason_for_Visit__c": "Open account",
                "Appointment_Date__c": "2025-05-02",
                "Appointment_Time__c": "25:00",
                "Location__c": "Uptown"
            }),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_DATETIME");

    let (status, _, body) = send(&app, get("/api/salesforce/appointments", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reschedule_requires_id() {
    let app = app(&[]);
    let cookie = login(&app).await;
    let (status, _, body) = send(
        &app,
        post(
            "/api/salesforce/appointments/reschedule",
            json!({"Appointment_Date__c": "2025-05-02"}),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_PARAMETERS");
}

#[tokio::test]
async fn test_visit_history_limit() {
    let crm = Arc::new(InMemoryCrm::new());
    for day in 1..=4 {
        crm.add_visit(VisitRecord {
            id: format!("a0V00000000000{}", day),
            contact_id: Some(CONTACT.to_string()),
            visit_date: Some(format!("2025-01-0{}", day)),
            purpose: Some("Deposit".to_string()),
            outcome: None,
        });
    }
    let app = app_with(settings(), crm, &[]);
    let cookie = login(&app).await;

    let (status, _, body) = send(
        &app,
        post("/api/salesforce/visit-history", json!({"limit": 2}), Some(&cookie)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let visits = body["visits"].as_array().unwrap();
    assert_eq!(visits.len(), 2);
    assert_eq!(visits[0]["Visit_Date__c"], "2025-01-04");
}

#[tokio::test]
async fn test_suggested_replies_always_three() {
    let app = app(&[]);
    let (status, _, body) = send(
        &app,
        post(
            "/api/suggestedReplies",
            json!({"userQuery": "hi", "missingFields": ["Location__c"]}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_verify_confirmation() {
    let app = app(&[r#"{"isConfirmed": true}"#]);
    let (status, _, body) = send(
        &app,
        post("/api/verify-confirmation", json!({"text": "Yes please"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isConfirmed"], true);

    let (status, _, body) = send(&app, post("/api/verify-confirmation", json!({}), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_PARAMETERS");
}

#[tokio::test]
async fn test_greeting_falls_back_for_guests() {
    let app = app(&[]);
    let (status, _, body) = send(
        &app,
        post("/api/generate-greeting", json!({"customerType": "new"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["greeting"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_session_signals_recovery() {
    let mut settings = settings();
    settings.session.max_age_seconds = 1;
    let app = app_with(settings, Arc::new(InMemoryCrm::new()), &[]);
    let cookie = login(&app).await;

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let (status, _, body) = send(
        &app,
        post(
            "/api/chat",
            json!({"query": "hello", "customerType": "new"}),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "SESSION_EXPIRED");
    assert_eq!(body["recovery"], true);
}

#[tokio::test]
async fn test_timed_out_turn_still_commits_once() {
    let mut settings = settings();
    settings.server.timeout_seconds = 1;
    let crm = Arc::new(InMemoryCrm::new());
    let app = slow_app(
        settings,
        crm.clone(),
        &[
            "Welcome back!",
            r#"{
                "response": "",
                "appointmentDetails": {
                    "Reason_for_Visit__c": "Loan",
                    "Appointment_Date__c": "2025-03-06",
                    "Appointment_Time__c": "3:00 PM",
                    "Location__c": "Downtown"
                },
                "action": "book"
            }"#,
            r#"{"isConfirmed": true}"#,
            r#"{"response": "", "appointmentDetails": {}, "missingFields": []}"#,
            r#"{"isConfirmed": true}"#,
        ],
        Duration::from_millis(600),
    );
    let cookie = login(&app).await;

    // Chat plus confirmation outlast the request timeout
    let (status, _, _) = send(
        &app,
        post(
            "/api/chat",
            json!({"query": "Loan meeting downtown March 6 at 3 PM, go ahead", "customerType": "new"}),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(crm.appointment_writes(), 1);

    // The retried "yes" finds a closed draft
    let (status, _, body) = send(
        &app,
        post(
            "/api/chat",
            json!({"query": "yes", "customerType": "new"}),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["missingFields"].as_array().unwrap().len(), 4);
    assert_eq!(crm.appointment_writes(), 1);
}

#[tokio::test]
async fn test_metrics_disabled_without_recorder() {
    let app = app(&[]);
    let response = app.oneshot(get("/metrics", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
