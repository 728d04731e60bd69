//! LLM gateway
//!
//! Wraps a backend with the four conversational operations the orchestrator
//! needs plus product recommendations. Each operation has a fixed sampling
//! profile and a failure policy:
//!
//! | Operation | On failure |
//! |---|---|
//! | `generate_greeting` | canned welcome |
//! | `verify_confirmation` | `false` |
//! | `chat` | error (turn aborts) |
//! | `suggest_replies` | error (caller substitutes local replies) |
//! | `recommend_products` | error (caller falls back to keyword match) |

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use bankbot_config::DomainCatalog;
use bankbot_core::conversation::recent_turns;
use bankbot_core::{
    json_extract, AppointmentAction, AppointmentDetails, ChatMessage, ChatRole, CustomerType,
    FlowStage, GuidedFlow,
};

use crate::backend::{GenerationOptions, LlmBackend};
use crate::prompt::{self, PromptBuilder};
use crate::LlmError;

const GREETING_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.7,
    max_tokens: 120,
    json_mode: false,
};

const CONFIRMATION_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.0,
    max_tokens: 20,
    json_mode: true,
};

const CHAT_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.3,
    max_tokens: 600,
    json_mode: true,
};

const SUGGESTION_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.7,
    max_tokens: 120,
    json_mode: true,
};

const RECOMMENDATION_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.4,
    max_tokens: 400,
    json_mode: true,
};

/// Turns sent to the confirmation check
const CONFIRMATION_WINDOW: usize = 3;

/// Most suggestions returned
pub const MAX_SUGGESTIONS: usize = 3;

static ENVELOPE_SCHEMA: Lazy<Option<jsonschema::JSONSchema>> = Lazy::new(|| {
    let schema = json!({
        "type": "object",
        "required": ["response"],
        "properties": {
            "response": { "type": "string" },
            "appointmentDetails": { "type": ["object", "null"] },
            "missingFields": {
                "type": ["array", "null"],
                "items": { "type": "string" }
            },
            "action": { "type": ["string", "null"] },
            "error": { "type": ["string", "null"] }
        }
    });
    match jsonschema::JSONSchema::compile(&schema) {
        Ok(compiled) => Some(compiled),
        Err(e) => {
            tracing::error!(error = %e, "Chat envelope schema failed to compile");
            None
        }
    }
});

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Structured reply of the chat operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub response: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub appointment_details: AppointmentDetails,
    /// The model's own claim; advisory only
    #[serde(default, deserialize_with = "null_as_default")]
    pub missing_fields: Vec<String>,
    #[serde(default)]
    pub action: Option<AppointmentAction>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Inputs of the greeting operation
#[derive(Debug, Clone, Copy)]
pub struct GreetingRequest<'a> {
    pub customer_type: CustomerType,
    pub username: &'a str,
    pub chat_context: &'a [ChatMessage],
    pub incomplete_appointment: Option<&'a GuidedFlow>,
}

/// Inputs of the chat operation
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub query: &'a str,
    pub customer_type: CustomerType,
    /// Extra context such as prior appointments
    pub context: Option<&'a str>,
    /// History up to, not including, the new query
    pub history: &'a [ChatMessage],
    /// `YYYY-MM-DD`, used to resolve relative dates
    pub today: &'a str,
}

/// Inputs of the suggestion operation, as posted by the client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub user_query: String,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub sf_data: Option<Value>,
    #[serde(default)]
    pub missing_fields: Vec<String>,
    #[serde(default)]
    pub guided_flow: GuidedFlow,
    /// Stage reported by the last chat turn
    #[serde(default)]
    pub stage: Option<FlowStage>,
}

/// A catalog product picked for the customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub product_id: String,
    #[serde(default)]
    pub reason: String,
}

/// Canned greeting used when generation fails
pub fn fallback_greeting(username: &str) -> String {
    format!("Welcome, {}! How can I assist you today?", username)
}

fn record_failure(purpose: &'static str, error: &LlmError) {
    tracing::warn!(purpose, error = %error, "LLM call failed");
    metrics::counter!("bankbot_llm_failures_total", "purpose" => purpose).increment(1);
}

/// Gateway over a language-model backend
pub struct LlmGateway {
    backend: Arc<dyn LlmBackend>,
    catalog: Arc<DomainCatalog>,
}

impl LlmGateway {
    pub fn new(backend: Arc<dyn LlmBackend>, catalog: Arc<DomainCatalog>) -> Self {
        Self { backend, catalog }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Personalised welcome; never fails
    pub async fn generate_greeting(&self, request: GreetingRequest<'_>) -> String {
        let context = greeting_context(request.chat_context, request.incomplete_appointment);
        let messages = PromptBuilder::new()
            .system(prompt::greeting_prompt(
                &self.catalog.bank,
                request.customer_type,
                request.username,
                context.as_deref(),
            ))
            .user(format!("Greet {}.", request.username))
            .build();

        match self.backend.generate(&messages, &GREETING_OPTIONS).await {
            Ok(result) if !result.text.trim().is_empty() => result.text.trim().to_string(),
            Ok(_) => {
                record_failure("greeting", &LlmError::InvalidResponse("empty greeting".into()));
                fallback_greeting(request.username)
            }
            Err(e) => {
                record_failure("greeting", &e);
                fallback_greeting(request.username)
            }
        }
    }

    /// Whether `text` confirms the pending appointment; `false` on any failure
    pub async fn verify_confirmation(&self, text: &str, history: &[ChatMessage]) -> bool {
        let messages = PromptBuilder::new()
            .system(prompt::confirmation_prompt())
            .history(&recent_turns(history, CONFIRMATION_WINDOW))
            .user(text)
            .build();

        match self.backend.generate(&messages, &CONFIRMATION_OPTIONS).await {
            Ok(result) => parse_confirmation(&result.text),
            Err(e) => {
                record_failure("confirmation", &e);
                false
            }
        }
    }

    /// Slot-filling reply with extracted appointment fields
    pub async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatEnvelope, LlmError> {
        let messages = PromptBuilder::new()
            .system(prompt::chat_prompt(
                &self.catalog,
                request.customer_type,
                request.context,
                request.today,
            ))
            .history(request.history)
            .user(request.query)
            .build();

        let result = self
            .backend
            .generate(&messages, &CHAT_OPTIONS)
            .await
            .map_err(|e| {
                record_failure("chat", &e);
                e
            })?;

        Ok(parse_envelope(&result.text))
    }

    /// Up to three quick replies
    pub async fn suggest_replies(
        &self,
        request: &SuggestionRequest,
    ) -> Result<Vec<String>, LlmError> {
        let context = suggestion_context(request);
        let messages = PromptBuilder::new()
            .system(prompt::suggestions_prompt(&context))
            .history(&recent_turns(&request.chat_history, 4))
            .user(if request.user_query.trim().is_empty() {
                "Suggest replies."
            } else {
                request.user_query.as_str()
            })
            .build();

        let result = self
            .backend
            .generate(&messages, &SUGGESTION_OPTIONS)
            .await
            .map_err(|e| {
                record_failure("suggestions", &e);
                e
            })?;

        let suggestions = parse_suggestions(&result.text);
        if suggestions.is_empty() {
            let err = LlmError::InvalidResponse("no suggestions in response".to_string());
            record_failure("suggestions", &err);
            return Err(err);
        }
        Ok(suggestions)
    }

    /// Catalog products that fit what is known about the customer
    pub async fn recommend_products(
        &self,
        customer_context: &str,
    ) -> Result<Vec<Recommendation>, LlmError> {
        let messages = PromptBuilder::new()
            .system(prompt::recommendations_prompt(&self.catalog, customer_context))
            .user("Recommend products.")
            .build();

        let result = self
            .backend
            .generate(&messages, &RECOMMENDATION_OPTIONS)
            .await
            .map_err(|e| {
                record_failure("recommendations", &e);
                e
            })?;

        let value = json_extract::extract_value(&result.text);
        let picked: Vec<Recommendation> = value
            .get("recommendations")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let known: Vec<Recommendation> = picked
            .into_iter()
            .filter(|r| self.catalog.product(&r.product_id).is_some())
            .take(MAX_SUGGESTIONS)
            .collect();

        if known.is_empty() {
            let err = LlmError::InvalidResponse("no catalog products recommended".to_string());
            record_failure("recommendations", &err);
            return Err(err);
        }
        Ok(known)
    }
}

/// Prior user turns about reasons or appointments, plus any unfinished draft
fn greeting_context(history: &[ChatMessage], draft: Option<&GuidedFlow>) -> Option<String> {
    let mut parts: Vec<String> = history
        .iter()
        .filter(|m| m.role == ChatRole::User)
        .filter(|m| {
            let lowered = m.content.to_lowercase();
            lowered.contains("reason") || lowered.contains("appointment")
        })
        .map(|m| format!("they said \"{}\"", m.content.trim()))
        .collect();

    if let Some(summary) = draft.and_then(GuidedFlow::summary) {
        parts.push(format!("draft appointment ({})", summary));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn suggestion_context(request: &SuggestionRequest) -> String {
    let mut lines = vec![format!(
        "Current step: {}.",
        request
            .stage
            .unwrap_or_else(|| request.guided_flow.stage())
            .display_name()
    )];
    if !request.missing_fields.is_empty() {
        lines.push(format!(
            "Still missing: {}.",
            request.missing_fields.join(", ")
        ));
    }
    if let Some(user_type) = request.user_type.as_deref() {
        lines.push(format!("Customer type: {}.", user_type));
    }
    if let Some(data) = request.sf_data.as_ref().filter(|d| !d.is_null()) {
        lines.push(format!("Known customer data: {}", data));
    }
    lines.join("\n")
}

/// Strict schema-validated parse, degrading to lenient extraction
pub fn parse_envelope(text: &str) -> ChatEnvelope {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        let valid = (*ENVELOPE_SCHEMA)
            .as_ref()
            .map_or(true, |schema| schema.is_valid(&value));
        if valid {
            if let Ok(envelope) = serde_json::from_value::<ChatEnvelope>(value) {
                return envelope;
            }
        }
        tracing::debug!("Chat reply is JSON but not a valid envelope, using lenient parse");
    }

    let extracted = json_extract::extract(text);
    let mut envelope: ChatEnvelope = serde_json::from_str(&extracted).unwrap_or_default();

    // Plain prose with no JSON at all is still a usable reply
    if extracted == json_extract::EMPTY_OBJECT && !text.trim_start().starts_with('{') {
        envelope.response = text.trim().to_string();
    }
    envelope
}

fn parse_confirmation(text: &str) -> bool {
    let value = json_extract::extract_value(text);
    match value.get("isConfirmed") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn parse_suggestions(text: &str) -> Vec<String> {
    let value = json_extract::extract_value(text);
    value
        .get("suggestions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .take(MAX_SUGGESTIONS)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FinishReason, GenerationResult};
    use crate::prompt::Message;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays canned replies; an `Err` entry simulates a failed request
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, String>>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn generate(
            &self,
            messages: &[Message],
            _options: &GenerationOptions,
        ) -> Result<GenerationResult, LlmError> {
            self.seen.lock().push(messages.to_vec());
            match self.replies.lock().pop_front() {
                Some(Ok(text)) => Ok(GenerationResult {
                    text,
                    tokens: 0,
                    total_time_ms: 0,
                    finish_reason: FinishReason::Stop,
                }),
                Some(Err(e)) => Err(LlmError::Api(e)),
                None => Err(LlmError::Api("script exhausted".to_string())),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn gateway(backend: Arc<ScriptedBackend>) -> LlmGateway {
        LlmGateway::new(backend, Arc::new(DomainCatalog::default()))
    }

    fn greeting(username: &str) -> GreetingRequest<'_> {
        GreetingRequest {
            customer_type: CustomerType::New,
            username,
            chat_context: &[],
            incomplete_appointment: None,
        }
    }

    #[tokio::test]
    async fn test_greeting_fallback_on_error() {
        let gw = gateway(ScriptedBackend::new(vec![Err("503")]));
        assert_eq!(
            gw.generate_greeting(greeting("sam")).await,
            "Welcome, sam! How can I assist you today?"
        );
    }

    #[tokio::test]
    async fn test_greeting_uses_model_text() {
        let gw = gateway(ScriptedBackend::new(vec![Ok("  Hello Sam, welcome back!  ")]));
        assert_eq!(gw.generate_greeting(greeting("sam")).await, "Hello Sam, welcome back!");
    }

    #[tokio::test]
    async fn test_confirmation_sends_last_three_turns() {
        let backend = ScriptedBackend::new(vec![Ok(r#"{"isConfirmed": true}"#)]);
        let gw = gateway(backend.clone());
        let history = vec![
            ChatMessage::assistant("Welcome"),
            ChatMessage::user("Book a loan meeting"),
            ChatMessage::system("ignored"),
            ChatMessage::assistant("When?"),
            ChatMessage::user("Tomorrow 3pm Downtown"),
            ChatMessage::assistant("Confirm loan meeting tomorrow at 3 PM, Downtown?"),
        ];

        assert!(gw.verify_confirmation("yes please", &history).await);

        let seen = backend.seen.lock();
        let sent = &seen[0];
        // system + 3 turns + new text
        assert_eq!(sent.len(), 5);
        assert_eq!(sent[1].content, "When?");
        assert_eq!(sent[4].content, "yes please");
    }

    #[tokio::test]
    async fn test_confirmation_false_on_garbage_or_error() {
        let gw = gateway(ScriptedBackend::new(vec![Ok("sure thing"), Err("timeout")]));
        assert!(!gw.verify_confirmation("yes", &[]).await);
        assert!(!gw.verify_confirmation("yes", &[]).await);
    }

    #[tokio::test]
    async fn test_chat_error_propagates() {
        let gw = gateway(ScriptedBackend::new(vec![Err("500")]));
        let result = gw
            .chat(ChatRequest {
                query: "book",
                customer_type: CustomerType::New,
                context: None,
                history: &[],
                today: "2025-03-05",
            })
            .await;
        assert!(matches!(result, Err(LlmError::Api(_))));
    }

    #[test]
    fn test_parse_envelope_strict() {
        let envelope = parse_envelope(
            r#"{"response": "Which branch?", "appointmentDetails": {"Reason_for_Visit__c": "Loan",
                "Appointment_Date__c": "2025-03-06", "Appointment_Time__c": "3:00 PM", "Location__c": null},
                "missingFields": ["Location__c"], "action": "book"}"#,
        );
        assert_eq!(envelope.response, "Which branch?");
        assert_eq!(envelope.appointment_details.reason.as_deref(), Some("Loan"));
        assert_eq!(envelope.missing_fields, vec!["Location__c"]);
        assert_eq!(envelope.action, Some(AppointmentAction::Book));
    }

    #[test]
    fn test_parse_envelope_fenced() {
        let envelope = parse_envelope(
            "Here you go:\n```json\n{\"response\": \"Done\", \"appointmentDetails\": null, \"action\": \"cancel\"}\n```",
        );
        assert_eq!(envelope.response, "Done");
        assert_eq!(envelope.action, Some(AppointmentAction::Cancel));
        assert!(envelope.appointment_details.is_empty());
    }

    #[test]
    fn test_parse_envelope_schema_violation_degrades() {
        // response must be a string; lenient parse yields an empty envelope
        let envelope = parse_envelope(r#"{"response": 42}"#);
        assert_eq!(envelope, ChatEnvelope::default());
    }

    #[test]
    fn test_parse_envelope_plain_prose() {
        let envelope = parse_envelope("What time suits you?");
        assert_eq!(envelope.response, "What time suits you?");
        assert!(envelope.missing_fields.is_empty());
    }

    #[test]
    fn test_parse_suggestions_caps_at_three() {
        let s = parse_suggestions(r#"{"suggestions": ["a", " ", "b", "c", "d"]}"#);
        assert_eq!(s, vec!["a", "b", "c"]);
        assert!(parse_suggestions("nothing").is_empty());
    }

    #[tokio::test]
    async fn test_recommendations_filtered_to_catalog() {
        let gw = gateway(ScriptedBackend::new(vec![Ok(
            r#"{"recommendations": [{"productId": "home-mortgage", "reason": "Buying a house"},
                {"productId": "crypto-fund", "reason": "?"}]}"#,
        )]));
        let recs = gw.recommend_products("wants a house").await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].product_id, "home-mortgage");
    }

    #[test]
    fn test_greeting_context() {
        let history = vec![
            ChatMessage::user("I need an appointment about my card"),
            ChatMessage::user("hello"),
        ];
        let flow = GuidedFlow {
            reason: Some("Card".into()),
            ..Default::default()
        };
        let context = greeting_context(&history, Some(&flow)).unwrap();
        assert!(context.contains("appointment about my card"));
        assert!(context.contains("reason: Card"));
        assert!(!context.contains("hello"));
        assert_eq!(greeting_context(&[], None), None);
    }
}
