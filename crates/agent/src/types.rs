//! Request and response bodies of the orchestrator operations

use serde::{Deserialize, Serialize};

use bankbot_core::{AppointmentAction, AppointmentDetails, ChatMessage, FlowStage, GuidedFlow};
use bankbot_crm::AppointmentRecord;

/// Body of a chat turn; both fields are required but checked by the
/// orchestrator so a missing one maps to `MISSING_PARAMETERS`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInput {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub customer_type: Option<String>,
}

impl ChatInput {
    pub fn new(query: impl Into<String>, customer_type: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            customer_type: Some(customer_type.into()),
        }
    }
}

/// Result of a chat turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOutcome {
    pub response: String,
    pub appointment_details: AppointmentDetails,
    /// Authoritative list of CRM field names still to fill
    pub missing_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<AppointmentAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_appointments: Option<Vec<AppointmentRecord>>,
    /// Guided-flow stage after this turn, for client labels
    pub stage: FlowStage,
    /// Whether this turn wrote an appointment to the CRM
    #[serde(skip)]
    pub committed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub username: String,
    pub greeting: String,
    pub chat_history: Vec<ChatMessage>,
    pub guided_flow: GuidedFlow,
}

/// Replay of the visible conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStateView {
    pub messages: Vec<ChatMessage>,
    pub appointment_details: AppointmentDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GreetingInput {
    #[serde(default)]
    pub customer_type: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationInput {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
}

/// Appointment written through the direct booking endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingOutcome {
    pub id: String,
    pub appointment_details: AppointmentDetails,
    /// Combined ISO instant stored in `Appointment_Time__c`
    pub appointment_time: String,
}

/// A catalog product suggested to the customer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecommendation {
    pub product_id: String,
    pub name: String,
    pub description: String,
    pub reason: String,
}

/// Where a recommendation list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Model,
    Keywords,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationsOutcome {
    pub recommendations: Vec<ProductRecommendation>,
    pub source: RecommendationSource,
}
