//! Prompt building
//!
//! Each gateway operation sends a system prompt describing one narrow task,
//! followed by a slice of the chat history and the new user text.

use serde::{Deserialize, Serialize};
use std::fmt;

use bankbot_config::{BankProfile, DomainCatalog};
use bankbot_core::{ChatMessage, ChatRole, CustomerType};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl From<ChatRole> for Role {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::System => Role::System,
            ChatRole::User => Role::User,
            ChatRole::Assistant => Role::Assistant,
        }
    }
}

/// Chat message sent to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for Message {
    /// Assistant envelopes are sent as their response text
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.into(),
            content: msg.display_text(),
        }
    }
}

/// Assembles the message list for one request
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    messages: Vec<Message>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::system(content));
        self
    }

    /// Append history turns, dropping stored system entries
    pub fn history(mut self, history: &[ChatMessage]) -> Self {
        self.messages
            .extend(history.iter().filter(|m| !m.is_system()).map(Message::from));
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn build(self) -> Vec<Message> {
        self.messages
    }
}

/// System prompt for the welcome message
pub fn greeting_prompt(
    bank: &BankProfile,
    customer_type: CustomerType,
    username: &str,
    context: Option<&str>,
) -> String {
    let relationship = if customer_type.is_regular() {
        "a returning customer"
    } else {
        "a new customer"
    };
    let mut prompt = format!(
        "You are {assistant}, the appointment assistant at {bank}. Write a short, warm \
         greeting (one or two sentences) for {username}, who is {relationship}. Offer help \
         with booking, rescheduling or cancelling a branch appointment. Reply with plain text only.",
        assistant = bank.assistant_name,
        bank = bank.bank_name,
        username = username,
        relationship = relationship,
    );
    if let Some(context) = context {
        prompt.push_str(&format!(
            "\n\nThe customer left an unfinished request last time: {}. Mention it and offer to continue.",
            context
        ));
    }
    prompt
}

/// System prompt for the yes/no confirmation check
pub fn confirmation_prompt() -> String {
    r#"You decide whether the customer's latest message confirms the appointment details the assistant just summarised.
Agreement such as "yes", "sounds good", "book it" or "confirm" counts as confirmation. Questions, changes, hesitation or anything unrelated do not.
Reply with JSON only: {"isConfirmed": true} or {"isConfirmed": false}"#
        .to_string()
}

/// System prompt for the main slot-filling chat
pub fn chat_prompt(
    catalog: &DomainCatalog,
    customer_type: CustomerType,
    context: Option<&str>,
    today: &str,
) -> String {
    let locations = catalog.branches.location_names().join(", ");
    let mut prompt = format!(
        r#"You are {assistant}, the appointment assistant at {bank}. Help the customer book, reschedule or cancel a branch appointment.
Today is {today}. The customer is {customer}.
Collect four fields: reason for visit, date, time and branch location. Ask for whatever is missing, one question at a time. When everything is known, summarise the appointment and ask the customer to confirm.
Branch locations: {locations}.

Reply with JSON only, in this shape:
{{
  "response": "what you say to the customer",
  "appointmentDetails": {{
    "Id": "existing appointment id when rescheduling or cancelling, else null",
    "Reason_for_Visit__c": "string or null",
    "Appointment_Date__c": "YYYY-MM-DD or null",
    "Appointment_Time__c": "h:mm AM/PM or null",
    "Location__c": "string or null"
  }},
  "missingFields": ["names of the appointmentDetails fields still unknown"],
  "action": "book | reschedule | cancel"
}}
Resolve relative dates like "tomorrow" against today's date."#,
        assistant = catalog.bank.assistant_name,
        bank = catalog.bank.bank_name,
        today = today,
        customer = if customer_type.is_regular() {
            "a returning customer"
        } else {
            "a new customer"
        },
        locations = if locations.is_empty() { "any" } else { locations.as_str() },
    );
    if let Some(context) = context {
        prompt.push_str("\n\nCustomer context:\n");
        prompt.push_str(context);
    }
    prompt
}

/// System prompt for quick-reply suggestions
pub fn suggestions_prompt(context: &str) -> String {
    format!(
        r#"Suggest up to three short replies (under eight words each) the customer might tap next in a banking appointment chat.
Write them from the customer's point of view.
{context}
Reply with JSON only: {{"suggestions": ["...", "...", "..."]}}"#,
        context = context
    )
}

/// System prompt for product recommendations
pub fn recommendations_prompt(catalog: &DomainCatalog, context: &str) -> String {
    let products = catalog
        .products
        .iter()
        .map(|p| format!("- {}: {} ({})", p.id, p.name, p.description))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Pick up to three products from this catalog that fit the customer best.
{products}

What we know about the customer:
{context}

Reply with JSON only: {{"recommendations": [{{"productId": "...", "reason": "one sentence"}}]}}"#,
        products = products,
        context = context
    )
}
