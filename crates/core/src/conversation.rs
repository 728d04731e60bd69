//! Chat turns and the assistant envelope stored in history

use serde::{Deserialize, Serialize};

use crate::appointment::AppointmentDetails;

/// Author of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// One entry of the chat history
///
/// Assistant entries hold a JSON-encoded [`AssistantEnvelope`] rather than
/// plain text, so the last extracted appointment draft can be replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Plain-text assistant turn, wrapped in an envelope with no draft
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::assistant_envelope(&AssistantEnvelope {
            response: text.into(),
            ..Default::default()
        })
    }

    /// Assistant turn carrying a full envelope
    pub fn assistant_envelope(envelope: &AssistantEnvelope) -> Self {
        let content = serde_json::to_string(envelope).unwrap_or_else(|_| envelope.response.clone());
        Self {
            role: ChatRole::Assistant,
            content,
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == ChatRole::System
    }

    /// Decode the envelope of an assistant turn
    ///
    /// Older snapshots may hold plain text; that is returned as the response.
    pub fn envelope(&self) -> Option<AssistantEnvelope> {
        if self.role != ChatRole::Assistant {
            return None;
        }
        match serde_json::from_str::<AssistantEnvelope>(&self.content) {
            Ok(envelope) => Some(envelope),
            Err(_) => Some(AssistantEnvelope {
                response: self.content.clone(),
                ..Default::default()
            }),
        }
    }

    /// Text to show the user: the envelope response for assistant turns
    pub fn display_text(&self) -> String {
        self.envelope()
            .map(|e| e.response)
            .unwrap_or_else(|| self.content.clone())
    }
}

/// What an assistant turn said and extracted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantEnvelope {
    pub response: String,
    #[serde(default)]
    pub appointment_details: AppointmentDetails,
    #[serde(default)]
    pub missing_fields: Vec<String>,
}

/// The last `n` non-system turns, oldest first
pub fn recent_turns(history: &[ChatMessage], n: usize) -> Vec<ChatMessage> {
    let mut turns: Vec<ChatMessage> = history
        .iter()
        .rev()
        .filter(|m| !m.is_system())
        .take(n)
        .cloned()
        .collect();
    turns.reverse();
    turns
}

/// Draft carried by the most recent assistant turn, if any
pub fn last_appointment_details(history: &[ChatMessage]) -> Option<AppointmentDetails> {
    history
        .iter()
        .rev()
        .find_map(|m| m.envelope())
        .map(|e| e.appointment_details)
}
