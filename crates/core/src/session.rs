//! Per-session conversation state and its persisted snapshot

use serde::{Deserialize, Serialize};

use crate::appointment::AppointmentDetails;
use crate::conversation::{last_appointment_details, ChatMessage};
use crate::flow::{GuidedFlow, ReferralState};

/// Logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub username: String,
}

/// Everything the server remembers about one browser session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub user: Option<SessionUser>,
    pub chat_history: Vec<ChatMessage>,
    pub guided_flow: GuidedFlow,
    pub referral_state: ReferralState,
    /// Id of the CRM chat-session record backing this session
    pub sf_chat_id: Option<String>,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Display name; guests are called "Guest"
    pub fn username(&self) -> &str {
        self.user.as_ref().map_or("Guest", |u| u.username.as_str())
    }

    pub fn visible_history(&self) -> Vec<ChatMessage> {
        self.chat_history
            .iter()
            .filter(|m| !m.is_system())
            .cloned()
            .collect()
    }

    /// Draft from the latest assistant turn, falling back to the guided flow
    pub fn last_appointment_details(&self) -> AppointmentDetails {
        last_appointment_details(&self.chat_history)
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| self.guided_flow.to_details())
    }

    /// Snapshot persisted to the CRM
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            chat_history: self.chat_history.clone(),
            guided_flow: self.guided_flow.clone(),
        }
    }

    /// Replace history and draft with a restored snapshot
    pub fn restore(&mut self, record_id: impl Into<String>, snapshot: ConversationSnapshot) {
        self.chat_history = snapshot.chat_history;
        self.guided_flow = snapshot.guided_flow;
        self.sf_chat_id = Some(record_id.into());
        self.referral_state = ReferralState::InProgress;
    }
}

/// Body of the CRM chat-session `History__c` field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub guided_flow: GuidedFlow,
}

impl ConversationSnapshot {
    /// Parse a stored history blob; unreadable blobs yield an empty snapshot
    pub fn from_blob(blob: &str) -> Self {
        serde_json::from_str(blob).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unreadable chat-session history, starting empty");
            Self::default()
        })
    }

    pub fn to_blob(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
