//! Chat-session snapshots
//!
//! Each contact has at most one `in_progress` snapshot. The snapshot body is
//! the JSON-encoded conversation (`History__c`), so a returning customer can
//! pick up an unfinished booking after logging in again.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use bankbot_core::{ConversationSnapshot, ReferralState};

use crate::soql::{validate_id, SoqlQuery};
use crate::{CrmError, SalesforceClient};

pub const CHAT_SESSION_SOBJECT: &str = "Chat_Session__c";

/// Chat-session record as stored in the CRM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSessionRecord {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Contact__c", default)]
    pub contact_id: Option<String>,
    #[serde(rename = "History__c", default)]
    pub history: Option<String>,
    #[serde(rename = "Appointment_Status__c", default)]
    pub status: Option<String>,
    #[serde(rename = "Last_Updated__c", default)]
    pub last_updated: Option<String>,
}

impl ChatSessionRecord {
    pub fn state(&self) -> ReferralState {
        ReferralState::parse(self.status.as_deref().unwrap_or_default())
    }

    /// Decoded conversation; a missing or unreadable body is an empty one
    pub fn snapshot(&self) -> ConversationSnapshot {
        self.history
            .as_deref()
            .map(ConversationSnapshot::from_blob)
            .unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
struct ChatSessionWrite<'a> {
    #[serde(rename = "Contact__c", skip_serializing_if = "Option::is_none")]
    contact_id: Option<&'a str>,
    #[serde(rename = "History__c", skip_serializing_if = "Option::is_none")]
    history: Option<String>,
    #[serde(rename = "Appointment_Status__c")]
    status: &'static str,
    #[serde(rename = "Last_Updated__c")]
    last_updated: String,
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Chat-session store trait
#[async_trait]
pub trait ChatSessionStore: Send + Sync {
    /// In-progress snapshots for the contact, most recently updated first
    async fn query_in_progress(&self, contact_id: &str)
        -> Result<Vec<ChatSessionRecord>, CrmError>;

    /// Create a snapshot, or overwrite `existing_id` when given; returns the id
    async fn upsert(
        &self,
        contact_id: &str,
        snapshot: &ConversationSnapshot,
        status: ReferralState,
        existing_id: Option<&str>,
    ) -> Result<String, CrmError>;

    async fn update_status(&self, id: &str, status: ReferralState) -> Result<(), CrmError>;

    /// Mark every in-progress snapshot except `keep_id` as completed
    ///
    /// Returns how many were closed.
    async fn complete_stray(
        &self,
        contact_id: &str,
        keep_id: Option<&str>,
    ) -> Result<usize, CrmError> {
        let mut closed = 0;
        for record in self.query_in_progress(contact_id).await? {
            if Some(record.id.as_str()) == keep_id {
                continue;
            }
            self.update_status(&record.id, ReferralState::Completed).await?;
            closed += 1;
        }
        if closed > 0 {
            tracing::info!(contact_id = %contact_id, closed, "Closed stray chat sessions");
        }
        Ok(closed)
    }
}

/// Salesforce implementation of chat-session store
#[derive(Clone)]
pub struct SalesforceChatSessionStore {
    client: SalesforceClient,
}

impl SalesforceChatSessionStore {
    pub fn new(client: SalesforceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatSessionStore for SalesforceChatSessionStore {
    async fn query_in_progress(
        &self,
        contact_id: &str,
    ) -> Result<Vec<ChatSessionRecord>, CrmError> {
        let query = SoqlQuery::new(
            "SELECT Id, Contact__c, History__c, Appointment_Status__c, Last_Updated__c \
             FROM Chat_Session__c WHERE Contact__c = :contact \
             AND Appointment_Status__c = :status ORDER BY Last_Updated__c DESC",
        )
        .bind_id("contact", contact_id)?
        .bind_text("status", ReferralState::InProgress.as_str());

        self.client.query(&query).await
    }

    async fn upsert(
        &self,
        contact_id: &str,
        snapshot: &ConversationSnapshot,
        status: ReferralState,
        existing_id: Option<&str>,
    ) -> Result<String, CrmError> {
        let contact_id = validate_id(contact_id)?;
        let body = ChatSessionWrite {
            contact_id: existing_id.is_none().then_some(contact_id),
            history: Some(snapshot.to_blob()),
            status: status.as_str(),
            last_updated: now_timestamp(),
        };

        let id = match existing_id {
            Some(id) => {
                self.client.update(CHAT_SESSION_SOBJECT, id, &body).await?;
                id.to_string()
            }
            None => self.client.create(CHAT_SESSION_SOBJECT, &body).await?,
        };

        tracing::debug!(
            chat_session_id = %id,
            status = status.as_str(),
            turns = snapshot.chat_history.len(),
            "Chat session persisted"
        );
        Ok(id)
    }

    async fn update_status(&self, id: &str, status: ReferralState) -> Result<(), CrmError> {
        let body = ChatSessionWrite {
            contact_id: None,
            history: None,
            status: status.as_str(),
            last_updated: now_timestamp(),
        };
        self.client.update(CHAT_SESSION_SOBJECT, id, &body).await?;

        tracing::info!(chat_session_id = %id, status = status.as_str(), "Chat session status updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankbot_core::{ChatMessage, GuidedFlow};

    #[test]
    fn test_record_snapshot() {
        let snapshot = ConversationSnapshot {
            chat_history: vec![ChatMessage::user("I need a loan")],
            guided_flow: GuidedFlow {
                reason: Some("Loan".to_string()),
                ..Default::default()
            },
        };
        let record = ChatSessionRecord {
            id: "a0C000000000001".to_string(),
            contact_id: Some("003XX0000000001".to_string()),
            history: Some(snapshot.to_blob()),
            status: Some("in_progress".to_string()),
            last_updated: None,
        };
        assert_eq!(record.state(), ReferralState::InProgress);
        assert_eq!(record.snapshot(), snapshot);
    }

    #[test]
    fn test_record_without_history() {
        let record: ChatSessionRecord = serde_json::from_str(
            r#"{"Id":"a0C000000000001","History__c":null,"Appointment_Status__c":"completed"}"#,
        )
        .unwrap();
        assert_eq!(record.state(), ReferralState::Completed);
        assert!(record.snapshot().chat_history.is_empty());
    }

    #[test]
    fn test_status_only_write() {
        let body = ChatSessionWrite {
            contact_id: None,
            history: None,
            status: ReferralState::Completed.as_str(),
            last_updated: "2025-03-06T15:00:00.000Z".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["Appointment_Status__c"], "completed");
        assert!(json.get("History__c").is_none());
        assert!(json.get("Contact__c").is_none());
    }
}
