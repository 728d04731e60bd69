//! Read-only visit history and banker notes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::soql::SoqlQuery;
use crate::{CrmError, SalesforceClient};

/// Default number of visits returned when the caller gives no limit
pub const DEFAULT_VISIT_LIMIT: usize = 10;
const MAX_VISIT_LIMIT: usize = 200;

/// Past branch visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Contact__c", default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(rename = "Visit_Date__c", default)]
    pub visit_date: Option<String>,
    #[serde(rename = "Purpose__c", default)]
    pub purpose: Option<String>,
    #[serde(rename = "Outcome__c", default)]
    pub outcome: Option<String>,
}

/// Note left by a banker about the customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankerNote {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Contact__c", default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(rename = "Banker__c", default)]
    pub banker: Option<String>,
    #[serde(rename = "Note__c", default)]
    pub note: Option<String>,
    #[serde(rename = "Created_Date__c", default)]
    pub created_date: Option<String>,
}

impl VisitRecord {
    pub fn describe(&self) -> String {
        format!(
            "- {}: {} ({})",
            self.visit_date.as_deref().unwrap_or("unknown date"),
            self.purpose.as_deref().unwrap_or("visit"),
            self.outcome.as_deref().unwrap_or("no outcome recorded")
        )
    }
}

impl BankerNote {
    pub fn describe(&self) -> Option<String> {
        let note = self.note.as_deref()?.trim();
        (!note.is_empty()).then(|| format!("- {}", note))
    }
}

/// Visit store trait
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// Most recent visits first
    async fn visit_history(&self, contact_id: &str, limit: usize)
        -> Result<Vec<VisitRecord>, CrmError>;

    /// Most recent notes first
    async fn banker_notes(&self, contact_id: &str) -> Result<Vec<BankerNote>, CrmError>;
}

pub(crate) fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_VISIT_LIMIT)
}

/// Salesforce implementation of visit store
#[derive(Clone)]
pub struct SalesforceVisitStore {
    client: SalesforceClient,
}

impl SalesforceVisitStore {
    pub fn new(client: SalesforceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VisitStore for SalesforceVisitStore {
    async fn visit_history(
        &self,
        contact_id: &str,
        limit: usize,
    ) -> Result<Vec<VisitRecord>, CrmError> {
        let query = SoqlQuery::new(
            "SELECT Id, Contact__c, Visit_Date__c, Purpose__c, Outcome__c FROM Visit__c \
             WHERE Contact__c = :contact ORDER BY Visit_Date__c DESC LIMIT :limit",
        )
        .bind_id("contact", contact_id)?
        .bind_int("limit", clamp_limit(limit) as i64);

        self.client.query(&query).await
    }

    async fn banker_notes(&self, contact_id: &str) -> Result<Vec<BankerNote>, CrmError> {
        let query = SoqlQuery::new(
            "SELECT Id, Contact__c, Banker__c, Note__c, Created_Date__c FROM Banker_Note__c \
             WHERE Contact__c = :contact ORDER BY Created_Date__c DESC LIMIT 20",
        )
        .bind_id("contact", contact_id)?;

        self.client.query(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(10), 10);
        assert_eq!(clamp_limit(10_000), 200);
    }

    #[test]
    fn test_blank_note_not_described() {
        let note = BankerNote {
            id: "a0N000000000001".to_string(),
            contact_id: None,
            banker: Some("005XX0000000001".to_string()),
            note: Some("   ".to_string()),
            created_date: None,
        };
        assert!(note.describe().is_none());
    }

    #[test]
    fn test_visit_deserialize() {
        let visit: VisitRecord = serde_json::from_str(
            r#"{"Id":"a0V000000000001","Visit_Date__c":"2024-11-02","Purpose__c":"Mortgage review","Outcome__c":null}"#,
        )
        .unwrap();
        assert_eq!(
            visit.describe(),
            "- 2024-11-02: Mortgage review (no outcome recorded)"
        );
    }
}
