//! Appointment records in the CRM

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::convert::Infallible;
use std::str::FromStr;

use bankbot_core::appointment::is_filled;
use bankbot_core::{datetime, AppointmentDetails};

use crate::soql::{validate_banker_id, validate_id, SoqlQuery};
use crate::{CrmError, SalesforceClient};

pub const APPOINTMENT_SOBJECT: &str = "Appointment__c";

/// Appointment status as stored in `Status__c`
///
/// Cancelling is a soft delete; records are never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[default]
    Confirmed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "Confirmed",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Lenient: anything other than a cancellation reads as confirmed
impl FromStr for AppointmentStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("cancelled") || s.eq_ignore_ascii_case("canceled") {
            Ok(Self::Cancelled)
        } else {
            Ok(Self::Confirmed)
        }
    }
}

fn status_or_default<'de, D>(deserializer: D) -> Result<AppointmentStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .and_then(|s| s.parse().ok())
        .unwrap_or_default())
}

/// Appointment as read back from the CRM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Reason_for_Visit__c", default)]
    pub reason: Option<String>,
    #[serde(rename = "Appointment_Date__c", default)]
    pub date: Option<String>,
    /// Combined ISO instant
    #[serde(rename = "Appointment_Time__c", default)]
    pub time: Option<String>,
    #[serde(rename = "Location__c", default)]
    pub location: Option<String>,
    #[serde(rename = "Banker__c", default, skip_serializing_if = "Option::is_none")]
    pub banker: Option<String>,
    #[serde(rename = "Status__c", default, deserialize_with = "status_or_default")]
    pub status: AppointmentStatus,
    #[serde(rename = "Contact__c", default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
}

impl AppointmentRecord {
    pub fn is_active(&self) -> bool {
        self.status == AppointmentStatus::Confirmed
    }

    /// One line per appointment, used as model context
    pub fn describe(&self) -> String {
        let when = self
            .time
            .as_deref()
            .map(datetime::format_for_display)
            .unwrap_or_else(|| self.date.clone().unwrap_or_default());
        format!(
            "- [{}] {} at {} on {} ({})",
            self.id,
            self.reason.as_deref().unwrap_or("Unspecified reason"),
            self.location.as_deref().unwrap_or("unspecified branch"),
            when,
            self.status.as_str()
        )
    }
}

/// Write payload for create and update
///
/// Only set fields are sent, so an update never blanks a column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppointmentData {
    #[serde(rename = "Reason_for_Visit__c", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "Appointment_Date__c", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "Appointment_Time__c", skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(rename = "Location__c", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "Banker__c", skip_serializing_if = "Option::is_none")]
    pub banker: Option<String>,
    #[serde(rename = "Status__c", skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(rename = "Contact__c", skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
}

fn trimmed(value: &Option<String>) -> Option<String> {
    is_filled(value).then(|| value.as_deref().unwrap_or_default().trim().to_string())
}

impl AppointmentData {
    /// Payload for a new confirmed booking
    pub fn booking(contact_id: &str, details: &AppointmentDetails, instant: String) -> Self {
        Self {
            contact_id: Some(contact_id.to_string()),
            status: Some(AppointmentStatus::Confirmed),
            ..Self::reschedule(details, instant)
        }
    }

    /// Payload moving an existing appointment
    pub fn reschedule(details: &AppointmentDetails, instant: String) -> Self {
        Self {
            reason: trimmed(&details.reason),
            date: trimmed(&details.date),
            time: Some(instant),
            location: trimmed(&details.location),
            banker: trimmed(&details.banker),
            ..Default::default()
        }
    }

    pub fn cancellation() -> Self {
        Self {
            status: Some(AppointmentStatus::Cancelled),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), CrmError> {
        if let Some(banker) = &self.banker {
            validate_banker_id(banker)?;
        }
        if let Some(contact) = &self.contact_id {
            validate_id(contact)?;
        }
        if let Some(time) = &self.time {
            if !datetime::is_iso_instant(time) {
                return Err(CrmError::Validation(format!(
                    "Appointment_Time__c must be an ISO instant: {}",
                    time
                )));
            }
        }
        Ok(())
    }
}

/// Appointment store trait
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Create a record and return its id
    async fn create(&self, data: &AppointmentData) -> Result<String, CrmError>;

    async fn update(&self, id: &str, data: &AppointmentData) -> Result<(), CrmError>;

    /// Soft delete: only `Status__c` changes
    async fn cancel(&self, id: &str) -> Result<(), CrmError> {
        self.update(id, &AppointmentData::cancellation()).await
    }

    /// All appointments for the contact, newest first, cancelled included
    async fn list_for_contact(&self, contact_id: &str) -> Result<Vec<AppointmentRecord>, CrmError>;
}

/// Salesforce implementation of appointment store
#[derive(Clone)]
pub struct SalesforceAppointmentStore {
    client: SalesforceClient,
}

impl SalesforceAppointmentStore {
    pub fn new(client: SalesforceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AppointmentStore for SalesforceAppointmentStore {
    async fn create(&self, data: &AppointmentData) -> Result<String, CrmError> {
        data.validate()?;
        let id = self.client.create(APPOINTMENT_SOBJECT, data).await?;

        tracing::info!(
            appointment_id = %id,
            location = ?data.location,
            time = ?data.time,
            "Appointment created in CRM"
        );
        Ok(id)
    }

    async fn update(&self, id: &str, data: &AppointmentData) -> Result<(), CrmError> {
        data.validate()?;
        self.client.update(APPOINTMENT_SOBJECT, id, data).await?;

        tracing::info!(
            appointment_id = %id,
            status = ?data.status,
            "Appointment updated in CRM"
        );
        Ok(())
    }

    async fn list_for_contact(&self, contact_id: &str) -> Result<Vec<AppointmentRecord>, CrmError> {
        let query = SoqlQuery::new(
            "SELECT Id, Reason_for_Visit__c, Appointment_Date__c, Appointment_Time__c, \
             Location__c, Banker__c, Status__c, Contact__c FROM Appointment__c \
             WHERE Contact__c = :contact ORDER BY Appointment_Time__c DESC LIMIT 50",
        )
        .bind_id("contact", contact_id)?;

        self.client.query(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> AppointmentDetails {
        AppointmentDetails {
            reason: Some(" Mortgage consultation ".to_string()),
            date: Some("2025-03-06".to_string()),
            time: Some("3:00 PM".to_string()),
            location: Some("Downtown".to_string()),
            banker: Some("".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_status_conversion() {
        assert_eq!("Cancelled".parse(), Ok(AppointmentStatus::Cancelled));
        assert_eq!("canceled".parse(), Ok(AppointmentStatus::Cancelled));
        assert_eq!("anything".parse(), Ok(AppointmentStatus::Confirmed));
        assert_eq!(AppointmentStatus::Cancelled.as_str(), "Cancelled");
    }

    #[test]
    fn test_booking_payload() {
        let data = AppointmentData::booking(
            "003XX0000000001",
            &details(),
            "2025-03-06T15:00:00.000Z".to_string(),
        );
        assert!(data.validate().is_ok());

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["Reason_for_Visit__c"], "Mortgage consultation");
        assert_eq!(json["Appointment_Time__c"], "2025-03-06T15:00:00.000Z");
        assert_eq!(json["Status__c"], "Confirmed");
        assert_eq!(json["Contact__c"], "003XX0000000001");
        assert!(json.get("Banker__c").is_none());
    }

    #[test]
    fn test_cancellation_only_touches_status() {
        let json = serde_json::to_value(AppointmentData::cancellation()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(obj["Status__c"], "Cancelled");
    }

    #[test]
    fn test_validate_rejects_bad_banker() {
        let mut data =
            AppointmentData::reschedule(&details(), "2025-03-06T15:00:00.000Z".to_string());
        data.banker = Some("003XX0000000001".to_string());
        assert!(matches!(data.validate(), Err(CrmError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_raw_time() {
        let data = AppointmentData::reschedule(&details(), "3:00 PM".to_string());
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_record_deserialize() {
        let raw = r#"{"attributes":{"type":"Appointment__c"},"Id":"a0A000000000001AAA",
            "Reason_for_Visit__c":"Loan","Appointment_Date__c":"2025-03-06",
            "Appointment_Time__c":"2025-03-06T15:00:00.000Z","Location__c":"Downtown",
            "Banker__c":null,"Status__c":"Cancelled","Contact__c":"003XX0000000001"}"#;
        let record: AppointmentRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.status, AppointmentStatus::Cancelled);
        assert!(!record.is_active());
        assert!(record.describe().contains("March 6th, 2025"));
    }
}
