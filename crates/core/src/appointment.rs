//! Appointment draft, required-field validation and follow-up questions

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Appointment fields as extracted by the model, named like the CRM record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentDetails {
    #[serde(
        rename = "Id",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(rename = "Reason_for_Visit__c", default, deserialize_with = "lenient_string")]
    pub reason: Option<String>,
    #[serde(rename = "Appointment_Date__c", default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(rename = "Appointment_Time__c", default, deserialize_with = "lenient_string")]
    pub time: Option<String>,
    #[serde(rename = "Location__c", default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(
        rename = "Banker__c",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub banker: Option<String>,
}

/// Accept strings, numbers and booleans; everything else becomes `None`
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Present and non-blank after trimming
pub fn is_filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl AppointmentDetails {
    pub fn field(&self, field: RequiredField) -> &Option<String> {
        match field {
            RequiredField::Reason => &self.reason,
            RequiredField::Date => &self.date,
            RequiredField::Time => &self.time,
            RequiredField::Location => &self.location,
        }
    }

    /// Required fields that are absent or blank, in fixed order
    ///
    /// This is the authoritative check; the model's own `missingFields`
    /// claim is never trusted.
    pub fn missing_required(&self) -> Vec<RequiredField> {
        RequiredField::ALL
            .into_iter()
            .filter(|f| !is_filled(self.field(*f)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        !is_filled(&self.reason)
            && !is_filled(&self.date)
            && !is_filled(&self.time)
            && !is_filled(&self.location)
            && !is_filled(&self.id)
    }
}

/// Fields that must be filled before a booking or reschedule is committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredField {
    Reason,
    Date,
    Time,
    Location,
}

impl RequiredField {
    /// Validation order
    pub const ALL: [RequiredField; 4] = [Self::Reason, Self::Date, Self::Time, Self::Location];

    /// CRM field name, which is also what clients receive in `missingFields`
    pub fn crm_name(&self) -> &'static str {
        match self {
            Self::Reason => "Reason_for_Visit__c",
            Self::Date => "Appointment_Date__c",
            Self::Time => "Appointment_Time__c",
            Self::Location => "Location__c",
        }
    }

    /// Canned follow-up question for this field
    pub fn question(&self) -> &'static str {
        match self {
            Self::Reason => "What is the reason for your visit?",
            Self::Date => "What date would you like to come in?",
            Self::Time => "What time works best for you?",
            Self::Location => "Which branch location would you prefer?",
        }
    }

    pub fn from_crm_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.crm_name() == name)
    }
}

pub fn crm_names(fields: &[RequiredField]) -> Vec<String> {
    fields.iter().map(|f| f.crm_name().to_string()).collect()
}

/// Concatenated canned questions for the missing fields
pub fn follow_up_prompt(missing: &[RequiredField]) -> String {
    missing
        .iter()
        .map(|f| f.question())
        .collect::<Vec<_>>()
        .join(" ")
}

const GENERIC_PHRASES: [&str; 4] = [
    "how can i assist you today",
    "i didn't understand",
    "could you please provide more details",
    "i'm sorry, something went wrong",
];

/// Whether a model response is too generic to serve as a follow-up question
pub fn is_generic_response(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    lowered.is_empty() || GENERIC_PHRASES.iter().any(|p| lowered.contains(p))
}

/// What the model says the user wants done with the draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum AppointmentAction {
    /// Create a new appointment
    #[default]
    Book,
    /// Update an existing appointment in place
    Reschedule,
    /// Mark an existing appointment cancelled
    Cancel,
}

impl From<String> for AppointmentAction {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl AppointmentAction {
    /// Lenient parse; anything unrecognised is a booking
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "reschedule" | "update" | "modify" | "change" => Self::Reschedule,
            "cancel" | "cancellation" | "delete" => Self::Cancel,
            _ => Self::Book,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Reschedule => "reschedule",
            Self::Cancel => "cancel",
        }
    }
}

/// Existing customers get their prior appointments as prompt context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum CustomerType {
    Regular,
    New,
}

impl From<String> for CustomerType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl CustomerType {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "regular" | "existing" | "returning" => Self::Regular,
            _ => Self::New,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::New => "new",
        }
    }

    pub fn is_regular(&self) -> bool {
        matches!(self, Self::Regular)
    }
}
