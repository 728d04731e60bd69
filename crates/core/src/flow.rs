//! Guided appointment flow
//!
//! The server keeps one draft per session and derives the current stage
//! from which slots are filled:
//!
//! ```text
//! Reason -> Time (date + time) -> Location -> Confirmation -> Completed
//!                                                          \-> Cancelled
//! ```
//!
//! Slots arrive from model extraction and are merged into the draft every
//! turn. A committed booking, reschedule or cancellation resets the draft.
//!
//! The draft also remembers which action it is heading for. A confirming
//! "yes" rarely carries an action of its own, so an existing appointment
//! id in the draft always resolves to a reschedule or cancel.

use serde::{Deserialize, Serialize};

use crate::appointment::{is_filled, AppointmentAction, AppointmentDetails, RequiredField};

/// Stage of the guided flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    Reason,
    Time,
    Location,
    Confirmation,
    Completed,
    Cancelled,
}

impl FlowStage {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Reason => "Reason for visit",
            Self::Time => "Date and time",
            Self::Location => "Branch location",
            Self::Confirmation => "Confirmation",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Per-session appointment draft
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidedFlow {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Set only while rescheduling or cancelling an existing appointment
    #[serde(default)]
    pub appointment_id: Option<String>,
    /// Action requested on an earlier turn and not yet committed
    #[serde(default)]
    pub action: Option<AppointmentAction>,
}

fn overwrite(slot: &mut Option<String>, value: &Option<String>) {
    if is_filled(value) {
        *slot = value.as_ref().map(|v| v.trim().to_string());
    }
}

fn filled(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn backfill(slot: &mut Option<String>, draft: &Option<String>) {
    if !is_filled(slot) && is_filled(draft) {
        *slot = draft.clone();
    }
}

impl GuidedFlow {
    /// Current stage derived from the filled slots
    pub fn stage(&self) -> FlowStage {
        if !is_filled(&self.reason) {
            FlowStage::Reason
        } else if !is_filled(&self.date) || !is_filled(&self.time) {
            FlowStage::Time
        } else if !is_filled(&self.location) {
            FlowStage::Location
        } else {
            FlowStage::Confirmation
        }
    }

    /// Merge one model reply and resolve the action it applies to
    ///
    /// Only a reschedule or cancel may point the draft at an existing
    /// appointment. A reply without an action keeps the pending one.
    pub fn merge_reply(
        &mut self,
        requested: Option<AppointmentAction>,
        details: &AppointmentDetails,
    ) -> AppointmentAction {
        match requested {
            Some(AppointmentAction::Reschedule) => {
                if let Some(id) = filled(&details.id) {
                    self.begin_reschedule(id);
                } else {
                    self.action = Some(AppointmentAction::Reschedule);
                }
            }
            Some(AppointmentAction::Cancel) => {
                if let Some(id) = filled(&details.id) {
                    self.appointment_id = Some(id);
                }
                self.action = Some(AppointmentAction::Cancel);
            }
            Some(AppointmentAction::Book) if self.appointment_id.is_none() => {
                self.action = Some(AppointmentAction::Book);
            }
            Some(AppointmentAction::Book) | None => {}
        }
        self.merge_details(details);
        self.pending_action()
    }

    /// Copy every non-blank extracted slot into the draft
    ///
    /// The appointment id is not a slot; see [`Self::merge_reply`].
    pub fn merge_details(&mut self, details: &AppointmentDetails) {
        overwrite(&mut self.reason, &details.reason);
        overwrite(&mut self.date, &details.date);
        overwrite(&mut self.time, &details.time);
        overwrite(&mut self.location, &details.location);
    }

    /// Action the draft will commit as
    pub fn pending_action(&self) -> AppointmentAction {
        match self.action {
            Some(AppointmentAction::Cancel) => AppointmentAction::Cancel,
            _ if is_filled(&self.appointment_id) => AppointmentAction::Reschedule,
            Some(action) => action,
            None => AppointmentAction::Book,
        }
    }

    /// Fill blank fields of `details` from the draft
    pub fn fill_details(&self, details: &mut AppointmentDetails) {
        backfill(&mut details.reason, &self.reason);
        backfill(&mut details.date, &self.date);
        backfill(&mut details.time, &self.time);
        backfill(&mut details.location, &self.location);
        backfill(&mut details.id, &self.appointment_id);
    }

    /// Start editing an existing appointment
    pub fn begin_reschedule(&mut self, appointment_id: impl Into<String>) {
        self.appointment_id = Some(appointment_id.into());
        self.action = Some(AppointmentAction::Reschedule);
    }

    /// Clear every slot, including the appointment id
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Terminal stage for a committed action; the draft is cleared
    pub fn complete(&mut self, action: AppointmentAction) -> FlowStage {
        self.reset();
        match action {
            AppointmentAction::Cancel => FlowStage::Cancelled,
            AppointmentAction::Book | AppointmentAction::Reschedule => FlowStage::Completed,
        }
    }

    pub fn is_empty(&self) -> bool {
        !is_filled(&self.reason)
            && !is_filled(&self.date)
            && !is_filled(&self.time)
            && !is_filled(&self.location)
            && !is_filled(&self.appointment_id)
            && self.action.is_none()
    }

    pub fn missing_fields(&self) -> Vec<RequiredField> {
        self.to_details().missing_required()
    }

    pub fn to_details(&self) -> AppointmentDetails {
        AppointmentDetails {
            id: self.appointment_id.clone(),
            reason: self.reason.clone(),
            date: self.date.clone(),
            time: self.time.clone(),
            location: self.location.clone(),
            banker: None,
        }
    }

    /// One-line description of the filled slots, for prompt context
    pub fn summary(&self) -> Option<String> {
        let parts: Vec<String> = [
            ("reason", &self.reason),
            ("date", &self.date),
            ("time", &self.time),
            ("location", &self.location),
        ]
        .into_iter()
        .filter(|(_, v)| is_filled(v))
        .map(|(name, v)| format!("{}: {}", name, v.as_deref().unwrap_or_default()))
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Whether the session's chat-session snapshot is still open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralState {
    #[default]
    InProgress,
    Completed,
}

impl ReferralState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "completed" => Self::Completed,
            _ => Self::InProgress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(reason: &str, date: &str, time: &str, location: &str) -> AppointmentDetails {
        AppointmentDetails {
            reason: Some(reason.into()),
            date: Some(date.into()),
            time: Some(time.into()),
            location: Some(location.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_stage_progression() {
        let mut flow = GuidedFlow::default();
        assert_eq!(flow.stage(), FlowStage::Reason);

        flow.merge_details(&details("Open account", "", "", ""));
        assert_eq!(flow.stage(), FlowStage::Time);

        flow.merge_details(&details("", "2025-03-06", "", ""));
        assert_eq!(flow.stage(), FlowStage::Time);

        flow.merge_details(&details("", "", "3:00 PM", ""));
        assert_eq!(flow.stage(), FlowStage::Location);

        flow.merge_details(&details("", "", "", "Downtown"));
        assert_eq!(flow.stage(), FlowStage::Confirmation);
        assert!(flow.missing_fields().is_empty());
    }

    #[test]
    fn test_blank_extraction_does_not_erase_draft() {
        let mut flow = GuidedFlow::default();
        flow.merge_details(&details("Loan", "2025-03-06", "10:00 AM", "Uptown"));
        flow.merge_details(&details(" ", "", "", ""));
        assert_eq!(flow.location.as_deref(), Some("Uptown"));
        assert_eq!(flow.reason.as_deref(), Some("Loan"));
    }

    #[test]
    fn test_fill_details_from_draft() {
        let mut flow = GuidedFlow::default();
        flow.merge_details(&details("Loan", "2025-03-06", "10:00 AM", "Uptown"));

        let mut extracted = AppointmentDetails {
            time: Some("11:00 AM".into()),
            location: Some(String::new()),
            ..Default::default()
        };
        flow.fill_details(&mut extracted);
        assert_eq!(extracted.reason.as_deref(), Some("Loan"));
        assert_eq!(extracted.time.as_deref(), Some("11:00 AM"));
        assert_eq!(extracted.location.as_deref(), Some("Uptown"));
    }

    #[test]
    fn test_cancel_resets_everything() {
        let mut flow = GuidedFlow::default();
        flow.begin_reschedule("a01XX0000001");
        flow.merge_details(&details("Loan", "2025-03-06", "10:00 AM", "Uptown"));

        assert_eq!(flow.complete(AppointmentAction::Cancel), FlowStage::Cancelled);
        assert!(flow.is_empty());
        assert_eq!(flow.appointment_id, None);
        assert_eq!(flow.stage(), FlowStage::Reason);
    }

    #[test]
    fn test_pending_reschedule_survives_bare_confirmation() {
        let mut flow = GuidedFlow::default();
        let reply = AppointmentDetails {
            id: Some("a0A000000000001".into()),
            ..details("Loan", "2025-03-07", "4:00 PM", "Uptown")
        };
        assert_eq!(
            flow.merge_reply(Some(AppointmentAction::Reschedule), &reply),
            AppointmentAction::Reschedule
        );

        // "yes" with no action, and with the default action the model fills in
        assert_eq!(
            flow.merge_reply(None, &AppointmentDetails::default()),
            AppointmentAction::Reschedule
        );
        assert_eq!(
            flow.merge_reply(Some(AppointmentAction::Book), &AppointmentDetails::default()),
            AppointmentAction::Reschedule
        );
        assert_eq!(flow.appointment_id.as_deref(), Some("a0A000000000001"));
    }

    #[test]
    fn test_pending_cancel_wins_over_full_draft() {
        let mut flow = GuidedFlow::default();
        flow.merge_details(&details("Loan", "2025-03-06", "10:00 AM", "Uptown"));
        let reply = AppointmentDetails {
            id: Some("a0A000000000002".into()),
            ..Default::default()
        };
        flow.merge_reply(Some(AppointmentAction::Cancel), &reply);

        assert_eq!(
            flow.merge_reply(None, &AppointmentDetails::default()),
            AppointmentAction::Cancel
        );
    }

    #[test]
    fn test_booking_ignores_model_id() {
        let mut flow = GuidedFlow::default();
        let reply = AppointmentDetails {
            id: Some("a0A000000000003".into()),
            ..details("Loan", "2025-03-06", "10:00 AM", "Uptown")
        };
        assert_eq!(
            flow.merge_reply(Some(AppointmentAction::Book), &reply),
            AppointmentAction::Book
        );
        assert_eq!(flow.appointment_id, None);
        assert_eq!(
            flow.merge_reply(None, &AppointmentDetails::default()),
            AppointmentAction::Book
        );
    }

    #[test]
    fn test_summary() {
        let mut flow = GuidedFlow::default();
        assert_eq!(flow.summary(), None);
        flow.reason = Some("Mortgage".into());
        flow.location = Some("Main St".into());
        assert_eq!(
            flow.summary().as_deref(),
            Some("reason: Mortgage, location: Main St")
        );
    }

    #[test]
    fn test_serializes_camel_case() {
        let flow = GuidedFlow {
            appointment_id: Some("a01".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&flow).unwrap();
        assert_eq!(json["appointmentId"], "a01");
        assert!(json["reason"].is_null());

        let mut flow = GuidedFlow::default();
        flow.begin_reschedule("a01");
        let json = serde_json::to_value(&flow).unwrap();
        assert_eq!(json["action"], "reschedule");
        let restored: GuidedFlow = serde_json::from_value(json).unwrap();
        assert_eq!(restored.pending_action(), AppointmentAction::Reschedule);
    }
}
