//! One chat turn

use bankbot_core::appointment::{crm_names, is_filled};
use bankbot_core::{
    datetime, follow_up_prompt, is_generic_response, AppointmentAction, AppointmentDetails,
    AssistantEnvelope, ChatMessage, CustomerType, Error, FlowStage, ReferralState, RequiredField,
    Result, SessionState,
};
use bankbot_crm::{AppointmentData, AppointmentRecord};
use bankbot_llm::{ChatEnvelope, ChatRequest};

use super::ChatOrchestrator;
use crate::types::{ChatInput, ChatOutcome};

/// Appended when every field is present but the user has not confirmed
pub const CONFIRM_SUFFIX: &str = "Please confirm if you would like me to go ahead with this appointment.";

const CANCEL_FOLLOW_UP: &str = "Which appointment would you like to cancel?";

const RESCHEDULE_FOLLOW_UP: &str = "Which appointment would you like to reschedule?";

/// How a turn ended, used as the metrics label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnOutcome {
    BranchLookup,
    FollowUp,
    AwaitingConfirmation,
    Committed,
    Failed,
}

impl TurnOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::BranchLookup => "branch_lookup",
            Self::FollowUp => "follow_up",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }
}

fn count_turn(outcome: TurnOutcome) {
    metrics::counter!("bankbot_chat_turns_total", "outcome" => outcome.as_str()).increment(1);
}

fn count_write(action: AppointmentAction) {
    metrics::counter!("bankbot_crm_writes_total", "kind" => action.as_str()).increment(1);
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn validate_input(input: &ChatInput) -> Result<(&str, CustomerType)> {
    match (required(&input.query), required(&input.customer_type)) {
        (Some(query), Some(customer_type)) => Ok((query, CustomerType::parse(customer_type))),
        _ => Err(Error::MissingParameters(
            "query and customerType are required".to_string(),
        )),
    }
}

/// Result of the decision steps, before it is recorded in history
struct Reply {
    response: String,
    details: AppointmentDetails,
    missing: Vec<RequiredField>,
    outcome: TurnOutcome,
    stage: FlowStage,
}

impl ChatOrchestrator {
    /// Handle one user message
    pub async fn chat(&self, state: &mut SessionState, input: &ChatInput) -> Result<ChatOutcome> {
        let (query, customer_type) = validate_input(input)?;

        self.ensure_history(state, customer_type).await;

        if self.catalog.branches.matches_lookup(query) {
            return Ok(self.branch_lookup(state, query).await);
        }

        let (previous, context) = if customer_type.is_regular() {
            let (records, context) = self.customer_context().await;
            (Some(records), context)
        } else {
            (None, None)
        };

        let history = state.chat_history.clone();
        state.chat_history.push(ChatMessage::user(query));

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let envelope = match self
            .llm
            .chat(ChatRequest {
                query,
                customer_type,
                context: context.as_deref(),
                history: &history,
                today: &today,
            })
            .await
        {
            Ok(envelope) => envelope,
            Err(e) => {
                count_turn(TurnOutcome::Failed);
                self.persist(state).await;
                return Err(e.into());
            }
        };

        let action = state
            .guided_flow
            .merge_reply(envelope.action, &envelope.appointment_details);
        let mut details = envelope.appointment_details.clone();
        if action == AppointmentAction::Book {
            details.id = None;
        }
        state.guided_flow.fill_details(&mut details);

        tracing::debug!(
            action = action.as_str(),
            stage = state.guided_flow.stage().display_name(),
            "Model reply merged into draft"
        );

        let reply = match action {
            AppointmentAction::Cancel => {
                self.cancel_turn(state, query, &history, &envelope, details)
                    .await
            }
            AppointmentAction::Book | AppointmentAction::Reschedule => {
                self.booking_turn(state, query, &history, &envelope, action, details)
                    .await
            }
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                count_turn(TurnOutcome::Failed);
                self.persist(state).await;
                return Err(e);
            }
        };

        let missing_fields = crm_names(&reply.missing);
        state
            .chat_history
            .push(ChatMessage::assistant_envelope(&AssistantEnvelope {
                response: reply.response.clone(),
                appointment_details: reply.details.clone(),
                missing_fields: missing_fields.clone(),
            }));
        self.persist(state).await;
        count_turn(reply.outcome);

        Ok(ChatOutcome {
            response: reply.response,
            appointment_details: reply.details,
            missing_fields,
            action: Some(action),
            previous_appointments: previous,
            stage: reply.stage,
            committed: reply.outcome == TurnOutcome::Committed,
        })
    }

    /// Fixed branch answer; no model call but the turn is still recorded
    async fn branch_lookup(&self, state: &mut SessionState, query: &str) -> ChatOutcome {
        let details = state.guided_flow.to_details();
        let missing_fields = crm_names(&details.missing_required());
        let response = self.catalog.branches.response.clone();

        state.chat_history.push(ChatMessage::user(query));
        state
            .chat_history
            .push(ChatMessage::assistant_envelope(&AssistantEnvelope {
                response: response.clone(),
                appointment_details: details.clone(),
                missing_fields: missing_fields.clone(),
            }));
        self.persist(state).await;
        count_turn(TurnOutcome::BranchLookup);

        ChatOutcome {
            response,
            appointment_details: details,
            missing_fields,
            action: None,
            previous_appointments: None,
            stage: state.guided_flow.stage(),
            committed: false,
        }
    }

    /// Prior appointments and banker notes for a returning customer
    async fn customer_context(&self) -> (Vec<AppointmentRecord>, Option<String>) {
        let contact = self.tenant.contact_id();
        let mut sections = Vec::new();

        let records = match self.crm.appointments.list_for_contact(contact).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load prior appointments");
                Vec::new()
            }
        };
        if !records.is_empty() {
            let lines: Vec<String> = records.iter().map(AppointmentRecord::describe).collect();
            sections.push(format!(
                "Existing appointments (use the id in brackets as \"Id\" when rescheduling or cancelling):\n{}",
                lines.join("\n")
            ));
        }

        match self.crm.visits.banker_notes(contact).await {
            Ok(notes) => {
                let lines: Vec<String> = notes.iter().filter_map(|n| n.describe()).collect();
                if !lines.is_empty() {
                    sections.push(format!("Banker notes:\n{}", lines.join("\n")));
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not load banker notes"),
        }

        let context = (!sections.is_empty()).then(|| sections.join("\n\n"));
        (records, context)
    }

    async fn booking_turn(
        &self,
        state: &mut SessionState,
        query: &str,
        history: &[ChatMessage],
        envelope: &ChatEnvelope,
        action: AppointmentAction,
        mut details: AppointmentDetails,
    ) -> Result<Reply> {
        if action == AppointmentAction::Reschedule && required(&details.id).is_none() {
            let response = if is_generic_response(&envelope.response) {
                RESCHEDULE_FOLLOW_UP.to_string()
            } else {
                envelope.response.trim().to_string()
            };
            return Ok(Reply {
                response,
                details,
                missing: Vec::new(),
                outcome: TurnOutcome::FollowUp,
                stage: state.guided_flow.stage(),
            });
        }

        let missing = details.missing_required();
        if !missing.is_empty() {
            let response = if is_generic_response(&envelope.response) {
                follow_up_prompt(&missing)
            } else {
                envelope.response.trim().to_string()
            };
            return Ok(Reply {
                response,
                details,
                missing,
                outcome: TurnOutcome::FollowUp,
                stage: state.guided_flow.stage(),
            });
        }

        if !self.llm.verify_confirmation(query, history).await {
            return Ok(Reply {
                response: with_confirm_suffix(envelope, &details),
                details,
                missing,
                outcome: TurnOutcome::AwaitingConfirmation,
                stage: state.guided_flow.stage(),
            });
        }

        let date = details.date.clone().unwrap_or_default();
        let time = details.time.clone().unwrap_or_default();
        let instant = datetime::combine(date.trim(), time.trim())
            .ok_or(Error::InvalidDateTime { date, time })?;

        let contact = self.tenant.contact_id();
        match action {
            AppointmentAction::Reschedule => {
                let id = required(&details.id)
                    .ok_or_else(|| {
                        Error::Validation("An appointment id is required to reschedule".to_string())
                    })?
                    .to_string();
                self.crm
                    .appointments
                    .update(&id, &AppointmentData::reschedule(&details, instant.clone()))
                    .await?;
                details.id = Some(id);
            }
            _ => {
                let id = self
                    .crm
                    .appointments
                    .create(&AppointmentData::booking(contact, &details, instant.clone()))
                    .await?;
                details.id = Some(id);
            }
        }
        count_write(action);

        tracing::info!(
            appointment_id = ?details.id,
            action = action.as_str(),
            time = %instant,
            "Appointment committed"
        );

        let response = if is_generic_response(&envelope.response) {
            committed_message(action, &details, &instant)
        } else {
            envelope.response.trim().to_string()
        };
        let stage = self.finish(state, action);

        Ok(Reply {
            response,
            details,
            missing: Vec::new(),
            outcome: TurnOutcome::Committed,
            stage,
        })
    }

    /// Cancel needs only an appointment id
    async fn cancel_turn(
        &self,
        state: &mut SessionState,
        query: &str,
        history: &[ChatMessage],
        envelope: &ChatEnvelope,
        details: AppointmentDetails,
    ) -> Result<Reply> {
        let Some(id) = required(&details.id).map(str::to_string) else {
            let response = if is_generic_response(&envelope.response) {
                CANCEL_FOLLOW_UP.to_string()
            } else {
                envelope.response.trim().to_string()
            };
            return Ok(Reply {
                response,
                details,
                missing: Vec::new(),
                outcome: TurnOutcome::FollowUp,
                stage: state.guided_flow.stage(),
            });
        };

        if !self.llm.verify_confirmation(query, history).await {
            return Ok(Reply {
                response: with_confirm_suffix(envelope, &details),
                details,
                missing: Vec::new(),
                outcome: TurnOutcome::AwaitingConfirmation,
                stage: state.guided_flow.stage(),
            });
        }

        self.crm.appointments.cancel(&id).await?;
        count_write(AppointmentAction::Cancel);
        tracing::info!(appointment_id = %id, "Appointment cancelled");

        let response = if is_generic_response(&envelope.response) {
            committed_message(AppointmentAction::Cancel, &details, "")
        } else {
            envelope.response.trim().to_string()
        };
        let stage = self.finish(state, AppointmentAction::Cancel);

        Ok(Reply {
            response,
            details,
            missing: Vec::new(),
            outcome: TurnOutcome::Committed,
            stage,
        })
    }

    /// Close the draft and mark the snapshot completed
    fn finish(&self, state: &mut SessionState, action: AppointmentAction) -> FlowStage {
        let stage = state.guided_flow.complete(action);
        state.referral_state = ReferralState::Completed;
        tracing::debug!(stage = stage.display_name(), "Guided flow finished");
        stage
    }
}

fn with_confirm_suffix(envelope: &ChatEnvelope, details: &AppointmentDetails) -> String {
    let base = if is_generic_response(&envelope.response) {
        summarize(details)
    } else {
        envelope.response.trim().to_string()
    };
    format!("{} {}", base, CONFIRM_SUFFIX)
}

fn summarize(details: &AppointmentDetails) -> String {
    let mut parts = Vec::new();
    if is_filled(&details.reason) {
        parts.push(format!("for {}", details.reason.as_deref().unwrap_or_default().trim()));
    }
    if is_filled(&details.location) {
        parts.push(format!("at {}", details.location.as_deref().unwrap_or_default().trim()));
    }
    if is_filled(&details.date) {
        parts.push(format!("on {}", details.date.as_deref().unwrap_or_default().trim()));
    }
    if is_filled(&details.time) {
        parts.push(format!("at {}", details.time.as_deref().unwrap_or_default().trim()));
    }
    if parts.is_empty() {
        "I have your appointment details.".to_string()
    } else {
        format!("I have an appointment {}.", parts.join(" "))
    }
}

fn committed_message(
    action: AppointmentAction,
    details: &AppointmentDetails,
    instant: &str,
) -> String {
    let location = details.location.as_deref().unwrap_or("the branch").trim();
    match action {
        AppointmentAction::Book => format!(
            "Your appointment at {} is booked for {}.",
            location,
            datetime::format_for_display(instant)
        ),
        AppointmentAction::Reschedule => format!(
            "Your appointment has been moved to {} at {}.",
            datetime::format_for_display(instant),
            location
        ),
        AppointmentAction::Cancel => "Your appointment has been cancelled.".to_string(),
    }
}
