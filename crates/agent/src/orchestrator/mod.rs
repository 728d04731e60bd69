//! Chat orchestrator
//!
//! Drives one session through the guided appointment flow:
//! - `turn` - the chat turn (validation, model call, merge, commit)
//! - `records` - direct appointment, note and visit operations
//!
//! The orchestrator never holds session state itself. Callers pass the
//! session's `SessionState` in, already locked, so two requests from the
//! same session cannot interleave.

mod records;
mod turn;

use std::sync::Arc;

use bankbot_config::{DomainCatalog, TenantContext};
use bankbot_core::{
    ChatMessage, CustomerType, GuidedFlow, ReferralState, SessionState, SessionUser,
};
use bankbot_crm::CrmLayer;
use bankbot_llm::{GreetingRequest, LlmGateway, SuggestionRequest};

use crate::suggestions;
use crate::types::{ChatStateView, ConfirmationInput, GreetingInput, LoginOutcome};

/// Orchestrates the model, the CRM and the per-session draft
pub struct ChatOrchestrator {
    llm: Arc<LlmGateway>,
    crm: CrmLayer,
    catalog: Arc<DomainCatalog>,
    tenant: TenantContext,
}

impl ChatOrchestrator {
    pub fn new(
        llm: Arc<LlmGateway>,
        crm: CrmLayer,
        catalog: Arc<DomainCatalog>,
        tenant: TenantContext,
    ) -> Self {
        Self {
            llm,
            crm,
            catalog,
            tenant,
        }
    }

    pub fn catalog(&self) -> &DomainCatalog {
        &self.catalog
    }

    pub fn tenant(&self) -> &TenantContext {
        &self.tenant
    }

    /// Establish a logged-in session and reconcile CRM snapshots
    ///
    /// The most recent in-progress snapshot is reused and every other one is
    /// closed. Without one the session starts fresh and a new snapshot is
    /// created.
    pub async fn login(&self, state: &mut SessionState, username: &str) -> LoginOutcome {
        state.user = Some(SessionUser {
            username: username.to_string(),
        });

        let contact = self.tenant.contact_id();
        let latest = match self.crm.chat_sessions.query_in_progress(contact).await {
            Ok(records) => records.into_iter().next(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not load chat sessions at login");
                None
            }
        };

        if let Err(e) = self
            .crm
            .chat_sessions
            .complete_stray(contact, latest.as_ref().map(|r| r.id.as_str()))
            .await
        {
            tracing::warn!(error = %e, "Could not close stray chat sessions");
        }

        match latest {
            Some(record) => {
                tracing::info!(chat_session_id = %record.id, "Resuming chat session");
                let snapshot = record.snapshot();
                state.restore(record.id, snapshot);
            }
            None => {
                state.chat_history.clear();
                state.guided_flow.reset();
                state.sf_chat_id = None;
                state.referral_state = ReferralState::InProgress;
            }
        }

        let greeting = self.greet(state, CustomerType::Regular).await;
        state.chat_history.push(ChatMessage::assistant(greeting.clone()));
        self.persist(state).await;

        LoginOutcome {
            username: username.to_string(),
            greeting,
            chat_history: state.visible_history(),
            guided_flow: state.guided_flow.clone(),
        }
    }

    /// Visible history and the latest draft
    pub fn chat_state(&self, state: &SessionState) -> ChatStateView {
        ChatStateView {
            messages: state.visible_history(),
            appointment_details: state.last_appointment_details(),
        }
    }

    /// Standalone greeting; does not touch the history
    pub async fn greeting(&self, state: &SessionState, input: &GreetingInput) -> String {
        let customer_type = match input.customer_type.as_deref() {
            Some(value) => CustomerType::parse(value),
            None if state.is_authenticated() => CustomerType::Regular,
            None => CustomerType::New,
        };
        let username = match (&state.user, input.username.as_deref()) {
            (Some(user), _) => user.username.clone(),
            (None, Some(name)) if !name.trim().is_empty() => name.trim().to_string(),
            _ => state.username().to_string(),
        };

        self.llm
            .generate_greeting(GreetingRequest {
                customer_type,
                username: &username,
                chat_context: &state.chat_history,
                incomplete_appointment: draft(&state.guided_flow),
            })
            .await
    }

    pub async fn verify_confirmation(&self, input: &ConfirmationInput) -> bool {
        self.llm
            .verify_confirmation(&input.text, &input.chat_history)
            .await
    }

    /// Always three replies: model output padded with stage-based defaults
    pub async fn suggested_replies(&self, request: &SuggestionRequest) -> Vec<String> {
        let from_model = match self.llm.suggest_replies(request).await {
            Ok(replies) => replies,
            Err(e) => {
                tracing::debug!(error = %e, "Using local reply suggestions");
                Vec::new()
            }
        };
        suggestions::complete(from_model, request, &self.catalog)
    }

    /// Seed an empty history from the latest snapshot and a greeting
    async fn ensure_history(&self, state: &mut SessionState, customer_type: CustomerType) {
        if !state.chat_history.is_empty() {
            return;
        }

        let contact = self.tenant.contact_id();
        match self.crm.chat_sessions.query_in_progress(contact).await {
            Ok(records) => {
                if let Some(record) = records.into_iter().next() {
                    tracing::info!(chat_session_id = %record.id, "Restored chat session");
                    let snapshot = record.snapshot();
                    state.restore(record.id, snapshot);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not load chat session snapshot"),
        }

        let greeting = self.greet(state, customer_type).await;
        state.chat_history.push(ChatMessage::assistant(greeting));
        self.persist(state).await;
    }

    async fn greet(&self, state: &SessionState, customer_type: CustomerType) -> String {
        self.llm
            .generate_greeting(GreetingRequest {
                customer_type,
                username: state.username(),
                chat_context: &state.chat_history,
                incomplete_appointment: draft(&state.guided_flow),
            })
            .await
    }

    /// Save the session snapshot; failures are logged and swallowed
    async fn persist(&self, state: &mut SessionState) {
        // A new draft after a committed action opens a new snapshot
        if state.referral_state == ReferralState::Completed && !state.guided_flow.is_empty() {
            state.sf_chat_id = None;
            state.referral_state = ReferralState::InProgress;
        }

        let snapshot = state.snapshot();
        match self
            .crm
            .chat_sessions
            .upsert(
                self.tenant.contact_id(),
                &snapshot,
                state.referral_state,
                state.sf_chat_id.as_deref(),
            )
            .await
        {
            Ok(id) => state.sf_chat_id = Some(id),
            Err(e) => tracing::warn!(error = %e, "Failed to persist chat session"),
        }
    }
}

fn draft(flow: &GuidedFlow) -> Option<&GuidedFlow> {
    (!flow.is_empty()).then_some(flow)
}
