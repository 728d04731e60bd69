//! Core types for the banking appointment assistant
//!
//! This crate provides the pieces every other crate builds on:
//! - Guided appointment flow and required-field validation
//! - Date/time normalization between loose user text and CRM instants
//! - Lenient JSON extraction from model output
//! - Chat history and session state
//! - Error types

pub mod appointment;
pub mod conversation;
pub mod datetime;
pub mod error;
pub mod flow;
pub mod json_extract;
pub mod session;

pub use appointment::{
    follow_up_prompt, is_generic_response, AppointmentAction, AppointmentDetails, CustomerType,
    RequiredField,
};
pub use conversation::{recent_turns, AssistantEnvelope, ChatMessage, ChatRole};
pub use datetime::DisplayParts;
pub use error::{Error, ErrorKind, Result};
pub use flow::{FlowStage, GuidedFlow, ReferralState};
pub use session::{ConversationSnapshot, SessionState, SessionUser};
