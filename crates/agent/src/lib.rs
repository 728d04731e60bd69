//! Chat orchestration for the banking appointment assistant
//!
//! Features:
//! - Guided appointment flow over model extraction and a server-side draft
//! - Authoritative required-field checks and canned follow-ups
//! - Confirmation gate before any CRM write
//! - Chat-session snapshots so unfinished bookings survive a new login
//! - Quick-reply suggestions and product recommendations with local fallbacks

pub mod orchestrator;
pub mod suggestions;
pub mod types;

pub use orchestrator::ChatOrchestrator;
pub use types::{
    BookingOutcome, ChatInput, ChatOutcome, ChatStateView, ConfirmationInput, GreetingInput,
    LoginOutcome, ProductRecommendation, RecommendationSource, RecommendationsOutcome,
};
