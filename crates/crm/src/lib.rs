//! CRM gateway for the banking appointment assistant
//!
//! Provides access to:
//! - Appointments (create, reschedule, soft cancel)
//! - Chat-session snapshots used to resume unfinished conversations
//! - Visit history and banker notes used as prompt context
//!
//! Every query goes through [`SoqlQuery`], which binds values as escaped
//! literals and validates record ids.

pub mod appointments;
pub mod chat_sessions;
pub mod client;
pub mod error;
pub mod memory;
pub mod soql;
pub mod visits;

pub use appointments::{
    AppointmentData, AppointmentRecord, AppointmentStatus, AppointmentStore,
    SalesforceAppointmentStore,
};
pub use chat_sessions::{ChatSessionRecord, ChatSessionStore, SalesforceChatSessionStore};
pub use client::{SalesforceClient, SalesforceConfig};
pub use error::CrmError;
pub use memory::InMemoryCrm;
pub use soql::SoqlQuery;
pub use visits::{BankerNote, SalesforceVisitStore, VisitRecord, VisitStore, DEFAULT_VISIT_LIMIT};

use std::sync::Arc;

use bankbot_config::{CrmMode, CrmSettings};

/// Initialize the CRM layer for the configured mode
///
/// Salesforce mode with a missing instance URL or access token fails here,
/// before the server starts accepting requests.
pub fn init(settings: &CrmSettings) -> Result<CrmLayer, CrmError> {
    match settings.mode {
        CrmMode::Salesforce => {
            let config = SalesforceConfig::from_settings(settings)?;
            let client = SalesforceClient::connect(config)?;
            Ok(CrmLayer {
                appointments: Arc::new(SalesforceAppointmentStore::new(client.clone())),
                chat_sessions: Arc::new(SalesforceChatSessionStore::new(client.clone())),
                visits: Arc::new(SalesforceVisitStore::new(client)),
            })
        }
        CrmMode::Memory => {
            tracing::warn!("Using in-memory CRM; nothing will be persisted");
            Ok(CrmLayer::from_memory(Arc::new(InMemoryCrm::new())))
        }
    }
}

/// Combined CRM layer with all stores
#[derive(Clone)]
pub struct CrmLayer {
    pub appointments: Arc<dyn AppointmentStore>,
    pub chat_sessions: Arc<dyn ChatSessionStore>,
    pub visits: Arc<dyn VisitStore>,
}

impl CrmLayer {
    /// Back every store with the same in-memory CRM
    pub fn from_memory(crm: Arc<InMemoryCrm>) -> Self {
        Self {
            appointments: crm.clone(),
            chat_sessions: crm.clone(),
            visits: crm,
        }
    }
}
