//! Tenant context
//!
//! The deployment serves a single CRM contact. The id is resolved once at
//! startup and handed to every component that reads or writes CRM records.

/// Immutable tenant identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    contact_id: String,
}

impl TenantContext {
    pub fn new(contact_id: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
        }
    }

    pub fn contact_id(&self) -> &str {
        &self.contact_id
    }
}
