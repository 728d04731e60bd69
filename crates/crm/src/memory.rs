//! Process-local CRM for development and tests
//!
//! Implements every store trait over `parking_lot` maps. Records are never
//! removed, matching the soft-delete behaviour of the real CRM.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use bankbot_core::{ConversationSnapshot, ReferralState};

use crate::appointments::{AppointmentData, AppointmentRecord, AppointmentStore};
use crate::chat_sessions::{now_timestamp, ChatSessionRecord, ChatSessionStore};
use crate::soql::validate_id;
use crate::visits::{clamp_limit, BankerNote, VisitRecord, VisitStore};
use crate::CrmError;

const APPOINTMENT_PREFIX: &str = "a0A";
const CHAT_SESSION_PREFIX: &str = "a0C";

/// 18 character id with the given key prefix
fn new_record_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    format!("{}{}", prefix, &suffix[..15])
}

#[derive(Debug, Clone)]
struct Stored<T> {
    seq: u64,
    record: T,
}

#[derive(Default)]
struct Tables {
    seq: u64,
    appointments: HashMap<String, Stored<AppointmentRecord>>,
    chat_sessions: HashMap<String, Stored<ChatSessionRecord>>,
    visits: Vec<VisitRecord>,
    notes: Vec<BankerNote>,
    writes: usize,
}

impl Tables {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// In-memory implementation of all CRM stores
#[derive(Default)]
pub struct InMemoryCrm {
    tables: RwLock<Tables>,
}

impl InMemoryCrm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_visit(&self, visit: VisitRecord) {
        self.tables.write().visits.push(visit);
    }

    pub fn add_banker_note(&self, note: BankerNote) {
        self.tables.write().notes.push(note);
    }

    /// Number of appointment create/update calls so far
    pub fn appointment_writes(&self) -> usize {
        self.tables.read().writes
    }

    pub fn appointment(&self, id: &str) -> Option<AppointmentRecord> {
        self.tables
            .read()
            .appointments
            .get(id)
            .map(|s| s.record.clone())
    }

    pub fn chat_session(&self, id: &str) -> Option<ChatSessionRecord> {
        self.tables
            .read()
            .chat_sessions
            .get(id)
            .map(|s| s.record.clone())
    }

    /// Every chat-session record regardless of status, oldest first
    pub fn chat_sessions(&self) -> Vec<ChatSessionRecord> {
        let tables = self.tables.read();
        let mut stored: Vec<_> = tables.chat_sessions.values().collect();
        stored.sort_by_key(|s| s.seq);
        stored.into_iter().map(|s| s.record.clone()).collect()
    }
}

fn apply(record: &mut AppointmentRecord, data: &AppointmentData) {
    let fields = [
        (&mut record.reason, &data.reason),
        (&mut record.date, &data.date),
        (&mut record.time, &data.time),
        (&mut record.location, &data.location),
        (&mut record.banker, &data.banker),
        (&mut record.contact_id, &data.contact_id),
    ];
    for (slot, value) in fields {
        if value.is_some() {
            *slot = value.clone();
        }
    }
    if let Some(status) = data.status {
        record.status = status;
    }
}

#[async_trait]
impl AppointmentStore for InMemoryCrm {
    async fn create(&self, data: &AppointmentData) -> Result<String, CrmError> {
        data.validate()?;
        let id = new_record_id(APPOINTMENT_PREFIX);
        let mut record = AppointmentRecord {
            id: id.clone(),
            reason: None,
            date: None,
            time: None,
            location: None,
            banker: None,
            status: Default::default(),
            contact_id: None,
        };
        apply(&mut record, data);

        let mut tables = self.tables.write();
        let seq = tables.next_seq();
        tables.appointments.insert(id.clone(), Stored { seq, record });
        tables.writes += 1;

        tracing::info!(appointment_id = %id, "Appointment created in memory");
        Ok(id)
    }

    async fn update(&self, id: &str, data: &AppointmentData) -> Result<(), CrmError> {
        validate_id(id)?;
        data.validate()?;

        let mut tables = self.tables.write();
        let stored = tables
            .appointments
            .get_mut(id)
            .ok_or_else(|| CrmError::NotFound(id.to_string()))?;
        apply(&mut stored.record, data);
        tables.writes += 1;

        tracing::info!(appointment_id = %id, status = ?data.status, "Appointment updated in memory");
        Ok(())
    }

    async fn list_for_contact(&self, contact_id: &str) -> Result<Vec<AppointmentRecord>, CrmError> {
        validate_id(contact_id)?;
        let tables = self.tables.read();
        let mut stored: Vec<_> = tables
            .appointments
            .values()
            .filter(|s| s.record.contact_id.as_deref() == Some(contact_id))
            .collect();
        stored.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(stored.into_iter().map(|s| s.record.clone()).collect())
    }
}

#[async_trait]
impl ChatSessionStore for InMemoryCrm {
    async fn query_in_progress(
        &self,
        contact_id: &str,
    ) -> Result<Vec<ChatSessionRecord>, CrmError> {
        validate_id(contact_id)?;
        let tables = self.tables.read();
        let mut stored: Vec<_> = tables
            .chat_sessions
            .values()
            .filter(|s| {
                s.record.contact_id.as_deref() == Some(contact_id)
                    && s.record.state() == ReferralState::InProgress
            })
            .collect();
        stored.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(stored.into_iter().map(|s| s.record.clone()).collect())
    }

    async fn upsert(
        &self,
        contact_id: &str,
        snapshot: &ConversationSnapshot,
        status: ReferralState,
        existing_id: Option<&str>,
    ) -> Result<String, CrmError> {
        validate_id(contact_id)?;
        let mut tables = self.tables.write();
        let seq = tables.next_seq();

        let id = match existing_id {
            Some(id) => {
                let stored = tables
                    .chat_sessions
                    .get_mut(id)
                    .ok_or_else(|| CrmError::NotFound(id.to_string()))?;
                stored.seq = seq;
                stored.record.history = Some(snapshot.to_blob());
                stored.record.status = Some(status.as_str().to_string());
                stored.record.last_updated = Some(now_timestamp());
                id.to_string()
            }
            None => {
                let id = new_record_id(CHAT_SESSION_PREFIX);
                let record = ChatSessionRecord {
                    id: id.clone(),
                    contact_id: Some(contact_id.to_string()),
                    history: Some(snapshot.to_blob()),
                    status: Some(status.as_str().to_string()),
                    last_updated: Some(now_timestamp()),
                };
                tables.chat_sessions.insert(id.clone(), Stored { seq, record });
                id
            }
        };
        Ok(id)
    }

    async fn update_status(&self, id: &str, status: ReferralState) -> Result<(), CrmError> {
        let mut tables = self.tables.write();
        let seq = tables.next_seq();
        let stored = tables
            .chat_sessions
            .get_mut(id)
            .ok_or_else(|| CrmError::NotFound(id.to_string()))?;
        stored.seq = seq;
        stored.record.status = Some(status.as_str().to_string());
        stored.record.last_updated = Some(now_timestamp());
        Ok(())
    }
}

#[async_trait]
impl VisitStore for InMemoryCrm {
    async fn visit_history(
        &self,
        contact_id: &str,
        limit: usize,
    ) -> Result<Vec<VisitRecord>, CrmError> {
        validate_id(contact_id)?;
        let mut visits: Vec<_> = self
            .tables
            .read()
            .visits
            .iter()
            .filter(|v| v.contact_id.as_deref() == Some(contact_id))
            .cloned()
            .collect();
        visits.sort_by(|a, b| b.visit_date.cmp(&a.visit_date));
        visits.truncate(clamp_limit(limit));
        Ok(visits)
    }

    async fn banker_notes(&self, contact_id: &str) -> Result<Vec<BankerNote>, CrmError> {
        validate_id(contact_id)?;
        let mut notes: Vec<_> = self
            .tables
            .read()
            .notes
            .iter()
            .filter(|n| n.contact_id.as_deref() == Some(contact_id))
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.created_date.cmp(&a.created_date));
        Ok(notes)
    }
}
