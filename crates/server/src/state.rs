//! Application State
//!
//! Shared state across all handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_cookies::Cookies;

use bankbot_agent::ChatOrchestrator;
use bankbot_config::Settings;
use bankbot_core::Error;

use crate::auth::SessionCookie;
use crate::session::{Lookup, Session, SessionManager};
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub sessions: Arc<SessionManager>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub cookie: Arc<SessionCookie>,
    /// Absent when metrics are disabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Settings,
        orchestrator: Arc<ChatOrchestrator>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self, ServerError> {
        let cookie = SessionCookie::from_settings(&config)?;
        let sessions = SessionManager::from_config(&config.session);
        Ok(Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            orchestrator,
            cookie: Arc::new(cookie),
            metrics,
        })
    }

    /// Session named by the cookie
    ///
    /// `Ok(None)` when the request carries no session cookie. A cookie whose
    /// session has been evicted is cleared and reported as expired.
    pub fn current_session(&self, cookies: &Cookies) -> Result<Option<Arc<Session>>, Error> {
        let Some(id) = self.cookie.read(cookies) else {
            return Ok(None);
        };
        match self.sessions.lookup(&id) {
            Lookup::Active(session) => Ok(Some(session)),
            Lookup::Expired => {
                tracing::info!(session_id = %id, "Session cookie refers to an expired session");
                self.cookie.clear(cookies);
                Err(Error::SessionExpired)
            }
        }
    }

    /// Session named by the cookie, creating one when there is no cookie
    pub fn session_or_create(&self, cookies: &Cookies) -> Result<Arc<Session>, Error> {
        match self.current_session(cookies)? {
            Some(session) => Ok(session),
            None => Ok(self.start_session(cookies)),
        }
    }

    /// Fresh session with a new cookie
    pub fn start_session(&self, cookies: &Cookies) -> Arc<Session> {
        let session = self.sessions.create();
        self.cookie.issue(cookies, &session.id);
        session
    }

    pub fn end_session(&self, cookies: &Cookies) {
        if let Some(id) = self.cookie.read(cookies) {
            self.sessions.remove(&id);
        }
        self.cookie.clear(cookies);
    }
}
