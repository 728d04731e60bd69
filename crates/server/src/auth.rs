//! Authentication
//!
//! A single static account is configured through `auth.username` and
//! `auth.password`. A successful login marks the session as authenticated;
//! the session id travels in a signed, HTTP-only cookie.

use tower_cookies::cookie::{time, SameSite};
use tower_cookies::{Cookie, Cookies, Key};

use bankbot_config::Settings;
use bankbot_core::{Error, SessionState, SessionUser};

use crate::ServerError;

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Check a login attempt against the configured account
pub fn check_credentials(settings: &Settings, username: &str, password: &str) -> bool {
    let user_ok = constant_time_compare(username.trim(), settings.auth.username.trim());
    let pass_ok = constant_time_compare(password, &settings.auth.password);
    user_ok & pass_ok
}

/// The logged-in user, or `Unauthorized`
pub fn require_user(state: &SessionState) -> Result<&SessionUser, Error> {
    state
        .user
        .as_ref()
        .ok_or_else(|| Error::Unauthorized("Authentication required".to_string()))
}

/// Signing and attributes of the session cookie
#[derive(Clone)]
pub struct SessionCookie {
    name: String,
    key: Key,
    secure: bool,
    max_age_seconds: i64,
}

impl SessionCookie {
    /// Derive the signing key from the configured secret
    ///
    /// An empty secret is only accepted outside production and yields a
    /// random per-process key, so sessions do not survive a restart.
    pub fn from_settings(settings: &Settings) -> Result<Self, ServerError> {
        let secret = settings.session.secret.as_bytes();
        let key = if secret.is_empty() {
            if settings.environment.is_strict() {
                return Err(ServerError::Startup(
                    "session.secret is required".to_string(),
                ));
            }
            tracing::warn!("No session secret configured, using a random signing key");
            Key::generate()
        } else {
            Key::try_from(secret).map_err(|e| ServerError::Startup(e.to_string()))?
        };

        Ok(Self {
            name: settings.session.cookie_name.clone(),
            key,
            secure: settings.environment.is_production(),
            max_age_seconds: i64::try_from(settings.session.max_age_seconds).unwrap_or(i64::MAX),
        })
    }

    /// Session id from a cookie with a valid signature
    pub fn read(&self, cookies: &Cookies) -> Option<String> {
        cookies
            .signed(&self.key)
            .get(&self.name)
            .map(|cookie| cookie.value().to_string())
            .filter(|id| !id.is_empty())
    }

    pub fn issue(&self, cookies: &Cookies, session_id: &str) {
        let cookie = Cookie::build((self.name.clone(), session_id.to_string()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(self.max_age_seconds))
            .build();
        cookies.signed(&self.key).add(cookie);
    }

    pub fn clear(&self, cookies: &Cookies) {
        let cookie = Cookie::build((self.name.clone(), "")).path("/").build();
        cookies.signed(&self.key).remove(cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankbot_config::RuntimeEnvironment;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.auth.username = "demo".to_string();
        settings.auth.password = "hunter2".to_string();
        settings
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "ab"));
        assert!(constant_time_compare("", ""));
    }

    #[test]
    fn test_check_credentials() {
        let settings = settings();
        assert!(check_credentials(&settings, "demo", "hunter2"));
        assert!(check_credentials(&settings, " demo ", "hunter2"));
        assert!(!check_credentials(&settings, "demo", "hunter"));
        assert!(!check_credentials(&settings, "admin", "hunter2"));
    }

    #[test]
    fn test_require_user() {
        let mut state = SessionState::default();
        assert!(matches!(require_user(&state), Err(Error::Unauthorized(_))));

        state.user = Some(SessionUser {
            username: "demo".to_string(),
        });
        assert_eq!(require_user(&state).unwrap().username, "demo");
    }

    #[test]
    fn test_cookie_key_from_secret() {
        let mut settings = settings();
        settings.session.secret = "s".repeat(64);
        assert!(SessionCookie::from_settings(&settings).is_ok());

        settings.session.secret = "short".to_string();
        assert!(SessionCookie::from_settings(&settings).is_err());
    }

    #[test]
    fn test_empty_secret_rejected_in_production() {
        let mut settings = settings();
        assert!(SessionCookie::from_settings(&settings).is_ok());

        settings.environment = RuntimeEnvironment::Production;
        assert!(SessionCookie::from_settings(&settings).is_err());
    }
}
