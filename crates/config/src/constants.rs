//! Default values shared by settings and their consumers

/// Environment variable prefix for overrides (`BANKBOT__SECTION__KEY`)
pub const ENV_PREFIX: &str = "BANKBOT";

/// Environment variable naming the config overlay (`config/{env}`)
pub const ENV_SELECTOR: &str = "BANKBOT_ENV";

/// HTTP server defaults
pub mod server {
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 5000;
    /// Three model calls and two CRM round trips at their default timeouts
    pub const DEFAULT_TIMEOUT_SECS: u64 = 240;
    pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
}

/// Session cookie defaults
pub mod session {
    /// One hour
    pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;
    pub const DEFAULT_COOKIE_NAME: &str = "bankbot.sid";
    pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
    /// Signing keys need at least this many bytes
    pub const MIN_SECRET_LEN: usize = 64;
}

/// Language-model endpoint defaults
pub mod llm {
    pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
}

/// CRM defaults
pub mod crm {
    pub const DEFAULT_API_VERSION: &str = "v59.0";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
}
