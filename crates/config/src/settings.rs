//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{self, crm, llm, server, session};
use crate::tenant::TenantContext;
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Relaxed validation, insecure cookies allowed
    #[default]
    Development,
    Staging,
    /// All validations enforced, cookies marked `Secure`
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Static login credentials
    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub crm: CrmSettings,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Optional YAML file with products, branches and bank profile
    #[serde(default)]
    pub catalog_path: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    server::DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    server::DEFAULT_PORT
}

fn default_timeout() -> u64 {
    server::DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec![server::DEFAULT_CORS_ORIGIN.to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

/// Single static account, set via `BANKBOT__AUTH__USERNAME` and
/// `BANKBOT__AUTH__PASSWORD`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cookie signing secret (`BANKBOT__SESSION__SECRET`)
    #[serde(default)]
    pub secret: String,

    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

fn default_cookie_name() -> String {
    session::DEFAULT_COOKIE_NAME.to_string()
}

fn default_max_age() -> u64 {
    session::DEFAULT_MAX_AGE_SECS
}

fn default_cleanup_interval() -> u64 {
    session::DEFAULT_CLEANUP_INTERVAL_SECS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            cookie_name: default_cookie_name(),
            max_age_seconds: default_max_age(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

/// OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// `BANKBOT__LLM__API_KEY`
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,

    /// Azure OpenAI API version; set it to use an Azure deployment
    #[serde(default)]
    pub api_version: Option<String>,
}

fn default_llm_endpoint() -> String {
    llm::DEFAULT_ENDPOINT.to_string()
}

fn default_llm_model() -> String {
    llm::DEFAULT_MODEL.to_string()
}

fn default_llm_timeout() -> u64 {
    llm::DEFAULT_TIMEOUT_SECS
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            model: default_llm_model(),
            timeout_seconds: default_llm_timeout(),
            api_version: None,
        }
    }
}

impl LlmSettings {
    pub fn is_local(&self) -> bool {
        self.endpoint.starts_with("http://localhost") || self.endpoint.starts_with("http://127.0.0.1")
    }
}

/// Which CRM backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CrmMode {
    /// Salesforce REST API
    #[default]
    Salesforce,
    /// Process-local store for development and tests
    Memory,
}

/// CRM connection and tenant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmSettings {
    #[serde(default)]
    pub mode: CrmMode,

    /// e.g. `https://example.my.salesforce.com` (`BANKBOT__CRM__INSTANCE_URL`)
    #[serde(default)]
    pub instance_url: String,

    /// `BANKBOT__CRM__ACCESS_TOKEN`
    #[serde(default)]
    pub access_token: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// The single contact every appointment and chat session belongs to
    #[serde(default)]
    pub contact_id: String,

    #[serde(default = "default_crm_timeout")]
    pub timeout_seconds: u64,
}

fn default_api_version() -> String {
    crm::DEFAULT_API_VERSION.to_string()
}

fn default_crm_timeout() -> u64 {
    crm::DEFAULT_TIMEOUT_SECS
}

impl Default for CrmSettings {
    fn default() -> Self {
        Self {
            mode: CrmMode::default(),
            instance_url: String::new(),
            access_token: String::new(),
            api_version: default_api_version(),
            contact_id: String::new(),
            timeout_seconds: default_crm_timeout(),
        }
    }
}

/// Logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

impl Settings {
    /// Validate all sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_auth()?;
        self.validate_session()?;
        self.validate_llm()?;
        self.validate_crm()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }
        if self.server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    fn validate_auth(&self) -> Result<(), ConfigError> {
        if self.auth.username.trim().is_empty() {
            return Err(ConfigError::MissingField("auth.username".to_string()));
        }
        if self.auth.password.is_empty() {
            return Err(ConfigError::MissingField("auth.password".to_string()));
        }
        Ok(())
    }

    fn validate_session(&self) -> Result<(), ConfigError> {
        let secret = &self.session.secret;
        if secret.is_empty() {
            // Development falls back to a per-process random key
            if self.environment.is_strict() {
                return Err(ConfigError::MissingField("session.secret".to_string()));
            }
        } else if secret.len() < session::MIN_SECRET_LEN {
            return Err(ConfigError::InvalidValue {
                field: "session.secret".to_string(),
                message: format!(
                    "Must be at least {} bytes, got {}",
                    session::MIN_SECRET_LEN,
                    secret.len()
                ),
            });
        }
        if self.session.max_age_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_age_seconds".to_string(),
                message: "Max age must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        if self.llm.api_key.is_empty() && !self.llm.is_local() {
            return Err(ConfigError::MissingField("llm.api_key".to_string()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::MissingField("llm.model".to_string()));
        }
        Ok(())
    }

    fn validate_crm(&self) -> Result<(), ConfigError> {
        if self.crm.contact_id.trim().is_empty() {
            return Err(ConfigError::MissingField("crm.contact_id".to_string()));
        }
        if self.crm.mode == CrmMode::Salesforce {
            if self.crm.instance_url.trim().is_empty() {
                return Err(ConfigError::MissingField("crm.instance_url".to_string()));
            }
            if self.crm.access_token.trim().is_empty() {
                return Err(ConfigError::MissingField("crm.access_token".to_string()));
            }
        } else if self.environment.is_production() {
            return Err(ConfigError::InvalidValue {
                field: "crm.mode".to_string(),
                message: "In-memory CRM is not allowed in production".to_string(),
            });
        }
        Ok(())
    }

    /// Tenant the whole deployment acts on behalf of
    pub fn tenant(&self) -> TenantContext {
        TenantContext::new(self.crm.contact_id.trim())
    }
}

/// Load settings from files and environment
///
/// Priority: env vars > `config/{env}` > `config/default` > defaults.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix(constants::ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("server.cors_origins")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
