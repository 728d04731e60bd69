//! Configuration management for the banking appointment assistant
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`)
//! - Environment variables (`BANKBOT__` prefix, `__` between sections)
//!
//! Domain data (products, branches, bank profile) lives in a separate
//! YAML catalog referenced by `catalog_path`.

pub mod catalog;
pub mod constants;
pub mod settings;
pub mod tenant;

pub use catalog::{BankProfile, BranchDirectory, BranchLocation, DomainCatalog, Product};
pub use settings::{
    load_settings, AuthConfig, CrmMode, CrmSettings, LlmSettings, ObservabilityConfig,
    RuntimeEnvironment, ServerConfig, SessionConfig, Settings,
};
pub use tenant::TenantContext;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for bankbot_core::Error {
    fn from(err: ConfigError) -> Self {
        bankbot_core::Error::Configuration(err.to_string())
    }
}
