use thiserror::Error;

/// CRM errors
#[derive(Error, Debug, Clone)]
pub enum CrmError {
    #[error("CRM configuration error: {0}")]
    Configuration(String),

    #[error("CRM request failed: {0}")]
    Http(String),

    #[error("CRM API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid CRM data: {0}")]
    InvalidData(String),

    #[error("Invalid record id: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid field value: {0}")]
    Validation(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for CrmError {
    fn from(err: reqwest::Error) -> Self {
        CrmError::Http(err.to_string())
    }
}

impl From<CrmError> for bankbot_core::Error {
    fn from(err: CrmError) -> Self {
        match err {
            CrmError::Configuration(msg) => bankbot_core::Error::Configuration(msg),
            CrmError::NotFound(what) => bankbot_core::Error::NotFound(what),
            CrmError::InvalidIdentifier(_) | CrmError::Validation(_) => {
                bankbot_core::Error::Validation(err.to_string())
            }
            other => bankbot_core::Error::Crm(other.to_string()),
        }
    }
}
