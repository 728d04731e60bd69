//! Salesforce REST client and connection settings

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use bankbot_config::CrmSettings;

use crate::soql::{validate_id, SoqlQuery};
use crate::CrmError;

/// Salesforce connection settings
#[derive(Debug, Clone)]
pub struct SalesforceConfig {
    pub instance_url: String,
    pub access_token: String,
    pub api_version: String,
    pub timeout: Duration,
}

impl SalesforceConfig {
    /// Missing URL or token is fatal; there is no retry or later refresh.
    pub fn from_settings(settings: &CrmSettings) -> Result<Self, CrmError> {
        let instance_url = settings.instance_url.trim().trim_end_matches('/');
        if instance_url.is_empty() {
            return Err(CrmError::Configuration(
                "CRM instance URL is not configured".to_string(),
            ));
        }
        let access_token = settings.access_token.trim();
        if access_token.is_empty() {
            return Err(CrmError::Configuration(
                "CRM access token is not configured".to_string(),
            ));
        }

        Ok(Self {
            instance_url: instance_url.to_string(),
            access_token: access_token.to_string(),
            api_version: settings.api_version.trim_start_matches('v').to_string(),
            timeout: Duration::from_secs(settings.timeout_seconds),
        })
    }

    fn data_url(&self) -> String {
        format!("{}/services/data/v{}", self.instance_url, self.api_version)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    records: Vec<T>,
    #[serde(default = "default_done")]
    done: bool,
    #[serde(rename = "nextRecordsUrl", default)]
    next_records_url: Option<String>,
}

fn default_done() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

/// Salesforce REST client wrapper
#[derive(Clone)]
pub struct SalesforceClient {
    http: Client,
    config: Arc<SalesforceConfig>,
}

impl SalesforceClient {
    pub fn connect(config: SalesforceConfig) -> Result<Self, CrmError> {
        tracing::info!(
            instance_url = %config.instance_url,
            api_version = %config.api_version,
            "Configuring Salesforce client"
        );

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.access_token))
            .map_err(|_| CrmError::Configuration("Access token is not a valid header".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| CrmError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    pub fn instance_url(&self) -> &str {
        &self.config.instance_url
    }

    /// Run a query, following pagination until the result set is done
    pub async fn query<T: DeserializeOwned>(&self, query: &SoqlQuery) -> Result<Vec<T>, CrmError> {
        let soql = query.build()?;
        tracing::debug!(soql = %soql, "Running CRM query");

        let response = self
            .http
            .get(format!("{}/query", self.config.data_url()))
            .query(&[("q", soql.as_str())])
            .send()
            .await?;
        let mut page: QueryResponse<T> = Self::read_json(response).await?;

        let mut records = std::mem::take(&mut page.records);
        while !page.done {
            let Some(next) = page.next_records_url.take() else {
                break;
            };
            let response = self
                .http
                .get(format!("{}{}", self.config.instance_url, next))
                .send()
                .await?;
            page = Self::read_json(response).await?;
            records.append(&mut page.records);
        }

        Ok(records)
    }

    /// Create a record and return its id
    pub async fn create<B: Serialize + ?Sized>(
        &self,
        sobject: &str,
        body: &B,
    ) -> Result<String, CrmError> {
        let response = self
            .http
            .post(format!("{}/sobjects/{}", self.config.data_url(), sobject))
            .json(body)
            .send()
            .await?;
        let created: CreateResponse = Self::read_json(response).await?;

        if !created.success && !created.errors.is_empty() {
            return Err(CrmError::Api {
                status: StatusCode::BAD_REQUEST.as_u16(),
                message: serde_json::Value::Array(created.errors).to_string(),
            });
        }
        Ok(created.id)
    }

    /// Patch fields on an existing record
    pub async fn update<B: Serialize + ?Sized>(
        &self,
        sobject: &str,
        id: &str,
        body: &B,
    ) -> Result<(), CrmError> {
        let id = validate_id(id)?;
        let response = self
            .http
            .patch(format!("{}/sobjects/{}/{}", self.config.data_url(), sobject, id))
            .json(body)
            .send()
            .await?;
        Self::check_status(response, id).await.map(|_| ())
    }

    async fn check_status(response: Response, what: &str) -> Result<Response, CrmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(CrmError::NotFound(what.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), message = %message, "CRM request rejected");
        Err(CrmError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, CrmError> {
        let url = response.url().path().to_string();
        let response = Self::check_status(response, &url).await?;
        response
            .json()
            .await
            .map_err(|e| CrmError::InvalidData(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankbot_config::CrmMode;

    fn settings(url: &str, token: &str) -> CrmSettings {
        CrmSettings {
            mode: CrmMode::Salesforce,
            instance_url: url.to_string(),
            access_token: token.to_string(),
            api_version: "v59.0".to_string(),
            contact_id: "003XX0000000001".to_string(),
            timeout_seconds: 30,
        }
    }

    #[test]
    fn test_missing_url_is_fatal() {
        let result = SalesforceConfig::from_settings(&settings("  ", "token"));
        assert!(matches!(result, Err(CrmError::Configuration(_))));
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let result = SalesforceConfig::from_settings(&settings("https://bank.my.salesforce.com", ""));
        assert!(matches!(result, Err(CrmError::Configuration(_))));
    }

    #[test]
    fn test_data_url() {
        let config =
            SalesforceConfig::from_settings(&settings("https://bank.my.salesforce.com/", "tok")).unwrap();
        assert_eq!(config.data_url(), "https://bank.my.salesforce.com/services/data/v59.0");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_query_response_shape() {
        let raw = r#"{"totalSize":1,"done":true,"records":[{"Id":"a0A000000000001"}]}"#;
        let parsed: QueryResponse<serde_json::Value> = serde_json::from_str(raw).unwrap();
        assert!(parsed.done);
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.next_records_url.is_none());
    }

    #[test]
    fn test_connect() {
        let config =
            SalesforceConfig::from_settings(&settings("https://bank.my.salesforce.com", "tok")).unwrap();
        let client = SalesforceClient::connect(config).unwrap();
        assert_eq!(client.instance_url(), "https://bank.my.salesforce.com");
    }
}
