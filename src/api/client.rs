//! HTTP client for the Cucumber Studio API.
//!
//! [`CucumberStudioApi`] maps one method per upstream resource onto a single
//! `get` primitive. [`ApiClient`] implements that primitive over reqwest.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace};

use crate::api::types::{ApiErrorBody, ApiResponse, ListParams};
use crate::config::{Config, Credentials, LoggingConfig};
use crate::error::{Error, Result};
use crate::{REDACTED, VERSION};

/// JSON:API media type with the API version the client speaks.
pub const API_VERSION_HEADER: &str = "application/vnd.api+json; version=1";

/// Upstream request timeout.
pub const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers never written to logs.
const SENSITIVE_HEADERS: [&str; 5] = ["access-token", "client", "authorization", "cookie", "x-api-key"];

/// User agent string for API requests.
fn user_agent() -> String {
    format!("cucumberstudio-mcp/{} (rust)", VERSION)
}

/// Read access to the Cucumber Studio API.
///
/// Implementors only provide [`get`](Self::get); every resource method is
/// defined in terms of it.
#[async_trait]
pub trait CucumberStudioApi: Send + Sync {
    /// GET an endpoint relative to the API base URL.
    async fn get(&self, endpoint: &str, query: &[(String, String)]) -> Result<ApiResponse>;

    // ===== Projects =====

    async fn get_projects(&self, params: &ListParams) -> Result<ApiResponse> {
        self.get("/projects", &params.to_query()).await
    }

    async fn get_project(&self, project_id: &str) -> Result<ApiResponse> {
        self.get(&format!("/projects/{}", project_id), &[]).await
    }

    // ===== Scenarios =====

    async fn get_scenarios(&self, project_id: &str, params: &ListParams) -> Result<ApiResponse> {
        self.get(&format!("/projects/{}/scenarios", project_id), &params.to_query())
            .await
    }

    async fn get_scenario(&self, project_id: &str, scenario_id: &str) -> Result<ApiResponse> {
        self.get(
            &format!("/projects/{}/scenarios/{}", project_id, scenario_id),
            &[],
        )
        .await
    }

    async fn find_scenarios_by_tags(
        &self,
        project_id: &str,
        tags: &str,
        params: &ListParams,
    ) -> Result<ApiResponse> {
        let params = ListParams {
            filter_tags: Some(tags.to_string()),
            ..params.clone()
        };
        self.get(
            &format!("/projects/{}/scenarios/find_by_tags", project_id),
            &params.to_query(),
        )
        .await
    }

    // ===== Action words =====

    async fn get_action_words(&self, project_id: &str, params: &ListParams) -> Result<ApiResponse> {
        self.get(
            &format!("/projects/{}/actionwords", project_id),
            &params.to_query(),
        )
        .await
    }

    async fn get_action_word(&self, project_id: &str, action_word_id: &str) -> Result<ApiResponse> {
        self.get(
            &format!("/projects/{}/actionwords/{}", project_id, action_word_id),
            &[],
        )
        .await
    }

    async fn find_action_words_by_tags(
        &self,
        project_id: &str,
        tags: &str,
        params: &ListParams,
    ) -> Result<ApiResponse> {
        let params = ListParams {
            filter_tags: Some(tags.to_string()),
            ..params.clone()
        };
        self.get(
            &format!("/projects/{}/actionwords/find_by_tags", project_id),
            &params.to_query(),
        )
        .await
    }

    // ===== Folders =====

    async fn get_folders(&self, project_id: &str, params: &ListParams) -> Result<ApiResponse> {
        self.get(&format!("/projects/{}/folders", project_id), &params.to_query())
            .await
    }

    async fn get_folder(&self, project_id: &str, folder_id: &str) -> Result<ApiResponse> {
        self.get(&format!("/projects/{}/folders/{}", project_id, folder_id), &[])
            .await
    }

    async fn get_folder_children(
        &self,
        project_id: &str,
        folder_id: &str,
        params: &ListParams,
    ) -> Result<ApiResponse> {
        self.get(
            &format!("/projects/{}/folders/{}/children", project_id, folder_id),
            &params.to_query(),
        )
        .await
    }

    async fn get_folder_scenarios(
        &self,
        project_id: &str,
        folder_id: &str,
        params: &ListParams,
    ) -> Result<ApiResponse> {
        self.get(
            &format!("/projects/{}/folders/{}/scenarios", project_id, folder_id),
            &params.to_query(),
        )
        .await
    }

    // ===== Test runs =====

    async fn get_test_runs(&self, project_id: &str, params: &ListParams) -> Result<ApiResponse> {
        self.get(&format!("/projects/{}/test_runs", project_id), &params.to_query())
            .await
    }

    async fn get_test_run(&self, project_id: &str, test_run_id: &str) -> Result<ApiResponse> {
        self.get(
            &format!("/projects/{}/test_runs/{}", project_id, test_run_id),
            &[],
        )
        .await
    }

    async fn get_test_executions(
        &self,
        project_id: &str,
        test_run_id: &str,
        params: &ListParams,
    ) -> Result<ApiResponse> {
        self.get(
            &format!(
                "/projects/{}/test_runs/{}/test_executions",
                project_id, test_run_id
            ),
            &params.to_query(),
        )
        .await
    }

    // ===== Builds =====

    async fn get_builds(&self, project_id: &str, params: &ListParams) -> Result<ApiResponse> {
        self.get(&format!("/projects/{}/builds", project_id), &params.to_query())
            .await
    }

    async fn get_build(&self, project_id: &str, build_id: &str) -> Result<ApiResponse> {
        self.get(&format!("/projects/{}/builds/{}", project_id, build_id), &[])
            .await
    }

    // ===== Execution environments =====

    async fn get_execution_environments(
        &self,
        project_id: &str,
        params: &ListParams,
    ) -> Result<ApiResponse> {
        self.get(
            &format!("/projects/{}/execution_environments", project_id),
            &params.to_query(),
        )
        .await
    }

    /// Probe the API with a one-item project listing.
    async fn test_connection(&self) -> bool {
        match self.get_projects(&ListParams::page_size(1)).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Connection test failed: {}", e);
                false
            }
        }
    }
}

/// Zero-argument constructor for a fully configured upstream client.
pub type ApiClientFactory = Arc<dyn Fn() -> Result<Arc<dyn CucumberStudioApi>> + Send + Sync>;

/// Factory building [`ApiClient`]s from a configuration snapshot.
pub fn http_client_factory(config: Config) -> ApiClientFactory {
    Arc::new(move || {
        let client = ApiClient::from_config(&config)?;
        Ok(Arc::new(client) as Arc<dyn CucumberStudioApi>)
    })
}

/// reqwest-backed Cucumber Studio client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    uid: String,
    logging: LoggingConfig,
}

impl ApiClient {
    /// Create a new API client.
    pub fn new(base_url: &str, credentials: &Credentials, logging: LoggingConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(API_VERSION_HEADER));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("access-token", sensitive_header(&credentials.access_token)?);
        headers.insert("client", sensitive_header(&credentials.client_id)?);
        headers.insert("uid", sensitive_header(&credentials.uid)?);

        let client = Client::builder()
            .user_agent(user_agent())
            .default_headers(headers)
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            uid: credentials.uid.clone(),
            logging,
        })
    }

    /// Create a client from configuration, validating credentials first.
    pub fn from_config(config: &Config) -> Result<Self> {
        let credentials = config.credentials()?;
        Self::new(&config.base_url, &credentials, config.logging.clone())
    }

    /// Get the API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handle API response, extracting errors.
    async fn handle_response(&self, method_url: &str, response: Response) -> Result<ApiResponse> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let details = serde_json::from_str::<ApiErrorBody>(&body).ok();
            error!(
                status = status.as_u16(),
                "API Error: {} {}",
                status.as_u16(),
                method_url
            );
            if self.logging.log_response_bodies {
                debug!("Error response body: {}", body);
            }
            let message = details
                .as_ref()
                .and_then(ApiErrorBody::summary)
                .unwrap_or_else(|| format!("API request failed with status {}", status.as_u16()));
            return Err(Error::api(Some(status.as_u16()), message, details));
        }

        let body = response.text().await.map_err(|e| {
            error!("No response body from {}: {}", method_url, e);
            Error::api(None, "No response received from Cucumber Studio API", None)
        })?;
        debug!(
            status = status.as_u16(),
            bytes = body.len(),
            "Response: {} {}",
            status.as_u16(),
            method_url
        );
        if self.logging.log_api_responses || self.logging.log_response_bodies {
            debug!("Cucumber Studio response from {}: {}", method_url, body);
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::Internal(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl CucumberStudioApi for ApiClient {
    async fn get(&self, endpoint: &str, query: &[(String, String)]) -> Result<ApiResponse> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let method_url = format!("GET {}", url);

        debug!(query = ?query, "Request: {}", method_url);
        if self.logging.log_request_bodies {
            let uid = self.uid.as_str();
            trace!(
                "Request headers: {:?}",
                sanitize_headers(&[
                    ("accept", API_VERSION_HEADER),
                    ("access-token", ""),
                    ("client", ""),
                    ("uid", uid),
                ])
            );
        }

        let response = self.client.get(&url).query(query).send().await.map_err(|e| {
            error!(timeout = e.is_timeout(), "No response: {}: {}", method_url, e);
            Error::api(None, "No response received from Cucumber Studio API", None)
        })?;

        self.handle_response(&method_url, response).await
    }
}

fn sensitive_header(value: &str) -> Result<HeaderValue> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|_| Error::Config("credential contains characters not allowed in headers".to_string()))?;
    header.set_sensitive(true);
    Ok(header)
}

/// Replace sensitive header values with a redaction marker.
pub fn sanitize_headers<'a>(headers: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    headers
        .iter()
        .map(|(name, value)| {
            if SENSITIVE_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                (*name, REDACTED)
            } else {
                (*name, *value)
            }
        })
        .collect()
}
