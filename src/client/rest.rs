//! # API Management Policy REST Client
//!
//! Client for the Azure Resource Manager API Management policy endpoints:
//!
//! - `GET    {endpoint}{id}?api-version=...&format=xml`
//! - `PUT    {endpoint}{id}?api-version=...`
//! - `DELETE {endpoint}{id}?api-version=...`
//!
//! Each key of `{id}` is percent-encoded as a single path segment; dot
//! segments are refused so a name can never address a parent resource.
//!
//! Requests carry a bearer token from the configured `TokenCredential`.
//! In Pact mode the endpoint points at a mock server and the credential is a
//! dummy (see [`crate::client::credential`]).

use super::credential::build_credential;
use super::models::{ErrorResponse, PolicyContract, PolicyExportFormat};
use super::{ApiPolicyClient, ClientError};
use crate::config::ProviderConfig;
use crate::id::ApiPolicyId;
use crate::observability::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use azure_core::credentials::{TokenCredential, TokenRequestOptions};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, field, info, Instrument, Span};

/// REST implementation of [`ApiPolicyClient`]
pub struct RestApiPolicyClient {
    client: Client,
    endpoint: Url,
    api_version: String,
    token_scope: String,
    credential: Arc<dyn TokenCredential>,
}

impl std::fmt::Debug for RestApiPolicyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestApiPolicyClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl RestApiPolicyClient {
    /// Create a client from provider configuration
    ///
    /// # Errors
    /// Returns an error if the credential or HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let credential = build_credential(config)?;
        info!("API Management endpoint: {}", config.endpoint);
        Self::with_credential(
            &config.endpoint,
            &config.api_version,
            &config.token_scope,
            credential,
        )
    }

    /// Create a client with an explicit credential
    ///
    /// # Errors
    /// Returns an error if the endpoint is not a base URL or the HTTP client
    /// cannot be built.
    pub fn with_credential(
        endpoint: &str,
        api_version: &str,
        token_scope: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid API Management endpoint '{endpoint}'"))?;
        if endpoint.cannot_be_a_base() {
            anyhow::bail!("API Management endpoint '{endpoint}' cannot carry a path");
        }

        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_version: api_version.to_string(),
            token_scope: token_scope.to_string(),
            credential,
        })
    }

    fn url(&self, id: &ApiPolicyId) -> Result<Url, ClientError> {
        let segments = id.path_segments();
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(ClientError::InvalidPathSegment((*bad).to_string()));
        }

        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn get_token(&self) -> Result<String, ClientError> {
        let scope = &[self.token_scope.as_str()];
        let options = Some(TokenRequestOptions::default());
        let token_response = self
            .credential
            .get_token(scope, options)
            .await
            .map_err(ClientError::Credential)?;
        Ok(token_response.token.secret().to_string())
    }

    /// Authorise and send a request, mapping non-success statuses to errors
    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let token = self.get_token().await?;
        let response = request
            .query(&[("api-version", self.api_version.as_str())])
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .map_err(ClientError::Transport)?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Err(status_error(status, &text))
    }
}

fn status_error(status: StatusCode, body: &str) -> ClientError {
    let (code, message) = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(envelope) => (
            envelope.error.code,
            envelope.error.message.unwrap_or_else(|| body.to_string()),
        ),
        Err(_) => (None, body.to_string()),
    };
    ClientError::Status {
        status: status.as_u16(),
        code,
        message,
    }
}

fn operation_span(name: &'static str, id: &ApiPolicyId) -> Span {
    match name {
        "get" => tracing::debug_span!(
            "apim.policy.get",
            resource_group = %id.resource_group,
            service_name = %id.service_name,
            api_name = %id.api_name,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
        ),
        "create_or_update" => tracing::info_span!(
            "apim.policy.create_or_update",
            resource_group = %id.resource_group,
            service_name = %id.service_name,
            api_name = %id.api_name,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
        ),
        _ => tracing::info_span!(
            "apim.policy.delete",
            resource_group = %id.resource_group,
            service_name = %id.service_name,
            api_name = %id.api_name,
            operation.success = field::Empty,
            operation.duration_ms = field::Empty,
        ),
    }
}

/// Record span fields and metrics for a finished call
///
/// Not-found counts as a successful call: callers decide whether it matters.
fn finish<T>(
    span: &Span,
    operation: &str,
    start: Instant,
    result: Result<T, ClientError>,
) -> Result<T, ClientError> {
    let elapsed = start.elapsed();
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Durations of a single request never exceed u64 milliseconds"
    )]
    let duration_ms = elapsed.as_millis() as u64;
    span.record("operation.duration_ms", duration_ms);
    let success = match &result {
        Ok(_) => true,
        Err(e) => e.is_not_found(),
    };
    span.record("operation.success", success);
    if success {
        metrics::record_operation(operation, elapsed.as_secs_f64());
    } else {
        metrics::increment_operation_errors(operation);
    }
    result
}

#[async_trait]
impl ApiPolicyClient for RestApiPolicyClient {
    async fn get(
        &self,
        id: &ApiPolicyId,
        format: PolicyExportFormat,
    ) -> Result<PolicyContract, ClientError> {
        let span = operation_span("get", id);
        let start = Instant::now();
        let result = async {
            let request = self
                .client
                .get(self.url(id)?)
                .query(&[("format", format.as_str())]);
            let response = self.send(request).await?;
            response
                .json::<PolicyContract>()
                .await
                .map_err(ClientError::Decode)
        }
        .instrument(span.clone())
        .await;

        finish(&span, "get", start, result)
    }

    async fn create_or_update(
        &self,
        id: &ApiPolicyId,
        parameters: &PolicyContract,
        if_match: Option<&str>,
    ) -> Result<PolicyContract, ClientError> {
        let span = operation_span("create_or_update", id);
        let start = Instant::now();
        let result = async {
            let mut request = self.client.put(self.url(id)?).json(parameters);
            if let Some(etag) = if_match.filter(|e| !e.is_empty()) {
                request = request.header("If-Match", etag);
            }
            debug!("Writing policy for {}", id);
            let response = self.send(request).await?;
            // 201 and 200 both carry the stored contract; 202 may not
            let text = response.text().await.map_err(ClientError::Decode)?;
            if text.trim().is_empty() {
                return Ok(PolicyContract::default());
            }
            serde_json::from_str::<PolicyContract>(&text).map_err(ClientError::InvalidBody)
        }
        .instrument(span.clone())
        .await;

        finish(&span, "create_or_update", start, result)
    }

    async fn delete(&self, id: &ApiPolicyId, if_match: Option<&str>) -> Result<(), ClientError> {
        let span = operation_span("delete", id);
        let start = Instant::now();
        let etag = if_match.filter(|e| !e.is_empty()).unwrap_or("*");

        let result = async {
            let request = self.client.delete(self.url(id)?).header("If-Match", etag);
            debug!("Deleting policy for {}", id);
            self.send(request).await.map(|_| ())
        }
        .instrument(span.clone())
        .await;

        finish(&span, "delete", start, result)
    }
}
