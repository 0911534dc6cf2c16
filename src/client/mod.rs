//! # Remote Policy Client
//!
//! Abstract interface for the API Management policy endpoints.
//!
//! The reconciler only talks to the service through [`ApiPolicyClient`], so
//! tests can substitute an in-memory implementation and the REST client can be
//! pointed at a Pact mock server.

pub mod credential;
pub mod models;
pub mod rest;

use crate::id::ApiPolicyId;
use async_trait::async_trait;
use thiserror::Error;

pub use models::{
    PolicyBody, PolicyContentFormat, PolicyContract, PolicyContractProperties, PolicyExportFormat,
};
pub use rest::RestApiPolicyClient;

/// Errors returned by the remote policy client
#[derive(Debug, Error)]
pub enum ClientError {
    /// The service answered with a non-success status
    #[error("unexpected status {status}{}: {message}", code_suffix(.code))]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The request never produced a response
    #[error("sending request: {0}")]
    Transport(#[source] reqwest::Error),

    /// The response body could not be decoded
    #[error("decoding response: {0}")]
    Decode(#[source] reqwest::Error),

    /// The response body was not a policy contract
    #[error("decoding response body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    /// A key segment would not address a single path element
    #[error("refusing to address path segment {0:?}")]
    InvalidPathSegment(String),

    /// No access token could be obtained for the management endpoint
    #[error("acquiring access token: {0}")]
    Credential(#[source] azure_core::Error),
}

impl ClientError {
    /// Whether the service reported that the policy does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    /// Build a not-found error, as the service reports a missing policy
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Status {
            status: 404,
            code: Some("ResourceNotFound".to_string()),
            message: message.into(),
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Provider trait for the API policy endpoints
#[async_trait]
pub trait ApiPolicyClient: Send + Sync {
    /// Fetch the policy attached to an API, exported in the given format
    async fn get(
        &self,
        id: &ApiPolicyId,
        format: PolicyExportFormat,
    ) -> Result<PolicyContract, ClientError>;

    /// Create or replace the policy attached to an API
    ///
    /// `if_match` is the entity tag to match; `None` writes unconditionally.
    async fn create_or_update(
        &self,
        id: &ApiPolicyId,
        parameters: &PolicyContract,
        if_match: Option<&str>,
    ) -> Result<PolicyContract, ClientError>;

    /// Delete the policy attached to an API
    async fn delete(&self, id: &ApiPolicyId, if_match: Option<&str>) -> Result<(), ClientError>;
}
