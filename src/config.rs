//! # Provider Configuration
//!
//! Provider-level settings loaded from environment variables.
//!
//! All settings have sensible defaults from [`crate::constants`]. Only the
//! subscription is required, and only once a new policy has to be addressed.

use crate::constants::{
    DEFAULT_APIM_API_VERSION, DEFAULT_ARM_ENDPOINT, DEFAULT_CREATE_TIMEOUT_SECS,
    DEFAULT_DELETE_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, DEFAULT_UPDATE_TIMEOUT_SECS,
};
use crate::schema::ResourceTimeouts;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::warn;

/// Azure authentication method for the management endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AzureAuth {
    /// Workload Identity federated with the given application client ID
    WorkloadIdentity { client_id: String },
    /// System-assigned managed identity (AKS, App Service, VMs)
    ManagedIdentity,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Provider-level configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Subscription that owns the API Management services
    pub subscription_id: Option<String>,
    /// Management endpoint requests are sent to
    pub endpoint: String,
    /// OAuth scope requested from the credential
    pub token_scope: String,
    /// API Management REST API version
    pub api_version: String,
    pub auth: AzureAuth,
    /// Route requests to a Pact mock server with a dummy credential
    pub pact_mode: bool,
    pub timeouts: ResourceTimeouts,
    pub log_format: LogFormat,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            subscription_id: None,
            endpoint: DEFAULT_ARM_ENDPOINT.to_string(),
            token_scope: format!("{DEFAULT_ARM_ENDPOINT}/.default"),
            api_version: DEFAULT_APIM_API_VERSION.to_string(),
            auth: AzureAuth::ManagedIdentity,
            pact_mode: false,
            timeouts: ResourceTimeouts::default(),
            log_format: LogFormat::Text,
        }
    }
}

impl ProviderConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// # Errors
    /// Returns an error when Pact mode is enabled without a mock endpoint, or
    /// when the mock endpoint points at production Azure.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// # Errors
    /// See [`ProviderConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pact_mode = lookup_bool(&lookup, "PACT_MODE", false);

        let endpoint = if pact_mode {
            let endpoint = lookup("APIM_POLICY_ENDPOINT").context(
                "PACT_MODE enabled but API Management endpoint not configured. \
                Set APIM_POLICY_ENDPOINT environment variable.",
            )?;
            validate_pact_endpoint(&endpoint)?;
            endpoint
        } else {
            lookup("ARM_ENDPOINT").unwrap_or_else(|| DEFAULT_ARM_ENDPOINT.to_string())
        };
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let token_scope = lookup("ARM_TOKEN_SCOPE").unwrap_or_else(|| {
            if pact_mode {
                format!("{DEFAULT_ARM_ENDPOINT}/.default")
            } else {
                format!("{endpoint}/.default")
            }
        });

        let auth = match lookup("AZURE_CLIENT_ID").filter(|id| !id.is_empty()) {
            Some(client_id) => AzureAuth::WorkloadIdentity { client_id },
            None => AzureAuth::ManagedIdentity,
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            subscription_id: lookup("AZURE_SUBSCRIPTION_ID").filter(|s| !s.is_empty()),
            endpoint,
            token_scope,
            api_version: lookup("APIM_API_VERSION")
                .unwrap_or_else(|| DEFAULT_APIM_API_VERSION.to_string()),
            auth,
            pact_mode,
            timeouts: ResourceTimeouts {
                create: lookup_secs(&lookup, "APIM_CREATE_TIMEOUT_SECS", DEFAULT_CREATE_TIMEOUT_SECS),
                read: lookup_secs(&lookup, "APIM_READ_TIMEOUT_SECS", DEFAULT_READ_TIMEOUT_SECS),
                update: lookup_secs(&lookup, "APIM_UPDATE_TIMEOUT_SECS", DEFAULT_UPDATE_TIMEOUT_SECS),
                delete: lookup_secs(&lookup, "APIM_DELETE_TIMEOUT_SECS", DEFAULT_DELETE_TIMEOUT_SECS),
            },
            log_format,
        })
    }
}

/// Refuse production endpoints while Pact mode is on
fn validate_pact_endpoint(endpoint: &str) -> Result<()> {
    if endpoint.contains("management.azure.com") {
        return Err(anyhow::anyhow!(
            "PACT_MODE enabled but endpoint '{endpoint}' points to production Azure. \
            This is not allowed in Pact mode. Use a mock server endpoint instead."
        ));
    }

    let looks_like_mock = endpoint.starts_with("http://localhost")
        || endpoint.starts_with("http://127.0.0.1")
        || endpoint.starts_with("http://[::1]")
        || endpoint.contains("pact")
        || endpoint.contains("mock");

    if !looks_like_mock {
        warn!(
            "PACT_MODE enabled but endpoint '{}' does not appear to be a mock server. \
            Verify this is correct and not pointing to production Azure.",
            endpoint
        );
    }

    Ok(())
}

fn lookup_secs<F>(lookup: &F, key: &str, default: u64) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_secs(
        lookup(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

fn lookup_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}
