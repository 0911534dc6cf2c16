//! # Management Credentials
//!
//! Builds the `TokenCredential` used to authenticate against Azure Resource
//! Manager, and a mock credential for Pact testing.

use crate::config::{AzureAuth, ProviderConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use azure_core::credentials::{AccessToken, Secret, TokenCredential, TokenRequestOptions};
use azure_identity::{ManagedIdentityCredential, WorkloadIdentityCredential};
use std::sync::Arc;
use tracing::{debug, info};

/// Mock TokenCredential for Pact testing
/// Returns a dummy token without attempting real Azure authentication
#[derive(Debug)]
pub struct MockTokenCredential;

#[async_trait]
impl TokenCredential for MockTokenCredential {
    async fn get_token(
        &self,
        _scopes: &[&str],
        _options: Option<TokenRequestOptions<'_>>,
    ) -> azure_core::Result<AccessToken> {
        use typespec_client_core::time::{Duration, OffsetDateTime};

        Ok(AccessToken::new(
            Secret::new("test-token".to_string()),
            OffsetDateTime::now_utc() + Duration::seconds(3600),
        ))
    }
}

/// Build the credential for the configured authentication method
///
/// # Errors
/// Returns an error if the Azure identity credential cannot be created.
pub fn build_credential(config: &ProviderConfig) -> Result<Arc<dyn TokenCredential>> {
    if config.pact_mode {
        debug!("Pact mode: using mock Azure credential");
        return Ok(Arc::new(MockTokenCredential));
    }

    let credential: Arc<dyn TokenCredential> = match &config.auth {
        AzureAuth::WorkloadIdentity { client_id } => {
            info!(
                "Using Azure Workload Identity authentication with client ID: {}",
                client_id
            );
            let options = azure_identity::WorkloadIdentityCredentialOptions {
                client_id: Some(client_id.clone()),
                ..Default::default()
            };
            WorkloadIdentityCredential::new(Some(options))
                .context("Failed to create WorkloadIdentityCredential")?
        }
        AzureAuth::ManagedIdentity => {
            info!("No client ID configured, using Managed Identity");
            ManagedIdentityCredential::new(None)
                .context("Failed to create ManagedIdentityCredential")?
        }
    };

    Ok(credential)
}
