//! Common test utilities for Pact integration tests
//!
//! Provides rustls initialization and a provider configuration pointed at a
//! Pact mock server.

use apim_policy_provider::config::ProviderConfig;
use std::collections::HashMap;
use std::sync::Once;

pub const SUBSCRIPTION_ID: &str = "00000000-0000-0000-0000-000000000000";
pub const API_VERSION: &str = "2021-08-01";
pub const POLICY_PATH: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg1/providers/Microsoft.ApiManagement/service/svc1/apis/api1/policies/policy";

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Must run before any request is made; only the first call has an effect.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

/// Base URL of a mock server without the trailing slash
pub fn base_url(url: &impl ToString) -> String {
    let mut base_url = url.to_string();
    if base_url.ends_with('/') {
        base_url.pop();
    }
    base_url
}

/// Provider configuration in Pact mode against `endpoint`
pub fn pact_config(endpoint: &str) -> ProviderConfig {
    let env: HashMap<&str, String> = HashMap::from([
        ("PACT_MODE", "true".to_string()),
        ("APIM_POLICY_ENDPOINT", endpoint.to_string()),
        ("AZURE_SUBSCRIPTION_ID", SUBSCRIPTION_ID.to_string()),
    ]);
    ProviderConfig::from_lookup(|key| env.get(key).cloned())
        .expect("Pact configuration should be valid")
}
