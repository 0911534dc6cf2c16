//! # Constants
//!
//! Shared constants used throughout the provider.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default Azure Resource Manager endpoint (public cloud)
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

/// API Management REST API version used for policy operations
pub const DEFAULT_APIM_API_VERSION: &str = "2021-08-01";

/// Name of the single policy document attached to an API
pub const API_POLICY_NAME: &str = "policy";

/// Resource type name reported in "already exists" errors
pub const RESOURCE_TYPE_NAME: &str = "azurerm_api_management_api_policy";

/// Default create timeout (seconds)
pub const DEFAULT_CREATE_TIMEOUT_SECS: u64 = 30 * 60;

/// Default read timeout (seconds)
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5 * 60;

/// Default update timeout (seconds)
pub const DEFAULT_UPDATE_TIMEOUT_SECS: u64 = 30 * 60;

/// Default delete timeout (seconds)
pub const DEFAULT_DELETE_TIMEOUT_SECS: u64 = 30 * 60;

/// Maximum length of a resource group name
pub const MAX_RESOURCE_GROUP_NAME_LEN: usize = 90;

/// Maximum length of an API Management API name
pub const MAX_API_NAME_LEN: usize = 256;

/// Default tracing filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "apim_policy_provider=info,apim_policy=info";
