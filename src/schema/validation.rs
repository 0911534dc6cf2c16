//! # Field Validation
//!
//! Validates configuration values against Azure naming rules before any
//! request is made:
//! - Resource group: https://learn.microsoft.com/en-us/rest/api/resources/resource-groups/create-or-update
//! - API Management service: https://learn.microsoft.com/en-us/azure/azure-resource-manager/management/resource-name-rules#microsoftapimanagement

use crate::constants::{MAX_API_NAME_LEN, MAX_RESOURCE_GROUP_NAME_LEN};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static RESOURCE_GROUP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-\w._()]+$")
        .expect("Failed to compile resource group regex - this should never happen")
});

static SERVICE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z](?:[a-zA-Z0-9-]{0,48}[a-zA-Z0-9])?$")
        .expect("Failed to compile service name regex - this should never happen")
});

static API_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^*#&+:<>?/]+$")
        .expect("Failed to compile API name regex - this should never happen")
});

/// A single invalid configuration value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be set")]
    Required { field: &'static str },

    #[error("{field} {value:?} is invalid: {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("\"{field}\": conflicts with {other}")]
    Conflict {
        field: &'static str,
        other: &'static str,
    },
}

/// Every problem found in one configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a resource group name
///
/// # Errors
/// Returns a [`ValidationError`] naming `field` when the value is not a valid
/// resource group name.
pub fn validate_resource_group_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Required { field });
    }
    let invalid = |reason| ValidationError::Invalid {
        field,
        value: value.to_string(),
        reason,
    };
    if value.chars().count() > MAX_RESOURCE_GROUP_NAME_LEN {
        return Err(invalid("may not exceed 90 characters in length"));
    }
    if value.ends_with('.') {
        return Err(invalid("may not end with a period"));
    }
    if !RESOURCE_GROUP_NAME.is_match(value) {
        return Err(invalid(
            "may only contain letters, digits, dash, underscores, parentheses and periods",
        ));
    }
    Ok(())
}

/// Validate an API Management service name
///
/// # Errors
/// Returns a [`ValidationError`] naming `field` when the value is not a valid
/// service name.
pub fn validate_service_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Required { field });
    }
    if !SERVICE_NAME.is_match(value) {
        return Err(ValidationError::Invalid {
            field,
            value: value.to_string(),
            reason: "must be 1-50 characters of letters, numbers and hyphens, start with a letter and end with a letter or number",
        });
    }
    Ok(())
}

/// Validate an API name (may carry a `;rev=N` revision suffix)
///
/// # Errors
/// Returns a [`ValidationError`] naming `field` when the value is not a valid
/// API name.
pub fn validate_api_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Required { field });
    }
    let invalid = |reason| ValidationError::Invalid {
        field,
        value: value.to_string(),
        reason,
    };
    if value.chars().count() > MAX_API_NAME_LEN {
        return Err(invalid("may not exceed 256 characters in length"));
    }
    if !API_NAME.is_match(value) {
        return Err(invalid(
            "may not contain '*', '#', '&', '+', ':', '<', '>', '?' or '/'",
        ));
    }
    if value == "." || value == ".." {
        return Err(invalid("may not be a relative path segment"));
    }
    if value.trim() != value {
        return Err(invalid("may not begin or end with whitespace"));
    }
    Ok(())
}

/// Validate that a policy link is an absolute http(s) URL
///
/// # Errors
/// Returns a [`ValidationError`] naming `field` when the value cannot be
/// fetched by the service.
pub fn validate_xml_link(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::Invalid {
        field,
        value: value.to_string(),
        reason,
    };
    match reqwest::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        Ok(_) => Err(invalid("must use the http or https scheme")),
        Err(_) => Err(invalid("must be an absolute URL")),
    }
}
