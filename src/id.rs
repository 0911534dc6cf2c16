//! # API Policy Identifier
//!
//! Parses and formats the ARM resource identifier of an API policy:
//!
//! ```text
//! /subscriptions/{subscriptionId}/resourceGroups/{resourceGroup}/providers/Microsoft.ApiManagement/service/{serviceName}/apis/{apiName}/policies/{policyName}
//! ```
//!
//! The identifier is the only handle persisted between invocations, so parse
//! errors are surfaced to callers verbatim.

use crate::constants::API_POLICY_NAME;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

const PROVIDER_NAMESPACE: &str = "Microsoft.ApiManagement";

/// Errors produced while parsing an API policy identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("ID was empty")]
    Empty,

    #[error("the number of segments in ID {0:?} is not divisible by 2")]
    OddSegments(String),

    #[error("ID contained more than one `{0}` element")]
    DuplicateSegment(String),

    #[error("ID was missing the `{0}` element")]
    MissingSegment(&'static str),

    #[error("ID has an empty value for the `{0}` element")]
    EmptySegment(&'static str),

    #[error("ID has a relative path value for the `{0}` element")]
    DotSegment(&'static str),

    #[error("ID has provider {0:?}, expected \"Microsoft.ApiManagement\"")]
    WrongProvider(String),

    #[error("ID contained unexpected segments: {0}")]
    UnexpectedSegments(String),
}

/// Identifier of the policy document attached to one API
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiPolicyId {
    pub subscription_id: String,
    pub resource_group: String,
    pub service_name: String,
    pub api_name: String,
    pub name: String,
}

impl ApiPolicyId {
    /// Build the identifier for an API's policy (policy name is always `policy`)
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        service_name: impl Into<String>,
        api_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            service_name: service_name.into(),
            api_name: api_name.into(),
            name: API_POLICY_NAME.to_string(),
        }
    }

    /// Parse an identifier string
    ///
    /// # Errors
    /// Returns an [`IdParseError`] describing the first malformed element.
    pub fn parse(input: &str) -> Result<Self, IdParseError> {
        let trimmed = input.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(IdParseError::Empty);
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.len() % 2 != 0 {
            return Err(IdParseError::OddSegments(input.to_string()));
        }

        let mut components: HashMap<&str, &str> = HashMap::new();
        for pair in segments.chunks(2) {
            let (key, value) = (pair[0], pair[1]);
            if components.insert(key, value).is_some() {
                return Err(IdParseError::DuplicateSegment(key.to_string()));
            }
        }

        let subscription_id = pop_segment(&mut components, "subscriptions")?;
        // ARM hands back both casings depending on the API that produced the ID
        let resource_group = match components.remove("resourcegroups") {
            Some(value) if !components.contains_key("resourceGroups") => {
                non_empty(value, "resourceGroups")?
            }
            Some(_) => return Err(IdParseError::DuplicateSegment("resourceGroups".into())),
            None => pop_segment(&mut components, "resourceGroups")?,
        };

        let provider = pop_segment(&mut components, "providers")?;
        if !provider.eq_ignore_ascii_case(PROVIDER_NAMESPACE) {
            return Err(IdParseError::WrongProvider(provider));
        }

        let service_name = pop_segment(&mut components, "service")?;
        let api_name = pop_segment(&mut components, "apis")?;
        let name = pop_segment(&mut components, "policies")?;

        if !components.is_empty() {
            let mut leftover: Vec<String> = components
                .iter()
                .map(|(k, v)| format!("{k}/{v}"))
                .collect();
            leftover.sort();
            return Err(IdParseError::UnexpectedSegments(leftover.join(", ")));
        }

        Ok(Self {
            subscription_id,
            resource_group,
            service_name,
            api_name,
            name,
        })
    }

    /// Path segments of the canonical ARM path, unencoded
    pub fn path_segments(&self) -> [&str; 12] {
        [
            "subscriptions",
            &self.subscription_id,
            "resourceGroups",
            &self.resource_group,
            "providers",
            PROVIDER_NAMESPACE,
            "service",
            &self.service_name,
            "apis",
            &self.api_name,
            "policies",
            &self.name,
        ]
    }

    /// Render the canonical ARM path for this policy
    pub fn id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/service/{}/apis/{}/policies/{}",
            self.subscription_id,
            self.resource_group,
            PROVIDER_NAMESPACE,
            self.service_name,
            self.api_name,
            self.name
        )
    }
}

impl fmt::Display for ApiPolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Api Policy: (Policy Name {:?} / Api Name {:?} / Service Name {:?} / Resource Group {:?})",
            self.name, self.api_name, self.service_name, self.resource_group
        )
    }
}

impl std::str::FromStr for ApiPolicyId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn pop_segment(
    components: &mut HashMap<&str, &str>,
    key: &'static str,
) -> Result<String, IdParseError> {
    let value = components
        .remove(key)
        .ok_or(IdParseError::MissingSegment(key))?;
    non_empty(value, key)
}

fn non_empty(value: &str, key: &'static str) -> Result<String, IdParseError> {
    match value {
        "" => Err(IdParseError::EmptySegment(key)),
        "." | ".." => Err(IdParseError::DotSegment(key)),
        _ => Ok(value.to_string()),
    }
}
