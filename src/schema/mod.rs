//! # Resource Schema
//!
//! Declares the configuration surface of the API policy resource: its fields,
//! their optionality and conflicts, the operation timeouts, and the importer
//! that validates externally supplied identifiers.
//!
//! ```yaml
//! resource_group_name: rg1
//! api_management_name: svc1
//! api_name: api1
//! xml_content: |
//!   <policies>
//!     <inbound><base /></inbound>
//!   </policies>
//! ```

pub mod diff;
pub mod validation;

use crate::constants::{
    DEFAULT_CREATE_TIMEOUT_SECS, DEFAULT_DELETE_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS,
    DEFAULT_UPDATE_TIMEOUT_SECS, RESOURCE_TYPE_NAME,
};
use crate::id::{ApiPolicyId, IdParseError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

pub use diff::xml_with_dotnet_interpolations_diff_suppress;
pub use validation::{ValidationError, ValidationErrors};

pub const FIELD_RESOURCE_GROUP_NAME: &str = "resource_group_name";
pub const FIELD_API_MANAGEMENT_NAME: &str = "api_management_name";
pub const FIELD_API_NAME: &str = "api_name";
pub const FIELD_XML_CONTENT: &str = "xml_content";
pub const FIELD_XML_LINK: &str = "xml_link";

/// Declarative configuration of one API policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ApiPolicyConfig {
    /// Resource group containing the API Management service
    pub resource_group_name: String,
    /// Name of the API Management service
    pub api_management_name: String,
    /// Name of the API the policy is attached to
    pub api_name: String,
    /// Inline policy XML. Conflicts with `xml_link`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml_content: Option<String>,
    /// URL the service downloads the policy XML from. Conflicts with `xml_content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml_link: Option<String>,
}

impl ApiPolicyConfig {
    /// Check every field; all problems are reported together
    ///
    /// # Errors
    /// Returns [`ValidationErrors`] listing each invalid or conflicting field.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if let Err(e) =
            validation::validate_resource_group_name(FIELD_RESOURCE_GROUP_NAME, &self.resource_group_name)
        {
            errors.push(e);
        }
        if let Err(e) =
            validation::validate_service_name(FIELD_API_MANAGEMENT_NAME, &self.api_management_name)
        {
            errors.push(e);
        }
        if let Err(e) = validation::validate_api_name(FIELD_API_NAME, &self.api_name) {
            errors.push(e);
        }

        let content = self.xml_content.as_deref().filter(|c| !c.is_empty());
        let link = self.xml_link.as_deref().filter(|l| !l.is_empty());
        if content.is_some() && link.is_some() {
            errors.push(ValidationError::Conflict {
                field: FIELD_XML_CONTENT,
                other: FIELD_XML_LINK,
            });
        }
        if let Some(link) = link {
            if let Err(e) = validation::validate_xml_link(FIELD_XML_LINK, link) {
                errors.push(e);
            }
        }

        errors.into_result()
    }
}

/// Per-operation deadlines enforced around each entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceTimeouts {
    #[serde(serialize_with = "as_secs")]
    pub create: Duration,
    #[serde(serialize_with = "as_secs")]
    pub read: Duration,
    #[serde(serialize_with = "as_secs")]
    pub update: Duration,
    #[serde(serialize_with = "as_secs")]
    pub delete: Duration,
}

impl Default for ResourceTimeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(DEFAULT_CREATE_TIMEOUT_SECS),
            read: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            update: Duration::from_secs(DEFAULT_UPDATE_TIMEOUT_SECS),
            delete: Duration::from_secs(DEFAULT_DELETE_TIMEOUT_SECS),
        }
    }
}

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
}

/// Declaration of one configuration field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    pub optional: bool,
    /// Filled in from the remote when not configured
    pub computed: bool,
    /// Changing the value replaces the resource
    pub force_new: bool,
    #[serde(skip_serializing_if = "no_conflicts")]
    pub conflicts_with: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_suppress: Option<&'static str>,
}

#[allow(
    clippy::trivially_copy_pass_by_ref,
    reason = "serde passes skip_serializing_if arguments by reference"
)]
fn no_conflicts(conflicts: &&'static [&'static str]) -> bool {
    conflicts.is_empty()
}

impl FieldSchema {
    const fn key(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::String,
            required: true,
            optional: false,
            computed: false,
            force_new: true,
            conflicts_with: &[],
            diff_suppress: None,
        }
    }
}

/// Declaration of the whole resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSchema {
    pub type_name: &'static str,
    pub fields: Vec<FieldSchema>,
    pub timeouts: ResourceTimeouts,
}

impl ResourceSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Schema of the API policy resource
pub fn resource_schema() -> ResourceSchema {
    ResourceSchema {
        type_name: RESOURCE_TYPE_NAME,
        fields: vec![
            FieldSchema::key(FIELD_RESOURCE_GROUP_NAME),
            FieldSchema::key(FIELD_API_MANAGEMENT_NAME),
            FieldSchema::key(FIELD_API_NAME),
            FieldSchema {
                name: FIELD_XML_CONTENT,
                field_type: FieldType::String,
                required: false,
                optional: true,
                computed: true,
                force_new: false,
                conflicts_with: &[FIELD_XML_LINK],
                diff_suppress: Some("xml_with_dotnet_interpolations"),
            },
            FieldSchema {
                name: FIELD_XML_LINK,
                field_type: FieldType::String,
                required: false,
                optional: true,
                computed: false,
                force_new: false,
                conflicts_with: &[FIELD_XML_CONTENT],
                diff_suppress: None,
            },
        ],
        timeouts: ResourceTimeouts::default(),
    }
}

/// JSON Schema of [`ApiPolicyConfig`]
pub fn config_json_schema() -> schemars::Schema {
    schemars::schema_for!(ApiPolicyConfig)
}

/// Validate an identifier supplied for import, before any network call
///
/// # Errors
/// Returns the codec's [`IdParseError`] unchanged.
pub fn validate_import_id(id: &str) -> Result<ApiPolicyId, IdParseError> {
    ApiPolicyId::parse(id)
}
