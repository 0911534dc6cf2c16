//! # Policy Wire Models
//!
//! Request and response bodies of the API Management policy REST API.

use serde::{Deserialize, Serialize};

/// Format of the policy `value` submitted to the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyContentFormat {
    #[serde(rename = "xml")]
    Xml,
    #[serde(rename = "xml-link")]
    XmlLink,
    #[serde(rename = "rawxml")]
    RawXml,
    #[serde(rename = "rawxml-link")]
    RawXmlLink,
}

/// Format the service uses when exporting a policy on read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyExportFormat {
    Xml,
    RawXml,
}

impl PolicyExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::RawXml => "rawxml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyContractProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<PolicyContentFormat>,
}

/// Policy resource as returned by (and sent to) the management API
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyContract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PolicyContractProperties>,
}

impl PolicyContract {
    /// Remote identifier, treating an empty string as absent
    pub fn resource_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// The one way a policy document is specified on write
///
/// A link is fetched by the service and stored as content, so reads only
/// ever produce [`PolicyBody::InlineXml`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyBody {
    InlineXml(String),
    XmlLink(String),
}

impl PolicyBody {
    pub fn format(&self) -> PolicyContentFormat {
        match self {
            Self::InlineXml(_) => PolicyContentFormat::RawXml,
            Self::XmlLink(_) => PolicyContentFormat::RawXmlLink,
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Self::XmlLink(_))
    }
}

impl From<PolicyBody> for PolicyContract {
    fn from(body: PolicyBody) -> Self {
        let format = body.format();
        let value = match body {
            PolicyBody::InlineXml(value) | PolicyBody::XmlLink(value) => value,
        };
        Self {
            properties: Some(PolicyContractProperties {
                value: Some(value),
                format: Some(format),
            }),
            ..Self::default()
        }
    }
}

/// ARM error envelope: `{"error": {"code": "...", "message": "..."}}`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
