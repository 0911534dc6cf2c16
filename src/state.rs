//! # Resource State
//!
//! [`ResourceData`] holds the configuration fields of one API policy and its
//! opaque identifier between invocations. An empty identifier means the
//! policy is not tracked (never created, or removed upstream).
//!
//! Unset string fields are stored as empty strings, so "not configured" and
//! "configured as empty" are the same thing to the reconciler.

use crate::schema::ApiPolicyConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceData {
    #[serde(default)]
    id: String,
    #[serde(default)]
    resource_group_name: String,
    #[serde(default)]
    api_management_name: String,
    #[serde(default)]
    api_name: String,
    #[serde(default)]
    xml_content: String,
    #[serde(default)]
    xml_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    /// Set only while the first create of this resource is in flight
    #[serde(skip)]
    new_resource: bool,
}

impl ResourceData {
    /// State for a resource that is about to be created
    pub fn for_create(config: &ApiPolicyConfig) -> Self {
        Self {
            resource_group_name: config.resource_group_name.clone(),
            api_management_name: config.api_management_name.clone(),
            api_name: config.api_name.clone(),
            xml_content: config.xml_content.clone().unwrap_or_default(),
            xml_link: config.xml_link.clone().unwrap_or_default(),
            new_resource: true,
            ..Self::default()
        }
    }

    /// State for a resource being imported by identifier
    pub fn for_import(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Merge configuration into existing state ahead of an update
    ///
    /// `xml_content` is computed: leaving it out of the configuration keeps
    /// the value last read from the service. `xml_link` is not.
    pub fn apply_config(&mut self, config: &ApiPolicyConfig) {
        self.resource_group_name.clone_from(&config.resource_group_name);
        self.api_management_name.clone_from(&config.api_management_name);
        self.api_name.clone_from(&config.api_name);
        if let Some(content) = &config.xml_content {
            self.xml_content.clone_from(content);
        }
        self.xml_link = config.xml_link.clone().unwrap_or_default();
        self.new_resource = false;
    }

    /// Whether applying `config` would change a force-new key field
    pub fn key_changed(&self, config: &ApiPolicyConfig) -> bool {
        self.resource_group_name != config.resource_group_name
            || self.api_management_name != config.api_management_name
            || self.api_name != config.api_name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Drop the identifier: the resource is no longer tracked
    pub fn clear_id(&mut self) {
        self.id.clear();
    }

    pub fn is_tracked(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn is_new_resource(&self) -> bool {
        self.new_resource
    }

    pub fn set_new_resource(&mut self, new_resource: bool) {
        self.new_resource = new_resource;
    }

    pub fn resource_group_name(&self) -> &str {
        &self.resource_group_name
    }

    pub fn set_resource_group_name(&mut self, value: impl Into<String>) {
        self.resource_group_name = value.into();
    }

    pub fn api_management_name(&self) -> &str {
        &self.api_management_name
    }

    pub fn set_api_management_name(&mut self, value: impl Into<String>) {
        self.api_management_name = value.into();
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    pub fn set_api_name(&mut self, value: impl Into<String>) {
        self.api_name = value.into();
    }

    pub fn xml_content(&self) -> &str {
        &self.xml_content
    }

    pub fn set_xml_content(&mut self, value: impl Into<String>) {
        self.xml_content = value.into();
    }

    pub fn xml_link(&self) -> &str {
        &self.xml_link
    }

    pub fn set_xml_link(&mut self, value: impl Into<String>) {
        self.xml_link = value.into();
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Load state from a JSON file; a missing file means no state yet
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;
        let data = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse state file {}", path.display()))?;
        Ok(Some(data))
    }

    /// Persist state as JSON, replacing the file atomically
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Some(Utc::now());
        let text = serde_json::to_string_pretty(self).context("Failed to serialize state")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, text)
            .with_context(|| format!("Failed to write state file {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move state file into {}", path.display()))?;
        Ok(())
    }
}
