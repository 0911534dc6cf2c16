//! # API Policy Reconciler
//!
//! Maps the declarative configuration of an API policy onto the management
//! API. Each entry point handles one reconciliation cycle:
//!
//! - [`ApiPolicyReconciler::create_or_update`] - create (refusing to adopt an
//!   existing policy) or update, then refresh state
//! - [`ApiPolicyReconciler::read`] - refresh state; a vanished policy drops
//!   the stored identifier instead of failing
//! - [`ApiPolicyReconciler::delete`] - idempotent delete
//!
//! Every entry point races its work against the operation timeout and the
//! caller's cancellation token.

mod error;
#[cfg(test)]
mod tests;

pub use error::{PolicyKey, ReconcileError};

use crate::client::{ApiPolicyClient, PolicyBody, PolicyContract, PolicyExportFormat};
use crate::constants::RESOURCE_TYPE_NAME;
use crate::id::ApiPolicyId;
use crate::observability::metrics;
use crate::schema::ResourceTimeouts;
use crate::state::ResourceData;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reconciler entry point, used for timeouts, metrics labels and messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn timeout(self, timeouts: &ResourceTimeouts) -> Duration {
        match self {
            Self::Create => timeouts.create,
            Self::Read => timeouts.read,
            Self::Update => timeouts.update,
            Self::Delete => timeouts.delete,
        }
    }
}

/// Pick the policy document to submit; a link always wins over content
///
/// # Errors
/// Returns [`ReconcileError::MissingPolicyBody`] when both are empty.
pub fn select_policy_body(xml_content: &str, xml_link: &str) -> Result<PolicyBody, ReconcileError> {
    if !xml_link.is_empty() {
        Ok(PolicyBody::XmlLink(xml_link.to_string()))
    } else if !xml_content.is_empty() {
        Ok(PolicyBody::InlineXml(xml_content.to_string()))
    } else {
        Err(ReconcileError::MissingPolicyBody)
    }
}

fn policy_key(data: &ResourceData) -> PolicyKey {
    PolicyKey {
        resource_group: data.resource_group_name().to_string(),
        service_name: data.api_management_name().to_string(),
        api_name: data.api_name().to_string(),
    }
}

/// Drop the local link once an update has sent inline content
///
/// Nothing asks the service whether it still holds a link, so a link set
/// out of band stays invisible to later reads: reads never refresh
/// `xml_link`. Because a link always wins in [`select_policy_body`], this only
/// changes state that reached the reconciler with both fields set.
fn clear_superseded_link(data: &mut ResourceData, body: &PolicyBody) {
    if !data.is_new_resource() && !body.is_link() {
        data.set_xml_link("");
    }
}

/// Reconciler for the policy attached to one API
pub struct ApiPolicyReconciler {
    client: Arc<dyn ApiPolicyClient>,
    subscription_id: Option<String>,
    timeouts: ResourceTimeouts,
}

impl std::fmt::Debug for ApiPolicyReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiPolicyReconciler")
            .field("subscription_id", &self.subscription_id)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl ApiPolicyReconciler {
    pub fn new(
        client: Arc<dyn ApiPolicyClient>,
        subscription_id: Option<String>,
        timeouts: ResourceTimeouts,
    ) -> Self {
        Self {
            client,
            subscription_id,
            timeouts,
        }
    }

    /// Create the policy (when `data` is a new resource) or update it
    ///
    /// On success the stored identifier is the one reported by the service
    /// and every field has been refreshed by [`ApiPolicyReconciler::read`].
    ///
    /// # Errors
    /// See [`ReconcileError`]; nothing is sent when no policy body is set.
    pub async fn create_or_update(
        &self,
        data: &mut ResourceData,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        let operation = if data.is_new_resource() {
            Operation::Create
        } else {
            Operation::Update
        };
        self.guarded(operation, cancel, self.write_policy(data))
            .await
    }

    /// Refresh `data` from the service
    ///
    /// # Errors
    /// See [`ReconcileError`]. A policy that no longer exists is not an
    /// error: the identifier is cleared instead.
    pub async fn read(
        &self,
        data: &mut ResourceData,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        self.guarded(Operation::Read, cancel, self.read_policy(data))
            .await
    }

    /// Delete the policy; deleting a policy that is already gone succeeds
    ///
    /// # Errors
    /// See [`ReconcileError`].
    pub async fn delete(
        &self,
        data: &ResourceData,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        self.guarded(Operation::Delete, cancel, self.delete_policy(data))
            .await
    }

    async fn guarded<F>(
        &self,
        operation: Operation,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<(), ReconcileError>
    where
        F: Future<Output = Result<(), ReconcileError>>,
    {
        let after = operation.timeout(&self.timeouts);
        let start = Instant::now();
        metrics::increment_reconciliations(operation.as_str());

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ReconcileError::Cancelled {
                operation: operation.as_str(),
            }),
            outcome = tokio::time::timeout(after, work) => match outcome {
                Ok(result) => result,
                Err(_elapsed) => Err(ReconcileError::TimedOut {
                    operation: operation.as_str(),
                    after,
                }),
            },
        };

        metrics::observe_reconciliation_duration(operation.as_str(), start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::increment_reconciliation_errors(operation.as_str());
            warn!("API Policy {} failed: {}", operation.as_str(), e);
        }
        result
    }

    fn policy_id(&self, data: &ResourceData, key: &PolicyKey) -> Result<ApiPolicyId, ReconcileError> {
        // An existing resource keeps addressing the subscription it was created in
        let subscription_id = match ApiPolicyId::parse(data.id()) {
            Ok(existing) => existing.subscription_id,
            Err(_) => self
                .subscription_id
                .clone()
                .ok_or_else(|| ReconcileError::MissingSubscription { key: key.clone() })?,
        };
        Ok(ApiPolicyId::new(
            subscription_id,
            key.resource_group.clone(),
            key.service_name.clone(),
            key.api_name.clone(),
        ))
    }

    /// Resolve the policy a write of `data` would address, without calling
    /// the service
    ///
    /// # Errors
    /// Returns the error [`ApiPolicyReconciler::create_or_update`] would
    /// fail with before its first request.
    pub fn target(&self, data: &ResourceData) -> Result<ApiPolicyId, ReconcileError> {
        select_policy_body(data.xml_content(), data.xml_link())?;
        self.policy_id(data, &policy_key(data))
    }

    async fn write_policy(&self, data: &mut ResourceData) -> Result<(), ReconcileError> {
        let key = policy_key(data);

        let body = select_policy_body(data.xml_content(), data.xml_link())?;
        let id = self.policy_id(data, &key)?;

        if data.is_new_resource() {
            match self.client.get(&id, PolicyExportFormat::Xml).await {
                Ok(existing) => {
                    if let Some(existing_id) = existing.resource_id() {
                        return Err(ReconcileError::AlreadyExists {
                            resource_type: RESOURCE_TYPE_NAME,
                            id: existing_id.to_string(),
                        });
                    }
                }
                Err(e) if e.is_not_found() => {}
                Err(source) => {
                    return Err(ReconcileError::CheckingPresence { key, source });
                }
            }
        }
        clear_superseded_link(data, &body);

        info!(
            "Writing API Policy ({}) as {}",
            key,
            if body.is_link() { "xml_link" } else { "xml_content" }
        );
        let parameters = PolicyContract::from(body);
        self.client
            .create_or_update(&id, &parameters, None)
            .await
            .map_err(|source| ReconcileError::CreatingOrUpdating {
                key: key.clone(),
                source,
            })?;

        let written = self
            .client
            .get(&id, PolicyExportFormat::Xml)
            .await
            .map_err(|source| ReconcileError::Retrieving {
                key: key.clone(),
                source,
            })?;
        let Some(written_id) = written.resource_id() else {
            return Err(ReconcileError::MissingId { key });
        };
        data.set_id(written_id);

        self.read_policy(data).await
    }

    async fn read_policy(&self, data: &mut ResourceData) -> Result<(), ReconcileError> {
        let id = ApiPolicyId::parse(data.id())?;

        let policy = match self.client.get(&id, PolicyExportFormat::Xml).await {
            Ok(policy) => policy,
            Err(e) if e.is_not_found() => {
                debug!("{} was not found - removing from state!", id);
                metrics::increment_drift_detected();
                data.clear_id();
                return Ok(());
            }
            Err(source) => {
                return Err(ReconcileError::Reading {
                    id: id.to_string(),
                    source,
                });
            }
        };

        data.set_resource_group_name(id.resource_group.as_str());
        data.set_api_management_name(id.service_name.as_str());
        data.set_api_name(id.api_name.as_str());

        // A submitted link is downloaded and stored as content by the service,
        // so only xml_content can be refreshed; xml_link keeps its last value.
        if let Some(properties) = policy.properties {
            let content = properties
                .value
                .map(|value| html_escape::decode_html_entities(&value).into_owned())
                .unwrap_or_default();
            data.set_xml_content(content);
        }

        Ok(())
    }

    async fn delete_policy(&self, data: &ResourceData) -> Result<(), ReconcileError> {
        let id = ApiPolicyId::parse(data.id())?;

        info!("Deleting {}", id);
        match self.client.delete(&id, None).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("{} was already gone", id);
                Ok(())
            }
            Err(source) => Err(ReconcileError::Deleting {
                id: id.to_string(),
                source,
            }),
        }
    }
}
