//! # Reconciler Errors

use crate::client::ClientError;
use crate::id::IdParseError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The three-part key of an API policy, for error messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyKey {
    pub resource_group: String,
    pub service_name: String,
    pub api_name: String,
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Resource Group {:?} / API Management Service {:?} / API {:?}",
            self.resource_group, self.service_name, self.api_name
        )
    }
}

/// Errors returned by the reconciler entry points
///
/// Every error ends the current invocation; nothing is retried locally.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Neither way of specifying the policy document was configured
    #[error("Either `xml_content` or `xml_link` must be set")]
    MissingPolicyBody,

    /// A policy already exists where a new one was about to be created
    #[error(
        "A resource with the ID {id:?} already exists - to be managed this resource needs to be \
        imported into the state. Please see the resource documentation for {resource_type:?} for \
        more information."
    )]
    AlreadyExists {
        resource_type: &'static str,
        id: String,
    },

    #[error("checking for presence of existing API Policy ({key}): {source}")]
    CheckingPresence {
        key: PolicyKey,
        #[source]
        source: ClientError,
    },

    #[error("creating or updating API Policy ({key}): {source}")]
    CreatingOrUpdating {
        key: PolicyKey,
        #[source]
        source: ClientError,
    },

    #[error("retrieving API Policy ({key}): {source}")]
    Retrieving {
        key: PolicyKey,
        #[source]
        source: ClientError,
    },

    #[error("Cannot read ID for API Policy ({key})")]
    MissingId { key: PolicyKey },

    #[error("making Read request for {id}: {source}")]
    Reading {
        id: String,
        #[source]
        source: ClientError,
    },

    #[error("deleting {id}: {source}")]
    Deleting {
        id: String,
        #[source]
        source: ClientError,
    },

    /// The stored identifier could not be parsed
    #[error(transparent)]
    InvalidId(#[from] IdParseError),

    #[error("a subscription ID is required to address API Policy ({key})")]
    MissingSubscription { key: PolicyKey },

    #[error("{operation} of API Policy timed out after {}s", after.as_secs())]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },

    #[error("{operation} of API Policy was cancelled")]
    Cancelled { operation: &'static str },
}
