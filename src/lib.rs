//! # APIM Policy Provider
//!
//! Declarative management of the policy document attached to an API in an
//! Azure API Management service.
//!
//! The library is split into:
//!
//! - [`schema`] - configuration surface, validation, diff suppression, importer
//! - [`id`] - the resource identifier codec
//! - [`client`] - the management API client ([`client::ApiPolicyClient`])
//! - [`reconciler`] - create-or-update, read and delete
//! - [`state`] - per-resource state persisted between invocations
//! - [`config`] and [`observability`] - process configuration, logging, metrics
//!
//! Tests are included in the module files.

pub mod client;
pub mod config;
pub mod constants;
pub mod id;
pub mod observability;
pub mod reconciler;
pub mod schema;
pub mod state;

pub use client::{ApiPolicyClient, ClientError, RestApiPolicyClient};
pub use config::ProviderConfig;
pub use id::{ApiPolicyId, IdParseError};
pub use reconciler::{ApiPolicyReconciler, ReconcileError};
pub use schema::{ApiPolicyConfig, ResourceTimeouts};
pub use state::ResourceData;
