//! Cluster Resource Gateway
//!
//! The only seam between kanari and the Kubernetes API. Every call is scoped
//! to the single namespace the gateway was built for.
//!
//! Production code uses `KubeGateway` which talks to the API server through kube-rs.
//! Tests use `MockGateway` which keeps objects in memory and simulates the
//! endpoints controller.

mod client;
#[cfg(test)]
pub mod mock;

pub use client::KubeGateway;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name} already exists")]
    Conflict { kind: &'static str, name: String },

    #[error("Kubernetes API unavailable: {0}")]
    Unavailable(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
}

/// A single change to a Service's label selector
///
/// Kept as a tagged variant over one selector key; it is turned into the
/// API server's patch format only at the gateway boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorPatch {
    /// Set `key = value`, inserting the key if absent
    Add { key: String, value: String },
    /// Drop `key` from the selector (no-op if absent)
    Remove { key: String },
}

impl SelectorPatch {
    pub fn key(&self) -> &str {
        match self {
            SelectorPatch::Add { key, .. } | SelectorPatch::Remove { key } => key,
        }
    }

    /// JSON merge patch (RFC 7386) body for `spec.selector`
    ///
    /// A `null` value deletes the key, which makes `Remove` idempotent
    /// on the API server side.
    pub fn to_merge_patch(&self) -> serde_json::Value {
        let value = match self {
            SelectorPatch::Add { value, .. } => json!(value),
            SelectorPatch::Remove { .. } => serde_json::Value::Null,
        };
        let mut selector = serde_json::Map::new();
        selector.insert(self.key().to_string(), value);

        json!({
            "spec": {
                "selector": selector
            }
        })
    }

    /// Apply the patch to an in-memory selector
    pub fn apply(&self, selector: &mut BTreeMap<String, String>) {
        match self {
            SelectorPatch::Add { key, value } => {
                selector.insert(key.clone(), value.clone());
            }
            SelectorPatch::Remove { key } => {
                selector.remove(key);
            }
        }
    }
}

/// Namespace-scoped access to Deployments, Services and Endpoints
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// List Deployments matching a label selector (e.g. `app=nginx`)
    ///
    /// Items come back in the API server's order.
    async fn list_workloads(&self, label_selector: &str) -> Result<Vec<Deployment>, GatewayError>;

    async fn get_workload(&self, name: &str) -> Result<Deployment, GatewayError>;

    async fn create_workload(&self, workload: &Deployment) -> Result<Deployment, GatewayError>;

    async fn get_routing_service(&self, name: &str) -> Result<Service, GatewayError>;

    async fn patch_routing_service_selector(
        &self,
        name: &str,
        patch: &SelectorPatch,
    ) -> Result<Service, GatewayError>;

    async fn get_endpoint_set(&self, name: &str) -> Result<Endpoints, GatewayError>;
}
