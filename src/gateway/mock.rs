//! In-memory cluster for tests
//!
//! Stores Deployments and Services and derives Endpoints from them the way
//! the endpoints controller does: every available replica of a Deployment
//! becomes a pod carrying the pod template labels, and a Service's Endpoints
//! list the pods its selector matches. Selector patches can be made to
//! propagate with a lag of N endpoint reads.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{ClusterGateway, GatewayError, SelectorPatch};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
use k8s_openapi::api::core::v1::{
    Container, EndpointAddress, EndpointSubset, Endpoints, ObjectReference, PodSpec,
    PodTemplateSpec, Service, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Gateway operations, for failure injection and call assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MockOp {
    ListWorkloads,
    GetWorkload,
    CreateWorkload,
    GetService,
    PatchService,
    GetEndpoints,
}

/// Failure to inject for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    NotFound,
    Conflict,
    Unavailable,
    /// Never complete (for cancellation tests)
    Hang,
}

#[derive(Default)]
struct MockCluster {
    deployments: Vec<Deployment>,
    services: BTreeMap<String, Service>,
    missing_endpoints: BTreeSet<String>,
    endpoint_lag: usize,
    stale_endpoints: BTreeMap<String, (Endpoints, usize)>,
    failures: BTreeMap<MockOp, MockFailure>,
    calls: Vec<MockOp>,
    patches: Vec<(String, SelectorPatch)>,
}

pub struct MockGateway {
    cluster: Mutex<MockCluster>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        MockGateway {
            cluster: Mutex::new(MockCluster::default()),
        }
    }

    pub fn with_deployment(self, deployment: Deployment) -> Self {
        self.cluster.lock().unwrap().deployments.push(deployment);
        self
    }

    /// Add a Service (and its Endpoints) with the given selector
    pub fn with_service(self, name: &str, selector: &[(&str, &str)]) -> Self {
        self.cluster
            .lock()
            .unwrap()
            .services
            .insert(name.to_string(), service(name, selector));
        self
    }

    /// Make the Endpoints object of `name` absent
    pub fn without_endpoints(self, name: &str) -> Self {
        self.cluster
            .lock()
            .unwrap()
            .missing_endpoints
            .insert(name.to_string());
        self
    }

    /// Keep serving pre-patch Endpoints for `reads` reads after each patch
    pub fn with_endpoint_lag(self, reads: usize) -> Self {
        self.cluster.lock().unwrap().endpoint_lag = reads;
        self
    }

    pub fn fail(&self, op: MockOp, failure: MockFailure) {
        self.cluster.lock().unwrap().failures.insert(op, failure);
    }

    pub fn calls(&self) -> Vec<MockOp> {
        self.cluster.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, op: MockOp) -> usize {
        self.calls().iter().filter(|c| **c == op).count()
    }

    pub fn patches(&self) -> Vec<(String, SelectorPatch)> {
        self.cluster.lock().unwrap().patches.clone()
    }

    pub fn deployments(&self) -> Vec<Deployment> {
        self.cluster.lock().unwrap().deployments.clone()
    }

    pub fn selector(&self, service: &str) -> Option<BTreeMap<String, String>> {
        self.cluster
            .lock()
            .unwrap()
            .services
            .get(service)
            .and_then(|s| s.spec.as_ref())
            .and_then(|s| s.selector.clone())
    }

    /// Simulate the Deployment controller reporting ready replicas
    pub fn set_available(&self, name: &str, available: i32) {
        let mut cluster = self.cluster.lock().unwrap();
        if let Some(d) = cluster
            .deployments
            .iter_mut()
            .find(|d| d.metadata.name.as_deref() == Some(name))
        {
            d.status = Some(DeploymentStatus {
                available_replicas: Some(available),
                ..Default::default()
            });
        }
    }

    /// Record the call and return the injected failure, if any
    fn enter(&self, op: MockOp, name: &str) -> Option<(MockFailure, GatewayError)> {
        let mut cluster = self.cluster.lock().unwrap();
        cluster.calls.push(op);
        let failure = *cluster.failures.get(&op)?;
        let kind = match op {
            MockOp::ListWorkloads | MockOp::GetWorkload | MockOp::CreateWorkload => "Deployment",
            MockOp::GetService | MockOp::PatchService => "Service",
            MockOp::GetEndpoints => "Endpoints",
        };
        let err = match failure {
            MockFailure::NotFound | MockFailure::Hang => GatewayError::NotFound {
                kind,
                name: name.to_string(),
            },
            MockFailure::Conflict => GatewayError::Conflict {
                kind,
                name: name.to_string(),
            },
            MockFailure::Unavailable => {
                GatewayError::Unavailable("injected failure".to_string())
            }
        };
        Some((failure, err))
    }

    async fn check(&self, op: MockOp, name: &str) -> Result<(), GatewayError> {
        match self.enter(op, name) {
            None => Ok(()),
            Some((MockFailure::Hang, _)) => futures::future::pending().await,
            Some((_, err)) => Err(err),
        }
    }
}

impl MockCluster {
    /// Endpoints the controller would publish for a Service right now
    fn compute_endpoints(&self, name: &str) -> Endpoints {
        let selector = self
            .services
            .get(name)
            .and_then(|s| s.spec.as_ref())
            .and_then(|s| s.selector.clone())
            .unwrap_or_default();

        let mut addresses = Vec::new();
        for (index, deployment) in self.deployments.iter().enumerate() {
            let deployment_name = deployment.metadata.name.clone().unwrap_or_default();
            let pod_labels = deployment
                .spec
                .as_ref()
                .and_then(|s| s.template.metadata.as_ref())
                .and_then(|m| m.labels.clone())
                .unwrap_or_default();
            let matches = !selector.is_empty()
                && selector.iter().all(|(k, v)| pod_labels.get(k) == Some(v));
            if !matches {
                continue;
            }

            let available = deployment
                .status
                .as_ref()
                .and_then(|s| s.available_replicas)
                .unwrap_or(0);
            for replica in 0..available {
                addresses.push(EndpointAddress {
                    ip: format!("10.1.{}.{}", index, replica + 1),
                    target_ref: Some(ObjectReference {
                        kind: Some("Pod".to_string()),
                        name: Some(format!("{}-7d4b9c6f5-{}", deployment_name, replica)),
                        ..Default::default()
                    }),
                    ..Default::default()
                });
            }
        }

        let subsets = if addresses.is_empty() {
            None
        } else {
            Some(vec![EndpointSubset {
                addresses: Some(addresses),
                ..Default::default()
            }])
        };

        Endpoints {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            subsets,
        }
    }
}

/// Match `app=nginx,track` style selectors against labels
fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl ClusterGateway for MockGateway {
    async fn list_workloads(&self, label_selector: &str) -> Result<Vec<Deployment>, GatewayError> {
        self.check(MockOp::ListWorkloads, label_selector).await?;
        let cluster = self.cluster.lock().unwrap();
        Ok(cluster
            .deployments
            .iter()
            .filter(|d| {
                let labels = d.metadata.labels.clone().unwrap_or_default();
                selector_matches(label_selector, &labels)
            })
            .cloned()
            .collect())
    }

    async fn get_workload(&self, name: &str) -> Result<Deployment, GatewayError> {
        self.check(MockOp::GetWorkload, name).await?;
        let cluster = self.cluster.lock().unwrap();
        cluster
            .deployments
            .iter()
            .find(|d| d.metadata.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                kind: "Deployment",
                name: name.to_string(),
            })
    }

    async fn create_workload(&self, workload: &Deployment) -> Result<Deployment, GatewayError> {
        let name = workload.metadata.name.clone().unwrap_or_default();
        self.check(MockOp::CreateWorkload, &name).await?;
        let mut cluster = self.cluster.lock().unwrap();
        if cluster
            .deployments
            .iter()
            .any(|d| d.metadata.name.as_deref() == Some(name.as_str()))
        {
            return Err(GatewayError::Conflict {
                kind: "Deployment",
                name,
            });
        }
        let mut created = workload.clone();
        created.metadata.namespace = Some("default".to_string());
        cluster.deployments.push(created.clone());
        Ok(created)
    }

    async fn get_routing_service(&self, name: &str) -> Result<Service, GatewayError> {
        self.check(MockOp::GetService, name).await?;
        let cluster = self.cluster.lock().unwrap();
        cluster
            .services
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                kind: "Service",
                name: name.to_string(),
            })
    }

    async fn patch_routing_service_selector(
        &self,
        name: &str,
        patch: &SelectorPatch,
    ) -> Result<Service, GatewayError> {
        self.check(MockOp::PatchService, name).await?;
        let mut cluster = self.cluster.lock().unwrap();
        if !cluster.services.contains_key(name) {
            return Err(GatewayError::NotFound {
                kind: "Service",
                name: name.to_string(),
            });
        }

        if cluster.endpoint_lag > 0 {
            let snapshot = cluster.compute_endpoints(name);
            let lag = cluster.endpoint_lag;
            cluster
                .stale_endpoints
                .insert(name.to_string(), (snapshot, lag));
        }

        cluster.patches.push((name.to_string(), patch.clone()));
        let service = cluster.services.get_mut(name).expect("checked above");
        let spec = service.spec.get_or_insert_with(ServiceSpec::default);
        patch.apply(spec.selector.get_or_insert_with(BTreeMap::new));
        Ok(service.clone())
    }

    async fn get_endpoint_set(&self, name: &str) -> Result<Endpoints, GatewayError> {
        self.check(MockOp::GetEndpoints, name).await?;
        let mut cluster = self.cluster.lock().unwrap();
        if cluster.missing_endpoints.contains(name) || !cluster.services.contains_key(name) {
            return Err(GatewayError::NotFound {
                kind: "Endpoints",
                name: name.to_string(),
            });
        }

        if let Some((snapshot, remaining)) = cluster.stale_endpoints.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(snapshot.clone());
            }
        }
        cluster.stale_endpoints.remove(name);
        Ok(cluster.compute_endpoints(name))
    }
}

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Build a Service with the given selector
pub fn service(name: &str, selector: &[(&str, &str)]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(string_map(selector)),
            ..Default::default()
        }),
        status: None,
    }
}

/// Build a Deployment the way an operator would lay out a tracked release
///
/// Object labels, selector and pod template all carry `app` and, when given,
/// `track`. All `replicas` are reported available.
pub fn deployment(
    name: &str,
    app: &str,
    track: Option<&str>,
    marker: Option<&str>,
    image: &str,
    replicas: i32,
) -> Deployment {
    let mut labels = string_map(&[("app", app)]);
    if let Some(track) = track {
        labels.insert("track".to_string(), track.to_string());
    }
    let annotations = marker.map(|m| string_map(&[("devops-tool-htmx", m)]));

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            labels: Some(labels.clone()),
            annotations,
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: name.to_string(),
                        image: Some(image.to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: Some(DeploymentStatus {
            available_replicas: Some(replicas),
            ..Default::default()
        }),
    }
}

/// Managed primary Deployment named after the application
pub fn primary(app: &str, image: &str, replicas: i32) -> Deployment {
    deployment(app, app, Some("main"), Some("true"), image, replicas)
}

/// The `nginx` application: 3-replica primary pinned by its Service
pub fn nginx_cluster() -> MockGateway {
    MockGateway::new()
        .with_deployment(primary("nginx", "nginx:1.25.0-alpine", 3))
        .with_service("nginx", &[("app", "nginx"), ("track", "main")])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matches() {
        let labels = string_map(&[("app", "nginx"), ("track", "main")]);
        assert!(selector_matches("app=nginx", &labels));
        assert!(selector_matches("app", &labels));
        assert!(selector_matches("app=nginx,track=main", &labels));
        assert!(!selector_matches("app=redis", &labels));
        assert!(!selector_matches("tier", &labels));
    }

    #[tokio::test]
    async fn test_endpoints_follow_selector() {
        let gateway = nginx_cluster().with_deployment(deployment(
            "nginx-canary-a",
            "nginx",
            Some("canary"),
            Some("true"),
            "nginx:beta",
            1,
        ));

        let pinned = gateway.get_endpoint_set("nginx").await.unwrap();
        let addresses = pinned.subsets.unwrap()[0].addresses.clone().unwrap();
        assert_eq!(addresses.len(), 3);

        gateway
            .patch_routing_service_selector(
                "nginx",
                &SelectorPatch::Remove {
                    key: "track".to_string(),
                },
            )
            .await
            .unwrap();

        let split = gateway.get_endpoint_set("nginx").await.unwrap();
        let addresses = split.subsets.unwrap()[0].addresses.clone().unwrap();
        assert_eq!(addresses.len(), 4);
    }

    #[tokio::test]
    async fn test_endpoint_lag_serves_stale_snapshot() {
        let gateway = nginx_cluster()
            .with_deployment(deployment(
                "nginx-canary-a",
                "nginx",
                Some("canary"),
                Some("true"),
                "nginx:beta",
                1,
            ))
            .with_endpoint_lag(2);

        gateway
            .patch_routing_service_selector(
                "nginx",
                &SelectorPatch::Remove {
                    key: "track".to_string(),
                },
            )
            .await
            .unwrap();

        let count = |e: Endpoints| e.subsets.unwrap()[0].addresses.clone().unwrap().len();
        assert_eq!(count(gateway.get_endpoint_set("nginx").await.unwrap()), 3);
        assert_eq!(count(gateway.get_endpoint_set("nginx").await.unwrap()), 3);
        assert_eq!(count(gateway.get_endpoint_set("nginx").await.unwrap()), 4);
    }
}
