use super::{ClusterGateway, GatewayError, SelectorPatch};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::{debug, error};

const DEPLOYMENT: &str = "Deployment";
const SERVICE: &str = "Service";
const ENDPOINTS: &str = "Endpoints";

/// Translate kube errors into gateway errors
///
/// 404 and 409 become typed variants so callers can tell a missing object
/// or a name collision apart from transport/auth failures. Server-side 5xx
/// responses are reported as `Unavailable`.
fn classify(err: kube::Error, kind: &'static str, name: &str) -> GatewayError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => GatewayError::NotFound {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 409 => GatewayError::Conflict {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code >= 500 => {
            error!(code = resp.code, kind = kind, name = %name, "Kubernetes API server error");
            GatewayError::Unavailable(resp.message.clone())
        }
        other => {
            error!(error = ?other, kind = kind, name = %name, "Kubernetes API call failed");
            GatewayError::Kube(other)
        }
    }
}

/// Gateway backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeGateway {
    deployments: Api<Deployment>,
    services: Api<Service>,
    endpoints: Api<Endpoints>,
    namespace: String,
}

impl KubeGateway {
    pub fn new(client: Client, namespace: &str) -> Self {
        KubeGateway {
            deployments: Api::namespaced(client.clone(), namespace),
            services: Api::namespaced(client.clone(), namespace),
            endpoints: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn list_workloads(&self, label_selector: &str) -> Result<Vec<Deployment>, GatewayError> {
        let params = ListParams::default().labels(label_selector);
        let list = self
            .deployments
            .list(&params)
            .await
            .map_err(|e| classify(e, DEPLOYMENT, label_selector))?;

        debug!(
            namespace = %self.namespace,
            selector = %label_selector,
            count = list.items.len(),
            "Listed Deployments"
        );
        Ok(list.items)
    }

    async fn get_workload(&self, name: &str) -> Result<Deployment, GatewayError> {
        self.deployments
            .get(name)
            .await
            .map_err(|e| classify(e, DEPLOYMENT, name))
    }

    async fn create_workload(&self, workload: &Deployment) -> Result<Deployment, GatewayError> {
        let name = workload.metadata.name.as_deref().unwrap_or_default();
        self.deployments
            .create(&PostParams::default(), workload)
            .await
            .map_err(|e| classify(e, DEPLOYMENT, name))
    }

    async fn get_routing_service(&self, name: &str) -> Result<Service, GatewayError> {
        self.services
            .get(name)
            .await
            .map_err(|e| classify(e, SERVICE, name))
    }

    async fn patch_routing_service_selector(
        &self,
        name: &str,
        patch: &SelectorPatch,
    ) -> Result<Service, GatewayError> {
        let body = patch.to_merge_patch();
        debug!(service = %name, patch = %body, "Patching Service selector");

        self.services
            .patch(name, &PatchParams::default(), &Patch::Merge(&body))
            .await
            .map_err(|e| classify(e, SERVICE, name))
    }

    async fn get_endpoint_set(&self, name: &str) -> Result<Endpoints, GatewayError> {
        self.endpoints
            .get(name)
            .await
            .map_err(|e| classify(e, ENDPOINTS, name))
    }
}
