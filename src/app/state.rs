use super::context::{cancellable, Context};
use super::error::AppError;
use super::labels::{app_selector, is_managed, track_of, APP_LABEL, MAIN_TRACK, TRACK_LABEL};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Endpoints;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Replica count Kubernetes assumes when `spec.replicas` is unset
const DEFAULT_REPLICAS: i32 = 1;

/// One Deployment as seen by kanari
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub name: String,
    pub image: String,
    pub track: String,
    pub replicas: i32,
    pub available_replicas: i32,
}

/// One reachable backend behind the application's Service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "targetPod")]
    pub target_instance: String,
    #[serde(rename = "ip")]
    pub address: String,
}

/// Aggregate view of one application, recomputed on every read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub canary_enabled: bool,
    pub deployments: Vec<Workload>,
    pub endpoints: Vec<Endpoint>,
}

/// Build a Workload from a Deployment
///
/// The image is taken from the first container; kanari assumes
/// single-container pods.
///
/// # Errors
/// Returns MalformedWorkload if the pod template declares no containers
pub fn workload_from_deployment(deployment: &Deployment) -> Result<Workload, AppError> {
    let name = deployment.metadata.name.clone().unwrap_or_default();
    let spec = deployment
        .spec
        .as_ref()
        .ok_or_else(|| AppError::MalformedWorkload(name.clone()))?;

    let container = spec
        .template
        .spec
        .as_ref()
        .and_then(|pod| pod.containers.first())
        .ok_or_else(|| AppError::MalformedWorkload(name.clone()))?;

    let available_replicas = deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);

    Ok(Workload {
        image: container.image.clone().unwrap_or_default(),
        track: track_of(deployment).unwrap_or_default().to_string(),
        replicas: spec.replicas.unwrap_or(DEFAULT_REPLICAS),
        available_replicas,
        name,
    })
}

/// Derive whether canary traffic is enabled from a Service selector
///
/// Only an explicit `track=main` pins traffic to the primary. A missing
/// selector, a missing `track` key, or any other value counts as enabled.
pub fn is_canary_enabled(selector: Option<&BTreeMap<String, String>>) -> bool {
    selector
        .and_then(|s| s.get(TRACK_LABEL))
        .map(|track| track != MAIN_TRACK)
        .unwrap_or(true)
}

/// Extract endpoints from the first subset of an Endpoints object
pub fn endpoints_from(endpoint_set: &Endpoints) -> Vec<Endpoint> {
    endpoint_set
        .subsets
        .as_ref()
        .and_then(|subsets| subsets.first())
        .and_then(|subset| subset.addresses.as_ref())
        .map(|addresses| {
            addresses
                .iter()
                .map(|address| Endpoint {
                    target_instance: address
                        .target_ref
                        .as_ref()
                        .and_then(|r| r.name.clone())
                        .unwrap_or_default(),
                    address: address.ip.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Read the current state of an application
///
/// Lists the application's Deployments, keeps the managed ones, then fetches
/// the Service and Endpoints named exactly `app`. Any failure aborts the
/// whole read; no partial state is returned.
pub async fn project_state(
    ctx: &Context,
    app: &str,
    cancel: &CancellationToken,
) -> Result<AppState, AppError> {
    let listed = cancellable(cancel, ctx.gateway.list_workloads(&app_selector(app))).await?;
    let total = listed.len();

    let deployments = listed
        .iter()
        .filter(|d| is_managed(d))
        .map(workload_from_deployment)
        .collect::<Result<Vec<_>, _>>()?;

    let (endpoint_set, service) = cancellable(
        cancel,
        futures::future::try_join(
            ctx.gateway.get_endpoint_set(app),
            ctx.gateway.get_routing_service(app),
        ),
    )
    .await?;

    let canary_enabled = is_canary_enabled(
        service
            .spec
            .as_ref()
            .and_then(|spec| spec.selector.as_ref()),
    );
    let endpoints = endpoints_from(&endpoint_set);

    debug!(
        app = %app,
        listed = total,
        managed = deployments.len(),
        endpoints = endpoints.len(),
        canary_enabled = canary_enabled,
        "Projected application state"
    );

    Ok(AppState {
        canary_enabled,
        deployments,
        endpoints,
    })
}

/// List the distinct application names found on Deployments
///
/// Any Deployment with an `app` label counts, managed or not. Names are
/// returned sorted.
pub async fn list_applications(
    ctx: &Context,
    cancel: &CancellationToken,
) -> Result<Vec<String>, AppError> {
    let listed = cancellable(cancel, ctx.gateway.list_workloads(APP_LABEL)).await?;

    let apps: BTreeSet<String> = listed
        .iter()
        .filter_map(|d| d.metadata.labels.as_ref()?.get(APP_LABEL).cloned())
        .filter(|app| !app.is_empty())
        .collect();

    Ok(apps.into_iter().collect())
}
