use super::context::{cancellable, Context};
use super::error::AppError;
use super::labels::{APP_LABEL, CANARY_TRACK, MANAGED_ANNOTATION, TRACK_LABEL};
use super::state::{workload_from_deployment, Workload};
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Replace the tag of an image reference
///
/// Splits on the first `:` and keeps everything before it, so
/// `nginx:1.25.0-alpine` + `beta` gives `nginx:beta` and an untagged
/// `myimage` + `v2` gives `myimage:v2`.
pub fn override_image_tag(image: &str, tag: &str) -> String {
    let repo = image.split_once(':').map(|(repo, _)| repo).unwrap_or(image);
    format!("{}:{}", repo, tag)
}

/// Name of a canary Deployment: `{app}-canary-{token}`
pub fn canary_name(app: &str, token: &str) -> String {
    format!("{}-{}-{}", app, CANARY_TRACK, token)
}

/// Build the canary Deployment from the primary
///
/// The whole primary spec is inherited. Overrides:
/// - Name and labels: `app={app}`, `track=canary`, marker annotation `true`
/// - `spec.selector.matchLabels.track` and pod template `track` label: `canary`
/// - `spec.replicas`: `replicas`
/// - First container image: tag replaced with `tag`
///
/// The three track labels must agree or the API server rejects the
/// Deployment for a selector/template mismatch.
///
/// # Errors
/// Returns MalformedWorkload if the primary declares no containers
pub fn build_canary_deployment(
    primary: &Deployment,
    app: &str,
    name: String,
    tag: &str,
    replicas: i32,
) -> Result<Deployment, AppError> {
    let primary_name = primary.metadata.name.clone().unwrap_or_default();
    let mut spec = primary
        .spec
        .clone()
        .ok_or_else(|| AppError::MalformedWorkload(primary_name.clone()))?;

    let container = spec
        .template
        .spec
        .as_mut()
        .and_then(|pod| pod.containers.first_mut())
        .ok_or_else(|| AppError::MalformedWorkload(primary_name.clone()))?;
    let image = override_image_tag(container.image.as_deref().unwrap_or_default(), tag);
    container.image = Some(image);

    spec.replicas = Some(replicas);

    spec.selector
        .match_labels
        .get_or_insert_with(BTreeMap::new)
        .insert(TRACK_LABEL.to_string(), CANARY_TRACK.to_string());

    spec.template
        .metadata
        .get_or_insert_with(ObjectMeta::default)
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(TRACK_LABEL.to_string(), CANARY_TRACK.to_string());

    let mut labels = primary.metadata.labels.clone().unwrap_or_default();
    labels.insert(APP_LABEL.to_string(), app.to_string());
    labels.insert(TRACK_LABEL.to_string(), CANARY_TRACK.to_string());

    let annotations = BTreeMap::from([(MANAGED_ANNOTATION.to_string(), "true".to_string())]);

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(spec),
        status: None,
    })
}

/// Spawn a canary Deployment derived from the application's primary
///
/// Fetches the Deployment named `app`, builds the canary and creates it.
/// Does not wait for the canary to become ready. A name collision is
/// returned as a gateway conflict; the caller may retry.
pub async fn spawn_canary(
    ctx: &Context,
    app: &str,
    tag: &str,
    replicas: i32,
    cancel: &CancellationToken,
) -> Result<Workload, AppError> {
    if tag.is_empty() {
        return Err(AppError::InvalidTag);
    }

    let primary = cancellable(cancel, ctx.gateway.get_workload(app)).await?;

    let name = canary_name(app, &ctx.names.generate());
    let canary = build_canary_deployment(&primary, app, name, tag, replicas)?;

    info!(
        app = %app,
        canary = ?canary.metadata.name,
        tag = %tag,
        replicas = replicas,
        "Creating canary Deployment"
    );

    let created = cancellable(cancel, ctx.gateway.create_workload(&canary)).await?;
    let workload = workload_from_deployment(&created)?;

    info!(
        app = %app,
        canary = %workload.name,
        image = %workload.image,
        "Canary Deployment created"
    );

    Ok(workload)
}
