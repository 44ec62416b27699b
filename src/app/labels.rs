//! Label and annotation convention shared with the cluster
//!
//! These keys are the whole contract: a Deployment belongs to kanari only if
//! it carries the marker annotation and a track label.

use k8s_openapi::api::apps::v1::Deployment;
use tracing::debug;

/// Application grouping key on Deployments, pods and Service selectors
pub const APP_LABEL: &str = "app";

/// Track key partitioning an application's pods into routing groups
pub const TRACK_LABEL: &str = "track";

/// Track value of the primary release
pub const MAIN_TRACK: &str = "main";

/// Track value given to spawned canaries
pub const CANARY_TRACK: &str = "canary";

/// Opt-in marker annotation (boolean string)
pub const MANAGED_ANNOTATION: &str = "devops-tool-htmx";

/// Label selector matching every object of one application
pub fn app_selector(app: &str) -> String {
    format!("{}={}", APP_LABEL, app)
}

/// Check if `value` is a valid Kubernetes label value
///
/// At most 63 characters of `[A-Za-z0-9._-]`, starting and ending with an
/// alphanumeric. Application names are label values, so anything else
/// cannot name an application.
pub fn is_valid_label_value(value: &str) -> bool {
    let bytes = value.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= 63
                && first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        }
        _ => false,
    }
}

/// Parse a boolean string the way annotation values are conventionally written
///
/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
/// Anything else (including empty) is `None`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Get the track label of a Deployment, if set and non-empty
pub fn track_of(deployment: &Deployment) -> Option<&str> {
    deployment
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(TRACK_LABEL))
        .map(String::as_str)
        .filter(|track| !track.is_empty())
}

/// Check if a Deployment opted in to kanari
///
/// Requires the marker annotation to parse as `true` and a non-empty track
/// label. Missing or malformed markers exclude the Deployment silently.
pub fn is_managed(deployment: &Deployment) -> bool {
    let name = deployment.metadata.name.as_deref().unwrap_or_default();

    let marker = deployment
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(MANAGED_ANNOTATION));

    match marker.map(|value| parse_bool(value)) {
        Some(Some(true)) => {}
        Some(Some(false)) => {
            debug!(deployment = %name, "Skipping Deployment: marker annotation is false");
            return false;
        }
        Some(None) => {
            debug!(deployment = %name, "Skipping Deployment: malformed marker annotation");
            return false;
        }
        None => {
            debug!(deployment = %name, "Skipping Deployment: no marker annotation");
            return false;
        }
    }

    if track_of(deployment).is_none() {
        debug!(deployment = %name, "Skipping Deployment: no track label");
        return false;
    }

    true
}
