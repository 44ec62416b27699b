use super::context::{cancellable, sleep_cancellable, Context};
use super::error::AppError;
use super::labels::{MAIN_TRACK, TRACK_LABEL};
use super::state::{project_state, AppState, Endpoint, Workload};
use crate::gateway::SelectorPatch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Build the Service selector patch for a traffic mode
///
/// Enabled drops the `track` key so the Service matches every track;
/// disabled pins it to `track=main`.
pub fn traffic_patch(enabled: bool) -> SelectorPatch {
    if enabled {
        SelectorPatch::Remove {
            key: TRACK_LABEL.to_string(),
        }
    } else {
        SelectorPatch::Add {
            key: TRACK_LABEL.to_string(),
            value: MAIN_TRACK.to_string(),
        }
    }
}

/// Find the workload an endpoint's pod belongs to
///
/// Pods are named `{deployment}-{hash}-{suffix}`. The longest matching
/// Deployment name wins, so `nginx-canary-x-...` is not attributed to `nginx`.
pub fn owning_workload<'a>(endpoint: &Endpoint, workloads: &'a [Workload]) -> Option<&'a Workload> {
    workloads
        .iter()
        .filter(|w| {
            endpoint
                .target_instance
                .strip_prefix(w.name.as_str())
                .is_some_and(|rest| rest.starts_with('-'))
        })
        .max_by_key(|w| w.name.len())
}

/// Check if the endpoints reflect the requested traffic mode
///
/// - Disabled: the selector pins `main` and no endpoint belongs to a
///   non-main workload.
/// - Enabled: the selector matches all tracks and every non-main workload
///   with available replicas has at least one endpoint.
pub fn is_converged(state: &AppState, enabled: bool) -> bool {
    if state.canary_enabled != enabled {
        return false;
    }

    if enabled {
        state
            .deployments
            .iter()
            .filter(|w| w.track != MAIN_TRACK && w.available_replicas > 0)
            .all(|w| {
                state
                    .endpoints
                    .iter()
                    .any(|e| owning_workload(e, &state.deployments).map(|o| &o.name) == Some(&w.name))
            })
    } else {
        state.endpoints.iter().all(|e| {
            owning_workload(e, &state.deployments)
                .map(|o| o.track == MAIN_TRACK)
                .unwrap_or(true)
        })
    }
}

/// Enable or disable canary traffic for an application
///
/// Patches the selector of the Service named `app`, then waits for the
/// endpoints controller to catch up (see `TrafficTiming`) and returns the
/// resulting state. If the endpoints have not converged when the timeout
/// expires, the last state read is returned as is.
///
/// Patching to the mode already in effect is a no-op on the cluster.
pub async fn set_canary_traffic(
    ctx: &Context,
    app: &str,
    enabled: bool,
    cancel: &CancellationToken,
) -> Result<AppState, AppError> {
    let patch = traffic_patch(enabled);

    cancellable(
        cancel,
        ctx.gateway.patch_routing_service_selector(app, &patch),
    )
    .await?;
    let patched_at = Instant::now();

    info!(app = %app, enabled = enabled, patch = ?patch, "Service selector patched");

    sleep_cancellable(cancel, ctx.timing.settle_delay).await?;

    let mut polls = 1u32;
    loop {
        let state = project_state(ctx, app, cancel).await?;

        if is_converged(&state, enabled) {
            debug!(app = %app, polls = polls, "Endpoints converged");
            return Ok(state);
        }

        if patched_at.elapsed() >= ctx.timing.converge_timeout {
            warn!(
                app = %app,
                enabled = enabled,
                polls = polls,
                timeout_ms = ctx.timing.converge_timeout.as_millis() as u64,
                "Endpoints not converged before timeout, returning possibly stale state"
            );
            return Ok(state);
        }

        sleep_cancellable(cancel, ctx.timing.poll_interval).await?;
        polls += 1;
    }
}
