use super::error::AppError;
use super::names::{NameGenerator, RandomNames};
use crate::gateway::ClusterGateway;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Timing of the post-patch wait in the traffic switch
///
/// The endpoints controller applies a selector change asynchronously. After a
/// patch we wait `settle_delay`, then re-read every `poll_interval` until the
/// endpoints reflect the new selector or `converge_timeout` has passed since
/// the patch. A zero timeout degrades to a single read after `settle_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficTiming {
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub converge_timeout: Duration,
}

impl Default for TrafficTiming {
    fn default() -> Self {
        TrafficTiming {
            settle_delay: Duration::from_millis(100),
            poll_interval: Duration::from_millis(100),
            converge_timeout: Duration::from_secs(2),
        }
    }
}

/// Dependencies shared by every core operation
///
/// Holds no mutable state; each operation re-reads the cluster.
pub struct Context {
    pub gateway: Arc<dyn ClusterGateway>,
    pub names: Arc<dyn NameGenerator>,
    pub timing: TrafficTiming,
}

impl Context {
    /// Create a new Context with random canary names
    pub fn new(gateway: impl ClusterGateway + 'static, timing: TrafficTiming) -> Self {
        Context {
            gateway: Arc::new(gateway),
            names: Arc::new(RandomNames),
            timing,
        }
    }

    #[cfg(test)]
    pub fn new_mock(gateway: Arc<crate::gateway::mock::MockGateway>) -> Self {
        Context {
            gateway,
            names: Arc::new(super::names::FixedNames("gentle-otter".to_string())),
            timing: TrafficTiming {
                settle_delay: Duration::from_millis(1),
                poll_interval: Duration::from_millis(1),
                converge_timeout: Duration::from_millis(200),
            },
        }
    }
}

/// Run a gateway call unless `cancel` fires first
///
/// Cancellation drops the in-flight call and returns `AppError::Cancelled`.
pub async fn cancellable<T, E, F>(cancel: &CancellationToken, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<AppError>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = call => result.map_err(Into::into),
    }
}

/// Sleep for `duration`, returning early with `Cancelled` if `cancel` fires
pub async fn sleep_cancellable(
    cancel: &CancellationToken,
    duration: Duration,
) -> Result<(), AppError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
