//! Process configuration from environment variables
//!
//! - `KANARI_NAMESPACE` - namespace all cluster calls are scoped to (default: default)
//! - `KANARI_PORT` - HTTP listen port (default: 3000)
//! - `KANARI_SETTLE_DELAY_MS` - wait after a selector patch (default: 100)
//! - `KANARI_CONVERGE_TIMEOUT_MS` - bound on the endpoints convergence poll (default: 2000)
//! - `KANARI_POLL_INTERVAL_MS` - delay between convergence polls (default: 100)
//!
//! Cluster credentials are resolved by kube (`KUBECONFIG`, `~/.kube/config`,
//! or the in-cluster service account).

use crate::app::TrafficTiming;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_NAMESPACE: &str = "default";
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub namespace: String,
    pub port: u16,
    pub timing: TrafficTiming,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            namespace: DEFAULT_NAMESPACE.to_string(),
            port: DEFAULT_PORT,
            timing: TrafficTiming::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup (testable without touching env)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let namespace = lookup("KANARI_NAMESPACE")
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or(defaults.namespace);

        let millis = |key: &str, default: Duration| {
            let fallback = default.as_millis() as u64;
            Duration::from_millis(parse_or(&lookup, key, fallback))
        };

        Config {
            namespace,
            port: parse_or(&lookup, "KANARI_PORT", defaults.port),
            timing: TrafficTiming {
                settle_delay: millis("KANARI_SETTLE_DELAY_MS", defaults.timing.settle_delay),
                poll_interval: millis("KANARI_POLL_INTERVAL_MS", defaults.timing.poll_interval),
                converge_timeout: millis(
                    "KANARI_CONVERGE_TIMEOUT_MS",
                    defaults.timing.converge_timeout,
                ),
            },
        }
    }
}

/// Parse a variable, falling back to `default` when unset or malformed
fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(variable = key, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
    }
}
