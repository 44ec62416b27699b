//! Canary topology core
//!
//! Three operations, each re-reading the cluster through the gateway:
//! - `project_state` - derive `AppState` for one application
//! - `spawn_canary` - create a canary Deployment from the primary
//! - `set_canary_traffic` - split or pin traffic via the Service selector

pub mod canary;
pub mod context;
pub mod error;
pub mod labels;
pub mod names;
pub mod state;
pub mod traffic;

pub use canary::*;
pub use context::*;
pub use error::*;
pub use state::*;
pub use traffic::*;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "state_test.rs"]
mod state_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "canary_test.rs"]
mod canary_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "traffic_test.rs"]
mod traffic_tests;
