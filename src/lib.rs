//! kanari: inspect and steer canary releases of Kubernetes Deployments
//!
//! - `gateway` - namespace-scoped access to Deployments, Services, Endpoints
//! - `app` - state projection, canary spawning, traffic switching
//! - `server` - HTTP API, htmx views, health and metrics

pub mod app;
pub mod config;
pub mod gateway;
pub mod server;
