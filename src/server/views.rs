//! HTML views rendered with askama
//!
//! `index.html` is the full page; `app.html` is the fragment htmx swaps in
//! after every state read or mutation.

use crate::app::{AppState, Endpoint, Workload};
use askama::Template;
use axum::response::Html;

fn render<T: Template>(tmpl: T) -> Html<String> {
    Html(
        tmpl.render()
            .unwrap_or_else(|e| format!("<pre>Template error: {e}</pre>")),
    )
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate<'a> {
    apps: &'a [String],
}

#[derive(Template)]
#[template(path = "app.html")]
struct AppTemplate<'a> {
    name: &'a str,
    canary_enabled: bool,
    deployments: &'a [Workload],
    endpoints: &'a [Endpoint],
}

pub fn render_index(apps: &[String]) -> Html<String> {
    render(IndexTemplate { apps })
}

pub fn render_app(name: &str, state: &AppState) -> Html<String> {
    render(AppTemplate {
        name,
        canary_enabled: state.canary_enabled,
        deployments: &state.deployments,
        endpoints: &state.endpoints,
    })
}
