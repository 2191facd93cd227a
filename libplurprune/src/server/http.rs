//! Read-only status surface for server mode
//!
//! Every response is built from a fresh read of the [`StatusStore`].
//!
//! - `GET /`                      HTML status page
//! - `GET /api/status`            all platforms as JSON
//! - `GET /api/status/:platform`  one platform as JSON, 404 if unknown
//! - `GET /metrics`               Prometheus exposition
//! - `GET /healthz`               liveness

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::fmt::Write as _;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::server::status::{PlatformStatus, StatusStore};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub status: StatusStore,
    /// Absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(status: StatusStore, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            status,
            metrics,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusDocument {
    pub generated_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub running: usize,
    pub platforms: Vec<PlatformStatus>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handler-level failures
#[derive(Debug)]
pub enum AppError {
    UnknownPlatform(String),
    MetricsDisabled,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::UnknownPlatform(name) => {
                (StatusCode::NOT_FOUND, format!("unknown platform '{}'", name))
            }
            AppError::MetricsDisabled => {
                (StatusCode::NOT_FOUND, "metrics are not enabled".to_string())
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status_page))
        .route("/api/status", get(status_json))
        .route("/api/status/:platform", get(platform_json))
        .route("/metrics", get(metrics_text))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serve the router until `cancel` fires
pub async fn serve(listener: TcpListener, state: AppState, cancel: CancellationToken) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Status server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("Status server stopped");
    Ok(())
}

fn document(state: &AppState) -> StatusDocument {
    let now = Utc::now();
    let platforms = state.status.snapshot();
    StatusDocument {
        generated_at: now,
        uptime_secs: (now - state.started_at).num_seconds(),
        running: platforms.iter().filter(|p| p.running).count(),
        platforms,
    }
}

async fn status_json(State(state): State<AppState>) -> Json<StatusDocument> {
    Json(document(&state))
}

async fn platform_json(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> std::result::Result<Json<PlatformStatus>, AppError> {
    state
        .status
        .get(&platform)
        .map(Json)
        .ok_or(AppError::UnknownPlatform(platform))
}

async fn metrics_text(State(state): State<AppState>) -> std::result::Result<Response, AppError> {
    let handle = state.metrics.as_ref().ok_or(AppError::MetricsDisabled)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response())
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn status_page(State(state): State<AppState>) -> Html<String> {
    Html(render_page(&document(&state)))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn optional<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| escape(&v.to_string()))
        .unwrap_or_else(|| "-".to_string())
}

fn render_page(doc: &StatusDocument) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>plurprune</title>\
         <meta http-equiv=\"refresh\" content=\"30\"></head><body>\n<h1>plurprune</h1>\n",
    );
    let _ = writeln!(
        html,
        "<p>Up {}s, {} of {} platforms running</p>",
        doc.uptime_secs,
        doc.running,
        doc.platforms.len()
    );

    if doc.platforms.is_empty() {
        html.push_str("<p>No platforms configured.</p>\n");
    } else {
        html.push_str(
            "<table border=\"1\">\n<tr><th>Platform</th><th>State</th><th>Last run</th>\
             <th>Outcome</th><th>Stopped on</th><th>Runs</th><th>Deleted</th><th>Unliked</th>\
             <th>Unshared</th><th>Preserved</th><th>Errors</th><th>Dropped ticks</th>\
             <th>Next run</th><th>Last error</th></tr>\n",
        );
        for p in &doc.platforms {
            let state = if p.running {
                format!("running (round {})", p.current_rounds)
            } else {
                "idle".to_string()
            };
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}/{}</td>\
                 <td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
                 <td>{}</td></tr>",
                escape(&p.platform),
                state,
                optional(&p.last_run_at),
                optional(&p.last_outcome),
                optional(&p.last_termination),
                p.runs_succeeded,
                p.runs_total,
                p.deleted_total,
                p.unliked_total,
                p.unshared_total,
                p.preserved_total,
                p.errors_total,
                p.dropped_ticks,
                optional(&p.next_run_at),
                optional(&p.last_error),
            );
        }
        html.push_str("</table>\n");
    }

    html.push_str("</body></html>\n");
    html
}
