//! API Server module
//!
//! This module provides the HTTP API server functionality for orbitask.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::asteroids::AsteroidAction;
use crate::engine::{BodyClick, Core, EngineError, Snapshot, SWEEP_INTERVAL};
use crate::hierarchy::{PlanetBody, System};
use crate::models::{SettingsPatch, SubtaskDraft, SubtaskPatch, TaskDraft, TaskPatch};

/// Request to focus a system; `null` clears the focus
#[derive(Serialize, Deserialize, Default)]
pub struct FocusRequest {
    pub system_id: Option<String>,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3000).into(),
        }
    }
}

/// API responses
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Helper function to map Core results to Axum responses
fn map_core_result<T: Serialize>(result: Result<T, EngineError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<T>::error(e.to_string())),
        )
            .into_response(),
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Builds the application router around `core`
pub fn router(core: Core) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { Redirect::temporary("/ui") }))
        // --- Snapshot --- //
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/history", get(get_history))
        .route("/api/rebuild", post(rebuild))
        // --- Tasks --- //
        .route("/api/tasks", get(list_tasks).post(add_task))
        .route(
            "/api/tasks/:id",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/api/tasks/:id/toggle", post(toggle_task))
        .route("/api/tasks/:id/subtasks", post(add_subtask))
        .route(
            "/api/tasks/:id/subtasks/:subtask_id",
            axum::routing::patch(update_subtask).delete(delete_subtask),
        )
        .route(
            "/api/tasks/:id/subtasks/:subtask_id/toggle",
            post(toggle_subtask),
        )
        // --- Settings --- //
        .route("/api/settings", get(get_settings).patch(update_settings))
        .route("/api/focus", post(focus_system))
        // --- Renderer callbacks --- //
        .route("/api/click", post(body_click))
        .route("/api/asteroids/:id/accept", post(accept_asteroid))
        .route("/api/asteroids/:id/reject", post(reject_asteroid))
        .route("/api/asteroids/:id/collision", post(asteroid_collision))
        .route("/api/asteroids/sweep", post(sweep_asteroids))
        // --- UI --- //
        .route("/ui", get(ui_handler))
        .route("/ui/events", get(events_handler))
        .layer(cors)
        .with_state(core)
}

/// Starts the API server
pub async fn serve(core: Core, config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let _sweeper = core.spawn_sweeper(SWEEP_INTERVAL);
    let app = router(core);

    // Start server
    tracing::info!("Starting server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Snapshot Handlers --- //

async fn get_snapshot(State(core): State<Core>) -> impl IntoResponse {
    let snapshot = core.snapshot();
    ok(&*snapshot)
}

async fn get_history(State(core): State<Core>) -> impl IntoResponse {
    ok(core.history())
}

async fn rebuild(State(core): State<Core>) -> impl IntoResponse {
    ok(core.flush())
}

// --- Task Handlers --- //

async fn list_tasks(State(core): State<Core>) -> impl IntoResponse {
    ok(core.tasks())
}

async fn add_task(State(core): State<Core>, Json(payload): Json<Value>) -> impl IntoResponse {
    ok(core.add_task(TaskDraft::from_value(&payload)))
}

async fn get_task(State(core): State<Core>, Path(id): Path<String>) -> impl IntoResponse {
    map_core_result(core.task(&id))
}

async fn update_task(
    State(core): State<Core>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    map_core_result(core.update_task(&id, TaskPatch::from_value(&payload)))
}

async fn delete_task(State(core): State<Core>, Path(id): Path<String>) -> impl IntoResponse {
    map_core_result(core.delete_task(&id))
}

async fn toggle_task(State(core): State<Core>, Path(id): Path<String>) -> impl IntoResponse {
    map_core_result(core.toggle_task(&id))
}

async fn add_subtask(
    State(core): State<Core>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    map_core_result(core.add_subtask(&id, SubtaskDraft::from_value(&payload)))
}

async fn update_subtask(
    State(core): State<Core>,
    Path((id, subtask_id)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    map_core_result(core.update_subtask(&id, &subtask_id, SubtaskPatch::from_value(&payload)))
}

async fn delete_subtask(
    State(core): State<Core>,
    Path((id, subtask_id)): Path<(String, String)>,
) -> impl IntoResponse {
    map_core_result(core.delete_subtask(&id, &subtask_id))
}

async fn toggle_subtask(
    State(core): State<Core>,
    Path((id, subtask_id)): Path<(String, String)>,
) -> impl IntoResponse {
    map_core_result(core.toggle_subtask(&id, &subtask_id))
}

// --- Settings Handlers --- //

async fn get_settings(State(core): State<Core>) -> impl IntoResponse {
    ok(core.settings())
}

async fn update_settings(
    State(core): State<Core>,
    Json(patch): Json<SettingsPatch>,
) -> impl IntoResponse {
    ok(core.update_settings(patch))
}

async fn focus_system(
    State(core): State<Core>,
    payload: Option<Json<FocusRequest>>,
) -> impl IntoResponse {
    let system_id = payload.and_then(|Json(request)| request.system_id);
    ok(core.focus_system(system_id.as_deref()))
}

// --- Renderer Callback Handlers --- //

async fn body_click(State(core): State<Core>, Json(click): Json<BodyClick>) -> impl IntoResponse {
    map_core_result(core.body_click(click))
}

async fn accept_asteroid(State(core): State<Core>, Path(id): Path<String>) -> impl IntoResponse {
    map_core_result(core.asteroid_action(&id, AsteroidAction::Accept))
}

async fn reject_asteroid(State(core): State<Core>, Path(id): Path<String>) -> impl IntoResponse {
    map_core_result(core.asteroid_action(&id, AsteroidAction::Reject))
}

async fn asteroid_collision(
    State(core): State<Core>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    map_core_result(core.asteroid_collision(&id))
}

async fn sweep_asteroids(State(core): State<Core>) -> impl IntoResponse {
    ok(core.sweep_expired())
}

// --- UI and Event Handlers --- //

async fn events_handler(State(core): State<Core>) -> impl IntoResponse {
    let stream = snapshot_events(core.subscribe());

    // Set headers for event stream
    let headers = [
        (
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("text/event-stream"),
        ),
        (
            axum::http::header::CACHE_CONTROL,
            axum::http::HeaderValue::from_static("no-cache"),
        ),
    ];

    (headers, axum::body::Body::from_stream(stream))
}

/// One `snapshot` event per published version. A lagging receiver skips
/// straight to the next version it sees.
fn snapshot_events(
    receiver: tokio::sync::broadcast::Receiver<u64>,
) -> impl Stream<Item = Result<String, Infallible>> {
    use tokio::sync::broadcast::error::RecvError;

    futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(version) => {
                    let event = format!("event: snapshot\ndata: {}\n\n", version);
                    return Some((Ok(event), receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event stream lagged by {} versions", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

async fn ui_handler(State(core): State<Core>) -> impl IntoResponse {
    let snapshot = core.snapshot();
    let settings = core.settings();
    Html(render_ui(&snapshot, settings.focused_system_id.as_deref()))
}

fn escape(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

fn render_ui(snapshot: &Snapshot, focused: Option<&str>) -> String {
    let mut html = String::from(HTML_TEMPLATE_HEADER);
    html.push_str(&format!(
        "<p class='meta'>Snapshot v{} built {}</p>",
        snapshot.version,
        snapshot.built_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    if snapshot.systems.is_empty() {
        html.push_str("<p class='empty'>No systems. Add a task with <code>orbitask task add</code>.</p>");
    }

    for system in &snapshot.systems {
        render_system(&mut html, system, focused == Some(system.id.as_str()));
    }

    if !snapshot.asteroids.is_empty() {
        html.push_str("<section class='asteroids'><h2>Asteroids</h2><ul>");
        for asteroid in &snapshot.asteroids {
            html.push_str(&format!(
                "<li><span class='dot' style='background:{}'></span>{} &rarr; <code>{}</code> (expires {})</li>",
                escape(&asteroid.color),
                escape(&asteroid.action),
                escape(&asteroid.target.body_id),
                asteroid.expires_at.format("%H:%M:%S")
            ));
        }
        html.push_str("</ul></section>");
    }

    html.push_str(HTML_TEMPLATE_FOOTER);
    html
}

fn render_system(html: &mut String, system: &System, focused: bool) {
    html.push_str(&format!(
        "<section class='system{}' style='border-color:{}'>",
        if focused { " focused" } else { "" },
        escape(&system.sun.theme.primary)
    ));
    html.push_str(&format!(
        "<h2>{} <small>{}</small></h2><p class='keywords'>{}</p><ul>",
        escape(&system.name),
        escape(&system.id),
        escape(&system.sun.keywords.join(" · "))
    ));
    for planet in &system.planets {
        render_planet(html, planet);
    }
    html.push_str("</ul></section>");
}

fn render_planet(html: &mut String, planet: &PlanetBody) {
    html.push_str(&format!(
        "<li class='{}'><span class='dot' style='background:{}'></span>{} <small>[{}] speed {:.2}</small>",
        if planet.completed { "done" } else { "" },
        escape(&planet.color),
        escape(&planet.name),
        escape(&planet.keywords.join(", ")),
        planet.orbit.speed
    ));
    if !planet.satellites.is_empty() {
        html.push_str("<ul>");
        for satellite in &planet.satellites {
            html.push_str(&format!(
                "<li class='{}'><span class='dot' style='background:{}'></span>{} <small>[{}]</small></li>",
                if satellite.completed { "done" } else { "" },
                escape(&satellite.color),
                escape(&satellite.name),
                escape(&satellite.keywords.join(", "))
            ));
        }
        html.push_str("</ul>");
    }
    html.push_str("</li>");
}

const HTML_TEMPLATE_HEADER: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Orbitask</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            line-height: 1.6;
            color: #e8ecf4;
            max-width: 1100px;
            margin: 0 auto;
            padding: 20px;
            background-color: #0b1020;
        }
        h1 { border-bottom: 2px solid #3498db; padding-bottom: 10px; }
        .system {
            border-left: 6px solid;
            background: #141b33;
            padding: 10px 20px;
            margin-bottom: 16px;
            border-radius: 8px;
        }
        .system.focused { box-shadow: 0 0 0 2px #f1c40f; }
        .dot {
            display: inline-block;
            width: 10px;
            height: 10px;
            border-radius: 50%;
            margin-right: 6px;
        }
        .done { text-decoration: line-through; opacity: 0.6; }
        .keywords, .meta, small { color: #9aa5c4; }
    </style>
</head>
<body>
    <h1>Orbitask</h1>
"#;

const HTML_TEMPLATE_FOOTER: &str = r#"
    <script>
        // Reload whenever a new snapshot is published
        const events = new EventSource('/ui/events');
        events.addEventListener('snapshot', () => window.location.reload());
    </script>
</body>
</html>
"#;
