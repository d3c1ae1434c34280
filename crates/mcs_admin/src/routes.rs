//! HTTP handlers for the admin API (spec.md §4.8).
//!
//! Every handler that touches the supervisor runs it via `spawn_blocking`
//! so directory walks, process spawns, and log reads never block the
//! admin request loop (spec.md §4.8 "off the HTTP request thread").

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use mcs_protocol::{
    AddServerRequest, AvailableProjectsResponse, ControlAction, LogTailResponse, McsError,
    McsResult, ServerStatsResponse, ServersResponse, SystemStatsResponse, WorkerStatusRecord,
};
use mcs_supervisor::Supervisor;
use serde::Deserialize;

use crate::assets::INDEX_HTML;
use crate::error::ApiError;
use crate::state::AdminState;

pub fn build_router(state: AdminState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/admin/system", get(system_stats))
        .route("/admin/available-projects", get(available_projects))
        .route("/admin/servers", get(list_servers).post(add_server))
        .route("/admin/servers/:name", axum::routing::delete(remove_server))
        .route("/admin/servers/:name/logs", get(server_logs))
        .route("/admin/servers/:name/stats", get(server_stats))
        .route("/admin/servers/:name/:action", post(server_action))
        .with_state(state)
}

async fn blocking<T, F>(supervisor: Arc<Supervisor>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Supervisor) -> McsResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(move || f(&supervisor)).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(join_err) => Err(ApiError::from(McsError::Io(std::io::Error::other(join_err)))),
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn system_stats(State(state): State<AdminState>) -> Result<Json<SystemStatsResponse>, ApiError> {
    let supervisor = state.supervisor;
    let stats = blocking(supervisor, |s| Ok(s.get_system_stats())).await?;
    Ok(Json(stats))
}

async fn available_projects(State(state): State<AdminState>) -> Result<Json<AvailableProjectsResponse>, ApiError> {
    let supervisor = state.supervisor;
    let paths = blocking(supervisor, |s| Ok(s.available_projects())).await?;
    Ok(Json(AvailableProjectsResponse { paths }))
}

async fn list_servers(State(state): State<AdminState>) -> Result<Json<ServersResponse>, ApiError> {
    let supervisor = state.supervisor;
    let servers = blocking(supervisor, |s| Ok(s.list_servers())).await?;
    Ok(Json(ServersResponse { servers }))
}

async fn add_server(
    State(state): State<AdminState>,
    Json(request): Json<AddServerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let supervisor = state.supervisor;
    let project_path = PathBuf::from(&request.path);
    let name = blocking(supervisor.clone(), move |s| {
        s.add_and_start_server(
            project_path,
            request.transport,
            request.host,
            request.context,
            request.modes,
            request.log_level,
        )
    })
    .await?;

    let record = blocking(supervisor, move |s| {
        s.list_servers()
            .into_iter()
            .find(|r| r.project_name == name)
            .ok_or_else(|| McsError::NotFound(name.clone()))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    #[serde(rename = "type", default)]
    log_type: Option<String>,
    lines: Option<usize>,
}

async fn server_logs(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Json<LogTailResponse>, ApiError> {
    let stderr = query.log_type.as_deref() == Some("stderr");
    let supervisor = state.supervisor;
    let lines = blocking(supervisor, move |s| s.get_server_logs(&name, stderr, query.lines)).await?;
    Ok(Json(LogTailResponse { lines }))
}

async fn server_stats(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<ServerStatsResponse>, ApiError> {
    let supervisor = state.supervisor;
    let stats = blocking(supervisor, move |s| s.get_server_stats(&name)).await?;
    Ok(Json(stats))
}

async fn server_action(
    State(state): State<AdminState>,
    Path((name, action)): Path<(String, String)>,
) -> Result<Json<WorkerStatusRecord>, ApiError> {
    let control_action = match action.as_str() {
        "start" => ControlAction::Start,
        "stop" => ControlAction::Stop,
        "restart" => ControlAction::Restart,
        other => {
            return Err(ApiError::from(McsError::Validation(format!(
                "unknown action: {other}"
            ))))
        }
    };

    let supervisor = state.supervisor;
    let name_for_lookup = name.clone();
    blocking(supervisor.clone(), move |s| match control_action {
        ControlAction::Start => s.start_server(&name),
        ControlAction::Stop => s.stop_server(&name),
        ControlAction::Restart => s.restart_server(&name),
    })
    .await?;

    let record = blocking(supervisor, move |s| {
        s.list_servers()
            .into_iter()
            .find(|r| r.project_name == name_for_lookup)
            .ok_or(McsError::NotFound(name_for_lookup.clone()))
    })
    .await?;
    Ok(Json(record))
}

async fn remove_server(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let supervisor = state.supervisor;
    blocking(supervisor, move |s| s.remove_server(&name)).await?;
    Ok(StatusCode::NO_CONTENT)
}
