use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use mscs_world::{CommandResult, Player, WorldRecord, WorldsResponse};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, state::AppState};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct HealthzResponse {
    status: &'static str,
    version: &'static str,
    mscs_path: String,
    worlds_cached_at: Option<String>,
}

pub async fn healthz(State(state): State<AppState>) -> Json<HealthzResponse> {
    Json(HealthzResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        mscs_path: state.worlds.executor().config().executable.display().to_string(),
        worlds_cached_at: state
            .worlds
            .worlds_computed_at()
            .await
            .map(|t| t.to_rfc3339()),
    })
}

pub async fn list_worlds(State(state): State<AppState>) -> ApiResult<WorldsResponse> {
    let worlds = state.worlds.worlds().await?;
    Ok(Json(WorldsResponse {
        worlds: worlds.as_ref().clone(),
    }))
}

pub async fn get_world(
    State(state): State<AppState>,
    Path(world_id): Path<String>,
) -> ApiResult<WorldRecord> {
    state
        .worlds
        .world(&world_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("world {world_id}")))
}

pub async fn world_players(
    State(state): State<AppState>,
    Path(world_id): Path<String>,
) -> ApiResult<Vec<Player>> {
    let roster = state
        .worlds
        .players(&world_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("world {world_id}")))?;
    Ok(Json(roster.as_ref().clone()))
}

pub async fn list_servers(State(state): State<AppState>) -> ApiResult<CommandResult> {
    Ok(Json(state.worlds.list_servers().await?))
}

pub async fn servers_status(State(state): State<AppState>) -> ApiResult<CommandResult> {
    let result = state.worlds.servers_status().await?;
    Ok(Json(result.as_ref().clone()))
}

pub async fn start_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<CommandResult> {
    Ok(Json(state.worlds.start(&name).await?))
}

pub async fn stop_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<CommandResult> {
    Ok(Json(state.worlds.stop(&name).await?))
}

pub async fn restart_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<CommandResult> {
    Ok(Json(state.worlds.restart(&name).await?))
}

pub async fn backup_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<CommandResult> {
    Ok(Json(state.worlds.backup(&name).await?))
}

pub async fn connected_players(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<CommandResult> {
    Ok(Json(state.worlds.connected_players(&name).await?))
}

#[derive(Debug, Deserialize)]
pub struct CommandQuery {
    command: String,
}

pub async fn run_command(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<CommandQuery>,
) -> ApiResult<CommandResult> {
    Ok(Json(state.worlds.run_command(&name, &q.command).await?))
}

pub async fn all_properties(State(state): State<AppState>) -> Json<BTreeMap<String, String>> {
    Json(state.properties.all().await)
}

pub async fn get_property(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<String, ApiError> {
    state
        .properties
        .get(&key)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("property {key}")))
}

pub async fn put_property(
    State(state): State<AppState>,
    Path(key): Path<String>,
    value: String,
) -> Result<StatusCode, ApiError> {
    state.properties.set(&key, &value).await?;
    Ok(StatusCode::OK)
}

pub async fn put_properties(
    State(state): State<AppState>,
    Json(values): Json<BTreeMap<String, String>>,
) -> Result<StatusCode, ApiError> {
    state.properties.set_many(values).await?;
    Ok(StatusCode::OK)
}

pub async fn delete_property(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.properties.delete(&key).await? {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::NotFound(format!("property {key}")))
    }
}

pub fn router(state: AppState) -> Router {
    let minecraft = Router::new()
        .route("/worlds", get(list_worlds))
        .route("/worlds/:world_id", get(get_world))
        .route("/worlds/:world_id/players", get(world_players))
        .route("/servers", get(list_servers))
        .route("/servers/status", get(servers_status))
        .route("/servers/:name/start", post(start_server))
        .route("/servers/:name/stop", post(stop_server))
        .route("/servers/:name/restart", post(restart_server))
        .route("/servers/:name/backup", post(backup_server))
        .route("/servers/:name/players", get(connected_players))
        .route("/servers/:name/command", post(run_command));

    let properties = Router::new()
        .route("/", get(all_properties).put(put_properties))
        .route(
            "/:key",
            get(get_property).put(put_property).delete(delete_property),
        );

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api/minecraft", minecraft)
        .nest("/api/properties", properties)
        .with_state(state)
}
