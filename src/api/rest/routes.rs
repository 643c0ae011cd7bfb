use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::dispatch::{self, BuildResult, NewRoute, StopChange};
use crate::engine::lifecycle::RouteProgress;
use crate::engine::location;
use crate::engine::tracker::StopUpdate;
use crate::error::AppError;
use crate::models::event::LocationPing;
use crate::models::route::{Route, RouteKey, Shift};
use crate::models::stop::{CandidateStop, GeoPoint, Stop, StopStatus};
use crate::state::AppState;
use crate::store::RouteFilter;

const DEFAULT_ACTOR: &str = "dispatch";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/routes", post(create_route).get(list_routes))
        .route("/routes/:id", get(get_route))
        .route("/routes/:id/stops/build", post(build_stops))
        .route("/routes/:id/stops/append", post(append_stops))
        .route("/routes/:id/stops/repair", post(repair_stops))
        .route("/routes/:id/assign", post(assign_route))
        .route("/routes/:id/start", post(start_route))
        .route("/routes/:id/complete", post(complete_route))
        .route("/routes/:id/cancel", post(cancel_route))
        .route("/routes/:id/stops/:stop_id/status", patch(update_stop_status))
        .route("/routes/:id/progress", get(route_progress))
        .route("/routes/:id/next", get(next_delivery))
        .route("/routes/:id/current", get(current_delivery))
        .route("/routes/:id/location", post(record_location).get(last_location))
        .route("/drivers/:driver_id/routes/:date/:shift", get(driver_route))
}

#[derive(Deserialize)]
pub struct CreateRouteRequest {
    pub date: NaiveDate,
    pub shift: Shift,
    pub max_capacity: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct BuildStopsRequest {
    pub stops: Option<Vec<CandidateStop>>,
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
pub struct AppendStopsRequest {
    pub stops: Vec<CandidateStop>,
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub driver_id: String,
    pub actor: Option<String>,
    pub expected_version: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct TransitionRequest {
    pub actor: Option<String>,
    pub expected_version: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CancelRequest {
    pub reason: Option<String>,
    pub actor: Option<String>,
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
pub struct UpdateStopStatusRequest {
    pub status: StopStatus,
    pub notes: Option<String>,
    pub reported_at: Option<DateTime<Utc>>,
    pub actor: Option<String>,
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
pub struct LocationRequest {
    pub location: GeoPoint,
    pub recorded_at: Option<DateTime<Utc>>,
}

fn actor_or_default(actor: &Option<String>) -> &str {
    actor
        .as_deref()
        .map(str::trim)
        .filter(|actor| !actor.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
}

async fn create_route(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRouteRequest>,
) -> Result<Json<Route>, AppError> {
    let route = dispatch::create_route(
        &state,
        NewRoute {
            date: payload.date,
            shift: payload.shift,
            max_capacity: payload.max_capacity,
            notes: payload.notes,
        },
    )
    .await?;

    Ok(Json(route))
}

async fn list_routes(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RouteFilter>,
) -> Result<Json<Vec<Route>>, AppError> {
    Ok(Json(dispatch::list_routes(&state, &filter).await?))
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(dispatch::get_route(&state, id).await?))
}

async fn driver_route(
    State(state): State<Arc<AppState>>,
    Path((driver_id, date, shift)): Path<(String, NaiveDate, Shift)>,
) -> Result<Json<Route>, AppError> {
    let key = RouteKey {
        driver_id,
        date,
        shift,
    };
    Ok(Json(dispatch::find_route_for_driver(&state, &key).await?))
}

async fn build_stops(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BuildStopsRequest>,
) -> Result<Json<BuildResult>, AppError> {
    let built = dispatch::build_route(&state, id, payload.stops, payload.expected_version).await?;
    Ok(Json(built))
}

async fn append_stops(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AppendStopsRequest>,
) -> Result<Json<BuildResult>, AppError> {
    if payload.stops.is_empty() {
        return Err(AppError::BadRequest("stops cannot be empty".to_string()));
    }

    let built = dispatch::append_stops(&state, id, payload.stops, payload.expected_version).await?;
    Ok(Json(built))
}

async fn repair_stops(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<BuildResult>, AppError> {
    let built = dispatch::repair_stops(&state, id, payload.expected_version).await?;
    Ok(Json(built))
}

async fn assign_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Route>, AppError> {
    let route = dispatch::assign_route(
        &state,
        id,
        &payload.driver_id,
        actor_or_default(&payload.actor),
        payload.expected_version,
    )
    .await?;

    Ok(Json(route))
}

async fn start_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Route>, AppError> {
    let route = dispatch::start_route(
        &state,
        id,
        actor_or_default(&payload.actor),
        payload.expected_version,
    )
    .await?;

    Ok(Json(route))
}

async fn complete_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Route>, AppError> {
    let route = dispatch::complete_route(
        &state,
        id,
        actor_or_default(&payload.actor),
        payload.expected_version,
    )
    .await?;

    Ok(Json(route))
}

async fn cancel_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<Route>, AppError> {
    let actor = actor_or_default(&payload.actor).to_string();
    let route = dispatch::cancel_route(
        &state,
        id,
        payload.reason,
        &actor,
        payload.expected_version,
    )
    .await?;

    Ok(Json(route))
}

async fn update_stop_status(
    State(state): State<Arc<AppState>>,
    Path((id, stop_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateStopStatusRequest>,
) -> Result<Json<StopChange>, AppError> {
    let actor = actor_or_default(&payload.actor).to_string();
    let change = dispatch::update_stop_status(
        &state,
        id,
        stop_id,
        StopUpdate {
            status: payload.status,
            notes: payload.notes,
            reported_at: payload.reported_at,
        },
        &actor,
        payload.expected_version,
    )
    .await?;

    Ok(Json(change))
}

async fn route_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RouteProgress>, AppError> {
    Ok(Json(dispatch::route_progress(&state, id).await?))
}

async fn next_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<Stop>>, AppError> {
    Ok(Json(dispatch::next_delivery(&state, id).await?))
}

async fn current_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<Stop>>, AppError> {
    Ok(Json(dispatch::current_delivery(&state, id).await?))
}

async fn record_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationRequest>,
) -> Result<Json<LocationPing>, AppError> {
    let ping = location::record_location(&state, id, payload.location, payload.recorded_at).await?;
    Ok(Json(ping))
}

async fn last_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LocationPing>, AppError> {
    location::last_location(&state, id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no location recorded for route {id}")))
}
