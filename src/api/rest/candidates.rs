use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::dispatch;
use crate::error::AppError;
use crate::models::route::Shift;
use crate::models::stop::CandidateStop;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/candidates", post(add_candidates).get(list_candidates))
}

#[derive(Deserialize)]
pub struct AddCandidatesRequest {
    pub date: NaiveDate,
    pub shift: Shift,
    pub stops: Vec<CandidateStop>,
}

#[derive(Deserialize)]
pub struct CandidatesQuery {
    pub date: NaiveDate,
    pub shift: Shift,
}

#[derive(Serialize)]
pub struct AddCandidatesResponse {
    pub date: NaiveDate,
    pub shift: Shift,
    pub pool_size: usize,
}

async fn add_candidates(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddCandidatesRequest>,
) -> Result<Json<AddCandidatesResponse>, AppError> {
    if payload.stops.is_empty() {
        return Err(AppError::BadRequest("stops cannot be empty".to_string()));
    }

    let pool_size =
        dispatch::add_candidates(&state, payload.date, payload.shift, payload.stops).await?;

    Ok(Json(AddCandidatesResponse {
        date: payload.date,
        shift: payload.shift,
        pool_size,
    }))
}

async fn list_candidates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CandidatesQuery>,
) -> Result<Json<Vec<CandidateStop>>, AppError> {
    let candidates = state.store.load_candidates(query.date, query.shift).await?;
    Ok(Json(candidates))
}
