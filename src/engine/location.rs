use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::engine::dispatch::get_route;
use crate::error::AppError;
use crate::models::event::{LocationPing, RouteEvent};
use crate::models::route::RouteStatus;
use crate::models::stop::GeoPoint;
use crate::state::AppState;

fn accepts_location(status: RouteStatus) -> bool {
    matches!(status, RouteStatus::Assigned | RouteStatus::InProgress)
}

fn ensure_accepts_location(route_id: Uuid, status: RouteStatus) -> Result<(), AppError> {
    if accepts_location(status) {
        return Ok(());
    }
    Err(AppError::BadRequest(format!(
        "route {route_id} is {status} and does not accept location updates"
    )))
}

fn validate(location: &GeoPoint) -> Result<(), AppError> {
    let in_range = (-90.0..=90.0).contains(&location.lat) && (-180.0..=180.0).contains(&location.lng);
    if in_range {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "coordinates out of range: {}, {}",
            location.lat, location.lng
        )))
    }
}

/// Stores a driver ping as the route's last-known location and relays it to
/// listeners. Older pings than the stored one are ignored.
///
/// The route status is checked again after the write: a ping that raced a
/// complete or cancel is withdrawn instead of outliving the route.
pub async fn record_location(
    state: &AppState,
    route_id: Uuid,
    location: GeoPoint,
    recorded_at: Option<DateTime<Utc>>,
) -> Result<LocationPing, AppError> {
    validate(&location)?;

    let route = get_route(state, route_id).await?;
    ensure_accepts_location(route_id, route.status)?;

    let ping = LocationPing {
        route_id,
        driver_id: route.driver_id.clone(),
        location,
        recorded_at: recorded_at.unwrap_or_else(Utc::now),
    };

    let mut slot = state.locations.entry(route_id).or_insert_with(|| ping.clone());
    if ping.recorded_at < slot.recorded_at {
        debug!(route_id = %route_id, "ignoring out-of-order location ping");
        return Ok(slot.clone());
    }
    *slot = ping.clone();
    drop(slot);

    let status = get_route(state, route_id).await?.status;
    if let Err(err) = ensure_accepts_location(route_id, status) {
        state
            .locations
            .remove_if(&route_id, |_, stored| stored.recorded_at == ping.recorded_at);
        return Err(err);
    }

    let _ = state
        .route_events_tx
        .send(RouteEvent::LocationUpdated(ping.clone()));
    Ok(ping)
}

pub fn last_location(state: &AppState, route_id: Uuid) -> Option<LocationPing> {
    state.locations.get(&route_id).map(|entry| entry.value().clone())
}
