use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::route::{Route, RouteStatus};
use crate::models::stop::{Stop, StopStatus};

#[derive(Debug, Clone)]
pub struct StopUpdate {
    pub status: StopStatus,
    pub notes: Option<String>,
    /// When the driver app observed the change; older reports are rejected.
    /// Reports stamped ahead of the server clock count as reported now.
    pub reported_at: Option<DateTime<Utc>>,
}

pub fn can_transition(from: StopStatus, to: StopStatus) -> bool {
    use StopStatus::*;

    if from.is_terminal() {
        return false;
    }

    matches!(
        (from, to),
        (Pending, PickedUp) | (PickedUp, OutForDelivery) | (OutForDelivery, Delivered) | (_, Failed)
    )
}

/// Applies one status change to a stop of an in-progress route and returns
/// the updated stop.
pub fn update_stop_status(
    route: &mut Route,
    stop_id: Uuid,
    update: StopUpdate,
    now: DateTime<Utc>,
) -> Result<Stop, AppError> {
    if route.status != RouteStatus::InProgress {
        return Err(AppError::InvalidTransition(format!(
            "stops can only change while route is in_progress, route {} is {}",
            route.id, route.status
        )));
    }

    let stop = route
        .stops
        .iter_mut()
        .find(|stop| stop.id == stop_id)
        .ok_or(AppError::StopNotFound(stop_id))?;

    let reported_at = update.reported_at.map_or(now, |reported| reported.min(now));
    if let Some(last) = stop.last_reported_at {
        if reported_at < last {
            return Err(AppError::StaleUpdate(format!(
                "stop {stop_id} update reported at {reported_at} is older than {last}"
            )));
        }
    }

    if !can_transition(stop.status, update.status) {
        return Err(AppError::InvalidTransition(format!(
            "stop {stop_id} cannot move from {} to {}",
            stop.status, update.status
        )));
    }

    stop.status = update.status;
    stop.last_reported_at = Some(reported_at);
    if update.status == StopStatus::Delivered {
        stop.delivered_at = Some(now);
    }
    if let Some(notes) = update.notes.filter(|notes| !notes.trim().is_empty()) {
        stop.notes = Some(notes);
    }

    let updated = stop.clone();
    route.updated_at = now;
    Ok(updated)
}

fn first_in_sequence(route: &Route, status: StopStatus) -> Option<&Stop> {
    route
        .stops
        .iter()
        .filter(|stop| stop.status == status)
        .min_by_key(|stop| stop.sequence)
}

pub fn next_delivery(route: &Route) -> Option<&Stop> {
    first_in_sequence(route, StopStatus::Pending)
}

/// Drivers deliver sequentially, so at most one stop is expected here.
pub fn current_delivery(route: &Route) -> Option<&Stop> {
    first_in_sequence(route, StopStatus::OutForDelivery)
}
