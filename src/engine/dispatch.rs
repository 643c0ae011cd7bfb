use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::builder::{rebuild_route_stops, BuildNotice, StopListEdit};
use crate::engine::lifecycle::{self, RouteProgress};
use crate::engine::notifications::enqueue_notification;
use crate::engine::tracker::{self, StopUpdate};
use crate::error::AppError;
use crate::models::event::{Notification, NotificationEvent, RouteEvent};
use crate::models::route::{Route, RouteKey, Shift};
use crate::models::stop::{CandidateStop, Stop, StopStatus};
use crate::state::AppState;
use crate::store::RouteFilter;

#[derive(Debug, Clone)]
pub struct NewRoute {
    pub date: NaiveDate,
    pub shift: Shift,
    pub max_capacity: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub route: Route,
    pub duplicates_dropped: usize,
    pub notices: Vec<BuildNotice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopChange {
    pub route_id: Uuid,
    pub route_version: u64,
    pub stop: Stop,
}

pub async fn get_route(state: &AppState, id: Uuid) -> Result<Route, AppError> {
    state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("route {} not found", id)))
}

pub async fn list_routes(state: &AppState, filter: &RouteFilter) -> Result<Vec<Route>, AppError> {
    state.store.list(filter).await
}

pub async fn find_route_for_driver(state: &AppState, key: &RouteKey) -> Result<Route, AppError> {
    state
        .store
        .find_by_key(key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no route for {key}")))
}

pub async fn route_progress(state: &AppState, id: Uuid) -> Result<RouteProgress, AppError> {
    let route = get_route(state, id).await?;
    Ok(lifecycle::progress(&route, Utc::now()))
}

pub async fn next_delivery(state: &AppState, id: Uuid) -> Result<Option<Stop>, AppError> {
    let route = get_route(state, id).await?;
    Ok(tracker::next_delivery(&route).cloned())
}

pub async fn current_delivery(state: &AppState, id: Uuid) -> Result<Option<Stop>, AppError> {
    let route = get_route(state, id).await?;
    Ok(tracker::current_delivery(&route).cloned())
}

pub async fn create_route(state: &AppState, request: NewRoute) -> Result<Route, AppError> {
    let max_capacity = request
        .max_capacity
        .unwrap_or(state.settings.default_max_capacity);
    if max_capacity == 0 {
        return Err(AppError::BadRequest("max_capacity must be > 0".to_string()));
    }

    let route = Route::new(
        request.date,
        request.shift,
        max_capacity,
        request.notes,
        Utc::now(),
    );
    let route = state.store.insert(route).await?;

    info!(
        route_id = %route.id,
        date = %route.date,
        shift = %route.shift,
        max_capacity,
        "route created"
    );
    Ok(route)
}

pub async fn add_candidates(
    state: &AppState,
    date: NaiveDate,
    shift: Shift,
    candidates: Vec<CandidateStop>,
) -> Result<usize, AppError> {
    let added = candidates.len();
    let pool_size = state.store.add_candidates(date, shift, candidates).await?;
    info!(%date, %shift, added, pool_size, "candidate stops recorded");
    Ok(pool_size)
}

async fn load_for_write(
    state: &AppState,
    id: Uuid,
    expected_version: Option<u64>,
) -> Result<Route, AppError> {
    let route = get_route(state, id).await?;

    if let Some(expected) = expected_version {
        if expected != route.version {
            state.metrics.write_conflicts_total.inc();
            return Err(AppError::ConcurrentModification {
                expected,
                actual: route.version,
            });
        }
    }

    Ok(route)
}

async fn save(state: &AppState, route: Route, loaded_version: u64) -> Result<Route, AppError> {
    let route_id = route.id;
    match state.store.update(route, loaded_version).await {
        Err(err @ AppError::ConcurrentModification { .. }) => {
            state.metrics.write_conflicts_total.inc();
            warn!(route_id = %route_id, error = %err, "route write lost optimistic lock");
            Err(err)
        }
        other => other,
    }
}

fn publish(state: &AppState, event: RouteEvent) {
    let _ = state.route_events_tx.send(event);
}

async fn edit_stops(
    state: &AppState,
    id: Uuid,
    edit: StopListEdit,
    incoming: Vec<Stop>,
    expected_version: Option<u64>,
) -> Result<BuildResult, AppError> {
    let kind = match edit {
        StopListEdit::Replace => "build",
        StopListEdit::Append => "append",
        StopListEdit::Repair => "repair",
    };
    let started = Instant::now();

    let result = async {
        let mut route = load_for_write(state, id, expected_version).await?;
        let loaded_version = route.version;
        let now = Utc::now();

        let outcome = rebuild_route_stops(&mut route, edit, incoming, now, state.estimator.as_ref())?;
        let route = save(state, route, loaded_version).await?;

        Ok::<_, AppError>(BuildResult {
            duplicates_dropped: outcome.duplicates_dropped(),
            notices: outcome.notices,
            route,
        })
    }
    .await;

    let outcome_label = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .build_latency_seconds
        .with_label_values(&[outcome_label])
        .observe(started.elapsed().as_secs_f64());

    let built = result?;
    state.metrics.routes_built_total.with_label_values(&[kind]).inc();
    state
        .metrics
        .duplicate_stops_dropped_total
        .inc_by(built.duplicates_dropped as u64);

    info!(
        route_id = %built.route.id,
        kind,
        stops = built.route.stops.len(),
        duplicates_dropped = built.duplicates_dropped,
        version = built.route.version,
        "route stops rebuilt"
    );
    publish(
        state,
        RouteEvent::StopsRebuilt {
            route_id: built.route.id,
            total_stops: built.route.stops.len(),
            version: built.route.version,
            at: built.route.updated_at,
        },
    );

    Ok(built)
}

/// Replaces the stop list. Without explicit candidates the persisted pool for
/// the route's date and shift is used, and the consumed candidates leave the
/// pool once the build is saved.
pub async fn build_route(
    state: &AppState,
    id: Uuid,
    candidates: Option<Vec<CandidateStop>>,
    expected_version: Option<u64>,
) -> Result<BuildResult, AppError> {
    let Some(candidates) = candidates else {
        let route = get_route(state, id).await?;
        let pooled = state.store.load_candidates(route.date, route.shift).await?;
        let incoming = pooled.iter().cloned().map(Stop::from_candidate).collect();

        let built = edit_stops(state, id, StopListEdit::Replace, incoming, expected_version).await?;
        let remaining = state
            .store
            .remove_candidates(route.date, route.shift, &pooled)
            .await?;
        info!(
            route_id = %id,
            consumed = pooled.len(),
            remaining,
            "candidate pool drained"
        );
        return Ok(built);
    };

    let incoming = candidates.into_iter().map(Stop::from_candidate).collect();
    edit_stops(state, id, StopListEdit::Replace, incoming, expected_version).await
}

pub async fn append_stops(
    state: &AppState,
    id: Uuid,
    candidates: Vec<CandidateStop>,
    expected_version: Option<u64>,
) -> Result<BuildResult, AppError> {
    let incoming = candidates.into_iter().map(Stop::from_candidate).collect();
    edit_stops(state, id, StopListEdit::Append, incoming, expected_version).await
}

/// Re-runs dedup and sequencing over the route's current stops.
pub async fn repair_stops(
    state: &AppState,
    id: Uuid,
    expected_version: Option<u64>,
) -> Result<BuildResult, AppError> {
    edit_stops(state, id, StopListEdit::Repair, Vec::new(), expected_version).await
}

async fn transition_route<F>(
    state: &AppState,
    id: Uuid,
    expected_version: Option<u64>,
    actor: &str,
    notify: Option<NotificationEvent>,
    apply: F,
) -> Result<Route, AppError>
where
    F: FnOnce(&mut Route, DateTime<Utc>) -> Result<(), AppError>,
{
    let mut route = load_for_write(state, id, expected_version).await?;
    let loaded_version = route.version;
    let from = route.status;
    let now = Utc::now();

    apply(&mut route, now)?;
    let route = save(state, route, loaded_version).await?;

    state
        .metrics
        .route_transitions_total
        .with_label_values(&[route.status.as_str()])
        .inc();
    info!(
        route_id = %route.id,
        from = %from,
        to = %route.status,
        actor,
        version = route.version,
        "route transition"
    );

    publish(
        state,
        RouteEvent::RouteStatusChanged {
            route_id: route.id,
            status: route.status,
            version: route.version,
            at: now,
        },
    );
    if let Some(event) = notify {
        enqueue_notification(
            state,
            Notification {
                route_id: route.id,
                stop_id: None,
                event,
                timestamp: now,
                actor: actor.to_string(),
            },
        );
    }
    if route.status.is_terminal() {
        state.locations.remove(&route.id);
    }

    Ok(route)
}

pub async fn assign_route(
    state: &AppState,
    id: Uuid,
    driver_id: &str,
    actor: &str,
    expected_version: Option<u64>,
) -> Result<Route, AppError> {
    transition_route(
        state,
        id,
        expected_version,
        actor,
        Some(NotificationEvent::RouteAssigned),
        |route, now| lifecycle::assign(route, driver_id, now),
    )
    .await
}

pub async fn start_route(
    state: &AppState,
    id: Uuid,
    actor: &str,
    expected_version: Option<u64>,
) -> Result<Route, AppError> {
    transition_route(state, id, expected_version, actor, None, lifecycle::start).await
}

pub async fn complete_route(
    state: &AppState,
    id: Uuid,
    actor: &str,
    expected_version: Option<u64>,
) -> Result<Route, AppError> {
    transition_route(
        state,
        id,
        expected_version,
        actor,
        Some(NotificationEvent::RouteCompleted),
        lifecycle::complete,
    )
    .await
}

pub async fn cancel_route(
    state: &AppState,
    id: Uuid,
    reason: Option<String>,
    actor: &str,
    expected_version: Option<u64>,
) -> Result<Route, AppError> {
    transition_route(
        state,
        id,
        expected_version,
        actor,
        Some(NotificationEvent::RouteCancelled),
        |route, now| lifecycle::cancel(route, reason, now),
    )
    .await
}

pub async fn update_stop_status(
    state: &AppState,
    route_id: Uuid,
    stop_id: Uuid,
    update: StopUpdate,
    actor: &str,
    expected_version: Option<u64>,
) -> Result<StopChange, AppError> {
    let mut route = load_for_write(state, route_id, expected_version).await?;
    let loaded_version = route.version;
    let now = Utc::now();

    let stop = tracker::update_stop_status(&mut route, stop_id, update, now)?;
    let route = save(state, route, loaded_version).await?;

    state
        .metrics
        .stop_transitions_total
        .with_label_values(&[stop.status.as_str()])
        .inc();
    info!(
        route_id = %route.id,
        stop_id = %stop.id,
        status = %stop.status,
        actor,
        version = route.version,
        "stop status updated"
    );

    publish(
        state,
        RouteEvent::StopStatusChanged {
            route_id: route.id,
            stop_id: stop.id,
            status: stop.status,
            version: route.version,
            at: now,
        },
    );

    let notify = match stop.status {
        StopStatus::Delivered => Some(NotificationEvent::StopDelivered),
        StopStatus::Failed => Some(NotificationEvent::StopFailed),
        _ => None,
    };
    if let Some(event) = notify {
        enqueue_notification(
            state,
            Notification {
                route_id: route.id,
                stop_id: Some(stop.id),
                event,
                timestamp: now,
                actor: actor.to_string(),
            },
        );
    }

    Ok(StopChange {
        route_id: route.id,
        route_version: route.version,
        stop,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::config::RouteSettings;
    use crate::models::event::NotificationEvent;
    use crate::models::route::RouteStatus;

    fn state() -> (AppState, tokio::sync::mpsc::Receiver<Notification>) {
        AppState::new(RouteSettings::default(), 16, 16)
    }

    fn candidate(subscription: &str) -> CandidateStop {
        CandidateStop {
            subscription_id: Some(subscription.to_string()),
            order_id: None,
            customer_id: None,
            customer_name: "Customer".to_string(),
            address: "5 Quay Lane".to_string(),
            location: None,
            phone: None,
            meal_type: None,
            time_slot: None,
            notes: None,
        }
    }

    async fn new_route(state: &AppState, capacity: u32) -> Route {
        create_route(
            state,
            NewRoute {
                date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
                shift: Shift::Morning,
                max_capacity: Some(capacity),
                notes: None,
            },
        )
        .await
        .unwrap()
    }

    fn pickup() -> StopUpdate {
        StopUpdate {
            status: StopStatus::PickedUp,
            notes: None,
            reported_at: None,
        }
    }

    #[tokio::test]
    async fn build_uses_candidate_pool_when_none_given() {
        let (state, _rx) = state();
        let route = new_route(&state, 5).await;
        add_candidates(
            &state,
            route.date,
            route.shift,
            vec![candidate("a"), candidate("b"), candidate("a")],
        )
        .await
        .unwrap();

        let built = build_route(&state, route.id, None, None).await.unwrap();
        assert_eq!(built.route.stops.len(), 2);
        assert_eq!(built.route.version, 1);
        assert!(state
            .store
            .load_candidates(route.date, route.shift)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn failed_pool_build_keeps_candidates() {
        let (state, _rx) = state();
        let route = new_route(&state, 1).await;
        add_candidates(&state, route.date, route.shift, vec![candidate("a"), candidate("b")])
            .await
            .unwrap();

        let result = build_route(&state, route.id, None, None).await;
        assert!(matches!(result, Err(AppError::CapacityExceeded { .. })));
        assert_eq!(
            state
                .store
                .load_candidates(route.date, route.shift)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn stale_expected_version_is_rejected() {
        let (state, _rx) = state();
        let route = new_route(&state, 5).await;
        assign_route(&state, route.id, "driver-1", "dispatch", Some(0))
            .await
            .unwrap();

        let result = start_route(&state, route.id, "driver-1", Some(0)).await;
        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(get_route(&state, route.id).await.unwrap().status, RouteStatus::Assigned);
    }

    #[tokio::test]
    async fn assignment_and_delivery_enqueue_notifications() {
        let (state, mut rx) = state();
        let route = new_route(&state, 5).await;
        build_route(&state, route.id, Some(vec![candidate("a")]), None)
            .await
            .unwrap();
        assign_route(&state, route.id, "driver-1", "dispatch", None)
            .await
            .unwrap();
        let route = start_route(&state, route.id, "driver-1", None).await.unwrap();
        let stop_id = route.stops[0].id;

        for status in [StopStatus::PickedUp, StopStatus::OutForDelivery, StopStatus::Delivered] {
            update_stop_status(
                &state,
                route.id,
                stop_id,
                StopUpdate {
                    status,
                    notes: None,
                    reported_at: None,
                },
                "driver-1",
                None,
            )
            .await
            .unwrap();
        }
        complete_route(&state, route.id, "driver-1", None).await.unwrap();

        let mut events = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            events.push(notification.event);
        }
        assert_eq!(
            events,
            vec![
                NotificationEvent::RouteAssigned,
                NotificationEvent::StopDelivered,
                NotificationEvent::RouteCompleted,
            ]
        );
    }

    #[tokio::test]
    async fn stop_update_is_published_on_event_hook() {
        let (state, _rx) = state();
        let route = new_route(&state, 5).await;
        build_route(&state, route.id, Some(vec![candidate("a")]), None)
            .await
            .unwrap();
        assign_route(&state, route.id, "driver-1", "dispatch", None)
            .await
            .unwrap();
        let route = start_route(&state, route.id, "driver-1", None).await.unwrap();

        let mut events = state.route_events_tx.subscribe();
        let change = update_stop_status(&state, route.id, route.stops[0].id, pickup(), "driver-1", None)
            .await
            .unwrap();

        match events.recv().await.unwrap() {
            RouteEvent::StopStatusChanged { stop_id, status, version, .. } => {
                assert_eq!(stop_id, change.stop.id);
                assert_eq!(status, StopStatus::PickedUp);
                assert_eq!(version, change.route_version);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn capacity_is_enforced_on_append() {
        let (state, _rx) = state();
        let route = new_route(&state, 1).await;
        build_route(&state, route.id, Some(vec![candidate("a")]), None)
            .await
            .unwrap();

        let result = append_stops(&state, route.id, vec![candidate("b")], None).await;
        assert!(matches!(result, Err(AppError::CapacityExceeded { .. })));

        let result = append_stops(&state, route.id, vec![candidate("a")], None).await;
        assert_eq!(result.unwrap().route.stops.len(), 1);
    }
}
