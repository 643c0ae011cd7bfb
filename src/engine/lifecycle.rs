use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::models::route::{format_duration, Route, RouteStatus};
use crate::models::stop::{Stop, StopStatus};

fn invalid(action: &str, route: &Route) -> AppError {
    AppError::InvalidTransition(format!(
        "cannot {action} route {} in status {}",
        route.id, route.status
    ))
}

pub fn assign(route: &mut Route, driver_id: &str, now: DateTime<Utc>) -> Result<(), AppError> {
    if route.status != RouteStatus::Draft {
        return Err(invalid("assign", route));
    }

    let driver_id = driver_id.trim();
    if driver_id.is_empty() {
        return Err(AppError::BadRequest("driver_id cannot be empty".to_string()));
    }

    route.driver_id = Some(driver_id.to_string());
    route.status = RouteStatus::Assigned;
    route.updated_at = now;
    Ok(())
}

/// Not idempotent: a second start is reported as a dispatch error.
pub fn start(route: &mut Route, now: DateTime<Utc>) -> Result<(), AppError> {
    if route.status != RouteStatus::Assigned {
        return Err(invalid("start", route));
    }

    route.status = RouteStatus::InProgress;
    route.start_time = Some(now);
    route.updated_at = now;
    Ok(())
}

pub fn complete(route: &mut Route, now: DateTime<Utc>) -> Result<(), AppError> {
    if route.status != RouteStatus::InProgress {
        return Err(invalid("complete", route));
    }

    let minutes = route
        .start_time
        .map(|started| (now - started).num_minutes())
        .unwrap_or(0);

    route.status = RouteStatus::Completed;
    route.end_time = Some(now);
    route.actual_duration_minutes = Some(minutes);
    route.actual_duration = Some(format_duration(minutes));
    route.updated_at = now;
    Ok(())
}

pub fn cancel(route: &mut Route, reason: Option<String>, now: DateTime<Utc>) -> Result<(), AppError> {
    if route.status.is_terminal() {
        return Err(invalid("cancel", route));
    }

    route.status = RouteStatus::Cancelled;
    route.cancellation_reason = reason.filter(|reason| !reason.trim().is_empty());
    route.updated_at = now;
    Ok(())
}

/// Read-only view recomputed from stop state on every request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteProgress {
    pub route_id: uuid::Uuid,
    pub status: RouteStatus,
    pub total_stops: usize,
    pub completed_stops: usize,
    pub failed_stops: usize,
    pub pending_stops: usize,
    pub progress_percentage: u32,
    pub capacity_utilization: u32,
    pub overdue: bool,
    pub next_delivery: Option<Stop>,
    pub current_delivery: Option<Stop>,
}

pub fn total_stops(route: &Route) -> usize {
    route.stops.len()
}

pub fn completed_stops(route: &Route) -> usize {
    count_with_status(route, StopStatus::Delivered)
}

fn count_with_status(route: &Route, status: StopStatus) -> usize {
    route.stops.iter().filter(|stop| stop.status == status).count()
}

/// Delivered share of all stops, floored to a whole percent.
pub fn progress_percentage(route: &Route) -> u32 {
    let total = total_stops(route);
    if total == 0 {
        return 0;
    }

    (completed_stops(route) * 100 / total) as u32
}

pub fn capacity_utilization(route: &Route) -> u32 {
    if route.max_capacity == 0 {
        return 0;
    }

    (total_stops(route) * 100 / route.max_capacity as usize) as u32
}

/// True once an in-progress route has run past its estimated duration.
/// Only reported; the route is never force-cancelled.
pub fn is_overdue(route: &Route, now: DateTime<Utc>) -> bool {
    match (route.status, route.start_time) {
        (RouteStatus::InProgress, Some(started)) if route.estimated_duration_minutes > 0 => {
            (now - started).num_minutes() > route.estimated_duration_minutes
        }
        _ => false,
    }
}

pub fn progress(route: &Route, now: DateTime<Utc>) -> RouteProgress {
    RouteProgress {
        route_id: route.id,
        status: route.status,
        total_stops: total_stops(route),
        completed_stops: completed_stops(route),
        failed_stops: count_with_status(route, StopStatus::Failed),
        pending_stops: count_with_status(route, StopStatus::Pending),
        progress_percentage: progress_percentage(route),
        capacity_utilization: capacity_utilization(route),
        overdue: is_overdue(route, now),
        next_delivery: crate::engine::tracker::next_delivery(route).cloned(),
        current_delivery: crate::engine::tracker::current_delivery(route).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::models::route::Shift;
    use crate::models::stop::{CandidateStop, Stop};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 17, 0, 0).unwrap()
    }

    fn route() -> Route {
        let date = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        Route::new(date, Shift::Evening, 10, None, now())
    }

    fn stop(status: StopStatus) -> Stop {
        let mut stop = Stop::from_candidate(CandidateStop {
            subscription_id: None,
            order_id: None,
            customer_id: None,
            customer_name: "C".to_string(),
            address: "1 Main St".to_string(),
            location: None,
            phone: None,
            meal_type: None,
            time_slot: None,
            notes: None,
        });
        stop.status = status;
        stop
    }

    fn in_progress() -> Route {
        let mut route = route();
        assign(&mut route, "driver-1", now()).unwrap();
        start(&mut route, now()).unwrap();
        route
    }

    #[test]
    fn happy_path_sets_timestamps_and_duration() {
        let mut route = route();
        assign(&mut route, "driver-1", now()).unwrap();
        assert_eq!(route.status, RouteStatus::Assigned);
        assert_eq!(route.driver_id.as_deref(), Some("driver-1"));

        start(&mut route, now()).unwrap();
        assert_eq!(route.start_time, Some(now()));

        let finished = now() + Duration::minutes(95);
        complete(&mut route, finished).unwrap();
        assert_eq!(route.status, RouteStatus::Completed);
        assert_eq!(route.end_time, Some(finished));
        assert_eq!(route.actual_duration_minutes, Some(95));
        assert_eq!(route.actual_duration.as_deref(), Some("1h 35m"));
    }

    #[test]
    fn cancel_allowed_from_every_live_state() {
        let mut draft = route();
        assert!(cancel(&mut draft, Some("no driver".to_string()), now()).is_ok());
        assert_eq!(draft.cancellation_reason.as_deref(), Some("no driver"));

        let mut assigned = route();
        assign(&mut assigned, "d", now()).unwrap();
        assert!(cancel(&mut assigned, None, now()).is_ok());

        let mut running = in_progress();
        assert!(cancel(&mut running, None, now()).is_ok());
        assert_eq!(running.status, RouteStatus::Cancelled);
    }

    #[test]
    fn cancel_fails_once_completed() {
        let mut route = in_progress();
        complete(&mut route, now()).unwrap();
        assert!(matches!(
            cancel(&mut route, None, now()),
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[test]
    fn start_twice_fails() {
        let mut route = in_progress();
        assert!(matches!(
            start(&mut route, now()),
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[test]
    fn complete_from_draft_fails() {
        let mut route = route();
        assert!(matches!(
            complete(&mut route, now()),
            Err(AppError::InvalidTransition(_))
        ));
        assert!(route.end_time.is_none());
    }

    #[test]
    fn assign_only_from_draft() {
        let mut route = route();
        assign(&mut route, "a", now()).unwrap();
        assert!(matches!(
            assign(&mut route, "b", now()),
            Err(AppError::InvalidTransition(_))
        ));
        assert_eq!(route.driver_id.as_deref(), Some("a"));
    }

    #[test]
    fn progress_floors_to_whole_percent() {
        let mut route = in_progress();
        route.stops = vec![
            stop(StopStatus::Delivered),
            stop(StopStatus::Delivered),
            stop(StopStatus::Pending),
        ];
        for (index, stop) in route.stops.iter_mut().enumerate() {
            stop.sequence = index as u32 + 1;
        }

        let view = progress(&route, now());
        assert_eq!(view.total_stops, 3);
        assert_eq!(view.completed_stops, 2);
        assert_eq!(view.progress_percentage, 66);
        assert_eq!(view.capacity_utilization, 30);
        assert_eq!(view.next_delivery.map(|stop| stop.sequence), Some(3));
        assert!(view.current_delivery.is_none());
    }

    #[test]
    fn empty_route_has_zero_progress() {
        let route = route();
        assert_eq!(progress_percentage(&route), 0);
        assert_eq!(capacity_utilization(&route), 0);
    }

    #[test]
    fn overdue_only_when_running_past_estimate() {
        let mut route = in_progress();
        route.estimated_duration_minutes = 30;

        assert!(!is_overdue(&route, now() + Duration::minutes(20)));
        assert!(is_overdue(&route, now() + Duration::minutes(45)));
    }
}
