use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::config::{EtaModel, RouteSettings};
use crate::error::AppError;
use crate::geo::{haversine_km, travel_minutes};
use crate::models::route::{format_duration, Route, RouteStatus};
use crate::models::stop::Stop;

/// Time spent between arriving at one stop and arriving at the next.
pub trait StopDurationEstimator: Send + Sync {
    fn estimate(&self, previous: &Stop, next: &Stop) -> Duration;

    /// Time spent at a single stop, used to close off the route duration.
    fn service_time(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    pub per_stop: Duration,
}

impl FixedInterval {
    pub fn minutes(minutes: i64) -> Self {
        Self {
            per_stop: Duration::minutes(minutes),
        }
    }
}

impl Default for FixedInterval {
    fn default() -> Self {
        Self::minutes(8)
    }
}

impl StopDurationEstimator for FixedInterval {
    fn estimate(&self, _previous: &Stop, _next: &Stop) -> Duration {
        self.per_stop
    }

    fn service_time(&self) -> Duration {
        self.per_stop
    }
}

/// Service time plus straight-line travel between consecutive coordinates.
#[derive(Debug, Clone, Copy)]
pub struct DistanceAware {
    pub service: Duration,
    pub speed_kmh: f64,
}

impl StopDurationEstimator for DistanceAware {
    fn estimate(&self, previous: &Stop, next: &Stop) -> Duration {
        match (&previous.location, &next.location) {
            (Some(from), Some(to)) => {
                let minutes = travel_minutes(haversine_km(from, to), self.speed_kmh);
                self.service + Duration::minutes(minutes)
            }
            _ => self.service,
        }
    }

    fn service_time(&self) -> Duration {
        self.service
    }
}

pub fn estimator_from_settings(settings: &RouteSettings) -> Box<dyn StopDurationEstimator> {
    match settings.eta_model {
        EtaModel::Fixed => Box::new(FixedInterval::minutes(settings.stop_duration_minutes)),
        EtaModel::Distance => Box::new(DistanceAware {
            service: Duration::minutes(settings.stop_duration_minutes),
            speed_kmh: settings.average_speed_kmh,
        }),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildNotice {
    DuplicateStopIgnored {
        subscription_id: String,
        position: usize,
    },
    MissingSubscriptionId {
        stop_id: Uuid,
        position: usize,
    },
    MalformedCandidateSkipped {
        stop_id: Uuid,
        position: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    pub stops: Vec<Stop>,
    pub notices: Vec<BuildNotice>,
}

impl BuildOutcome {
    pub fn duplicates_dropped(&self) -> usize {
        self.notices
            .iter()
            .filter(|notice| matches!(notice, BuildNotice::DuplicateStopIgnored { .. }))
            .count()
    }
}

/// Stable first-seen dedup by subscription, then resequencing from `now`.
///
/// Stops without a subscription id are never deduplicated. Stops with a
/// blank address are skipped. Running this on its own output with the same
/// `now` and estimator yields the same stops.
pub fn build_stops(
    candidates: Vec<Stop>,
    now: DateTime<Utc>,
    estimator: &dyn StopDurationEstimator,
) -> BuildOutcome {
    let mut seen: HashSet<String> = HashSet::with_capacity(candidates.len());
    let mut outcome = BuildOutcome {
        stops: Vec::with_capacity(candidates.len()),
        notices: Vec::new(),
    };

    for (position, stop) in candidates.into_iter().enumerate() {
        if stop.address.trim().is_empty() {
            warn!(stop_id = %stop.id, position, "skipping candidate stop without address");
            outcome.notices.push(BuildNotice::MalformedCandidateSkipped {
                stop_id: stop.id,
                position,
                reason: "address is empty".to_string(),
            });
            continue;
        }

        match &stop.subscription_id {
            Some(subscription_id) => {
                if !seen.insert(subscription_id.clone()) {
                    warn!(
                        subscription_id = %subscription_id,
                        position,
                        "duplicate stop ignored"
                    );
                    outcome.notices.push(BuildNotice::DuplicateStopIgnored {
                        subscription_id: subscription_id.clone(),
                        position,
                    });
                    continue;
                }
            }
            None => {
                warn!(stop_id = %stop.id, position, "stop has no subscription id; keeping it");
                outcome.notices.push(BuildNotice::MissingSubscriptionId {
                    stop_id: stop.id,
                    position,
                });
            }
        }

        outcome.stops.push(stop);
    }

    sequence_stops(&mut outcome.stops, now, estimator);
    outcome
}

/// Numbers stops 1..N and sets ETAs. Open stops arrive no earlier than
/// `now`; delivered and failed stops keep the ETA they were routed with
/// unless that would put them before the stop sequenced ahead of them.
pub fn sequence_stops(stops: &mut [Stop], now: DateTime<Utc>, estimator: &dyn StopDurationEstimator) {
    let mut previous: Option<DateTime<Utc>> = None;
    for index in 0..stops.len() {
        let earliest = match previous {
            Some(eta) => eta + estimator.estimate(&stops[index - 1], &stops[index]).max(Duration::zero()),
            None => now,
        };

        let stop = &mut stops[index];
        let eta = match (stop.status.is_terminal(), stop.estimated_arrival) {
            (true, Some(kept)) => previous.map_or(kept, |eta| kept.max(eta)),
            _ => earliest.max(now),
        };

        stop.sequence = index as u32 + 1;
        stop.estimated_arrival = Some(eta);
        previous = Some(eta);
    }
}

/// Minutes from the first ETA through service at the last stop.
pub fn estimated_duration_minutes(stops: &[Stop], estimator: &dyn StopDurationEstimator) -> i64 {
    let first = stops.first().and_then(|stop| stop.estimated_arrival);
    let last = stops.last().and_then(|stop| stop.estimated_arrival);

    match (first, last) {
        (Some(first), Some(last)) => ((last - first) + estimator.service_time()).num_minutes(),
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopListEdit {
    Replace,
    Append,
    Repair,
}

impl StopListEdit {
    fn allowed_in(self, status: RouteStatus) -> bool {
        match self {
            StopListEdit::Replace => matches!(status, RouteStatus::Draft | RouteStatus::Assigned),
            StopListEdit::Append | StopListEdit::Repair => !status.is_terminal(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            StopListEdit::Replace => "build stops for",
            StopListEdit::Append => "append stops to",
            StopListEdit::Repair => "repair stops of",
        }
    }
}

/// Writes a freshly built stop list onto `route`.
///
/// `incoming` is appended after the route's current stops for `Append`,
/// replaces them for `Replace`, and must be empty for `Repair`. The route is
/// left untouched when the deduplicated list would exceed its capacity.
pub fn rebuild_route_stops(
    route: &mut Route,
    edit: StopListEdit,
    incoming: Vec<Stop>,
    now: DateTime<Utc>,
    estimator: &dyn StopDurationEstimator,
) -> Result<BuildOutcome, AppError> {
    if !edit.allowed_in(route.status) {
        return Err(AppError::InvalidTransition(format!(
            "cannot {} a route in status {}",
            edit.as_str(),
            route.status
        )));
    }

    let candidates = match edit {
        StopListEdit::Replace => incoming,
        StopListEdit::Append | StopListEdit::Repair => {
            let mut combined = route.stops.clone();
            combined.extend(incoming);
            combined
        }
    };

    let outcome = build_stops(candidates, now, estimator);
    if outcome.stops.len() > route.max_capacity as usize {
        return Err(AppError::CapacityExceeded {
            requested: outcome.stops.len(),
            max_capacity: route.max_capacity,
        });
    }

    let minutes = estimated_duration_minutes(&outcome.stops, estimator);
    route.stops = outcome.stops.clone();
    route.estimated_duration_minutes = minutes;
    route.estimated_duration = format_duration(minutes);
    route.updated_at = now;

    Ok(outcome)
}
