use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::route::RouteStatus;
use crate::models::stop::{GeoPoint, StopStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationPing {
    pub route_id: Uuid,
    pub driver_id: Option<String>,
    pub location: GeoPoint,
    pub recorded_at: DateTime<Utc>,
}

/// Status-changed hook payloads relayed to listeners over `/ws`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteEvent {
    RouteStatusChanged {
        route_id: Uuid,
        status: RouteStatus,
        version: u64,
        at: DateTime<Utc>,
    },
    StopStatusChanged {
        route_id: Uuid,
        stop_id: Uuid,
        status: StopStatus,
        version: u64,
        at: DateTime<Utc>,
    },
    StopsRebuilt {
        route_id: Uuid,
        total_stops: usize,
        version: u64,
        at: DateTime<Utc>,
    },
    LocationUpdated(LocationPing),
}

impl RouteEvent {
    pub fn route_id(&self) -> Uuid {
        match self {
            RouteEvent::RouteStatusChanged { route_id, .. }
            | RouteEvent::StopStatusChanged { route_id, .. }
            | RouteEvent::StopsRebuilt { route_id, .. } => *route_id,
            RouteEvent::LocationUpdated(ping) => ping.route_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    RouteAssigned,
    StopDelivered,
    StopFailed,
    RouteCompleted,
    RouteCancelled,
}

impl NotificationEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationEvent::RouteAssigned => "route_assigned",
            NotificationEvent::StopDelivered => "stop_delivered",
            NotificationEvent::StopFailed => "stop_failed",
            NotificationEvent::RouteCompleted => "route_completed",
            NotificationEvent::RouteCancelled => "route_cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub route_id: Uuid,
    pub stop_id: Option<Uuid>,
    pub event: NotificationEvent,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
}
