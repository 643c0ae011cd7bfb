use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::stop::Stop;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Shift {
    Morning,
    Evening,
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shift::Morning => f.write_str("morning"),
            Shift::Evening => f.write_str("evening"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Draft,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl RouteStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RouteStatus::Completed | RouteStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RouteStatus::Draft => "draft",
            RouteStatus::Assigned => "assigned",
            RouteStatus::InProgress => "in_progress",
            RouteStatus::Completed => "completed",
            RouteStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a driver-bound route. Time of day never takes part in it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub driver_id: String,
    pub date: NaiveDate,
    pub shift: Shift,
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.driver_id, self.date, self.shift)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: Uuid,
    pub date: NaiveDate,
    pub shift: Shift,
    pub driver_id: Option<String>,
    pub status: RouteStatus,
    pub stops: Vec<Stop>,
    pub max_capacity: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub estimated_duration_minutes: i64,
    pub estimated_duration: String,
    pub actual_duration_minutes: Option<i64>,
    pub actual_duration: Option<String>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    /// Bumped by the store on every successful conditional write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Route {
    pub fn new(
        date: NaiveDate,
        shift: Shift,
        max_capacity: u32,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            shift,
            driver_id: None,
            status: RouteStatus::Draft,
            stops: Vec::new(),
            max_capacity,
            start_time: None,
            end_time: None,
            estimated_duration_minutes: 0,
            estimated_duration: format_duration(0),
            actual_duration_minutes: None,
            actual_duration: None,
            notes,
            cancellation_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Identity key while the route is bound to a driver and still live.
    pub fn key(&self) -> Option<RouteKey> {
        if self.status == RouteStatus::Cancelled {
            return None;
        }

        self.driver_id.as_ref().map(|driver_id| RouteKey {
            driver_id: driver_id.clone(),
            date: self.date,
            shift: self.shift,
        })
    }
}

/// Renders a minute count as `"{h}h {m}m"`.
pub fn format_duration(total_minutes: i64) -> String {
    let total_minutes = total_minutes.max(0);
    format!("{}h {}m", total_minutes / 60, total_minutes % 60)
}
