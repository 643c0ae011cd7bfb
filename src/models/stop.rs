use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Pending,
    PickedUp,
    OutForDelivery,
    Delivered,
    Failed,
}

impl StopStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StopStatus::Delivered | StopStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StopStatus::Pending => "pending",
            StopStatus::PickedUp => "picked_up",
            StopStatus::OutForDelivery => "out_for_delivery",
            StopStatus::Delivered => "delivered",
            StopStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw delivery target as pulled from subscriptions due on a date/shift.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateStop {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub time_slot: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stop {
    pub id: Uuid,
    pub subscription_id: Option<String>,
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub address: String,
    pub location: Option<GeoPoint>,
    pub phone: Option<String>,
    pub meal_type: Option<String>,
    pub time_slot: Option<String>,
    /// 1-based position within the owning route.
    pub sequence: u32,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub status: StopStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub last_reported_at: Option<DateTime<Utc>>,
}

impl Stop {
    pub fn from_candidate(candidate: CandidateStop) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id: candidate
                .subscription_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            order_id: candidate.order_id,
            customer_id: candidate.customer_id,
            customer_name: candidate.customer_name,
            address: candidate.address,
            location: candidate.location,
            phone: candidate.phone,
            meal_type: candidate.meal_type,
            time_slot: candidate.time_slot,
            sequence: 0,
            estimated_arrival: None,
            status: StopStatus::Pending,
            delivered_at: None,
            notes: candidate.notes,
            last_reported_at: None,
        }
    }
}
