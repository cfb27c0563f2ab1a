use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{RouteId, TripId};

/// Seat capacity given to a schedule when none is specified.
pub const DEFAULT_SEAT_COUNT: u32 = 44;

fn default_seat_count() -> u32 {
    DEFAULT_SEAT_COUNT
}

/// An origin/destination pair. Owns zero or more trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub origin: String,
    pub destination: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Route {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            id: RouteId::generate(),
            origin: origin.into(),
            destination: destination.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn label(&self) -> String {
        format!("{} -> {}", self.origin, self.destination)
    }
}

/// A single departure of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub route_id: RouteId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// Carried for display only; never computed on.
    pub price: f64,
    #[serde(default = "default_seat_count")]
    pub seat_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(route_id: RouteId, date: NaiveDate, time: NaiveTime, price: f64) -> Self {
        Self {
            id: TripId::generate(),
            route_id,
            date,
            time,
            price,
            seat_count: DEFAULT_SEAT_COUNT,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_seat_count(mut self, seat_count: u32) -> Self {
        self.seat_count = seat_count;
        self
    }
}
