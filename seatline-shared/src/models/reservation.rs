use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{ReservationId, SeatId, TripId, UserId};
use crate::pii::Masked;

/// Reservation state. Only `Held` occupies a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    #[serde(rename = "booked")]
    Held,
    #[serde(rename = "cancelled")]
    Retracted,
}

impl ReservationStatus {
    /// Value stored in the status field of a reservation document.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Held => "booked",
            ReservationStatus::Retracted => "cancelled",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booked" => Ok(ReservationStatus::Held),
            "cancelled" => Ok(ReservationStatus::Retracted),
            other => Err(format!("unknown reservation status: {}", other)),
        }
    }
}

/// A claim on one seat of one trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub trip_id: TripId,
    pub seat_id: SeatId,
    pub passenger_name: String,
    pub passenger_phone: Masked<String>,
    pub user_id: UserId,
    pub status: ReservationStatus,
    /// Assigned by the store when the record is written.
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_held(&self) -> bool {
        self.status == ReservationStatus::Held
    }
}

/// Attributes of a claim before the store has stamped it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub trip_id: TripId,
    pub seat_id: SeatId,
    pub passenger_name: String,
    pub passenger_phone: Masked<String>,
    pub user_id: UserId,
}

impl NewReservation {
    pub fn id(&self) -> ReservationId {
        ReservationId::compose(&self.trip_id, &self.seat_id)
    }

    /// Materializes a held record with the store-assigned creation time.
    pub fn into_held(self, created_at: DateTime<Utc>) -> Reservation {
        Reservation {
            id: self.id(),
            trip_id: self.trip_id,
            seat_id: self.seat_id,
            passenger_name: self.passenger_name,
            passenger_phone: self.passenger_phone,
            user_id: self.user_id,
            status: ReservationStatus::Held,
            created_at,
        }
    }
}
