use serde::{Deserialize, Serialize};

use super::ids::{SeatId, TripId};

/// Occupied-seat snapshot pushed to availability subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityUpdate {
    pub trip_id: TripId,
    /// Held seats, sorted.
    pub occupied: Vec<SeatId>,
    /// The locally selected seat that another passenger just took, if any.
    pub conflict: Option<SeatId>,
    /// Count of snapshots delivered on this subscription, starting at 1.
    pub revision: u64,
    pub observed_at: i64,
}

impl AvailabilityUpdate {
    pub fn is_occupied(&self, seat_id: &SeatId) -> bool {
        self.occupied.binary_search(seat_id).is_ok()
    }
}
