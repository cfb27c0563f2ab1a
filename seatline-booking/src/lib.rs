pub mod availability;
pub mod cascade;
pub mod engine;
pub mod retry;
pub mod schedule;

use seatline_catalog::LayoutError;
use seatline_core::{StoreError, ValidationError};
use seatline_shared::{ReservationId, SeatId, TripId};

pub use availability::{AvailabilitySynchronizer, SubscriptionHandle};
pub use cascade::{CascadeEngine, DeletionSummary};
pub use engine::{CancelOutcome, ReservationEngine};
pub use retry::RetryPolicy;
pub use schedule::ScheduleManager;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Trip seating is misconfigured: {0}")]
    Layout(#[from] LayoutError),

    #[error("Seat {seat_id} on trip {trip_id} was just taken, please pick another")]
    SeatTaken { trip_id: TripId, seat_id: SeatId },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Reservation {0} belongs to another passenger")]
    Forbidden(ReservationId),

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl BookingError {
    /// Only storage failures can succeed when repeated unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::Storage(_))
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
