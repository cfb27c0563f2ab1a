pub mod models;
pub mod pii;

pub use models::{
    AvailabilityUpdate, NewReservation, Reservation, ReservationId, ReservationStatus, Route,
    RouteId, SeatId, Trip, TripId, UserId, DEFAULT_SEAT_COUNT,
};
pub use pii::Masked;
