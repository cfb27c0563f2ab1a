pub mod catalog;
pub mod events;
pub mod ids;
pub mod reservation;

pub use catalog::{Route, Trip, DEFAULT_SEAT_COUNT};
pub use events::AvailabilityUpdate;
pub use ids::{ReservationId, RouteId, SeatId, TripId, UserId};
pub use reservation::{NewReservation, Reservation, ReservationStatus};
