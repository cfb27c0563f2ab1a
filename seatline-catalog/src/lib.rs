pub mod layout;

pub use layout::{generate_seat_layout, LayoutCell, LayoutError, SeatLayout, MAX_SEAT_CAPACITY};
