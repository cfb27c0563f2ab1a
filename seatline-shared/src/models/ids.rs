use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Document id of a route.
    RouteId
);
string_id!(
    /// Document id of a scheduled trip.
    TripId
);
string_id!(
    /// Seat label, unique within one trip only (`"1A"`, `"49"`).
    SeatId
);
string_id!(
    /// Identity issued by the authentication provider.
    UserId
);
string_id!(
    /// Composite `tripId_seatId` key of a reservation.
    ReservationId
);

impl RouteId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl TripId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl ReservationId {
    /// The storage address of a seat claim. Two claims for the same seat on the
    /// same trip always collide on this key.
    pub fn compose(trip_id: &TripId, seat_id: &SeatId) -> Self {
        Self(format!("{}_{}", trip_id, seat_id))
    }
}
