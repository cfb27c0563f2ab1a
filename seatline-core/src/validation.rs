use regex::Regex;
use seatline_shared::{Masked, SeatId, TripId};
use serde::Deserialize;
use std::sync::LazyLock;

pub const MIN_NAME_CHARS: usize = 2;
pub const MIN_CITY_CHARS: usize = 2;

/// Local mobile number: `+94` country code or a `0` trunk prefix, then nine digits.
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\+94|0)[0-9]{9}$").expect("phone pattern is a valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please select a seat")]
    MissingSeat,
    #[error("Passenger name must be at least {min} characters")]
    InvalidName { min: usize },
    #[error("Invalid phone number")]
    InvalidPhone,
    #[error("Seat {seat_id} does not exist on trip {trip_id}")]
    UnknownSeat { trip_id: TripId, seat_id: SeatId },
    #[error("Trip {0} is not open for booking")]
    TripInactive(TripId),
    #[error("City names must be at least {min} characters")]
    InvalidCity { min: usize },
    #[error("Price must be a non-negative amount")]
    InvalidPrice,
    #[error("Seat count must be between 1 and {max}")]
    InvalidSeatCount { max: u32 },
}

/// Passenger details as submitted by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct PassengerDetails {
    pub name: String,
    pub phone: Masked<String>,
}

/// Passenger details that passed validation, trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidPassenger {
    pub name: String,
    pub phone: Masked<String>,
}

impl PassengerDetails {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: Masked(phone.into()),
        }
    }

    pub fn validate(&self) -> Result<ValidPassenger, ValidationError> {
        Ok(ValidPassenger {
            name: validate_name(&self.name)?,
            phone: Masked(validate_phone(self.phone.expose())?),
        })
    }
}

pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.chars().count() < MIN_NAME_CHARS {
        return Err(ValidationError::InvalidName { min: MIN_NAME_CHARS });
    }
    Ok(trimmed.to_string())
}

pub fn validate_phone(phone: &str) -> Result<String, ValidationError> {
    let trimmed = phone.trim();
    if !PHONE_PATTERN.is_match(trimmed) {
        return Err(ValidationError::InvalidPhone);
    }
    Ok(trimmed.to_string())
}

pub fn validate_city(city: &str) -> Result<String, ValidationError> {
    let trimmed = city.trim();
    if trimmed.chars().count() < MIN_CITY_CHARS {
        return Err(ValidationError::InvalidCity { min: MIN_CITY_CHARS });
    }
    Ok(trimmed.to_string())
}

pub fn validate_price(price: f64) -> Result<f64, ValidationError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ValidationError::InvalidPrice);
    }
    Ok(price)
}

pub fn validate_seat_selection(seat_id: &SeatId) -> Result<(), ValidationError> {
    if seat_id.as_str().trim().is_empty() {
        return Err(ValidationError::MissingSeat);
    }
    Ok(())
}
