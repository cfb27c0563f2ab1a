use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use seatline_booking::BookingError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    RateLimited,
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded".to_string()),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(e) => AppError::ValidationError(e.to_string()),
            e @ BookingError::SeatTaken { .. } => AppError::ConflictError(e.to_string()),
            e @ BookingError::NotFound(_) => AppError::NotFoundError(e.to_string()),
            e @ BookingError::Forbidden(_) => AppError::AuthorizationError(e.to_string()),
            e @ (BookingError::Layout(_) | BookingError::Storage(_)) => {
                AppError::InternalServerError(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatline_core::{StoreError, ValidationError};
    use seatline_shared::{ReservationId, SeatId, TripId};

    fn status_of(err: BookingError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_booking_errors_map_to_http_statuses() {
        assert_eq!(status_of(ValidationError::InvalidPhone.into()), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(BookingError::SeatTaken { trip_id: TripId::new("t"), seat_id: SeatId::new("1A") }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(BookingError::NotFound("Trip t".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(BookingError::Forbidden(ReservationId::new("t_1A"))), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(StoreError::Backend("connection reset".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
