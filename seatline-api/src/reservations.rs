use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use seatline_booking::CancelOutcome;
use seatline_core::{PassengerDetails, Principal};
use seatline_shared::{Reservation, ReservationId, SeatId, TripId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::AppError, state::AppState};

const DEFAULT_HISTORY_LIMIT: usize = 5;
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub trip_id: TripId,
    pub seat_id: SeatId,
    pub passenger_name: String,
    pub passenger_phone: String,
}

#[derive(Debug, Serialize)]
pub struct ReserveResponse {
    pub reservation_id: ReservationId,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub reservation_id: ReservationId,
    pub outcome: CancelOutcome,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(reserve_seat))
        .route("/v1/reservations/mine", get(my_reservations))
        .route("/v1/reservations/{id}/cancel", post(cancel_reservation))
}

async fn reserve_seat(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<ReserveResponse>), AppError> {
    let passenger = PassengerDetails::new(req.passenger_name, req.passenger_phone);
    let reservation_id = state
        .engine
        .reserve(&req.trip_id, &req.seat_id, &passenger, &principal)
        .await?;

    Ok((StatusCode::CREATED, Json(ReserveResponse { reservation_id })))
}

async fn my_reservations(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Reservation>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
    let reservations = state.engine.recent_for_user(&principal.user_id, limit).await?;
    Ok(Json(reservations))
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ReservationId>,
) -> Result<Json<CancelResponse>, AppError> {
    let outcome = state.engine.cancel(&id, &principal).await?;
    info!("Cancel of {} by {}: {:?}", id, principal.user_id, outcome);
    Ok(Json(CancelResponse { reservation_id: id, outcome }))
}
