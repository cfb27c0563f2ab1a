use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use seatline_booking::DeletionSummary;
use seatline_core::Principal;
use seatline_shared::{Reservation, ReservationId, Route, RouteId, Trip, TripId};
use serde::Deserialize;
use tracing::info;

use crate::reservations::CancelResponse;
use crate::{error::AppError, state::AppState};

const DEFAULT_LISTING_LIMIT: usize = 300;
const MAX_LISTING_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct CreateRouteRequest {
    pub origin: String,
    pub destination: String,
}

#[derive(Debug, Deserialize)]
pub struct RouteActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub price: f64,
    pub seat_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    pub limit: Option<usize>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/reservations/{id}/retract", post(retract_reservation))
        .route("/v1/admin/reservations/{id}", delete(purge_reservation))
        .route(
            "/v1/admin/reservations",
            get(list_reservations).delete(purge_all_reservations),
        )
        .route("/v1/admin/routes", get(list_routes).post(create_route))
        .route("/v1/admin/routes/{route_id}", delete(delete_route))
        .route("/v1/admin/routes/{route_id}/active", post(set_route_active))
        .route("/v1/admin/routes/{route_id}/trips", post(create_trip))
        .route("/v1/admin/trips/{trip_id}", delete(delete_trip))
}

async fn list_reservations(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Vec<Reservation>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LISTING_LIMIT).clamp(1, MAX_LISTING_LIMIT);
    Ok(Json(state.engine.recent(limit).await?))
}

async fn list_routes(State(state): State<AppState>) -> Result<Json<Vec<Route>>, AppError> {
    Ok(Json(state.schedules.all_routes().await?))
}

async fn create_route(
    State(state): State<AppState>,
    Json(req): Json<CreateRouteRequest>,
) -> Result<(StatusCode, Json<Route>), AppError> {
    let route = state.schedules.create_route(&req.origin, &req.destination).await?;
    Ok((StatusCode::CREATED, Json(route)))
}

async fn set_route_active(
    State(state): State<AppState>,
    Path(route_id): Path<RouteId>,
    Json(req): Json<RouteActiveRequest>,
) -> Result<StatusCode, AppError> {
    state.schedules.set_route_active(&route_id, req.is_active).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_trip(
    State(state): State<AppState>,
    Path(route_id): Path<RouteId>,
    Json(req): Json<CreateTripRequest>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let trip = state
        .schedules
        .create_trip(&route_id, req.date, req.time, req.price, req.seat_count)
        .await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn retract_reservation(
    State(state): State<AppState>,
    Extension(admin): Extension<Principal>,
    Path(id): Path<ReservationId>,
) -> Result<Json<CancelResponse>, AppError> {
    let outcome = state.engine.retract(&id).await?;
    info!("Admin {} retracted {}", admin.user_id, id);
    Ok(Json(CancelResponse { reservation_id: id, outcome }))
}

async fn purge_reservation(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
) -> Result<StatusCode, AppError> {
    if state.cascade.purge_reservation(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFoundError(format!("Reservation {} not found", id)))
    }
}

async fn purge_all_reservations(
    State(state): State<AppState>,
    Extension(admin): Extension<Principal>,
) -> Result<Json<DeletionSummary>, AppError> {
    info!("Admin {} purging all reservations", admin.user_id);
    Ok(Json(state.cascade.purge_all_reservations().await?))
}

async fn delete_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
) -> Result<Json<DeletionSummary>, AppError> {
    let summary = state.cascade.delete_schedule_with_retry(&trip_id, &state.retry).await?;
    Ok(Json(summary))
}

async fn delete_route(
    State(state): State<AppState>,
    Path(route_id): Path<RouteId>,
) -> Result<Json<DeletionSummary>, AppError> {
    let summary = state.cascade.delete_route_with_retry(&route_id, &state.retry).await?;
    Ok(Json(summary))
}
