use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use seatline_shared::{Route, RouteId, Trip};
use serde::Deserialize;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct TripsQuery {
    /// `YYYY-MM-DD`
    pub date: NaiveDate,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/routes", get(list_active_routes))
        .route("/v1/routes/{route_id}/trips", get(trips_on_date))
}

async fn list_active_routes(State(state): State<AppState>) -> Result<Json<Vec<Route>>, AppError> {
    Ok(Json(state.schedules.active_routes().await?))
}

async fn trips_on_date(
    State(state): State<AppState>,
    Path(route_id): Path<RouteId>,
    Query(query): Query<TripsQuery>,
) -> Result<Json<Vec<Trip>>, AppError> {
    Ok(Json(state.schedules.trips_on(&route_id, query.date).await?))
}
