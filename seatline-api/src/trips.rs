use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use seatline_catalog::LayoutCell;
use seatline_shared::TripId;
use serde::Serialize;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct LayoutResponse {
    pub trip_id: TripId,
    pub capacity: u32,
    pub rows: Vec<Vec<LayoutCell>>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{trip_id}/layout", get(trip_layout))
        .route("/v1/trips/{trip_id}/availability", get(availability_stream))
}

async fn trip_layout(
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
) -> Result<Json<LayoutResponse>, AppError> {
    let layout = state.engine.layout_for(&trip_id).await?;
    let rows = layout.rows().into_iter().map(<[LayoutCell]>::to_vec).collect();

    Ok(Json(LayoutResponse {
        trip_id,
        capacity: layout.capacity(),
        rows,
    }))
}

/// One `availability` event per snapshot, starting with the current one.
async fn availability_stream(
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let subscription = state.availability.watch_trip(trip_id.clone()).await?;
    debug!("SSE client attached to trip {}", trip_id);

    let stream = WatchStream::new(subscription.updates()).map(move |update| {
        // The subscription lives as long as the client stays connected.
        let _subscription = &subscription;
        Event::default().event("availability").json_data(&update)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
