use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::{BookingError, BookingResult};
use seatline_core::repository::{CatalogStore, ReservationFilter, ReservationStore, MAX_BATCH_WRITES};
use seatline_shared::{ReservationId, RouteId, TripId};
use serde::Serialize;
use std::slice;
use std::sync::Arc;
use tracing::{debug, error, info};

pub const DEFAULT_BATCH_SIZE: usize = 400;

/// What a cascade removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionSummary {
    pub routes_deleted: usize,
    pub trips_deleted: usize,
    pub reservations_deleted: usize,
    pub batches: usize,
}

impl DeletionSummary {
    fn absorb(&mut self, other: DeletionSummary) {
        self.routes_deleted += other.routes_deleted;
        self.trips_deleted += other.trips_deleted;
        self.reservations_deleted += other.reservations_deleted;
        self.batches += other.batches;
    }
}

/// Removes routes, trips and reservations parent-last.
///
/// Each batch is atomic on its own; a failure midway leaves earlier batches deleted
/// and the cascade can simply be run again.
#[derive(Clone)]
pub struct CascadeEngine {
    reservations: Arc<dyn ReservationStore>,
    catalog: Arc<dyn CatalogStore>,
    batch_size: usize,
}

impl CascadeEngine {
    pub fn new(reservations: Arc<dyn ReservationStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            reservations,
            catalog,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Clamped to `1..=MAX_BATCH_WRITES`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_WRITES);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Deletes every reservation of a trip, then the trip.
    ///
    /// The trip is closed first so claims arriving mid-cascade fail as inactive
    /// instead of landing on a trip that is about to disappear.
    pub async fn delete_schedule(&self, trip_id: &TripId) -> BookingResult<DeletionSummary> {
        if let Some(mut trip) = self.catalog.get_trip(trip_id).await? {
            if trip.is_active {
                trip.is_active = false;
                self.catalog.insert_trip(&trip).await?;
                debug!("Trip {} closed for cascade", trip_id);
            }
        }

        let reservations = self
            .reservations
            .query(&ReservationFilter::for_trip(trip_id.clone()))
            .await?;
        let ids: Vec<ReservationId> = reservations.into_iter().map(|r| r.id).collect();

        let mut summary = self.delete_in_batches(&ids).await?;
        if self.catalog.delete_trip(trip_id).await? {
            summary.trips_deleted += 1;
        }

        info!(
            "Deleted trip {} with {} reservations in {} batches",
            trip_id, summary.reservations_deleted, summary.batches
        );
        Ok(summary)
    }

    /// Deletes each trip of the route in turn, then the route.
    pub async fn delete_route(&self, route_id: &RouteId) -> BookingResult<DeletionSummary> {
        let trips = self.catalog.trips_for_route(route_id).await?;
        let mut summary = DeletionSummary::default();

        for trip in &trips {
            summary.absorb(self.delete_schedule(&trip.id).await?);
        }
        if self.catalog.delete_route(route_id).await? {
            summary.routes_deleted += 1;
        }

        info!(
            "Deleted route {}: {} trips, {} reservations",
            route_id, summary.trips_deleted, summary.reservations_deleted
        );
        Ok(summary)
    }

    /// Clears the whole reservations collection.
    pub async fn purge_all_reservations(&self) -> BookingResult<DeletionSummary> {
        let reservations = self.reservations.query(&ReservationFilter::all()).await?;
        let ids: Vec<ReservationId> = reservations.into_iter().map(|r| r.id).collect();

        let summary = self.delete_in_batches(&ids).await?;
        info!("Purged {} reservations", summary.reservations_deleted);
        Ok(summary)
    }

    /// Erases one reservation record outright. Returns whether it existed.
    pub async fn purge_reservation(&self, id: &ReservationId) -> BookingResult<bool> {
        let removed = self.reservations.delete_batch(slice::from_ref(id)).await? > 0;
        if removed {
            info!("Purged reservation {}", id);
        }
        Ok(removed)
    }

    pub async fn delete_schedule_with_retry(
        &self,
        trip_id: &TripId,
        policy: &RetryPolicy,
    ) -> BookingResult<DeletionSummary> {
        retry_with_backoff(policy, BookingError::is_retryable, || self.delete_schedule(trip_id)).await
    }

    pub async fn delete_route_with_retry(
        &self,
        route_id: &RouteId,
        policy: &RetryPolicy,
    ) -> BookingResult<DeletionSummary> {
        retry_with_backoff(policy, BookingError::is_retryable, || self.delete_route(route_id)).await
    }

    async fn delete_in_batches(&self, ids: &[ReservationId]) -> BookingResult<DeletionSummary> {
        let mut summary = DeletionSummary::default();

        for chunk in ids.chunks(self.batch_size) {
            let removed = self.reservations.delete_batch(chunk).await.map_err(|err| {
                error!(
                    "Batch delete failed after {} of {} reservations: {}",
                    summary.reservations_deleted,
                    ids.len(),
                    err
                );
                err
            })?;
            summary.batches += 1;
            summary.reservations_deleted += removed;
            debug!("Batch {} removed {} reservations", summary.batches, removed);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use seatline_shared::{Masked, NewReservation, Route, SeatId, Trip, UserId};
    use seatline_store::MemoryStore;

    fn trip_on(route: &Route, day: u32) -> Trip {
        Trip::new(
            route.id.clone(),
            NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            1200.0,
        )
    }

    async fn seed(store: &MemoryStore, trip: &Trip, seats: &[&str]) {
        store.insert_trip(trip).await.unwrap();
        for seat in seats {
            store
                .create_if_absent(NewReservation {
                    trip_id: trip.id.clone(),
                    seat_id: SeatId::new(*seat),
                    passenger_name: "Dilani".to_string(),
                    passenger_phone: Masked("0779999999".to_string()),
                    user_id: UserId::new("u1"),
                })
                .await
                .unwrap();
        }
    }

    fn cascade(store: &MemoryStore) -> CascadeEngine {
        CascadeEngine::new(Arc::new(store.clone()), Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_delete_route_removes_every_descendant() {
        let store = MemoryStore::new();
        let route = Route::new("Colombo", "Galle");
        let other = Route::new("Colombo", "Kurunegala");
        store.insert_route(&route).await.unwrap();
        store.insert_route(&other).await.unwrap();

        let (first, second, unrelated) = (trip_on(&route, 1), trip_on(&route, 2), trip_on(&other, 1));
        seed(&store, &first, &["1A", "1B"]).await;
        seed(&store, &second, &["2A"]).await;
        seed(&store, &unrelated, &["3A"]).await;

        let summary = cascade(&store).delete_route(&route.id).await.unwrap();
        assert_eq!(
            summary,
            DeletionSummary { routes_deleted: 1, trips_deleted: 2, reservations_deleted: 3, batches: 2 }
        );

        assert!(store.get_route(&route.id).await.unwrap().is_none());
        assert!(store.trips_for_route(&route.id).await.unwrap().is_empty());
        assert!(store.query(&ReservationFilter::for_trip(first.id.clone())).await.unwrap().is_empty());
        assert_eq!(store.reservation_count().await, 1);
        assert!(store.get_trip(&unrelated.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_trip_submits_no_batch() {
        let store = MemoryStore::new();
        let route = Route::new("Matara", "Tangalle");
        let trip = trip_on(&route, 5);
        seed(&store, &trip, &[]).await;

        let summary = cascade(&store).delete_schedule(&trip.id).await.unwrap();
        assert_eq!(summary.batches, 0);
        assert_eq!(summary.trips_deleted, 1);
    }

    #[tokio::test]
    async fn test_rerun_after_completion_is_a_noop() {
        let store = MemoryStore::new();
        let route = Route::new("Badulla", "Ella");
        store.insert_route(&route).await.unwrap();
        seed(&store, &trip_on(&route, 9), &["1A"]).await;

        let engine = cascade(&store);
        engine.delete_route(&route.id).await.unwrap();
        assert_eq!(engine.delete_route(&route.id).await.unwrap(), DeletionSummary::default());
    }

    #[tokio::test]
    async fn test_purge_single_and_all() {
        let store = MemoryStore::new();
        let route = Route::new("Jaffna", "Point Pedro");
        let trip = trip_on(&route, 3);
        seed(&store, &trip, &["1A", "1B", "1C"]).await;

        let engine = cascade(&store).with_batch_size(2);
        let id = ReservationId::compose(&trip.id, &SeatId::new("1A"));
        assert!(engine.purge_reservation(&id).await.unwrap());
        assert!(!engine.purge_reservation(&id).await.unwrap());

        let summary = engine.purge_all_reservations().await.unwrap();
        assert_eq!(summary.reservations_deleted, 2);
        assert_eq!(summary.batches, 1);
        assert_eq!(store.reservation_count().await, 0);
        assert!(store.get_trip(&trip.id).await.unwrap().is_some());
    }

    #[test]
    fn test_batch_size_is_clamped_to_store_ceiling() {
        let store = MemoryStore::new();
        assert_eq!(cascade(&store).with_batch_size(10_000).batch_size(), MAX_BATCH_WRITES);
        assert_eq!(cascade(&store).with_batch_size(0).batch_size(), 1);
    }
}
