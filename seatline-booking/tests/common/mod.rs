#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use seatline_core::repository::{
    CatalogStore, ReservationFilter, ReservationStore, SnapshotStream, StoreError, TxCommit,
    TxDecide,
};
use seatline_shared::{
    Masked, NewReservation, Reservation, ReservationId, Route, SeatId, Trip, TripId, UserId,
};
use seatline_store::MemoryStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Wraps a [`MemoryStore`], recording every call and optionally failing batch deletes.
#[derive(Clone)]
pub struct CountingStore {
    inner: MemoryStore,
    calls: Arc<AtomicUsize>,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
    /// Batch deletes still to fail before the store recovers.
    failing_batches: Arc<AtomicUsize>,
    batch_calls: Arc<AtomicUsize>,
    /// 1-based batch call that fails; 0 disables.
    fail_at: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
            batch_sizes: Arc::new(Mutex::new(Vec::new())),
            failing_batches: Arc::new(AtomicUsize::new(0)),
            batch_calls: Arc::new(AtomicUsize::new(0)),
            fail_at: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    pub fn fail_next_batches(&self, count: usize) {
        self.failing_batches.store(count, Ordering::SeqCst);
    }

    pub fn fail_batch_at(&self, call: usize) {
        self.fail_at.store(call, Ordering::SeqCst);
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReservationStore for CountingStore {
    async fn create_if_absent(&self, reservation: NewReservation) -> Result<bool, StoreError> {
        self.record();
        self.inner.create_if_absent(reservation).await
    }

    async fn transact(&self, id: &ReservationId, decide: TxDecide<'_>) -> Result<TxCommit, StoreError> {
        self.record();
        self.inner.transact(id, decide).await
    }

    async fn get(&self, id: &ReservationId) -> Result<Option<Reservation>, StoreError> {
        self.record();
        self.inner.get(id).await
    }

    async fn query(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, StoreError> {
        self.record();
        self.inner.query(filter).await
    }

    async fn delete_batch(&self, ids: &[ReservationId]) -> Result<usize, StoreError> {
        self.record();
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self
            .failing_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
            || self.fail_at.load(Ordering::SeqCst) == call;
        if failing {
            return Err(StoreError::Backend("injected batch failure".to_string()));
        }

        let removed = self.inner.delete_batch(ids).await?;
        self.batch_sizes.lock().unwrap().push(ids.len());
        Ok(removed)
    }

    async fn watch(&self, filter: ReservationFilter) -> Result<SnapshotStream, StoreError> {
        self.record();
        self.inner.watch(filter).await
    }
}

#[async_trait]
impl CatalogStore for CountingStore {
    async fn insert_route(&self, route: &Route) -> Result<(), StoreError> {
        self.record();
        self.inner.insert_route(route).await
    }

    async fn insert_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        self.record();
        self.inner.insert_trip(trip).await
    }

    async fn get_route(&self, id: &seatline_shared::RouteId) -> Result<Option<Route>, StoreError> {
        self.record();
        self.inner.get_route(id).await
    }

    async fn list_routes(&self) -> Result<Vec<Route>, StoreError> {
        self.record();
        self.inner.list_routes().await
    }

    async fn set_route_active(&self, id: &seatline_shared::RouteId, is_active: bool) -> Result<bool, StoreError> {
        self.record();
        self.inner.set_route_active(id, is_active).await
    }

    async fn get_trip(&self, id: &TripId) -> Result<Option<Trip>, StoreError> {
        self.record();
        self.inner.get_trip(id).await
    }

    async fn trips_for_route(&self, route_id: &seatline_shared::RouteId) -> Result<Vec<Trip>, StoreError> {
        self.record();
        self.inner.trips_for_route(route_id).await
    }

    async fn delete_trip(&self, id: &TripId) -> Result<bool, StoreError> {
        self.record();
        self.inner.delete_trip(id).await
    }

    async fn delete_route(&self, id: &seatline_shared::RouteId) -> Result<bool, StoreError> {
        self.record();
        self.inner.delete_route(id).await
    }
}

pub async fn seed_trip(store: &MemoryStore, seat_count: u32) -> (Route, Trip) {
    let route = Route::new("Colombo", "Trincomalee");
    let trip = Trip::new(
        route.id.clone(),
        NaiveDate::from_ymd_opt(2026, 8, 14).unwrap(),
        NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
        1850.0,
    )
    .with_seat_count(seat_count);

    store.insert_route(&route).await.unwrap();
    store.insert_trip(&trip).await.unwrap();
    (route, trip)
}

pub fn held(trip_id: &TripId, seat: impl Into<String>) -> NewReservation {
    NewReservation {
        trip_id: trip_id.clone(),
        seat_id: SeatId::new(seat.into()),
        passenger_name: "Tharindu".to_string(),
        passenger_phone: Masked("0701234567".to_string()),
        user_id: UserId::new("seed"),
    }
}
