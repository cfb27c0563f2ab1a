mod common;

use common::{held, seed_trip, CountingStore};
use seatline_booking::{BookingError, CascadeEngine, ReservationEngine, RetryPolicy};
use seatline_core::{
    CatalogStore, PassengerDetails, Principal, ReservationFilter, ReservationStore, ValidationError,
};
use seatline_shared::SeatId;
use seatline_store::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

async fn fill(store: &MemoryStore, trip: &seatline_shared::Trip, count: usize) {
    for n in 0..count {
        assert!(store.create_if_absent(held(&trip.id, format!("S{}", n))).await.unwrap());
    }
}

#[tokio::test]
async fn test_large_trip_is_deleted_in_bounded_batches() {
    let memory = MemoryStore::new();
    let (_, trip) = seed_trip(&memory, 44).await;
    fill(&memory, &trip, 1001).await;

    let counting = CountingStore::new(memory.clone());
    let cascade = CascadeEngine::new(Arc::new(counting.clone()), Arc::new(counting.clone())).with_batch_size(400);

    let summary = cascade.delete_schedule(&trip.id).await.unwrap();

    assert_eq!(counting.batch_sizes(), vec![400, 400, 201]);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.reservations_deleted, 1001);
    assert_eq!(summary.trips_deleted, 1);
    assert_eq!(memory.reservation_count().await, 0);
    assert!(memory.get_trip(&trip.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_route_cascade_leaves_nothing_behind() {
    let memory = MemoryStore::new();
    let (route, trip) = seed_trip(&memory, 44).await;
    fill(&memory, &trip, 12).await;

    let cascade = CascadeEngine::new(Arc::new(memory.clone()), Arc::new(memory.clone()));
    let summary = cascade.delete_route(&route.id).await.unwrap();

    assert_eq!(summary.routes_deleted, 1);
    assert_eq!(summary.reservations_deleted, 12);
    assert!(memory.trips_for_route(&route.id).await.unwrap().is_empty());
    assert!(memory
        .query(&ReservationFilter::for_trip(trip.id.clone()))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_failed_batch_keeps_earlier_batches_and_rerun_finishes() {
    let memory = MemoryStore::new();
    let (route, trip) = seed_trip(&memory, 44).await;
    fill(&memory, &trip, 10).await;

    let counting = CountingStore::new(memory.clone());
    counting.fail_batch_at(2);
    let cascade = CascadeEngine::new(Arc::new(counting.clone()), Arc::new(counting.clone())).with_batch_size(4);

    let first_run = cascade.delete_schedule(&trip.id).await;
    assert!(matches!(first_run, Err(BookingError::Storage(_))));
    assert_eq!(memory.reservation_count().await, 6);
    assert!(memory.get_trip(&trip.id).await.unwrap().is_some());

    let summary = cascade.delete_route(&route.id).await.unwrap();
    assert_eq!(summary.reservations_deleted, 6);
    assert_eq!(summary.batches, 2);
    assert_eq!(counting.batch_sizes(), vec![4, 4, 2]);
    assert_eq!(memory.reservation_count().await, 0);
}

#[tokio::test]
async fn test_retry_wrapper_reruns_cascade_after_storage_failure() {
    let memory = MemoryStore::new();
    let (route, trip) = seed_trip(&memory, 44).await;
    fill(&memory, &trip, 5).await;

    let counting = CountingStore::new(memory.clone());
    counting.fail_next_batches(2);
    let cascade = CascadeEngine::new(Arc::new(counting.clone()), Arc::new(counting.clone()));

    let policy = RetryPolicy::default().initial_delay(Duration::from_millis(1));
    let summary = cascade.delete_route_with_retry(&route.id, &policy).await.unwrap();

    assert_eq!(summary.routes_deleted, 1);
    assert_eq!(memory.reservation_count().await, 0);
}

#[tokio::test]
async fn test_retry_wrapper_gives_up_when_policy_exhausted() {
    let memory = MemoryStore::new();
    let (_, trip) = seed_trip(&memory, 44).await;
    fill(&memory, &trip, 1).await;

    let counting = CountingStore::new(memory.clone());
    counting.fail_next_batches(10);
    let cascade = CascadeEngine::new(Arc::new(counting.clone()), Arc::new(counting.clone()));

    let policy = RetryPolicy::default().max_retries(1).initial_delay(Duration::from_millis(1));
    let result = cascade.delete_schedule_with_retry(&trip.id, &policy).await;

    assert!(matches!(result, Err(BookingError::Storage(_))));
    assert_eq!(memory.reservation_count().await, 1);
}

#[tokio::test]
async fn test_trip_under_cascade_rejects_new_claims() {
    let memory = MemoryStore::new();
    let (_, trip) = seed_trip(&memory, 44).await;
    fill(&memory, &trip, 6).await;

    let counting = CountingStore::new(memory.clone());
    counting.fail_batch_at(1);
    let cascade = CascadeEngine::new(Arc::new(counting.clone()), Arc::new(counting.clone())).with_batch_size(4);

    assert!(cascade.delete_schedule(&trip.id).await.is_err());
    let interrupted = memory.get_trip(&trip.id).await.unwrap().unwrap();
    assert!(!interrupted.is_active);

    let engine = ReservationEngine::new(Arc::new(memory.clone()), Arc::new(memory.clone()));
    let claim = engine
        .reserve(
            &trip.id,
            &SeatId::new("10A"),
            &PassengerDetails::new("Dilani Jayasuriya", "0761234567"),
            &Principal::user("late-passenger"),
        )
        .await;
    assert!(matches!(
        claim,
        Err(BookingError::Validation(ValidationError::TripInactive(_)))
    ));

    let summary = cascade.delete_schedule(&trip.id).await.unwrap();
    assert_eq!(summary.trips_deleted, 1);
    assert_eq!(memory.reservation_count().await, 0);
}
