//! Runs against a live database: `DATABASE_URL=postgres://... cargo test -- --ignored`.

use futures_util::StreamExt;
use seatline_core::repository::{
    ReservationFilter, ReservationStore, SnapshotStream, StoreError, TxWrite, MAX_BATCH_WRITES,
};
use seatline_shared::{Masked, NewReservation, Reservation, ReservationId, SeatId, TripId, UserId};
use seatline_store::PgStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

async fn connect(max_connections: u32) -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let store = PgStore::connect(&url, max_connections).await.unwrap();
    store.migrate().await.unwrap();
    store
}

fn draft(trip_id: &TripId, seat: &str, user: &str) -> NewReservation {
    NewReservation {
        trip_id: trip_id.clone(),
        seat_id: SeatId::new(seat),
        passenger_name: "Chamari Fernando".to_string(),
        passenger_phone: Masked("0712345678".to_string()),
        user_id: UserId::new(user),
    }
}

async fn next_snapshot(feed: &mut SnapshotStream) -> Vec<Reservation> {
    timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("snapshot within 5s")
        .expect("feed still open")
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs DATABASE_URL"]
async fn test_concurrent_claims_have_one_winner() {
    let store = Arc::new(connect(10).await);
    let trip_id = TripId::generate();
    let id = ReservationId::compose(&trip_id, &SeatId::new("1A"));

    let mut claims = Vec::new();
    for n in 0..16 {
        let store = Arc::clone(&store);
        let trip_id = trip_id.clone();
        let id = id.clone();
        claims.push(tokio::spawn(async move {
            let candidate = draft(&trip_id, "1A", &format!("u{}", n));
            store
                .transact(&id, &|current: Option<&Reservation>| match current {
                    Some(existing) if existing.is_held() => TxWrite::Skip,
                    _ => TxWrite::Create(candidate.clone()),
                })
                .await
        }));
    }

    let mut winners = 0;
    for claim in claims {
        if claim.await.unwrap().unwrap().written {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert!(store.get(&id).await.unwrap().unwrap().is_held());
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_delete_batch_limit_and_missing_ids() {
    let store = connect(5).await;
    let trip_id = TripId::generate();
    assert!(store.create_if_absent(draft(&trip_id, "1A", "u1")).await.unwrap());
    assert!(!store.create_if_absent(draft(&trip_id, "1A", "u2")).await.unwrap());

    let ids = vec![
        ReservationId::compose(&trip_id, &SeatId::new("1A")),
        ReservationId::compose(&trip_id, &SeatId::new("9D")),
    ];
    assert_eq!(store.delete_batch(&ids).await.unwrap(), 1);

    let oversized: Vec<ReservationId> = (0..=MAX_BATCH_WRITES)
        .map(|n| ReservationId::compose(&trip_id, &SeatId::new(n.to_string())))
        .collect();
    assert!(matches!(
        store.delete_batch(&oversized).await,
        Err(StoreError::BatchTooLarge { .. })
    ));
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_watch_follows_inserts_and_deletes_on_its_trip() {
    let store = connect(5).await;
    let trip_id = TripId::generate();
    let mut feed = store
        .watch(ReservationFilter::held_on_trip(trip_id.clone()))
        .await
        .unwrap();
    assert!(next_snapshot(&mut feed).await.is_empty());

    store.create_if_absent(draft(&TripId::generate(), "1A", "u1")).await.unwrap();
    store.create_if_absent(draft(&trip_id, "2B", "u1")).await.unwrap();
    let seats: Vec<String> = next_snapshot(&mut feed)
        .await
        .iter()
        .map(|r| r.seat_id.to_string())
        .collect();
    assert_eq!(seats, vec!["2B".to_string()]);

    store
        .delete_batch(&[ReservationId::compose(&trip_id, &SeatId::new("2B"))])
        .await
        .unwrap();
    assert!(next_snapshot(&mut feed).await.is_empty());
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_open_watches_do_not_exhaust_the_pool() {
    let max_connections = 3;
    let store = connect(max_connections).await;
    let trip_id = TripId::generate();

    let mut feeds = Vec::new();
    for _ in 0..(max_connections * 3) {
        let mut feed = store
            .watch(ReservationFilter::held_on_trip(trip_id.clone()))
            .await
            .unwrap();
        assert!(next_snapshot(&mut feed).await.is_empty());
        feeds.push(feed);
    }

    let created = timeout(
        Duration::from_secs(5),
        store.create_if_absent(draft(&trip_id, "3C", "u1")),
    )
    .await
    .expect("write is not starved by open watches")
    .unwrap();
    assert!(created);

    for feed in &mut feeds {
        assert_eq!(next_snapshot(feed).await.len(), 1);
    }
}
