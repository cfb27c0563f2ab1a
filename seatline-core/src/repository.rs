use async_trait::async_trait;
use futures_util::stream::BoxStream;
use seatline_shared::{
    NewReservation, Reservation, ReservationId, ReservationStatus, Route, RouteId, Trip, TripId,
    UserId,
};

/// Hard ceiling on writes in one atomic batch imposed by the document store.
pub const MAX_BATCH_WRITES: usize = 500;

/// How often a contended transaction is re-run before giving up.
pub const DEFAULT_TRANSACTION_ATTEMPTS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Transaction on {id} did not settle after {attempts} attempts")]
    Contention { id: ReservationId, attempts: u32 },
    #[error("Batch of {requested} writes exceeds the limit of {limit}")]
    BatchTooLarge { requested: usize, limit: usize },
    #[error("Malformed record {id}: {reason}")]
    Malformed { id: String, reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    ById,
    NewestFirst,
    OldestFirst,
}

/// Query over the reservations collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub trip_id: Option<TripId>,
    pub user_id: Option<UserId>,
    pub status: Option<ReservationStatus>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl ReservationFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_trip(trip_id: TripId) -> Self {
        Self { trip_id: Some(trip_id), ..Self::default() }
    }

    /// The live-availability query: held reservations of one trip.
    pub fn held_on_trip(trip_id: TripId) -> Self {
        Self {
            trip_id: Some(trip_id),
            status: Some(ReservationStatus::Held),
            ..Self::default()
        }
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self { user_id: Some(user_id), ..Self::default() }
    }

    pub fn order_by(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Predicate half of the filter; ordering and limit are applied by the store.
    pub fn matches(&self, reservation: &Reservation) -> bool {
        self.trip_id.as_ref().map_or(true, |t| &reservation.trip_id == t)
            && self.user_id.as_ref().map_or(true, |u| &reservation.user_id == u)
            && self.status.map_or(true, |s| reservation.status == s)
    }

    /// Sorts and truncates a matched result set.
    pub fn arrange(&self, mut rows: Vec<Reservation>) -> Vec<Reservation> {
        match self.order {
            SortOrder::ById => rows.sort_by(|a, b| a.id.cmp(&b.id)),
            SortOrder::NewestFirst => rows.sort_by(|a, b| {
                b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
            }),
            SortOrder::OldestFirst => rows.sort_by(|a, b| {
                a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
            }),
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

/// Write decided inside a transaction after reading the current record.
#[derive(Debug, Clone, PartialEq)]
pub enum TxWrite {
    /// Write a fresh held record, replacing whatever is stored. The store stamps `created_at`.
    Create(NewReservation),
    /// Change the status of the record that was read. No-op when the record is absent.
    SetStatus(ReservationStatus),
    /// Leave the record untouched.
    Skip,
}

/// Result of a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TxCommit {
    /// Record as read inside the winning attempt.
    pub previous: Option<Reservation>,
    /// Record as stored after the commit.
    pub current: Option<Reservation>,
    pub written: bool,
}

/// Decision function run against the record read inside a transaction. The store may
/// call it more than once when the transaction is contended.
pub type TxDecide<'a> = &'a (dyn Fn(Option<&Reservation>) -> TxWrite + Send + Sync);

/// Full result sets, one per change affecting the watched filter. The first item is
/// the current state.
pub type SnapshotStream = BoxStream<'static, Result<Vec<Reservation>, StoreError>>;

/// The only seam touching reservation storage.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Writes a held record unless any record exists at its id. Returns whether it was created.
    async fn create_if_absent(&self, reservation: NewReservation) -> Result<bool, StoreError>;

    /// Atomic read-then-conditional-write against one record.
    async fn transact(
        &self,
        id: &ReservationId,
        decide: TxDecide<'_>,
    ) -> Result<TxCommit, StoreError>;

    async fn get(&self, id: &ReservationId) -> Result<Option<Reservation>, StoreError>;

    async fn query(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, StoreError>;

    /// Deletes all ids in one atomic batch. Absent ids are ignored. Returns the number removed.
    async fn delete_batch(&self, ids: &[ReservationId]) -> Result<usize, StoreError>;

    async fn watch(&self, filter: ReservationFilter) -> Result<SnapshotStream, StoreError>;
}

/// Routes and trips, as far as the reservation engines need them.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_route(&self, route: &Route) -> Result<(), StoreError>;

    async fn insert_trip(&self, trip: &Trip) -> Result<(), StoreError>;

    async fn get_route(&self, id: &RouteId) -> Result<Option<Route>, StoreError>;

    /// All routes ordered by origin, then destination.
    async fn list_routes(&self) -> Result<Vec<Route>, StoreError>;

    /// Returns whether the route exists.
    async fn set_route_active(&self, id: &RouteId, is_active: bool) -> Result<bool, StoreError>;

    async fn get_trip(&self, id: &TripId) -> Result<Option<Trip>, StoreError>;

    /// Trips of a route ordered by date, then time.
    async fn trips_for_route(&self, route_id: &RouteId) -> Result<Vec<Trip>, StoreError>;

    /// Returns whether a trip was removed.
    async fn delete_trip(&self, id: &TripId) -> Result<bool, StoreError>;

    /// Returns whether a route was removed.
    async fn delete_route(&self, id: &RouteId) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use seatline_shared::{Masked, SeatId};

    fn held(trip: &str, seat: &str, user: &str, age_minutes: i64) -> Reservation {
        NewReservation {
            trip_id: TripId::new(trip),
            seat_id: SeatId::new(seat),
            passenger_name: "Test Passenger".to_string(),
            passenger_phone: Masked("0771234567".to_string()),
            user_id: UserId::new(user),
        }
        .into_held(Utc::now() - Duration::minutes(age_minutes))
    }

    #[test]
    fn test_filter_matches_trip_and_status() {
        let mut cancelled = held("t1", "2B", "u1", 0);
        cancelled.status = ReservationStatus::Retracted;

        let filter = ReservationFilter::held_on_trip(TripId::new("t1"));
        assert!(filter.matches(&held("t1", "1A", "u1", 0)));
        assert!(!filter.matches(&held("t2", "1A", "u1", 0)));
        assert!(!filter.matches(&cancelled));
    }

    #[test]
    fn test_arrange_newest_first_with_limit() {
        let rows = vec![held("t1", "1A", "u1", 30), held("t1", "1B", "u1", 5), held("t1", "1C", "u1", 10)];

        let arranged = ReservationFilter::for_user(UserId::new("u1"))
            .order_by(SortOrder::NewestFirst)
            .limit(2)
            .arrange(rows);

        let seats: Vec<&str> = arranged.iter().map(|r| r.seat_id.as_str()).collect();
        assert_eq!(seats, vec!["1B", "1C"]);
    }
}
