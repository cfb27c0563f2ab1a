use async_trait::async_trait;
use chrono::Utc;
use futures_util::{future, StreamExt};
use seatline_core::repository::{
    CatalogStore, ReservationFilter, ReservationStore, SnapshotStream, StoreError, TxCommit,
    TxDecide, TxWrite, MAX_BATCH_WRITES,
};
use seatline_shared::{
    NewReservation, Reservation, ReservationId, Route, RouteId, Trip, TripId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

#[derive(Default)]
struct Collections {
    routes: HashMap<RouteId, Route>,
    trips: HashMap<TripId, Trip>,
    reservations: HashMap<ReservationId, Reservation>,
}

struct Inner {
    collections: RwLock<Collections>,
    /// Bumped once per committed reservation write, while the write lock is held.
    revision: watch::Sender<u64>,
}

/// In-process document store.
///
/// The write lock is the single serialization point for every mutation, which gives
/// `transact` and `delete_batch` their atomicity. Watchers re-read their filter on
/// every revision and only see result sets that actually changed.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                collections: RwLock::new(Collections::default()),
                revision,
            }),
        }
    }

    pub async fn reservation_count(&self) -> usize {
        self.inner.collections.read().await.reservations.len()
    }

    fn bump_revision(&self) {
        self.inner.revision.send_modify(|rev| *rev += 1);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn create_if_absent(&self, reservation: NewReservation) -> Result<bool, StoreError> {
        let mut collections = self.inner.collections.write().await;
        let id = reservation.id();
        if collections.reservations.contains_key(&id) {
            return Ok(false);
        }

        collections.reservations.insert(id, reservation.into_held(Utc::now()));
        self.bump_revision();
        Ok(true)
    }

    async fn transact(
        &self,
        id: &ReservationId,
        decide: TxDecide<'_>,
    ) -> Result<TxCommit, StoreError> {
        let mut collections = self.inner.collections.write().await;
        let previous = collections.reservations.get(id).cloned();

        let current = match decide(previous.as_ref()) {
            TxWrite::Create(draft) => {
                if &draft.id() != id {
                    return Err(StoreError::Backend(format!(
                        "transaction on {} tried to write {}",
                        id,
                        draft.id()
                    )));
                }
                let record = draft.into_held(Utc::now());
                collections.reservations.insert(id.clone(), record.clone());
                Some(record)
            }
            TxWrite::SetStatus(status) => match collections.reservations.get_mut(id) {
                Some(record) if record.status != status => {
                    record.status = status;
                    Some(record.clone())
                }
                _ => None,
            },
            TxWrite::Skip => None,
        };

        let written = current.is_some();
        if written {
            self.bump_revision();
        }

        Ok(TxCommit {
            current: current.or_else(|| previous.clone()),
            previous,
            written,
        })
    }

    async fn get(&self, id: &ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.inner.collections.read().await.reservations.get(id).cloned())
    }

    async fn query(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, StoreError> {
        let collections = self.inner.collections.read().await;
        let rows = collections
            .reservations
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        Ok(filter.arrange(rows))
    }

    async fn delete_batch(&self, ids: &[ReservationId]) -> Result<usize, StoreError> {
        if ids.len() > MAX_BATCH_WRITES {
            return Err(StoreError::BatchTooLarge {
                requested: ids.len(),
                limit: MAX_BATCH_WRITES,
            });
        }

        let mut collections = self.inner.collections.write().await;
        let removed = ids
            .iter()
            .filter(|id| collections.reservations.remove(*id).is_some())
            .count();

        if removed > 0 {
            self.bump_revision();
        }
        debug!("Deleted {} of {} reservations in batch", removed, ids.len());
        Ok(removed)
    }

    async fn watch(&self, filter: ReservationFilter) -> Result<SnapshotStream, StoreError> {
        let store = self.clone();
        let revisions = WatchStream::new(self.inner.revision.subscribe());

        let snapshots = revisions
            .then(move |_| {
                let store = store.clone();
                let filter = filter.clone();
                async move { store.query(&filter).await }
            })
            .scan(None::<Vec<Reservation>>, |last, snapshot| {
                let unchanged = matches!(
                    (&snapshot, last.as_ref()),
                    (Ok(rows), Some(prev)) if rows == prev
                );
                if !unchanged {
                    if let Ok(rows) = &snapshot {
                        *last = Some(rows.clone());
                    }
                }
                future::ready(Some((!unchanged).then_some(snapshot)))
            })
            .filter_map(future::ready);

        Ok(snapshots.boxed())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn insert_route(&self, route: &Route) -> Result<(), StoreError> {
        let mut collections = self.inner.collections.write().await;
        collections.routes.insert(route.id.clone(), route.clone());
        Ok(())
    }

    async fn insert_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        let mut collections = self.inner.collections.write().await;
        collections.trips.insert(trip.id.clone(), trip.clone());
        Ok(())
    }

    async fn get_route(&self, id: &RouteId) -> Result<Option<Route>, StoreError> {
        Ok(self.inner.collections.read().await.routes.get(id).cloned())
    }

    async fn list_routes(&self) -> Result<Vec<Route>, StoreError> {
        let collections = self.inner.collections.read().await;
        let mut routes: Vec<Route> = collections.routes.values().cloned().collect();
        routes.sort_by(|a, b| {
            (&a.origin, &a.destination, &a.id).cmp(&(&b.origin, &b.destination, &b.id))
        });
        Ok(routes)
    }

    async fn set_route_active(&self, id: &RouteId, is_active: bool) -> Result<bool, StoreError> {
        let mut collections = self.inner.collections.write().await;
        Ok(match collections.routes.get_mut(id) {
            Some(route) => {
                route.is_active = is_active;
                true
            }
            None => false,
        })
    }

    async fn get_trip(&self, id: &TripId) -> Result<Option<Trip>, StoreError> {
        Ok(self.inner.collections.read().await.trips.get(id).cloned())
    }

    async fn trips_for_route(&self, route_id: &RouteId) -> Result<Vec<Trip>, StoreError> {
        let collections = self.inner.collections.read().await;
        let mut trips: Vec<Trip> = collections
            .trips
            .values()
            .filter(|t| &t.route_id == route_id)
            .cloned()
            .collect();
        trips.sort_by(|a, b| (a.date, a.time, &a.id).cmp(&(b.date, b.time, &b.id)));
        Ok(trips)
    }

    async fn delete_trip(&self, id: &TripId) -> Result<bool, StoreError> {
        Ok(self.inner.collections.write().await.trips.remove(id).is_some())
    }

    async fn delete_route(&self, id: &RouteId) -> Result<bool, StoreError> {
        Ok(self.inner.collections.write().await.routes.remove(id).is_some())
    }
}
