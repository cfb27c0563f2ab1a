use crate::engine::ReservationEngine;
use crate::{BookingError, BookingResult};
use chrono::Utc;
use futures_util::StreamExt;
use seatline_catalog::SeatLayout;
use seatline_core::repository::{ReservationFilter, SnapshotStream, StoreError};
use seatline_core::ValidationError;
use seatline_shared::{AvailabilityUpdate, Reservation, SeatId, TripId};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Per-subscription view of one trip. Never shared between subscriptions.
struct SeatState {
    trip_id: TripId,
    occupied: BTreeSet<SeatId>,
    selection: Option<SeatId>,
    revision: u64,
}

impl SeatState {
    fn new(trip_id: TripId) -> Self {
        Self {
            trip_id,
            occupied: BTreeSet::new(),
            selection: None,
            revision: 0,
        }
    }

    /// Rebuilds the occupied set from a full snapshot and drops a selection that
    /// someone else now holds.
    fn apply(&mut self, held: &[Reservation]) -> AvailabilityUpdate {
        self.occupied = held.iter().map(|r| r.seat_id.clone()).collect();
        self.revision += 1;

        let conflicted = self
            .selection
            .as_ref()
            .map_or(false, |seat| self.occupied.contains(seat));
        let conflict = if conflicted { self.selection.take() } else { None };

        AvailabilityUpdate {
            trip_id: self.trip_id.clone(),
            occupied: self.occupied.iter().cloned().collect(),
            conflict,
            revision: self.revision,
            observed_at: Utc::now().timestamp_millis(),
        }
    }
}

fn lock(state: &Mutex<SeatState>) -> MutexGuard<'_, SeatState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens live occupied-seat feeds for trips.
#[derive(Clone)]
pub struct AvailabilitySynchronizer {
    engine: ReservationEngine,
}

impl AvailabilitySynchronizer {
    pub fn new(engine: ReservationEngine) -> Self {
        Self { engine }
    }

    /// Starts following the held reservations of `trip_id`.
    ///
    /// `on_change` runs once for the initial snapshot before this returns, then once
    /// per change, in store commit order, on a background task.
    pub async fn subscribe<F>(&self, trip_id: TripId, mut on_change: F) -> BookingResult<SubscriptionHandle>
    where
        F: FnMut(&AvailabilityUpdate) + Send + 'static,
    {
        let layout = self.engine.layout_for(&trip_id).await?;
        let mut snapshots = self
            .engine
            .store()
            .watch(ReservationFilter::held_on_trip(trip_id.clone()))
            .await?;

        let mut state = SeatState::new(trip_id.clone());
        let first = match snapshots.next().await {
            Some(snapshot) => state.apply(&snapshot?),
            None => {
                return Err(BookingError::Storage(StoreError::Backend(format!(
                    "availability feed for trip {} closed before its first snapshot",
                    trip_id
                ))))
            }
        };
        on_change(&first);

        let (sender, updates) = watch::channel(first);
        let state = Arc::new(Mutex::new(state));
        let task = tokio::spawn(follow(snapshots, Arc::clone(&state), sender, on_change));

        info!("Subscribed to availability of trip {}", trip_id);
        Ok(SubscriptionHandle {
            trip_id,
            layout,
            state,
            updates,
            task: Some(task),
        })
    }

    /// Subscription without a callback, for consumers of [`SubscriptionHandle::updates`].
    pub async fn watch_trip(&self, trip_id: TripId) -> BookingResult<SubscriptionHandle> {
        self.subscribe(trip_id, |_: &AvailabilityUpdate| {}).await
    }
}

async fn follow<F>(
    mut snapshots: SnapshotStream,
    state: Arc<Mutex<SeatState>>,
    updates: watch::Sender<AvailabilityUpdate>,
    mut on_change: F,
) where
    F: FnMut(&AvailabilityUpdate) + Send + 'static,
{
    while let Some(snapshot) = snapshots.next().await {
        let held = match snapshot {
            Ok(held) => held,
            Err(err) => {
                error!("Availability snapshot failed: {}", err);
                continue;
            }
        };

        let update = lock(&state).apply(&held);
        if let Some(seat) = &update.conflict {
            warn!("Selected seat {} on trip {} was taken by another passenger", seat, update.trip_id);
        }
        on_change(&update);
        updates.send_replace(update);
    }
    debug!("Availability feed closed");
}

/// Live subscription to one trip. Released on [`unsubscribe`](Self::unsubscribe) or drop.
pub struct SubscriptionHandle {
    trip_id: TripId,
    layout: SeatLayout,
    state: Arc<Mutex<SeatState>>,
    updates: watch::Receiver<AvailabilityUpdate>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn trip_id(&self) -> &TripId {
        &self.trip_id
    }

    pub fn layout(&self) -> &SeatLayout {
        &self.layout
    }

    /// Latest delivered snapshot.
    pub fn current(&self) -> AvailabilityUpdate {
        self.updates.borrow().clone()
    }

    /// Receiver of every subsequent snapshot. Closes once the subscription is released.
    pub fn updates(&self) -> watch::Receiver<AvailabilityUpdate> {
        self.updates.clone()
    }

    pub fn selection(&self) -> Option<SeatId> {
        lock(&self.state).selection.clone()
    }

    /// Toggles the local selection. Selecting the selected seat clears it.
    pub fn select(&self, seat_id: SeatId) -> BookingResult<Option<SeatId>> {
        let mut state = lock(&self.state);

        if state.selection.as_ref() == Some(&seat_id) {
            state.selection = None;
            return Ok(None);
        }
        if !self.layout.contains(&seat_id) {
            return Err(ValidationError::UnknownSeat {
                trip_id: self.trip_id.clone(),
                seat_id,
            }
            .into());
        }
        if state.occupied.contains(&seat_id) {
            return Err(BookingError::SeatTaken {
                trip_id: self.trip_id.clone(),
                seat_id,
            });
        }

        state.selection = Some(seat_id.clone());
        Ok(Some(seat_id))
    }

    pub fn clear_selection(&self) {
        lock(&self.state).selection = None;
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Stops the feed. Once this returns the callback never runs again. Safe to call twice.
    pub async fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(err) = task.await {
                if err.is_panic() {
                    error!("Availability feed for trip {} panicked", self.trip_id);
                }
            }
            info!("Unsubscribed from availability of trip {}", self.trip_id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
