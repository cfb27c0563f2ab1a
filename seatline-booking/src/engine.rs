use crate::{BookingError, BookingResult};
use seatline_catalog::{generate_seat_layout, SeatLayout};
use seatline_core::repository::{
    CatalogStore, ReservationFilter, ReservationStore, SortOrder, TxWrite,
};
use seatline_core::validation::validate_seat_selection;
use seatline_core::{PassengerDetails, Principal, ValidationError};
use seatline_shared::{
    NewReservation, Reservation, ReservationId, ReservationStatus, SeatId, Trip, TripId, UserId,
    DEFAULT_SEAT_COUNT,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a cancel or retract that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Retracted,
    /// The reservation had already been cancelled; nothing was written.
    AlreadyRetracted,
}

/// Claims, cancels and reads seat reservations.
///
/// Every claim is a single store transaction on the `<trip>_<seat>` record, so two
/// callers racing for one seat cannot both win. Nothing else is locked.
#[derive(Clone)]
pub struct ReservationEngine {
    reservations: Arc<dyn ReservationStore>,
    catalog: Arc<dyn CatalogStore>,
    default_capacity: u32,
}

impl ReservationEngine {
    pub fn new(reservations: Arc<dyn ReservationStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            reservations,
            catalog,
            default_capacity: DEFAULT_SEAT_COUNT,
        }
    }

    /// Capacity used for trips stored without one.
    pub fn with_default_capacity(mut self, capacity: u32) -> Self {
        self.default_capacity = capacity;
        self
    }

    pub fn store(&self) -> Arc<dyn ReservationStore> {
        Arc::clone(&self.reservations)
    }

    pub async fn trip(&self, trip_id: &TripId) -> BookingResult<Trip> {
        self.catalog
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Trip {}", trip_id)))
    }

    /// Seat map of an existing trip.
    pub async fn layout_for(&self, trip_id: &TripId) -> BookingResult<SeatLayout> {
        let trip = self.trip(trip_id).await?;
        self.layout_of(&trip)
    }

    pub(crate) fn layout_of(&self, trip: &Trip) -> BookingResult<SeatLayout> {
        let capacity = if trip.seat_count == 0 { self.default_capacity } else { trip.seat_count };
        Ok(generate_seat_layout(capacity)?)
    }

    /// Claims `seat_id` on `trip_id` for the calling passenger.
    ///
    /// Passenger details are checked before the store is touched. The claim fails
    /// with [`BookingError::SeatTaken`] when a held record already exists.
    pub async fn reserve(
        &self,
        trip_id: &TripId,
        seat_id: &SeatId,
        passenger: &PassengerDetails,
        principal: &Principal,
    ) -> BookingResult<ReservationId> {
        validate_seat_selection(seat_id)?;
        let passenger = passenger.validate()?;

        let trip = self.trip(trip_id).await?;
        if !trip.is_active {
            return Err(ValidationError::TripInactive(trip_id.clone()).into());
        }
        if !self.layout_of(&trip)?.contains(seat_id) {
            return Err(ValidationError::UnknownSeat {
                trip_id: trip_id.clone(),
                seat_id: seat_id.clone(),
            }
            .into());
        }

        let draft = NewReservation {
            trip_id: trip_id.clone(),
            seat_id: seat_id.clone(),
            passenger_name: passenger.name,
            passenger_phone: passenger.phone,
            user_id: principal.user_id.clone(),
        };
        let id = draft.id();

        let commit = self
            .reservations
            .transact(&id, &|current: Option<&Reservation>| match current {
                Some(existing) if existing.is_held() => TxWrite::Skip,
                _ => TxWrite::Create(draft.clone()),
            })
            .await?;

        if !commit.written {
            warn!("Seat {} on trip {} already held, claim by {} rejected", seat_id, trip_id, principal.user_id);
            return Err(BookingError::SeatTaken {
                trip_id: trip_id.clone(),
                seat_id: seat_id.clone(),
            });
        }

        info!("Reservation {} held for user {}", id, principal.user_id);
        Ok(id)
    }

    /// Cancels a reservation on behalf of its owner or an admin. The record is kept.
    pub async fn cancel(&self, id: &ReservationId, principal: &Principal) -> BookingResult<CancelOutcome> {
        self.retract_as(id, Some(principal)).await
    }

    /// Administrative cancel without an ownership check.
    pub async fn retract(&self, id: &ReservationId) -> BookingResult<CancelOutcome> {
        self.retract_as(id, None).await
    }

    async fn retract_as(&self, id: &ReservationId, principal: Option<&Principal>) -> BookingResult<CancelOutcome> {
        let permitted = |owner: &UserId| principal.map_or(true, |p| p.may_act_for(owner));

        let commit = self
            .reservations
            .transact(id, &|current: Option<&Reservation>| match current {
                Some(existing) if existing.is_held() && permitted(&existing.user_id) => {
                    TxWrite::SetStatus(ReservationStatus::Retracted)
                }
                _ => TxWrite::Skip,
            })
            .await?;

        let previous = commit
            .previous
            .ok_or_else(|| BookingError::NotFound(format!("Reservation {}", id)))?;

        if !permitted(&previous.user_id) {
            warn!("Cancel of {} refused: not owned by caller", id);
            return Err(BookingError::Forbidden(id.clone()));
        }

        if commit.written {
            info!("Reservation {} cancelled", id);
            Ok(CancelOutcome::Retracted)
        } else {
            Ok(CancelOutcome::AlreadyRetracted)
        }
    }

    pub async fn get(&self, id: &ReservationId) -> BookingResult<Option<Reservation>> {
        Ok(self.reservations.get(id).await?)
    }

    /// The caller's latest reservations, newest first.
    pub async fn recent_for_user(&self, user_id: &UserId, limit: usize) -> BookingResult<Vec<Reservation>> {
        let filter = ReservationFilter::for_user(user_id.clone())
            .order_by(SortOrder::NewestFirst)
            .limit(limit);
        Ok(self.reservations.query(&filter).await?)
    }

    /// Latest reservations across all passengers, newest first.
    pub async fn recent(&self, limit: usize) -> BookingResult<Vec<Reservation>> {
        let filter = ReservationFilter::all().order_by(SortOrder::NewestFirst).limit(limit);
        Ok(self.reservations.query(&filter).await?)
    }
}
