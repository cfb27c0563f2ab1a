use crate::{BookingError, BookingResult};
use chrono::{NaiveDate, NaiveTime};
use seatline_catalog::{generate_seat_layout, MAX_SEAT_CAPACITY};
use seatline_core::repository::CatalogStore;
use seatline_core::validation::{validate_city, validate_price};
use seatline_core::ValidationError;
use seatline_shared::{Route, RouteId, Trip, DEFAULT_SEAT_COUNT};
use std::sync::Arc;
use tracing::info;

/// Admin-side management of routes and their scheduled trips.
#[derive(Clone)]
pub struct ScheduleManager {
    catalog: Arc<dyn CatalogStore>,
}

impl ScheduleManager {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// New active route between two cities.
    pub async fn create_route(&self, origin: &str, destination: &str) -> BookingResult<Route> {
        let route = Route::new(validate_city(origin)?, validate_city(destination)?);
        self.catalog.insert_route(&route).await?;

        info!("Route {} created: {} -> {}", route.id, route.origin, route.destination);
        Ok(route)
    }

    pub async fn set_route_active(&self, route_id: &RouteId, is_active: bool) -> BookingResult<()> {
        if !self.catalog.set_route_active(route_id, is_active).await? {
            return Err(BookingError::NotFound(format!("Route {}", route_id)));
        }
        info!("Route {} active = {}", route_id, is_active);
        Ok(())
    }

    pub async fn all_routes(&self) -> BookingResult<Vec<Route>> {
        Ok(self.catalog.list_routes().await?)
    }

    /// Routes open to passengers.
    pub async fn active_routes(&self) -> BookingResult<Vec<Route>> {
        let mut routes = self.all_routes().await?;
        routes.retain(|route| route.is_active);
        Ok(routes)
    }

    /// Schedules a trip on an existing route. Capacity defaults to a standard coach.
    pub async fn create_trip(
        &self,
        route_id: &RouteId,
        date: NaiveDate,
        time: NaiveTime,
        price: f64,
        seat_count: Option<u32>,
    ) -> BookingResult<Trip> {
        let price = validate_price(price)?;
        let seat_count = seat_count.unwrap_or(DEFAULT_SEAT_COUNT);
        if generate_seat_layout(seat_count).is_err() {
            return Err(ValidationError::InvalidSeatCount { max: MAX_SEAT_CAPACITY }.into());
        }

        if self.catalog.get_route(route_id).await?.is_none() {
            return Err(BookingError::NotFound(format!("Route {}", route_id)));
        }

        let trip = Trip::new(route_id.clone(), date, time, price).with_seat_count(seat_count);
        self.catalog.insert_trip(&trip).await?;

        info!("Trip {} scheduled on route {} for {} {}", trip.id, route_id, date, time);
        Ok(trip)
    }

    /// Active trips of a route on one date, earliest departure first.
    pub async fn trips_on(&self, route_id: &RouteId, date: NaiveDate) -> BookingResult<Vec<Trip>> {
        let mut trips = self.catalog.trips_for_route(route_id).await?;
        trips.retain(|trip| trip.is_active && trip.date == date);
        trips.sort_by_key(|trip| trip.time);
        Ok(trips)
    }
}
