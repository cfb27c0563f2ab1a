use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures_util::{future, stream, StreamExt};
use seatline_core::repository::{
    CatalogStore, ReservationFilter, ReservationStore, SnapshotStream, SortOrder, StoreError,
    TxCommit, TxDecide, TxWrite, DEFAULT_TRANSACTION_ATTEMPTS, MAX_BATCH_WRITES,
};
use seatline_shared::{
    Masked, NewReservation, Reservation, ReservationId, ReservationStatus, Route, RouteId, SeatId,
    Trip, TripId, UserId,
};
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, OnceCell};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{error, info, warn};

/// Channel fed by the `reservations_changed` trigger; the payload is the trip id.
pub const CHANGE_CHANNEL: &str = "reservations_changed";

const RESERVATION_COLUMNS: &str =
    "id, trip_id, seat_id, passenger_name, passenger_phone, user_id, status, created_at";

/// Buffered trip ids per watcher before it lags and has to re-query.
const CHANGE_BUFFER: usize = 1024;

/// PostgreSQL-backed document store.
///
/// All watches share one `LISTEN` connection. When built with [`PgStore::connect`]
/// that connection is opened outside the pool, so open watches never hold pool
/// connections that reservations need.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    max_attempts: u32,
    listener_url: Option<String>,
    changes: Arc<OnceCell<broadcast::Sender<String>>>,
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: String,
    trip_id: String,
    seat_id: String,
    passenger_name: String,
    passenger_phone: String,
    user_id: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<ReservationStatus>()
            .map_err(|reason| StoreError::Malformed { id: row.id.clone(), reason })?;

        Ok(Reservation {
            id: ReservationId::new(row.id),
            trip_id: TripId::new(row.trip_id),
            seat_id: SeatId::new(row.seat_id),
            passenger_name: row.passenger_name,
            passenger_phone: Masked(row.passenger_phone),
            user_id: UserId::new(row.user_id),
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    id: String,
    origin: String,
    destination: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<RouteRow> for Route {
    fn from(row: RouteRow) -> Self {
        Route {
            id: RouteId::new(row.id),
            origin: row.origin,
            destination: row.destination,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: String,
    route_id: String,
    date: NaiveDate,
    time: NaiveTime,
    price: f64,
    seat_count: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = StoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        let seat_count = u32::try_from(row.seat_count).map_err(|_| StoreError::Malformed {
            id: row.id.clone(),
            reason: format!("negative seat count {}", row.seat_count),
        })?;

        Ok(Trip {
            id: TripId::new(row.id),
            route_id: RouteId::new(row.route_id),
            date: row.date,
            time: row.time,
            price: row.price,
            seat_count,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

/// Why a transaction attempt ended without a commit.
enum AttemptError {
    /// Lost a race on the same record; run the decision again.
    Retry(sqlx::Error),
    Fatal(StoreError),
}

impl From<sqlx::Error> for AttemptError {
    fn from(err: sqlx::Error) -> Self {
        let contended = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| matches!(&*code, "23505" | "40001" | "40P01"))
            .unwrap_or(false);

        if contended {
            AttemptError::Retry(err)
        } else {
            AttemptError::Fatal(backend(err))
        }
    }
}

impl From<StoreError> for AttemptError {
    fn from(err: StoreError) -> Self {
        AttemptError::Fatal(err)
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl PgStore {
    pub async fn connect(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        let mut store = Self::from_pool(pool);
        store.listener_url = Some(connection_string.to_string());
        Ok(store)
    }

    /// The shared change listener then borrows one pool connection for the life of
    /// the store.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            max_attempts: DEFAULT_TRANSACTION_ATTEMPTS,
            listener_url: None,
            changes: Arc::new(OnceCell::new()),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Starts the shared listener on first use and hands out the fan-out sender.
    async fn change_feed(&self) -> Result<&broadcast::Sender<String>, StoreError> {
        self.changes
            .get_or_try_init(|| async {
                let mut listener = match &self.listener_url {
                    Some(url) => PgListener::connect(url).await,
                    None => PgListener::connect_with(&self.pool).await,
                }
                .map_err(backend)?;
                listener.listen(CHANGE_CHANNEL).await.map_err(backend)?;

                let (sender, _) = broadcast::channel(CHANGE_BUFFER);
                tokio::spawn(forward_changes(listener, sender.clone()));
                info!("Listening on {}", CHANGE_CHANNEL);
                Ok(sender)
            })
            .await
    }

    async fn attempt(
        &self,
        id: &ReservationId,
        decide: TxDecide<'_>,
    ) -> Result<TxCommit, AttemptError> {
        let mut tx = self.pool.begin().await?;

        let select = format!("SELECT {} FROM reservations WHERE id = $1 FOR UPDATE", RESERVATION_COLUMNS);
        let previous = sqlx::query_as::<_, ReservationRow>(&select)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .map(Reservation::try_from)
            .transpose()?;

        let written = match decide(previous.as_ref()) {
            TxWrite::Create(draft) => {
                if &draft.id() != id {
                    return Err(AttemptError::Fatal(StoreError::Backend(format!(
                        "transaction on {} tried to write {}",
                        id,
                        draft.id()
                    ))));
                }
                // Without a row to lock, a concurrent insert surfaces as a unique
                // violation and the whole attempt is re-run.
                Some(if previous.is_none() {
                    insert_held(&mut tx, &draft).await?
                } else {
                    overwrite_held(&mut tx, &draft).await?
                })
            }
            TxWrite::SetStatus(status) => match &previous {
                Some(record) if record.status != status => {
                    Some(update_status(&mut tx, id, status).await?)
                }
                _ => None,
            },
            TxWrite::Skip => None,
        };

        tx.commit().await?;

        let was_written = written.is_some();
        Ok(TxCommit {
            current: written.or_else(|| previous.clone()),
            previous,
            written: was_written,
        })
    }
}

/// Relays trip ids from the `LISTEN` connection to every watcher. Runs until the
/// runtime shuts down; the listener reconnects on its own after connection loss.
async fn forward_changes(mut listener: PgListener, sender: broadcast::Sender<String>) {
    loop {
        match listener.recv().await {
            Ok(notification) => {
                // No open watch is not an error.
                let _ = sender.send(notification.payload().to_string());
            }
            Err(err) => {
                error!("Change listener failed: {}", err);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn insert_held(
    tx: &mut Transaction<'_, Postgres>,
    draft: &NewReservation,
) -> Result<Reservation, AttemptError> {
    let sql = format!(
        r#"
        INSERT INTO reservations (id, trip_id, seat_id, passenger_name, passenger_phone, user_id, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
        RETURNING {}
        "#,
        RESERVATION_COLUMNS
    );
    let row = bind_draft(sqlx::query_as::<_, ReservationRow>(&sql), draft)
        .fetch_one(&mut **tx)
        .await?;
    Ok(Reservation::try_from(row)?)
}

async fn overwrite_held(
    tx: &mut Transaction<'_, Postgres>,
    draft: &NewReservation,
) -> Result<Reservation, AttemptError> {
    let sql = format!(
        r#"
        UPDATE reservations
        SET trip_id = $2, seat_id = $3, passenger_name = $4, passenger_phone = $5,
            user_id = $6, status = $7, created_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        RESERVATION_COLUMNS
    );
    let row = bind_draft(sqlx::query_as::<_, ReservationRow>(&sql), draft)
        .fetch_one(&mut **tx)
        .await?;
    Ok(Reservation::try_from(row)?)
}

async fn update_status(
    tx: &mut Transaction<'_, Postgres>,
    id: &ReservationId,
    status: ReservationStatus,
) -> Result<Reservation, AttemptError> {
    let sql = format!(
        "UPDATE reservations SET status = $2 WHERE id = $1 RETURNING {}",
        RESERVATION_COLUMNS
    );
    let row = sqlx::query_as::<_, ReservationRow>(&sql)
        .bind(id.as_str())
        .bind(status.as_str())
        .fetch_one(&mut **tx)
        .await?;
    Ok(Reservation::try_from(row)?)
}

fn bind_draft<'q>(
    query: sqlx::query::QueryAs<'q, Postgres, ReservationRow, sqlx::postgres::PgArguments>,
    draft: &'q NewReservation,
) -> sqlx::query::QueryAs<'q, Postgres, ReservationRow, sqlx::postgres::PgArguments> {
    query
        .bind(draft.id().to_string())
        .bind(draft.trip_id.as_str())
        .bind(draft.seat_id.as_str())
        .bind(draft.passenger_name.as_str())
        .bind(draft.passenger_phone.expose().as_str())
        .bind(draft.user_id.as_str())
        .bind(ReservationStatus::Held.as_str())
}

#[async_trait]
impl ReservationStore for PgStore {
    async fn create_if_absent(&self, reservation: NewReservation) -> Result<bool, StoreError> {
        let sql = r#"
            INSERT INTO reservations (id, trip_id, seat_id, passenger_name, passenger_phone, user_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (id) DO NOTHING
            "#;
        let result = sqlx::query(sql)
            .bind(reservation.id().to_string())
            .bind(reservation.trip_id.as_str())
            .bind(reservation.seat_id.as_str())
            .bind(reservation.passenger_name.as_str())
            .bind(reservation.passenger_phone.expose().as_str())
            .bind(reservation.user_id.as_str())
            .bind(ReservationStatus::Held.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() == 1)
    }

    async fn transact(
        &self,
        id: &ReservationId,
        decide: TxDecide<'_>,
    ) -> Result<TxCommit, StoreError> {
        for attempt in 1..=self.max_attempts {
            match self.attempt(id, decide).await {
                Ok(commit) => return Ok(commit),
                Err(AttemptError::Retry(err)) => {
                    warn!("Transaction on {} contended (attempt {}): {}", id, attempt, err);
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
            }
        }

        Err(StoreError::Contention { id: id.clone(), attempts: self.max_attempts })
    }

    async fn get(&self, id: &ReservationId) -> Result<Option<Reservation>, StoreError> {
        let sql = format!("SELECT {} FROM reservations WHERE id = $1", RESERVATION_COLUMNS);
        sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Reservation::try_from)
            .transpose()
    }

    async fn query(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, StoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM reservations WHERE TRUE",
            RESERVATION_COLUMNS
        ));

        if let Some(trip_id) = &filter.trip_id {
            builder.push(" AND trip_id = ").push_bind(trip_id.as_str());
        }
        if let Some(user_id) = &filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id.as_str());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }

        builder.push(match filter.order {
            SortOrder::ById => " ORDER BY id",
            SortOrder::NewestFirst => " ORDER BY created_at DESC, id",
            SortOrder::OldestFirst => " ORDER BY created_at ASC, id",
        });

        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        builder
            .build_query_as::<ReservationRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?
            .into_iter()
            .map(Reservation::try_from)
            .collect()
    }

    async fn delete_batch(&self, ids: &[ReservationId]) -> Result<usize, StoreError> {
        if ids.len() > MAX_BATCH_WRITES {
            return Err(StoreError::BatchTooLarge {
                requested: ids.len(),
                limit: MAX_BATCH_WRITES,
            });
        }

        let keys: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let result = sqlx::query("DELETE FROM reservations WHERE id = ANY($1)")
            .bind(keys)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() as usize)
    }

    async fn watch(&self, filter: ReservationFilter) -> Result<SnapshotStream, StoreError> {
        let trip_id = filter.trip_id.clone();
        let changes = BroadcastStream::new(self.change_feed().await?.subscribe()).filter_map(
            move |change: Result<String, BroadcastStreamRecvError>| {
                let relevant = match change {
                    Ok(changed_trip) => trip_id.as_ref().map_or(true, |t| changed_trip == t.as_str()),
                    // Lagged behind and missed notifications; the next query catches up.
                    Err(_) => true,
                };
                future::ready(relevant.then_some(()))
            },
        );

        let store = self.clone();
        let snapshots = stream::once(future::ready(()))
            .chain(changes)
            .then(move |_| {
                let store = store.clone();
                let filter = filter.clone();
                async move { store.query(&filter).await }
            });

        Ok(snapshots.boxed())
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn insert_route(&self, route: &Route) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO routes (id, origin, destination, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET origin = EXCLUDED.origin, destination = EXCLUDED.destination,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(route.id.as_str())
        .bind(&route.origin)
        .bind(&route.destination)
        .bind(route.is_active)
        .bind(route.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn insert_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        let seat_count = i32::try_from(trip.seat_count).map_err(|_| StoreError::Malformed {
            id: trip.id.to_string(),
            reason: format!("seat count {} out of range", trip.seat_count),
        })?;

        sqlx::query(
            r#"
            INSERT INTO trips (id, route_id, date, time, price, seat_count, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE
            SET route_id = EXCLUDED.route_id, date = EXCLUDED.date, time = EXCLUDED.time,
                price = EXCLUDED.price, seat_count = EXCLUDED.seat_count,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(trip.id.as_str())
        .bind(trip.route_id.as_str())
        .bind(trip.date)
        .bind(trip.time)
        .bind(trip.price)
        .bind(seat_count)
        .bind(trip.is_active)
        .bind(trip.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn get_route(&self, id: &RouteId) -> Result<Option<Route>, StoreError> {
        let row = sqlx::query_as::<_, RouteRow>(
            "SELECT id, origin, destination, is_active, created_at FROM routes WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(Route::from))
    }

    async fn list_routes(&self) -> Result<Vec<Route>, StoreError> {
        let rows = sqlx::query_as::<_, RouteRow>(
            "SELECT id, origin, destination, is_active, created_at FROM routes ORDER BY origin, destination, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(Route::from).collect())
    }

    async fn set_route_active(&self, id: &RouteId, is_active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE routes SET is_active = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(is_active)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_trip(&self, id: &TripId) -> Result<Option<Trip>, StoreError> {
        sqlx::query_as::<_, TripRow>(
            "SELECT id, route_id, date, time, price, seat_count, is_active, created_at FROM trips WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .map(Trip::try_from)
        .transpose()
    }

    async fn trips_for_route(&self, route_id: &RouteId) -> Result<Vec<Trip>, StoreError> {
        sqlx::query_as::<_, TripRow>(
            r#"
            SELECT id, route_id, date, time, price, seat_count, is_active, created_at
            FROM trips
            WHERE route_id = $1
            ORDER BY date, time, id
            "#,
        )
        .bind(route_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?
        .into_iter()
        .map(Trip::try_from)
        .collect()
    }

    async fn delete_trip(&self, id: &TripId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM trips WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_route(&self, id: &RouteId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM routes WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }
}
