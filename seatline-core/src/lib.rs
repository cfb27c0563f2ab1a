pub mod principal;
pub mod repository;
pub mod validation;

pub use principal::{Principal, Role};
pub use repository::{
    CatalogStore, ReservationFilter, ReservationStore, SnapshotStream, SortOrder, StoreError,
    TxCommit, TxWrite, MAX_BATCH_WRITES,
};
pub use validation::{PassengerDetails, ValidPassenger, ValidationError};
