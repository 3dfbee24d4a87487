pub mod connection;
pub mod ledger;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_with_settings, DbPool};
pub use ledger::{AdmissionOutcome, CapacityLedger, LedgerError};
pub use repositories::{
    InMemoryReservationRepository, RepositoryError, ReservationRepository,
    SqlReservationRepository,
};
