use async_trait::async_trait;
use thiserror::Error;

use maitre_core::capacity::CapacityKey;
use maitre_core::domain::reservation::{
    NewReservation, Reservation, ReservationFilter, ReservationId, ReservationStatus,
};

pub mod memory;
pub mod reservation;

pub use memory::InMemoryReservationRepository;
pub use reservation::SqlReservationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Storage for reservations.
///
/// `insert_if_capacity` must check occupancy and insert as one atomic step: no other writer may
/// change the occupancy of `key` between the check and the insert.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn occupancy(&self, key: &CapacityKey) -> Result<u32, RepositoryError>;

    async fn insert(&self, reservation: &NewReservation) -> Result<Reservation, RepositoryError>;

    /// Inserts as `Pending` when `occupancy(key) + party_size <= max_capacity`, otherwise
    /// returns `None` and writes nothing.
    async fn insert_if_capacity(
        &self,
        reservation: &NewReservation,
        key: &CapacityKey,
        max_capacity: u32,
    ) -> Result<Option<Reservation>, RepositoryError>;

    async fn find_by_id(&self, id: ReservationId) -> Result<Option<Reservation>, RepositoryError>;

    /// Ordered by id.
    async fn list(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, RepositoryError>;

    /// Compare-and-set on status; returns `false` when the row no longer has `expected`.
    async fn update_status(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> Result<bool, RepositoryError>;
}
