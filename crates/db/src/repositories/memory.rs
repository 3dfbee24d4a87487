use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use maitre_core::capacity::CapacityKey;
use maitre_core::domain::reservation::{
    NewReservation, Reservation, ReservationFilter, ReservationId, ReservationStatus,
};

use super::{RepositoryError, ReservationRepository};

#[derive(Default)]
struct Table {
    rows: Vec<Reservation>,
    last_id: i64,
}

impl Table {
    fn occupancy(&self, key: &CapacityKey) -> u32 {
        key.occupancy(&self.rows)
    }

    fn push(&mut self, reservation: &NewReservation) -> Reservation {
        self.last_id += 1;
        let row = Reservation {
            id: ReservationId(self.last_id),
            date: reservation.date,
            time_slot: reservation.time_slot,
            party_size: reservation.party_size,
            contact: reservation.contact.clone(),
            special_requests: reservation.special_requests.clone(),
            status: ReservationStatus::Pending,
            created_at: Utc::now(),
        };
        self.rows.push(row.clone());
        row
    }
}

/// Process-local reservation store; one mutex guards both the occupancy check and the push.
#[derive(Default)]
pub struct InMemoryReservationRepository {
    table: Mutex<Table>,
}

#[async_trait]
impl ReservationRepository for InMemoryReservationRepository {
    async fn occupancy(&self, key: &CapacityKey) -> Result<u32, RepositoryError> {
        Ok(self.table.lock().await.occupancy(key))
    }

    async fn insert(&self, reservation: &NewReservation) -> Result<Reservation, RepositoryError> {
        Ok(self.table.lock().await.push(reservation))
    }

    async fn insert_if_capacity(
        &self,
        reservation: &NewReservation,
        key: &CapacityKey,
        max_capacity: u32,
    ) -> Result<Option<Reservation>, RepositoryError> {
        let mut table = self.table.lock().await;
        let occupancy = u64::from(table.occupancy(key));
        if occupancy + u64::from(reservation.party_size) > u64::from(max_capacity) {
            return Ok(None);
        }
        Ok(Some(table.push(reservation)))
    }

    async fn find_by_id(&self, id: ReservationId) -> Result<Option<Reservation>, RepositoryError> {
        Ok(self.table.lock().await.rows.iter().find(|row| row.id == id).cloned())
    }

    async fn list(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, RepositoryError> {
        Ok(self.table.lock().await.rows.iter().filter(|row| filter.matches(row)).cloned().collect())
    }

    async fn update_status(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> Result<bool, RepositoryError> {
        let mut table = self.table.lock().await;
        match table.rows.iter_mut().find(|row| row.id == id && row.status == expected) {
            Some(row) => {
                row.status = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use maitre_core::capacity::{CapacityGranularity, CapacityPolicy};
    use maitre_core::domain::reservation::{NewReservation, ReservationStatus};
    use maitre_core::domain::time_slot::TimeSlot;

    use super::InMemoryReservationRepository;
    use crate::repositories::ReservationRepository;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).expect("date")
    }

    #[tokio::test]
    async fn conditional_insert_stops_at_capacity() {
        let repo = InMemoryReservationRepository::default();
        let policy = CapacityPolicy::new(6, CapacityGranularity::PerSlot);
        let slot = TimeSlot::new(19, 0);
        let key = policy.key(date(), slot);

        let first = repo.insert_if_capacity(&NewReservation::new(date(), slot, 4), &key, 6).await;
        let second = repo.insert_if_capacity(&NewReservation::new(date(), slot, 3), &key, 6).await;
        let third = repo.insert_if_capacity(&NewReservation::new(date(), slot, 2), &key, 6).await;

        assert!(first.expect("first").is_some());
        assert!(second.expect("second").is_none());
        assert!(third.expect("third").is_some());
        assert_eq!(repo.occupancy(&key).await.expect("occupancy"), 6);
    }

    #[tokio::test]
    async fn cancelled_rows_release_capacity() {
        let repo = InMemoryReservationRepository::default();
        let key = CapacityPolicy::new(4, CapacityGranularity::PerDay).key(date(), None);

        let booked = repo
            .insert_if_capacity(&NewReservation::new(date(), None, 4), &key, 4)
            .await
            .expect("insert")
            .expect("admitted");
        assert!(repo
            .update_status(booked.id, ReservationStatus::Pending, ReservationStatus::Cancelled)
            .await
            .expect("cancel"));

        let again = repo
            .insert_if_capacity(&NewReservation::new(date(), None, 4), &key, 4)
            .await
            .expect("insert");
        assert!(again.is_some());
    }
}
