use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use maitre_core::capacity::CapacityKey;
use maitre_core::domain::reservation::{
    ContactInfo, NewReservation, Reservation, ReservationFilter, ReservationId, ReservationStatus,
};
use maitre_core::domain::time_slot::TimeSlot;

use super::{RepositoryError, ReservationRepository};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SELECT_COLUMNS: &str = "SELECT id, reservation_date, time_slot, party_size, contact_name,
        contact_email, contact_phone, special_requests, status, created_at
 FROM reservation";

pub struct SqlReservationRepository {
    pool: DbPool,
}

impl SqlReservationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn slot_to_column(slot: Option<TimeSlot>) -> Option<String> {
    slot.map(|slot| format!("{:02}:{:02}", slot.hour(), slot.minute()))
}

fn date_to_column(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn decode<T, E: ToString>(result: Result<T, E>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_reservation(row: &sqlx::sqlite::SqliteRow) -> Result<Reservation, RepositoryError> {
    let id: i64 = decode(row.try_get("id"))?;
    let date_str: String = decode(row.try_get("reservation_date"))?;
    let slot_str: Option<String> = decode(row.try_get("time_slot"))?;
    let party_size: i64 = decode(row.try_get("party_size"))?;
    let status_str: String = decode(row.try_get("status"))?;
    let created_at_str: String = decode(row.try_get("created_at"))?;

    let date = decode(NaiveDate::parse_from_str(&date_str, DATE_FORMAT))?;
    let time_slot = match slot_str {
        Some(raw) => Some(
            TimeSlot::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("invalid time slot `{raw}`")))?,
        ),
        None => None,
    };
    let status = ReservationStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_str}`")))?;
    let created_at = decode(DateTime::parse_from_rfc3339(&created_at_str))?.with_timezone(&Utc);

    Ok(Reservation {
        id: ReservationId(id),
        date,
        time_slot,
        party_size: decode(u32::try_from(party_size))?,
        contact: ContactInfo {
            name: decode(row.try_get("contact_name"))?,
            email: decode(row.try_get("contact_email"))?,
            phone: decode(row.try_get("contact_phone"))?,
        },
        special_requests: decode(row.try_get("special_requests"))?,
        status,
        created_at,
    })
}

fn pending_row(reservation: &NewReservation, id: i64, created_at: DateTime<Utc>) -> Reservation {
    Reservation {
        id: ReservationId(id),
        date: reservation.date,
        time_slot: reservation.time_slot,
        party_size: reservation.party_size,
        contact: reservation.contact.clone(),
        special_requests: reservation.special_requests.clone(),
        status: ReservationStatus::Pending,
        created_at,
    }
}

#[async_trait::async_trait]
impl ReservationRepository for SqlReservationRepository {
    async fn occupancy(&self, key: &CapacityKey) -> Result<u32, RepositoryError> {
        let total: i64 = sqlx::query(
            "SELECT COALESCE(SUM(party_size), 0) AS occupancy
             FROM reservation
             WHERE reservation_date = ?
               AND (? = 0 OR time_slot IS ?)
               AND status != 'cancelled'",
        )
        .bind(date_to_column(key.date))
        .bind(key.per_slot)
        .bind(slot_to_column(key.time_slot))
        .fetch_one(&self.pool)
        .await?
        .try_get("occupancy")?;

        decode(u32::try_from(total))
    }

    async fn insert(&self, reservation: &NewReservation) -> Result<Reservation, RepositoryError> {
        let created_at = Utc::now();
        let timestamp = created_at.to_rfc3339();

        let id: i64 = sqlx::query(
            "INSERT INTO reservation (reservation_date, time_slot, party_size, contact_name,
                                      contact_email, contact_phone, special_requests, status,
                                      created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
             RETURNING id",
        )
        .bind(date_to_column(reservation.date))
        .bind(slot_to_column(reservation.time_slot))
        .bind(i64::from(reservation.party_size))
        .bind(&reservation.contact.name)
        .bind(&reservation.contact.email)
        .bind(&reservation.contact.phone)
        .bind(&reservation.special_requests)
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_one(&self.pool)
        .await?
        .try_get("id")?;

        Ok(pending_row(reservation, id, created_at))
    }

    async fn insert_if_capacity(
        &self,
        reservation: &NewReservation,
        key: &CapacityKey,
        max_capacity: u32,
    ) -> Result<Option<Reservation>, RepositoryError> {
        let created_at = Utc::now();
        let timestamp = created_at.to_rfc3339();

        // A write statement takes the database write lock before evaluating its SELECT, so the
        // occupancy sum and the insert cannot interleave with another writer.
        let row = sqlx::query(
            "INSERT INTO reservation (reservation_date, time_slot, party_size, contact_name,
                                      contact_email, contact_phone, special_requests, status,
                                      created_at, updated_at)
             SELECT ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?
             WHERE (SELECT COALESCE(SUM(party_size), 0)
                    FROM reservation
                    WHERE reservation_date = ?
                      AND (? = 0 OR time_slot IS ?)
                      AND status != 'cancelled') + ? <= ?
             RETURNING id",
        )
        .bind(date_to_column(reservation.date))
        .bind(slot_to_column(reservation.time_slot))
        .bind(i64::from(reservation.party_size))
        .bind(&reservation.contact.name)
        .bind(&reservation.contact.email)
        .bind(&reservation.contact.phone)
        .bind(&reservation.special_requests)
        .bind(&timestamp)
        .bind(&timestamp)
        .bind(date_to_column(key.date))
        .bind(key.per_slot)
        .bind(slot_to_column(key.time_slot))
        .bind(i64::from(reservation.party_size))
        .bind(i64::from(max_capacity))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let id: i64 = row.try_get("id")?;
                Ok(Some(pending_row(reservation, id, created_at)))
            }
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: ReservationId) -> Result<Option<Reservation>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_reservation(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "{SELECT_COLUMNS}
             WHERE (? IS NULL OR reservation_date = ?)
               AND (? IS NULL OR time_slot = ?)
             ORDER BY id ASC"
        ))
        .bind(filter.date.map(date_to_column))
        .bind(filter.date.map(date_to_column))
        .bind(slot_to_column(filter.time_slot))
        .bind(slot_to_column(filter.time_slot))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_reservation).collect::<Result<Vec<_>, _>>()
    }

    async fn update_status(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE reservation SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use maitre_core::capacity::{CapacityGranularity, CapacityPolicy};
    use maitre_core::domain::reservation::{
        ContactInfo, NewReservation, ReservationFilter, ReservationId, ReservationStatus,
    };
    use maitre_core::domain::time_slot::TimeSlot;

    use super::SqlReservationRepository;
    use crate::repositories::{RepositoryError, ReservationRepository};
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlReservationRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlReservationRepository::new(pool)
    }

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).expect("date")
    }

    #[tokio::test]
    async fn unreadable_created_at_is_a_decode_error() {
        let repo = repository().await;
        let saved = repo.insert(&NewReservation::new(june(1), None, 2)).await.expect("insert");
        sqlx::query("UPDATE reservation SET created_at = 'yesterday-ish' WHERE id = ?")
            .bind(saved.id.0)
            .execute(&repo.pool)
            .await
            .expect("corrupt row");

        let error = repo.find_by_id(saved.id).await.expect_err("decode failure");
        assert!(matches!(error, RepositoryError::Decode(_)));
    }

    #[tokio::test]
    async fn insert_round_trips_all_fields() {
        let repo = repository().await;
        let mut booking = NewReservation::new(june(1), TimeSlot::new(19, 30), 4);
        booking.contact = ContactInfo {
            name: Some("Asha".to_string()),
            email: Some("asha@example.com".to_string()),
            phone: None,
        };
        booking.special_requests = Some("window seat".to_string());

        let saved = repo.insert(&booking).await.expect("insert");
        let loaded = repo.find_by_id(saved.id).await.expect("find").expect("row exists");

        assert_eq!(loaded.date, june(1));
        assert_eq!(loaded.time_slot, TimeSlot::new(19, 30));
        assert_eq!(loaded.party_size, 4);
        assert_eq!(loaded.contact.email.as_deref(), Some("asha@example.com"));
        assert_eq!(loaded.special_requests.as_deref(), Some("window seat"));
        assert_eq!(loaded.status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn ids_increase_monotonically() {
        let repo = repository().await;
        let first = repo.insert(&NewReservation::new(june(1), None, 2)).await.expect("first");
        let second = repo.insert(&NewReservation::new(june(2), None, 2)).await.expect("second");
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn conditional_insert_respects_slot_capacity() {
        let repo = repository().await;
        let policy = CapacityPolicy::new(10, CapacityGranularity::PerSlot);
        let seven = TimeSlot::new(19, 0);
        let key = policy.key(june(1), seven);

        let admitted = repo
            .insert_if_capacity(&NewReservation::new(june(1), seven, 8), &key, 10)
            .await
            .expect("insert");
        assert!(admitted.is_some());

        let rejected = repo
            .insert_if_capacity(&NewReservation::new(june(1), seven, 3), &key, 10)
            .await
            .expect("insert");
        assert!(rejected.is_none());
        assert_eq!(repo.occupancy(&key).await.expect("occupancy"), 8);

        let other_slot = policy.key(june(1), TimeSlot::new(20, 0));
        let elsewhere = repo
            .insert_if_capacity(&NewReservation::new(june(1), TimeSlot::new(20, 0), 10), &other_slot, 10)
            .await
            .expect("insert");
        assert!(elsewhere.is_some());
    }

    #[tokio::test]
    async fn per_day_key_sums_every_slot_and_skips_cancelled() {
        let repo = repository().await;
        let seven = repo.insert(&NewReservation::new(june(1), TimeSlot::new(19, 0), 5)).await.expect("7pm");
        repo.insert(&NewReservation::new(june(1), TimeSlot::new(20, 0), 6)).await.expect("8pm");
        repo.insert(&NewReservation::new(june(1), None, 1)).await.expect("legacy");
        repo.insert(&NewReservation::new(june(2), None, 9)).await.expect("next day");

        let per_day = CapacityPolicy::new(50, CapacityGranularity::PerDay).key(june(1), None);
        assert_eq!(repo.occupancy(&per_day).await.expect("occupancy"), 12);

        let applied = repo
            .update_status(seven.id, ReservationStatus::Pending, ReservationStatus::Cancelled)
            .await
            .expect("cancel");
        assert!(applied);
        assert_eq!(repo.occupancy(&per_day).await.expect("occupancy"), 7);
    }

    #[tokio::test]
    async fn status_update_is_compare_and_set() {
        let repo = repository().await;
        let saved = repo.insert(&NewReservation::new(june(1), None, 2)).await.expect("insert");

        let stale = repo
            .update_status(saved.id, ReservationStatus::Confirmed, ReservationStatus::Cancelled)
            .await
            .expect("update");
        assert!(!stale);

        let missing = repo
            .update_status(ReservationId(999), ReservationStatus::Pending, ReservationStatus::Confirmed)
            .await
            .expect("update");
        assert!(!missing);
    }

    #[tokio::test]
    async fn list_filters_by_date_and_slot_in_id_order() {
        let repo = repository().await;
        repo.insert(&NewReservation::new(june(1), TimeSlot::new(19, 0), 2)).await.expect("a");
        repo.insert(&NewReservation::new(june(1), TimeSlot::new(20, 0), 3)).await.expect("b");
        repo.insert(&NewReservation::new(june(2), TimeSlot::new(19, 0), 4)).await.expect("c");

        let all = repo.list(&ReservationFilter::default()).await.expect("list");
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|pair| pair[0].id < pair[1].id));

        let june_first = ReservationFilter { date: Some(june(1)), time_slot: None };
        assert_eq!(repo.list(&june_first).await.expect("list").len(), 2);

        let seven_pm = ReservationFilter { date: None, time_slot: TimeSlot::new(19, 0) };
        let sizes: Vec<u32> =
            repo.list(&seven_pm).await.expect("list").iter().map(|r| r.party_size).collect();
        assert_eq!(sizes, vec![2, 4]);
    }
}
