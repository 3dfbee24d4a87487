//! Capacity-aware reservation ledger.
//!
//! Every chat-path booking goes through [`CapacityLedger::admit`], which delegates the check and
//! the insert to a single atomic repository call. The sum of party sizes for a capacity key
//! therefore never exceeds the configured maximum, however many clients submit at once.

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use maitre_core::capacity::{Availability, CapacityPolicy};
use maitre_core::domain::reservation::{
    ContactInfo, NewReservation, Reservation, ReservationFilter, ReservationId, ReservationStatus,
};
use maitre_core::domain::time_slot::TimeSlot;
use maitre_core::errors::{ApplicationError, DomainError};

use crate::repositories::{RepositoryError, ReservationRepository};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("reservation {0} not found")]
    NotFound(ReservationId),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("storage failure: {0}")]
    Storage(#[from] RepositoryError),
}

impl From<LedgerError> for ApplicationError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::NotFound(id) => Self::NotFound(format!("reservation {id}")),
            LedgerError::Domain(error) => Self::Domain(error),
            LedgerError::Storage(error) => Self::Persistence(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Admitted(Reservation),
    /// Nothing was written. `availability` reflects occupancy observed right after the attempt.
    CapacityExceeded { availability: Availability },
}

impl AdmissionOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }
}

#[derive(Clone)]
pub struct CapacityLedger {
    repository: Arc<dyn ReservationRepository>,
    policy: CapacityPolicy,
}

impl CapacityLedger {
    pub fn new(repository: Arc<dyn ReservationRepository>, policy: CapacityPolicy) -> Self {
        Self { repository, policy }
    }

    pub fn policy(&self) -> CapacityPolicy {
        self.policy
    }

    pub async fn check_availability(
        &self,
        date: NaiveDate,
        time_slot: Option<TimeSlot>,
        party_size: u32,
    ) -> Result<Availability, LedgerError> {
        let key = self.policy.key(date, time_slot);
        let occupancy = self.repository.occupancy(&key).await?;
        Ok(self.policy.evaluate(occupancy, party_size))
    }

    /// Unconditional insert for operator corrections; the chat path always uses [`Self::admit`].
    pub async fn add_reservation(
        &self,
        reservation: NewReservation,
    ) -> Result<Reservation, LedgerError> {
        reservation.validate()?;
        let saved = self.repository.insert(&reservation).await?;
        info!(
            event_name = "ledger.reservation.added",
            reservation_id = saved.id.0,
            date = %saved.date,
            party_size = saved.party_size,
            "reservation recorded without capacity check"
        );
        Ok(saved)
    }

    pub async fn admit(&self, reservation: NewReservation) -> Result<AdmissionOutcome, LedgerError> {
        reservation.validate()?;
        let key = self.policy.key(reservation.date, reservation.time_slot);

        match self
            .repository
            .insert_if_capacity(&reservation, &key, self.policy.max_capacity)
            .await?
        {
            Some(saved) => {
                info!(
                    event_name = "ledger.admission.accepted",
                    reservation_id = saved.id.0,
                    date = %saved.date,
                    time_slot = ?saved.time_slot.map(|slot| slot.label()),
                    party_size = saved.party_size,
                    "reservation admitted"
                );
                Ok(AdmissionOutcome::Admitted(saved))
            }
            None => {
                let occupancy = self.repository.occupancy(&key).await?;
                let availability = self.policy.evaluate(occupancy, reservation.party_size);
                warn!(
                    event_name = "ledger.admission.rejected",
                    date = %reservation.date,
                    party_size = reservation.party_size,
                    occupancy = availability.occupancy,
                    max_capacity = availability.max_capacity,
                    "reservation rejected at capacity"
                );
                Ok(AdmissionOutcome::CapacityExceeded { availability })
            }
        }
    }

    /// One independent admission per date; a full date does not block the others.
    ///
    /// Each date carries its own result, so a storage failure on one date still reports the
    /// dates already committed. Only an invalid party size fails the whole call.
    pub async fn admit_many(
        &self,
        dates: &[NaiveDate],
        time_slot: Option<TimeSlot>,
        party_size: u32,
        contact: ContactInfo,
        special_requests: Option<String>,
    ) -> Result<Vec<(NaiveDate, Result<AdmissionOutcome, LedgerError>)>, LedgerError> {
        if party_size == 0 {
            return Err(DomainError::InvalidPartySize(party_size).into());
        }

        let mut outcomes = Vec::with_capacity(dates.len());
        for date in dates {
            let reservation = NewReservation {
                date: *date,
                time_slot,
                party_size,
                contact: contact.clone(),
                special_requests: special_requests.clone(),
            };
            let outcome = self.admit(reservation).await;
            if let Err(error) = &outcome {
                warn!(
                    event_name = "ledger.admission.failed",
                    date = %date,
                    error = %error,
                    "admission failed for one date"
                );
            }
            outcomes.push((*date, outcome));
        }
        Ok(outcomes)
    }

    pub async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, LedgerError> {
        Ok(self.repository.list(filter).await?)
    }

    pub async fn update_status(
        &self,
        id: ReservationId,
        next: ReservationStatus,
    ) -> Result<Reservation, LedgerError> {
        // Status only moves forward, so a lost compare-and-set race retries at most twice.
        loop {
            let mut current =
                self.repository.find_by_id(id).await?.ok_or(LedgerError::NotFound(id))?;
            let expected = current.status;
            current.transition_to(next)?;

            if expected == next
                || self.repository.update_status(id, expected, next).await?
            {
                info!(
                    event_name = "ledger.reservation.status_updated",
                    reservation_id = id.0,
                    from = expected.as_str(),
                    to = next.as_str(),
                    "reservation status updated"
                );
                return Ok(current);
            }
        }
    }
}
