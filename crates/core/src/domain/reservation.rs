use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::time_slot::TimeSlot;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReservationId(pub i64);

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether rows in this status count against capacity.
    pub fn occupies_capacity(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Confirmed, Self::Cancelled)
        ) || *self == next
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Everything a caller supplies when asking the ledger for a table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub date: NaiveDate,
    pub time_slot: Option<TimeSlot>,
    pub party_size: u32,
    pub contact: ContactInfo,
    pub special_requests: Option<String>,
}

impl NewReservation {
    pub fn new(date: NaiveDate, time_slot: Option<TimeSlot>, party_size: u32) -> Self {
        Self {
            date,
            time_slot,
            party_size,
            contact: ContactInfo::default(),
            special_requests: None,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.party_size == 0 {
            return Err(DomainError::InvalidPartySize(self.party_size));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub date: NaiveDate,
    pub time_slot: Option<TimeSlot>,
    pub party_size: u32,
    pub contact: ContactInfo,
    pub special_requests: Option<String>,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn transition_to(&mut self, next: ReservationStatus) -> Result<(), DomainError> {
        if self.status.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidReservationTransition { from: self.status, to: next })
    }
}

/// Optional predicates for listing reservations. Empty matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationFilter {
    pub date: Option<NaiveDate>,
    pub time_slot: Option<TimeSlot>,
}

impl ReservationFilter {
    pub fn matches(&self, reservation: &Reservation) -> bool {
        self.date.map_or(true, |date| reservation.date == date)
            && self.time_slot.map_or(true, |slot| reservation.time_slot == Some(slot))
    }
}
