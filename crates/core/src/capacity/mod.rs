//! Admission math for the reservation ledger.
//!
//! Storage backends compute occupancy for a [`CapacityKey`]; everything else (the admit
//! decision, remaining seats, which reservations share a key) is decided here so every backend
//! answers the same way.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::reservation::Reservation;
use crate::domain::time_slot::TimeSlot;

pub const DEFAULT_MAX_CAPACITY: u32 = 50;

const POLICY_CAPACITY_LABEL: &str = "max capacity:";

/// Whether seats are counted per service slot or per calendar day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityGranularity {
    #[default]
    PerSlot,
    PerDay,
}

impl CapacityGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerSlot => "per_slot",
            Self::PerDay => "per_day",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_slot" | "slot" => Some(Self::PerSlot),
            "per_day" | "day" => Some(Self::PerDay),
            _ => None,
        }
    }
}

/// The bucket that occupancy is summed over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapacityKey {
    pub date: NaiveDate,
    /// `None` either because the policy is per-day or because the row predates slots.
    pub time_slot: Option<TimeSlot>,
    pub per_slot: bool,
}

impl CapacityKey {
    pub fn contains(&self, reservation: &Reservation) -> bool {
        reservation.date == self.date
            && (!self.per_slot || reservation.time_slot == self.time_slot)
            && reservation.status.occupies_capacity()
    }

    /// Seats held under this key by `reservations`.
    pub fn occupancy<'a, I>(&self, reservations: I) -> u32
    where
        I: IntoIterator<Item = &'a Reservation>,
    {
        reservations
            .into_iter()
            .filter(|reservation| self.contains(reservation))
            .fold(0u32, |total, reservation| total.saturating_add(reservation.party_size))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityPolicy {
    pub max_capacity: u32,
    pub granularity: CapacityGranularity,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self { max_capacity: DEFAULT_MAX_CAPACITY, granularity: CapacityGranularity::default() }
    }
}

/// Result of comparing a requested party against current occupancy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub admit: bool,
    pub remaining: u32,
    pub occupancy: u32,
    pub max_capacity: u32,
}

impl CapacityPolicy {
    pub fn new(max_capacity: u32, granularity: CapacityGranularity) -> Self {
        Self { max_capacity, granularity }
    }

    /// Explicit configuration wins, then the policy document, then the static default.
    pub fn resolve(
        configured: Option<u32>,
        policy_text: Option<&str>,
        granularity: CapacityGranularity,
    ) -> Self {
        let max_capacity = configured
            .or_else(|| policy_text.and_then(max_capacity_from_policy_text))
            .unwrap_or(DEFAULT_MAX_CAPACITY);
        Self::new(max_capacity, granularity)
    }

    pub fn key(&self, date: NaiveDate, time_slot: Option<TimeSlot>) -> CapacityKey {
        match self.granularity {
            CapacityGranularity::PerSlot => CapacityKey { date, time_slot, per_slot: true },
            CapacityGranularity::PerDay => CapacityKey { date, time_slot: None, per_slot: false },
        }
    }

    pub fn evaluate(&self, occupancy: u32, party_size: u32) -> Availability {
        let admit = u64::from(occupancy) + u64::from(party_size) <= u64::from(self.max_capacity);
        Availability {
            admit,
            remaining: self.max_capacity.saturating_sub(occupancy),
            occupancy,
            max_capacity: self.max_capacity,
        }
    }
}

/// Reads `Max Capacity: N` (case-insensitive) from free policy text.
pub fn max_capacity_from_policy_text(text: &str) -> Option<u32> {
    let lowered = text.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(offset) = lowered[search_from..].find(POLICY_CAPACITY_LABEL) {
        let value_start = search_from + offset + POLICY_CAPACITY_LABEL.len();
        let digits: String = lowered[value_start..]
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(value) = digits.parse::<u32>() {
            if value > 0 {
                return Some(value);
            }
        }
        search_from = value_start;
    }

    None
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::{
        max_capacity_from_policy_text, CapacityGranularity, CapacityPolicy, DEFAULT_MAX_CAPACITY,
    };
    use crate::domain::reservation::{
        ContactInfo, Reservation, ReservationId, ReservationStatus,
    };
    use crate::domain::time_slot::TimeSlot;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).expect("date")
    }

    fn booking(id: i64, slot: Option<TimeSlot>, size: u32, status: ReservationStatus) -> Reservation {
        Reservation {
            id: ReservationId(id),
            date: date(),
            time_slot: slot,
            party_size: size,
            contact: ContactInfo::default(),
            special_requests: None,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn exact_fill_admits_and_one_over_rejects() {
        let policy = CapacityPolicy::new(50, CapacityGranularity::PerSlot);

        let exact = policy.evaluate(46, 4);
        assert!(exact.admit);
        assert_eq!(exact.remaining, 4);

        let over = policy.evaluate(46, 5);
        assert!(!over.admit);
        assert_eq!(over.remaining, 4);
    }

    #[test]
    fn empty_ledger_reports_full_capacity() {
        let availability = CapacityPolicy::default().evaluate(0, 50);
        assert!(availability.admit);
        assert_eq!(availability.remaining, DEFAULT_MAX_CAPACITY);
    }

    #[test]
    fn per_slot_occupancy_ignores_other_slots_and_cancellations() {
        let seven = TimeSlot::new(19, 0);
        let eight = TimeSlot::new(20, 0);
        let rows = vec![
            booking(1, seven, 10, ReservationStatus::Pending),
            booking(2, seven, 5, ReservationStatus::Confirmed),
            booking(3, seven, 20, ReservationStatus::Cancelled),
            booking(4, eight, 7, ReservationStatus::Pending),
        ];

        let per_slot = CapacityPolicy::new(50, CapacityGranularity::PerSlot);
        assert_eq!(per_slot.key(date(), seven).occupancy(&rows), 15);

        let per_day = CapacityPolicy::new(50, CapacityGranularity::PerDay);
        assert_eq!(per_day.key(date(), seven).occupancy(&rows), 22);
    }

    #[test]
    fn policy_text_capacity_is_parsed_case_insensitively() {
        assert_eq!(max_capacity_from_policy_text("Seating\nMax Capacity: 80 guests"), Some(80));
        assert_eq!(max_capacity_from_policy_text("MAX CAPACITY:120"), Some(120));
        assert_eq!(max_capacity_from_policy_text("max capacity: unknown"), None);
    }

    #[test]
    fn resolve_prefers_config_then_document_then_default() {
        let granularity = CapacityGranularity::PerDay;
        assert_eq!(
            CapacityPolicy::resolve(Some(30), Some("Max Capacity: 80"), granularity).max_capacity,
            30
        );
        assert_eq!(
            CapacityPolicy::resolve(None, Some("Max Capacity: 80"), granularity).max_capacity,
            80
        );
        assert_eq!(
            CapacityPolicy::resolve(None, None, granularity).max_capacity,
            DEFAULT_MAX_CAPACITY
        );
    }
}
