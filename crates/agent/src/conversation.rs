use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use maitre_core::domain::reservation::{ContactInfo, NewReservation};
use maitre_core::domain::time_slot::TimeSlot;

pub const RESERVATION_KEYWORDS: &[&str] = &["reservation", "book a table", "reserve", "booking"];
pub const DEFAULT_PARTY_SIZE: u32 = 2;

const MERIDIEM_TOKENS: &[&str] = &["am", "pm", "a.m.", "p.m."];
const MIN_PHONE_DIGITS: usize = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Reservation,
    Inquiry,
}

impl RequestKind {
    pub fn classify(text: &str) -> Self {
        let lowered = text.to_lowercase();
        if RESERVATION_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
            Self::Reservation
        } else {
            Self::Inquiry
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reservation => "reservation",
            Self::Inquiry => "inquiry",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Extracted,
    Defaulted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentField<T> {
    pub value: T,
    pub source: FieldSource,
}

impl<T> IntentField<T> {
    pub fn extracted(value: T) -> Self {
        Self { value, source: FieldSource::Extracted }
    }

    pub fn defaulted(value: T) -> Self {
        Self { value, source: FieldSource::Defaulted }
    }

    pub fn is_extracted(&self) -> bool {
        self.source == FieldSource::Extracted
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationIntent {
    pub date: IntentField<NaiveDate>,
    pub party_size: IntentField<u32>,
    pub time_slot: IntentField<TimeSlot>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub confidence_score: u8,
    pub clarification_prompt: Option<String>,
}

impl ReservationIntent {
    pub fn to_new_reservation(&self) -> NewReservation {
        let mut reservation = NewReservation::new(
            self.date.value,
            Some(self.time_slot.value),
            self.party_size.value,
        );
        reservation.contact =
            ContactInfo { name: None, email: self.email.clone(), phone: self.phone.clone() };
        reservation
    }
}

/// Turns a free-text booking request into a [`ReservationIntent`].
pub trait IntentParser: Send + Sync {
    fn parse(&self, text: &str, today: NaiveDate) -> ReservationIntent;
}

/// First-match extraction over whitespace tokens.
///
/// Date is the first valid `YYYY-MM-DD` (or `today`/`tomorrow`), time is the first clock token
/// that is a service slot, and party size is the first bare integer that is not part of the
/// date, a time or a phone number.
#[derive(Clone, Debug)]
pub struct HeuristicIntentParser {
    service_slots: Vec<TimeSlot>,
    default_slot: TimeSlot,
    default_party_size: u32,
}

impl HeuristicIntentParser {
    pub fn new(service_slots: Vec<TimeSlot>, default_slot: TimeSlot) -> Self {
        Self { service_slots, default_slot, default_party_size: DEFAULT_PARTY_SIZE }
    }

    fn is_service_slot(&self, slot: TimeSlot) -> bool {
        self.service_slots.is_empty() || self.service_slots.contains(&slot)
    }
}

impl IntentParser for HeuristicIntentParser {
    fn parse(&self, text: &str, today: NaiveDate) -> ReservationIntent {
        let tokens = tokenize(text);
        let mut consumed = vec![false; tokens.len()];

        let date = extract_date(&tokens, today);
        let phone = extract_phone(&tokens, &mut consumed);
        let email = tokens.iter().find(|token| is_email(token)).cloned();
        let (time_slot, unsupported_time) = extract_time(&tokens, &mut consumed, self);
        let party_size = extract_party_size(&tokens, &consumed);

        let date = date.map(IntentField::extracted).unwrap_or_else(|| {
            IntentField::defaulted(today.checked_add_days(Days::new(1)).unwrap_or(today))
        });
        let party_size = party_size
            .map(IntentField::extracted)
            .unwrap_or_else(|| IntentField::defaulted(self.default_party_size));
        let time_slot = time_slot
            .map(IntentField::extracted)
            .unwrap_or_else(|| IntentField::defaulted(self.default_slot));

        let confidence_score = confidence_score(
            date.is_extracted(),
            party_size.is_extracted(),
            time_slot.is_extracted(),
            email.is_some() || phone.is_some(),
        );
        let clarification_prompt =
            clarification(&date, &party_size, &time_slot, unsupported_time, &self.service_slots);

        ReservationIntent {
            date,
            party_size,
            time_slot,
            email,
            phone,
            confidence_score,
            clarification_prompt,
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| {
            let trimmed = raw.trim_matches(|c: char| {
                matches!(c, ',' | ';' | '!' | '?' | '(' | ')' | '[' | ']' | '"' | '\'')
            });
            let lowered = trimmed.to_lowercase();
            if lowered.ends_with("a.m.") || lowered.ends_with("p.m.") {
                lowered
            } else {
                lowered.trim_end_matches('.').to_string()
            }
        })
        .filter(|token| !token.is_empty())
        .collect()
}

fn find_iso_date(token: &str) -> Option<NaiveDate> {
    let bytes = token.as_bytes();
    if bytes.len() < 10 {
        return None;
    }

    (0..=bytes.len() - 10).find_map(|start| {
        let shaped = bytes[start..start + 10].iter().enumerate().all(|(offset, byte)| {
            if offset == 4 || offset == 7 {
                *byte == b'-'
            } else {
                byte.is_ascii_digit()
            }
        });
        if !shaped {
            return None;
        }
        NaiveDate::parse_from_str(&token[start..start + 10], "%Y-%m-%d").ok()
    })
}

fn has_date_shape(token: &str) -> bool {
    token.matches('-').count() >= 2 && token.chars().filter(char::is_ascii_digit).count() >= 8
}

fn extract_date(tokens: &[String], today: NaiveDate) -> Option<NaiveDate> {
    if let Some(date) = tokens.iter().find_map(|token| find_iso_date(token)) {
        return Some(date);
    }

    tokens.iter().find_map(|token| match token.as_str() {
        "today" | "tonight" => Some(today),
        "tomorrow" => today.checked_add_days(Days::new(1)),
        _ => None,
    })
}

fn is_email(token: &str) -> bool {
    match token.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

fn is_phone_piece(token: &str) -> bool {
    let digits = token.chars().filter(char::is_ascii_digit).count();
    !has_date_shape(token)
        && token.chars().all(|c| c.is_ascii_digit() || matches!(c, '-' | '.' | '+'))
        && (digits >= 3 || (token.starts_with('+') && digits >= 1))
}

fn extract_phone(tokens: &[String], consumed: &mut [bool]) -> Option<String> {
    let mut index = 0;
    while index < tokens.len() {
        if !is_phone_piece(&tokens[index]) {
            index += 1;
            continue;
        }

        let start = index;
        while index < tokens.len() && is_phone_piece(&tokens[index]) {
            index += 1;
        }
        let run = &tokens[start..index];
        let digits: usize =
            run.iter().map(|piece| piece.chars().filter(char::is_ascii_digit).count()).sum();
        if digits >= MIN_PHONE_DIGITS {
            consumed[start..index].iter_mut().for_each(|flag| *flag = true);
            return Some(run.join(" "));
        }
    }
    None
}

fn extract_time(
    tokens: &[String],
    consumed: &mut [bool],
    parser: &HeuristicIntentParser,
) -> (Option<TimeSlot>, Option<TimeSlot>) {
    let mut unsupported = None;

    for index in 0..tokens.len() {
        if consumed[index] {
            continue;
        }

        let next_is_meridiem = tokens
            .get(index + 1)
            .map(|next| MERIDIEM_TOKENS.contains(&next.as_str()))
            .unwrap_or(false);
        // "8:00 pm" must not be read as the 24-hour "8:00".
        let joined = next_is_meridiem
            .then(|| TimeSlot::parse(&format!("{}{}", tokens[index], tokens[index + 1])))
            .flatten();
        let (slot, width) = match joined {
            Some(slot) => (slot, 2),
            None => match TimeSlot::parse(&tokens[index]) {
                Some(slot) => (slot, 1),
                None => continue,
            },
        };

        consumed[index..index + width].iter_mut().for_each(|flag| *flag = true);
        if parser.is_service_slot(slot) {
            return (Some(slot), unsupported);
        }
        unsupported.get_or_insert(slot);
    }

    (None, unsupported)
}

fn extract_party_size(tokens: &[String], consumed: &[bool]) -> Option<u32> {
    tokens
        .iter()
        .zip(consumed)
        .filter(|(_, consumed)| !**consumed)
        .map(|(token, _)| token)
        .filter(|token| token.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|token| token.parse::<u32>().ok())
        .find(|size| *size > 0)
}

fn confidence_score(has_date: bool, has_party: bool, has_time: bool, has_contact: bool) -> u8 {
    let mut score = 10u8;
    if has_date {
        score += 30;
    }
    if has_party {
        score += 30;
    }
    if has_time {
        score += 20;
    }
    if has_contact {
        score += 10;
    }
    score.min(100)
}

fn clarification(
    date: &IntentField<NaiveDate>,
    party_size: &IntentField<u32>,
    time_slot: &IntentField<TimeSlot>,
    unsupported_time: Option<TimeSlot>,
    service_slots: &[TimeSlot],
) -> Option<String> {
    if let Some(requested) = unsupported_time {
        let offered =
            service_slots.iter().map(TimeSlot::label).collect::<Vec<_>>().join(", ");
        return Some(format!(
            "We do not seat at {}. Available times: {offered}. I used {} instead.",
            requested.label(),
            time_slot.value.label()
        ));
    }

    let mut assumed = Vec::new();
    if !date.is_extracted() {
        assumed.push(format!("date {}", date.value));
    }
    if !party_size.is_extracted() {
        assumed.push(format!("party of {}", party_size.value));
    }
    if assumed.is_empty() {
        return None;
    }

    Some(format!(
        "I assumed {}. Reply with a date (YYYY-MM-DD) and the number of guests to change it.",
        assumed.join(" and ")
    ))
}
