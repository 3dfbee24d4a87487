//! The per-turn booking loop.
//!
//! A message is classified, then either admitted against the ledger (reservation path) or
//! answered from the knowledge base (inquiry path). Generation problems degrade the reply but
//! never undo a booking; storage problems are the only hard failures.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use maitre_core::capacity::{Availability, CapacityGranularity};
use maitre_core::domain::reservation::Reservation;
use maitre_db::{AdmissionOutcome, CapacityLedger, LedgerError};

use crate::answerer::{AnswerError, RetrievalAugmentedAnswerer};
use crate::conversation::{IntentParser, RequestKind, ReservationIntent};
use crate::persona::Persona;
use crate::session::{ChatRole, SessionContext};

pub const NOT_INITIALIZED_NOTE: &str = "knowledge base not initialized";
pub const GENERATION_FAILED_NOTE: &str = "could not generate a detailed answer";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Clone, Debug, Serialize)]
pub struct TurnOutcome {
    pub kind: RequestKind,
    /// Reply parts in display order; for bookings the structured confirmation comes first.
    pub messages: Vec<String>,
    pub intent: Option<ReservationIntent>,
    pub reservation: Option<Reservation>,
    pub availability: Option<Availability>,
    pub sources: Vec<String>,
}

impl TurnOutcome {
    fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            messages: Vec::new(),
            intent: None,
            reservation: None,
            availability: None,
            sources: Vec::new(),
        }
    }

    pub fn reply(&self) -> String {
        self.messages.join("\n\n")
    }
}

pub struct BookingOrchestrator {
    parser: Arc<dyn IntentParser>,
    ledger: CapacityLedger,
    answerer: Arc<RetrievalAugmentedAnswerer>,
}

impl BookingOrchestrator {
    pub fn new(
        parser: Arc<dyn IntentParser>,
        ledger: CapacityLedger,
        answerer: Arc<RetrievalAugmentedAnswerer>,
    ) -> Self {
        Self { parser, ledger, answerer }
    }

    pub fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    pub async fn handle_message(
        &self,
        session: &mut SessionContext,
        text: &str,
    ) -> Result<TurnOutcome, OrchestratorError> {
        self.handle_message_on(session, text, Utc::now().date_naive()).await
    }

    /// Same as [`Self::handle_message`] with an explicit "today" for relative dates.
    pub async fn handle_message_on(
        &self,
        session: &mut SessionContext,
        text: &str,
        today: NaiveDate,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let kind = RequestKind::classify(text);
        info!(
            event_name = "agent.turn.classified",
            correlation_id = %session.id,
            kind = kind.as_str(),
            "chat turn classified"
        );

        session.record(ChatRole::User, text);
        let outcome = match kind {
            RequestKind::Reservation => self.handle_reservation(session, text, today).await?,
            RequestKind::Inquiry => self.handle_inquiry(session, text).await,
        };
        session.record(ChatRole::Assistant, outcome.reply());

        Ok(outcome)
    }

    async fn handle_reservation(
        &self,
        session: &SessionContext,
        text: &str,
        today: NaiveDate,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let mut outcome = TurnOutcome::new(RequestKind::Reservation);
        let intent = self.parser.parse(text, today);
        let request = intent.to_new_reservation();

        match self.ledger.admit(request).await? {
            AdmissionOutcome::CapacityExceeded { availability } => {
                let granularity = self.ledger.policy().granularity;
                outcome
                    .messages
                    .push(capacity_exceeded_message(&intent, &availability, granularity));
                outcome.availability = Some(availability);
            }
            AdmissionOutcome::Admitted(reservation) => {
                let confirmation = confirmation_message(&reservation, &intent);
                let question = format!(
                    "Phrase a short, friendly confirmation for this booking.\n{confirmation}\nGuest message: {text}"
                );
                outcome.messages.push(confirmation);

                match self.answerer.answer(&question, Persona::for_request(outcome.kind)).await {
                    Ok(answer) => {
                        outcome.sources = source_names(&answer.context);
                        outcome.messages.push(answer.text);
                    }
                    Err(error) => {
                        outcome.messages.push(degraded_note(session, &error));
                    }
                }
                outcome.reservation = Some(reservation);
            }
        }

        outcome.intent = Some(intent);
        Ok(outcome)
    }

    async fn handle_inquiry(&self, session: &SessionContext, text: &str) -> TurnOutcome {
        let mut outcome = TurnOutcome::new(RequestKind::Inquiry);
        let persona = Persona::for_request(RequestKind::Inquiry);
        match self.answerer.answer(text, persona).await {
            Ok(answer) => {
                outcome.sources = source_names(&answer.context);
                outcome.messages.push(answer.text);
            }
            Err(error) => outcome.messages.push(degraded_note(session, &error)),
        }
        outcome
    }
}

fn capacity_exceeded_message(
    intent: &ReservationIntent,
    availability: &Availability,
    granularity: CapacityGranularity,
) -> String {
    // Per-day capacity is one pool for the whole date, so no slot is named.
    let pool = match granularity {
        CapacityGranularity::PerSlot => format!(" at {}", intent.time_slot.value),
        CapacityGranularity::PerDay => " that day".to_string(),
    };
    format!(
        "Sorry, we are fully booked for {}; max {} guests. {} seat(s) remain{pool} and your party is {}.",
        intent.date.value,
        availability.max_capacity,
        availability.remaining,
        intent.party_size.value
    )
}

fn confirmation_message(reservation: &Reservation, intent: &ReservationIntent) -> String {
    let slot = reservation
        .time_slot
        .map(|slot| format!(" at {slot}"))
        .unwrap_or_default();
    let mut message = format!(
        "Reservation #{} recorded for {} guest(s) on {}{slot}. Status: {}.",
        reservation.id,
        reservation.party_size,
        reservation.date,
        reservation.status.as_str()
    );
    if let Some(prompt) = &intent.clarification_prompt {
        message.push(' ');
        message.push_str(prompt);
    }
    message
}

fn degraded_note(session: &SessionContext, error: &AnswerError) -> String {
    match error {
        AnswerError::NotReady => {
            warn!(
                event_name = "agent.answer.not_ready",
                correlation_id = %session.id,
                "answer requested before the knowledge base was built"
            );
            format!("Sorry, {NOT_INITIALIZED_NOTE}; please try again shortly.")
        }
        other => {
            warn!(
                event_name = "agent.answer.failed",
                correlation_id = %session.id,
                error = %other,
                "answer generation failed"
            );
            format!("Sorry, we {GENERATION_FAILED_NOTE} right now.")
        }
    }
}

fn source_names(context: &[maitre_core::retrieval::ScoredChunk]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for chunk in context {
        if !names.contains(&chunk.document) {
            names.push(chunk.document.clone());
        }
    }
    names
}
