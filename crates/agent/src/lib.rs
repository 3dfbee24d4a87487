//! Agent runtime for the restaurant assistant.
//!
//! The pieces, in the order a chat turn touches them:
//! - [`conversation`]: classify a message and pull a structured [`ReservationIntent`] out of it
//! - [`runtime`]: the [`BookingOrchestrator`] that admits bookings through the ledger or routes
//!   questions to the answerer
//! - [`answerer`]: top-k retrieval plus one generator call
//! - [`llm`] and [`embedding`]: HTTP collaborators for chat completions and embeddings
//!
//! # Safety Principle
//!
//! The language model only phrases text. Whether a table is free is decided by the
//! capacity ledger, and a failed generation never rolls back a recorded booking.

pub mod answerer;
pub mod conversation;
pub mod embedding;
mod http;
pub mod llm;
pub mod persona;
pub mod runtime;
pub mod session;

pub use answerer::{Answer, AnswerError, RetrievalAugmentedAnswerer};
pub use conversation::{
    FieldSource, HeuristicIntentParser, IntentField, IntentParser, RequestKind, ReservationIntent,
};
pub use embedding::build_embedder;
pub use http::{HttpError, JsonClient};
pub use llm::{build_generator, AnswerGenerator, GenerationError};
pub use persona::Persona;
pub use runtime::{BookingOrchestrator, OrchestratorError, TurnOutcome};
pub use session::{ChatMessage, ChatRole, SessionContext};
