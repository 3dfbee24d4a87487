//! Domain model, capacity policy, semantic retrieval and configuration for the maitre
//! restaurant assistant.

pub mod capacity;
pub mod config;
pub mod domain;
pub mod errors;
pub mod retrieval;

pub use capacity::{Availability, CapacityGranularity, CapacityKey, CapacityPolicy};
pub use domain::reservation::{
    ContactInfo, NewReservation, Reservation, ReservationFilter, ReservationId, ReservationStatus,
};
pub use domain::time_slot::TimeSlot;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use retrieval::{
    Embedder, HashingEmbedder, IndexSummary, KnowledgeBase, RetrievalError, ScoredChunk,
    SourceDocument,
};
