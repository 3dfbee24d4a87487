use serde::{Deserialize, Serialize};

use crate::conversation::RequestKind;

/// Voice the answer generator speaks in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    ReservationManager,
    CustomerSupport,
}

impl Persona {
    pub fn for_request(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Reservation => Self::ReservationManager,
            RequestKind::Inquiry => Self::CustomerSupport,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::ReservationManager => "Reservation Manager",
            Self::CustomerSupport => "Customer Support",
        }
    }

    pub fn goal(&self) -> &'static str {
        match self {
            Self::ReservationManager => "Handle restaurant reservations efficiently.",
            Self::CustomerSupport => {
                "Provide answers about restaurant policies, menu, and general inquiries."
            }
        }
    }

    pub fn backstory(&self) -> &'static str {
        match self {
            Self::ReservationManager => {
                "You are responsible for taking reservations, checking table availability, and managing booking requests."
            }
            Self::CustomerSupport => {
                "You are an expert in restaurant policies and menu details, assisting customers with accurate information."
            }
        }
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are the {}. {} Goal: {} Answer only from the provided context; say so when it does not cover the question.",
            self.role(),
            self.backstory(),
            self.goal()
        )
    }
}
