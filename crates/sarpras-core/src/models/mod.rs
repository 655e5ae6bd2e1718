//! Data models for rooms, equipment, and loans.

pub mod item;
pub mod loan;
pub mod room;

pub use item::{Availability, Item};
pub use loan::{
    derive_header_status, LineDecision, LoanHeader, LoanLine, LoanLineStatus, LoanRequestLine,
    LoanStatus, LoanSubmission,
};
pub use room::{BookingStatus, Room, RoomBooking};

use thiserror::Error;

/// Raised when a status transition violates the lifecycle rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid status transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: String,
    pub to: String,
}

impl InvalidTransition {
    pub fn new(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
