//! Room and booking data models.

use super::InvalidTransition;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bookable room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    /// Unique identifier.
    pub id: Uuid,
    /// Room name.
    pub name: String,
    /// Short room code (unique).
    pub code: String,
    /// Seating capacity.
    pub capacity: u32,
    /// Building or floor description.
    pub location: Option<String>,
    /// Soft-delete marker; deleted rooms are hidden from listings.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// Creates a new room.
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        capacity: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            code: code.into(),
            capacity,
            location: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if this room has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Status of a room booking in its lifecycle.
///
/// Bookings are never hard-deleted; the status carries the soft lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Draft, not yet submitted for verification.
    Pending,
    /// Submitted, awaiting verification.
    Submitted,
    /// Verified and approved.
    Approved,
    /// Verified and rejected.
    Rejected,
    /// Booking window in progress.
    Ongoing,
    /// Booking window finished.
    Completed,
    /// Cancelled by the requester.
    Cancelled,
}

impl BookingStatus {
    /// Stable string used in the database.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Submitted => "submitted",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Ongoing => "ongoing",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Parses the database representation.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "submitted" => Some(BookingStatus::Submitted),
            "approved" => Some(BookingStatus::Approved),
            "rejected" => Some(BookingStatus::Rejected),
            "ongoing" => Some(BookingStatus::Ongoing),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses that block a room window for plain availability checks.
    pub fn availability_blocking() -> &'static [BookingStatus] {
        &[BookingStatus::Approved, BookingStatus::Ongoing]
    }

    /// Statuses that block a room window during submission.
    ///
    /// The wider set includes not-yet-verified requests so that two
    /// submissions for the same window cannot race past each other before
    /// an admin resolves either.
    pub fn submission_blocking() -> &'static [BookingStatus] {
        &[
            BookingStatus::Approved,
            BookingStatus::Ongoing,
            BookingStatus::Submitted,
            BookingStatus::Pending,
        ]
    }

    /// Returns true if no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Completed | BookingStatus::Cancelled
        )
    }

    /// Validates a lifecycle transition.
    ///
    /// Verification resolves a submitted booking exactly once; resolved
    /// bookings cannot be re-verified.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Cancelled)
                | (Submitted, Approved)
                | (Submitted, Rejected)
                | (Submitted, Cancelled)
                | (Approved, Ongoing)
                | (Approved, Cancelled)
                | (Ongoing, Completed)
        )
    }

    /// Validates a transition, returning a typed error on violation.
    pub fn transition_to(&self, next: BookingStatus) -> Result<BookingStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition::new(self, next))
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "Pending"),
            BookingStatus::Submitted => write!(f, "Submitted"),
            BookingStatus::Approved => write!(f, "Approved"),
            BookingStatus::Rejected => write!(f, "Rejected"),
            BookingStatus::Ongoing => write!(f, "Ongoing"),
            BookingStatus::Completed => write!(f, "Completed"),
            BookingStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// A room booking request for one date and time window.
///
/// Windows are half-open: `[start_time, end_time)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomBooking {
    /// Unique identifier.
    pub id: Uuid,
    /// Room being booked.
    pub room_id: Uuid,
    /// Who requested the booking.
    pub requester_id: Uuid,
    /// Date of the booking.
    pub date: NaiveDate,
    /// Start of the window (inclusive).
    pub start_time: NaiveTime,
    /// End of the window (exclusive).
    pub end_time: NaiveTime,
    /// Current lifecycle status.
    pub status: BookingStatus,
    /// What the room will be used for.
    pub activity: String,
    /// Verifier identity, stamped on resolution.
    pub decided_by: Option<Uuid>,
    /// When the verification decision was made.
    pub decided_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RoomBooking {
    /// Creates a new booking in `Submitted` status.
    #[allow(clippy::too_many_arguments)]
    pub fn submitted(
        room_id: Uuid,
        requester_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        activity: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            requester_id,
            date,
            start_time,
            end_time,
            status: BookingStatus::Submitted,
            activity: activity.into(),
            decided_by: None,
            decided_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_db_round_trip() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Submitted,
            BookingStatus::Approved,
            BookingStatus::Rejected,
            BookingStatus::Ongoing,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(BookingStatus::from_db_str(status.as_db_str()), Some(status));
        }
        assert_eq!(BookingStatus::from_db_str("bogus"), None);
    }

    #[test]
    fn test_resolved_bookings_cannot_be_reverified() {
        assert!(BookingStatus::Submitted.can_transition_to(BookingStatus::Approved));
        assert!(BookingStatus::Submitted.can_transition_to(BookingStatus::Rejected));
        assert!(!BookingStatus::Approved.can_transition_to(BookingStatus::Rejected));
        assert!(!BookingStatus::Rejected.can_transition_to(BookingStatus::Approved));
        assert!(!BookingStatus::Rejected.can_transition_to(BookingStatus::Submitted));
    }

    #[test]
    fn test_lifecycle_progression() {
        assert!(BookingStatus::Approved.can_transition_to(BookingStatus::Ongoing));
        assert!(BookingStatus::Ongoing.can_transition_to(BookingStatus::Completed));
        assert!(BookingStatus::Completed.is_terminal());
        assert!(!BookingStatus::Completed.can_transition_to(BookingStatus::Ongoing));
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = BookingStatus::Rejected
            .transition_to(BookingStatus::Approved)
            .unwrap_err();
        assert!(err.to_string().contains("Rejected"));
        assert!(err.to_string().contains("Approved"));
    }

    #[test]
    fn test_blocking_sets() {
        assert_eq!(BookingStatus::availability_blocking().len(), 2);
        assert_eq!(BookingStatus::submission_blocking().len(), 4);
        assert!(BookingStatus::submission_blocking().contains(&BookingStatus::Submitted));
        assert!(!BookingStatus::availability_blocking().contains(&BookingStatus::Submitted));
    }
}
