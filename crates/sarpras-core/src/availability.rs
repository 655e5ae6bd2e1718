//! Room availability checking.
//!
//! Decides whether a proposed `(room, date, start, end)` window may be
//! booked. Windows are half-open `[start, end)`; on top of the standard
//! overlap test there is a stricter rule rejecting any window that shares
//! an exact endpoint with an existing booking. The two checks are not
//! redundant: a window starting exactly when another ends does not overlap
//! under half-open semantics but is still rejected by the endpoint rule.
//! The endpoint rule is intentional; do not relax it without a product
//! decision.

use crate::clock::SharedClock;
use crate::db::BookingRepository;
use crate::error::ServiceError;
use crate::models::{BookingStatus, RoomBooking};
use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Earliest bookable hour (inclusive).
pub const OPENING_HOUR: u32 = 6;

/// Latest hour a booking may end in.
pub const CLOSING_HOUR: u32 = 17;

/// Why a proposed booking window was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Window lies outside the 06:00-17:00 operating hours.
    OutsideOperatingHours,
    /// Window does not start strictly after the current moment.
    InPast,
    /// Window is empty or inverted (end not after start).
    EmptyWindow,
    /// Window shares an exact endpoint with an existing booking.
    ExactEndpointMatch { other: Uuid },
    /// Window overlaps an existing booking.
    Overlap { other: Uuid },
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::OutsideOperatingHours => {
                write!(f, "booking window is outside operating hours (06:00-17:00)")
            }
            ConflictReason::InPast => write!(f, "booking window is not in the future"),
            ConflictReason::EmptyWindow => write!(f, "booking window is empty"),
            ConflictReason::ExactEndpointMatch { other } => {
                write!(f, "window endpoint matches existing booking {other}")
            }
            ConflictReason::Overlap { other } => {
                write!(f, "window overlaps existing booking {other}")
            }
        }
    }
}

/// Which blocking-status set a check runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// Plain availability: only verified bookings block.
    Availability,
    /// Submission-time: unverified requests block too, so two submissions
    /// for one window cannot race past each other.
    Submission,
}

impl CheckMode {
    /// The blocking status set for this mode.
    pub fn blocking_statuses(&self) -> &'static [BookingStatus] {
        match self {
            CheckMode::Availability => BookingStatus::availability_blocking(),
            CheckMode::Submission => BookingStatus::submission_blocking(),
        }
    }
}

/// Result of an availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityOutcome {
    Available,
    Conflict(ConflictReason),
}

impl AvailabilityOutcome {
    /// Returns true if the window may be booked.
    pub fn is_available(&self) -> bool {
        matches!(self, AvailabilityOutcome::Available)
    }
}

/// Half-open overlap test: `[a_start, a_end)` intersects `[b_start, b_end)`.
pub fn windows_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Exact-endpoint rule: either proposed endpoint equals either existing one.
pub fn exact_endpoint_match(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start == b_start || a_start == b_end || a_end == b_start || a_end == b_end
}

/// Validates the window shape against operating hours and the clock.
pub fn validate_window(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    now: DateTime<Utc>,
) -> Result<(), ConflictReason> {
    if end <= start {
        return Err(ConflictReason::EmptyWindow);
    }
    if start.hour() < OPENING_HOUR || end.hour() > CLOSING_HOUR {
        return Err(ConflictReason::OutsideOperatingHours);
    }
    if date.and_time(start) <= now.naive_utc() {
        return Err(ConflictReason::InPast);
    }
    Ok(())
}

/// Checks a proposed window against existing bookings.
///
/// The endpoint rule is applied before the overlap test so boundary cases
/// report the stricter reason.
pub fn find_window_conflict(
    start: NaiveTime,
    end: NaiveTime,
    existing: &[RoomBooking],
) -> Option<ConflictReason> {
    for candidate in existing {
        if exact_endpoint_match(start, end, candidate.start_time, candidate.end_time) {
            return Some(ConflictReason::ExactEndpointMatch {
                other: candidate.id,
            });
        }
        if windows_overlap(start, end, candidate.start_time, candidate.end_time) {
            return Some(ConflictReason::Overlap {
                other: candidate.id,
            });
        }
    }
    None
}

/// Availability checking against the booking store.
pub struct AvailabilityChecker<B: BookingRepository> {
    bookings: Arc<B>,
    clock: SharedClock,
}

impl<B: BookingRepository> AvailabilityChecker<B> {
    /// Creates a checker over the given booking repository.
    pub fn new(bookings: Arc<B>, clock: SharedClock) -> Self {
        Self { bookings, clock }
    }

    /// Decides whether `(room_id, date, [start, end))` may be booked.
    ///
    /// Conflicts come back as an outcome, not an error; [`ServiceError`]
    /// is reserved for missing rooms and persistence faults.
    #[instrument(skip(self), fields(room_id = %room_id, date = %date))]
    pub async fn check(
        &self,
        room_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        mode: CheckMode,
    ) -> Result<AvailabilityOutcome, ServiceError> {
        let room = self
            .bookings
            .get_room(room_id)
            .await?
            .filter(|room| !room.is_deleted())
            .ok_or_else(|| ServiceError::not_found("room", room_id))?;

        if let Err(reason) = validate_window(date, start, end, self.clock.now()) {
            return Ok(AvailabilityOutcome::Conflict(reason));
        }

        let existing = self
            .bookings
            .list_for_room(room.id, date, mode.blocking_statuses())
            .await?;

        match find_window_conflict(start, end, &existing) {
            Some(reason) => Ok(AvailabilityOutcome::Conflict(reason)),
            None => Ok(AvailabilityOutcome::Available),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::db::mocks::MockStore;
    use crate::models::Room;
    use chrono::Duration;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn booking(start: NaiveTime, end: NaiveTime, status: BookingStatus) -> RoomBooking {
        let mut b = RoomBooking::submitted(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            start,
            end,
            "rapat",
            Utc::now(),
        );
        b.status = status;
        b
    }

    #[test]
    fn test_overlapping_window_is_rejected() {
        let existing = vec![booking(t(9, 0), t(10, 0), BookingStatus::Approved)];
        let conflict = find_window_conflict(t(9, 30), t(10, 30), &existing);
        assert!(matches!(conflict, Some(ConflictReason::Overlap { .. })));
    }

    #[test]
    fn test_adjacent_window_rejected_by_endpoint_rule() {
        // [10:00, 11:00) does not overlap [09:00, 10:00) under half-open
        // semantics, but the endpoint rule still rejects it.
        let existing = vec![booking(t(9, 0), t(10, 0), BookingStatus::Approved)];
        assert!(!windows_overlap(t(10, 0), t(11, 0), t(9, 0), t(10, 0)));
        let conflict = find_window_conflict(t(10, 0), t(11, 0), &existing);
        assert!(matches!(
            conflict,
            Some(ConflictReason::ExactEndpointMatch { .. })
        ));
    }

    #[test]
    fn test_disjoint_window_is_accepted() {
        let existing = vec![booking(t(9, 0), t(10, 0), BookingStatus::Approved)];
        assert_eq!(find_window_conflict(t(11, 0), t(12, 0), &existing), None);
    }

    #[test]
    fn test_window_before_opening_hour_is_rejected() {
        let now = Utc::now();
        let date = (now + Duration::days(1)).date_naive();
        assert_eq!(
            validate_window(date, t(5, 0), t(7, 0), now),
            Err(ConflictReason::OutsideOperatingHours)
        );
    }

    #[test]
    fn test_window_past_closing_hour_is_rejected() {
        let now = Utc::now();
        let date = (now + Duration::days(1)).date_naive();
        assert_eq!(
            validate_window(date, t(16, 0), t(18, 0), now),
            Err(ConflictReason::OutsideOperatingHours)
        );
    }

    #[test]
    fn test_past_window_is_rejected() {
        let now = Utc::now();
        let date = (now - Duration::days(1)).date_naive();
        assert_eq!(
            validate_window(date, t(9, 0), t(10, 0), now),
            Err(ConflictReason::InPast)
        );
    }

    #[test]
    fn test_empty_window_is_rejected() {
        let now = Utc::now();
        let date = (now + Duration::days(1)).date_naive();
        assert_eq!(
            validate_window(date, t(10, 0), t(10, 0), now),
            Err(ConflictReason::EmptyWindow)
        );
    }

    #[tokio::test]
    async fn test_checker_uses_narrow_set_for_availability() {
        let clock = Arc::new(ManualClock::at_system_time());
        let store = Arc::new(MockStore::new());
        let now = clock.now();
        let date = (now + Duration::days(2)).date_naive();

        let room = Room::new("Aula", "AULA-1", 100, now);
        store.insert_room(room.clone()).await;

        // A merely submitted booking occupies 09:00-10:00.
        let mut existing = RoomBooking::submitted(
            room.id,
            Uuid::new_v4(),
            date,
            t(9, 0),
            t(10, 0),
            "seminar",
            now,
        );
        existing.status = BookingStatus::Submitted;
        store.insert_booking(existing).await;

        let checker = AvailabilityChecker::new(store.clone(), clock.clone());

        // Plain availability ignores unverified requests.
        let outcome = checker
            .check(room.id, date, t(9, 30), t(10, 30), CheckMode::Availability)
            .await
            .unwrap();
        assert!(outcome.is_available());

        // Submission-time checking blocks on them.
        let outcome = checker
            .check(room.id, date, t(9, 30), t(10, 30), CheckMode::Submission)
            .await
            .unwrap();
        assert!(!outcome.is_available());
    }

    #[tokio::test]
    async fn test_checker_rejects_unknown_room() {
        let clock = Arc::new(ManualClock::at_system_time());
        let store = Arc::new(MockStore::new());
        let checker = AvailabilityChecker::new(store, clock);
        let date = (Utc::now() + Duration::days(1)).date_naive();

        let err = checker
            .check(Uuid::new_v4(), date, t(9, 0), t(10, 0), CheckMode::Availability)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}
