//! Room booking workflows.

use crate::availability::{AvailabilityChecker, AvailabilityOutcome, CheckMode};
use crate::cache::{cache_key, CacheError, CacheRegistry, TtlCache};
use crate::clock::SharedClock;
use crate::db::{
    BookingRepository, BookingSubmitOutcome, Pagination, PaginatedResult, UserRepository,
};
use crate::error::ServiceError;
use crate::models::{BookingStatus, RoomBooking};
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// A new booking request.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub room_id: Uuid,
    pub requester_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub activity: String,
}

/// Booking workflows over the repository, with cache maintenance.
pub struct BookingService<B: BookingRepository, U: UserRepository> {
    bookings: Arc<B>,
    users: Arc<U>,
    checker: AvailabilityChecker<B>,
    registry: Arc<CacheRegistry>,
    clock: SharedClock,
}

impl<B, U> BookingService<B, U>
where
    B: BookingRepository + 'static,
    U: UserRepository + 'static,
{
    pub fn new(
        bookings: Arc<B>,
        users: Arc<U>,
        registry: Arc<CacheRegistry>,
        clock: SharedClock,
    ) -> Self {
        let checker = AvailabilityChecker::new(bookings.clone(), clock.clone());
        Self {
            bookings,
            users,
            checker,
            registry,
            clock,
        }
    }

    async fn cache(&self) -> Arc<TtlCache> {
        self.registry.get_or_create("ruangan", None).await
    }

    /// Read-path availability check over verified bookings only.
    pub async fn check_availability(
        &self,
        room_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<AvailabilityOutcome, ServiceError> {
        self.checker
            .check(room_id, date, start, end, CheckMode::Availability)
            .await
    }

    /// Submits a booking request.
    ///
    /// The submission-time check blocks on unverified requests too, and
    /// the repository re-runs it atomically with the insert, so a window
    /// that passes here is the window that lands.
    #[instrument(skip(self, request), fields(room_id = %request.room_id))]
    pub async fn submit(&self, request: BookingRequest) -> Result<RoomBooking, ServiceError> {
        let requester = self
            .users
            .get(request.requester_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("account", request.requester_id))?;
        if !requester.identity().can_borrow() {
            return Err(ServiceError::Forbidden(
                "account is inactive or blocked".to_string(),
            ));
        }

        let outcome = self
            .checker
            .check(
                request.room_id,
                request.date,
                request.start_time,
                request.end_time,
                CheckMode::Submission,
            )
            .await?;
        if let AvailabilityOutcome::Conflict(reason) = outcome {
            return Err(ServiceError::Conflict(reason.to_string()));
        }

        let booking = RoomBooking::submitted(
            request.room_id,
            request.requester_id,
            request.date,
            request.start_time,
            request.end_time,
            request.activity,
            self.clock.now(),
        );
        let outcome = self
            .bookings
            .submit(&booking, BookingStatus::submission_blocking())
            .await?;
        let booking = match outcome {
            BookingSubmitOutcome::Created(booking) => booking,
            BookingSubmitOutcome::Conflict(reason) => {
                return Err(ServiceError::Conflict(reason.to_string()))
            }
        };

        self.invalidate_room(booking.room_id).await;
        Ok(booking)
    }

    /// Approves or rejects a submitted booking.
    ///
    /// A booking resolves exactly once; re-verifying an already resolved
    /// booking is a conflict.
    #[instrument(skip(self))]
    pub async fn decide(
        &self,
        booking_id: Uuid,
        approve: bool,
        approver_id: Uuid,
    ) -> Result<RoomBooking, ServiceError> {
        let approver = self
            .users
            .get(approver_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("account", approver_id))?;
        if !approver.identity().can_approve() {
            return Err(ServiceError::Forbidden(
                "account cannot verify bookings".to_string(),
            ));
        }

        let target = if approve {
            BookingStatus::Approved
        } else {
            BookingStatus::Rejected
        };
        let updated = self
            .bookings
            .transition(
                booking_id,
                BookingStatus::Submitted,
                target,
                Some(approver_id),
                self.clock.now(),
            )
            .await?;
        match updated {
            Some(booking) => {
                self.invalidate_room(booking.room_id).await;
                Ok(booking)
            }
            None => self.transition_conflict(booking_id).await,
        }
    }

    /// Cancels a booking on behalf of its requester.
    ///
    /// Cancelling an already approved booking earns the requester a
    /// warning; three warnings block the account. The warning write is
    /// best effort and never fails the cancellation.
    #[instrument(skip(self))]
    pub async fn cancel(&self, booking_id: Uuid, requester_id: Uuid) -> Result<RoomBooking, ServiceError> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("booking", booking_id))?;
        if booking.requester_id != requester_id {
            return Err(ServiceError::Forbidden(
                "booking belongs to another account".to_string(),
            ));
        }
        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(ServiceError::Conflict(format!(
                "booking in status {} cannot be cancelled",
                booking.status
            )));
        }

        let was_approved = booking.status == BookingStatus::Approved;
        let updated = self
            .bookings
            .transition(
                booking_id,
                booking.status,
                BookingStatus::Cancelled,
                None,
                self.clock.now(),
            )
            .await?;
        let booking = match updated {
            Some(booking) => booking,
            None => return self.transition_conflict(booking_id).await,
        };

        if was_approved {
            if let Err(err) = self.users.add_warning(requester_id, self.clock.now()).await {
                warn!(%requester_id, error = %err, "failed to record cancellation warning");
            }
        }

        self.invalidate_room(booking.room_id).await;
        Ok(booking)
    }

    /// Marks an approved booking as in progress.
    pub async fn mark_ongoing(&self, booking_id: Uuid) -> Result<RoomBooking, ServiceError> {
        self.advance(booking_id, BookingStatus::Approved, BookingStatus::Ongoing)
            .await
    }

    /// Marks an ongoing booking as completed.
    pub async fn mark_completed(&self, booking_id: Uuid) -> Result<RoomBooking, ServiceError> {
        self.advance(booking_id, BookingStatus::Ongoing, BookingStatus::Completed)
            .await
    }

    async fn advance(
        &self,
        booking_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<RoomBooking, ServiceError> {
        let updated = self
            .bookings
            .transition(booking_id, from, to, None, self.clock.now())
            .await?;
        match updated {
            Some(booking) => {
                self.invalidate_room(booking.room_id).await;
                Ok(booking)
            }
            None => self.transition_conflict(booking_id).await,
        }
    }

    /// A requester's booking history, cached per page.
    pub async fn history(
        &self,
        requester_id: Uuid,
        pagination: Pagination,
    ) -> Result<PaginatedResult<RoomBooking>, ServiceError> {
        let key = cache_key(
            "ruangan:history",
            Some(&json!({ "requester": requester_id, "page": pagination.page, "per_page": pagination.per_page })),
        );
        let bookings = self.bookings.clone();
        let pg = pagination.clone();
        let producer_key = key.clone();
        let bytes = self
            .cache()
            .await
            .get_or_set(&key, None, || async move {
                let rows = bookings
                    .list_for_requester(requester_id, &pg)
                    .await
                    .map_err(|e| CacheError::producer(&producer_key, e))?;
                serde_json::to_vec(&rows).map_err(CacheError::from)
            })
            .await?;
        let rows: Vec<RoomBooking> =
            serde_json::from_slice(&bytes).map_err(CacheError::from)?;
        let total = self.bookings.count_for_requester(requester_id).await?;
        Ok(PaginatedResult::new(rows, total, &pagination))
    }

    async fn invalidate_room(&self, room_id: Uuid) {
        let cache = self.cache().await;
        let removed = cache.clear_pattern("ruangan").await;
        debug!(%room_id, removed, "invalidated room booking caches");
    }

    async fn transition_conflict(&self, booking_id: Uuid) -> Result<RoomBooking, ServiceError> {
        match self.bookings.get(booking_id).await? {
            Some(existing) => Err(ServiceError::Conflict(format!(
                "booking already in status {}",
                existing.status
            ))),
            None => Err(ServiceError::not_found("booking", booking_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::db::mocks::MockStore;
    use crate::identity::{Account, Role};
    use crate::models::Room;
    use chrono::Duration;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    struct Fixture {
        store: Arc<MockStore>,
        service: BookingService<MockStore, MockStore>,
        room: Room,
        borrower: Account,
        approver: Account,
        date: NaiveDate,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::at_system_time());
        let now = clock.now();
        let store = Arc::new(MockStore::new());
        let registry = Arc::new(CacheRegistry::new(clock.clone()));

        let room = Room::new("Lab Komputer", "LAB-1", 40, now);
        store.insert_room(room.clone()).await;
        let borrower = Account::new("Borrower", Role::Borrower, now);
        store.insert_account(borrower.clone()).await;
        let approver = Account::new("Approver", Role::Approver, now);
        store.insert_account(approver.clone()).await;

        let service = BookingService::new(store.clone(), store.clone(), registry, clock.clone());
        let date = (now + Duration::days(3)).date_naive();
        Fixture {
            store,
            service,
            room,
            borrower,
            approver,
            date,
        }
    }

    fn request(fx: &Fixture, start: NaiveTime, end: NaiveTime) -> BookingRequest {
        BookingRequest {
            room_id: fx.room.id,
            requester_id: fx.borrower.id,
            date: fx.date,
            start_time: start,
            end_time: end,
            activity: "praktikum".to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_then_overlapping_submit_conflicts() {
        let fx = fixture().await;

        let booking = fx.service.submit(request(&fx, t(9, 0), t(10, 0))).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Submitted);

        let err = fx
            .service
            .submit(request(&fx, t(9, 30), t(10, 30)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_decide_is_single_resolution() {
        let fx = fixture().await;
        let booking = fx.service.submit(request(&fx, t(9, 0), t(10, 0))).await.unwrap();

        let approved = fx
            .service
            .decide(booking.id, true, fx.approver.id)
            .await
            .unwrap();
        assert_eq!(approved.status, BookingStatus::Approved);
        assert_eq!(approved.decided_by, Some(fx.approver.id));

        let err = fx
            .service
            .decide(booking.id, false, fx.approver.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_borrower_cannot_decide() {
        let fx = fixture().await;
        let booking = fx.service.submit(request(&fx, t(9, 0), t(10, 0))).await.unwrap();

        let err = fx
            .service
            .decide(booking.id, true, fx.borrower.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_cancelling_approved_booking_warns_and_blocks_at_three() {
        let fx = fixture().await;

        for i in 0..3 {
            let start = t(9 + i, 0);
            let end = t(10 + i, 0);
            let booking = fx.service.submit(request(&fx, start, end)).await.unwrap();
            fx.service
                .decide(booking.id, true, fx.approver.id)
                .await
                .unwrap();
            let cancelled = fx.service.cancel(booking.id, fx.borrower.id).await.unwrap();
            assert_eq!(cancelled.status, BookingStatus::Cancelled);
        }

        let account = fx.store.account_snapshot(fx.borrower.id).await.unwrap();
        assert_eq!(account.warning_count, 3);
        assert!(account.blocked);

        // Blocked accounts cannot submit further bookings.
        let err = fx
            .service
            .submit(request(&fx, t(13, 0), t(14, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_cancelling_submitted_booking_earns_no_warning() {
        let fx = fixture().await;
        let booking = fx.service.submit(request(&fx, t(9, 0), t(10, 0))).await.unwrap();
        fx.service.cancel(booking.id, fx.borrower.id).await.unwrap();

        let account = fx.store.account_snapshot(fx.borrower.id).await.unwrap();
        assert_eq!(account.warning_count, 0);
        assert!(!account.blocked);
    }

    #[tokio::test]
    async fn test_lifecycle_approved_ongoing_completed() {
        let fx = fixture().await;
        let booking = fx.service.submit(request(&fx, t(9, 0), t(10, 0))).await.unwrap();
        fx.service
            .decide(booking.id, true, fx.approver.id)
            .await
            .unwrap();

        let ongoing = fx.service.mark_ongoing(booking.id).await.unwrap();
        assert_eq!(ongoing.status, BookingStatus::Ongoing);
        let done = fx.service.mark_completed(booking.id).await.unwrap();
        assert_eq!(done.status, BookingStatus::Completed);

        // Completed is terminal.
        let err = fx.service.cancel(booking.id, fx.borrower.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_history_is_paginated() {
        let fx = fixture().await;
        for i in 0..3 {
            fx.service
                .submit(request(&fx, t(8 + i * 2, 0), t(9 + i * 2, 0)))
                .await
                .unwrap();
        }

        let page = fx
            .service
            .history(fx.borrower.id, Pagination::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page.total, 3);
        assert!(page.has_next_page());
    }

    #[tokio::test]
    async fn test_unknown_requester_is_not_found() {
        let fx = fixture().await;
        let mut req = request(&fx, t(9, 0), t(10, 0));
        req.requester_id = Uuid::new_v4();
        let err = fx.service.submit(req).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}
