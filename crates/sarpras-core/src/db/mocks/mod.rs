//! In-memory repository implementations for tests.
//!
//! A single [`MockStore`] backs all four repository traits. All state
//! lives behind one `RwLock`, so each mutating call holds the write lock
//! for its whole duration and behaves like a database transaction. That
//! is what makes the concurrency tests meaningful: two tasks racing to
//! reserve the last unit of stock contend on the same lock a real
//! transaction would serialize on.

use super::{
    BookingRepository, BookingSubmitOutcome, DbError, ItemRepository, LineUpdateOutcome,
    LoanRepository, LoanSubmitOutcome, Pagination, UserRepository, WARNING_BLOCK_THRESHOLD,
};
use crate::availability::find_window_conflict;
use crate::identity::Account;
use crate::models::{
    derive_header_status, BookingStatus, Item, LineDecision, LoanHeader, LoanLine,
    LoanLineStatus, LoanSubmission, Room, RoomBooking,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MockState {
    rooms: HashMap<Uuid, Room>,
    bookings: HashMap<Uuid, RoomBooking>,
    items: HashMap<Uuid, Item>,
    headers: HashMap<Uuid, LoanHeader>,
    lines: HashMap<Uuid, LoanLine>,
    accounts: HashMap<Uuid, Account>,
}

/// In-memory store implementing every repository trait.
#[derive(Default)]
pub struct MockStore {
    state: RwLock<MockState>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_room(&self, room: Room) {
        self.state.write().await.rooms.insert(room.id, room);
    }

    pub async fn insert_booking(&self, booking: RoomBooking) {
        self.state.write().await.bookings.insert(booking.id, booking);
    }

    pub async fn insert_item(&self, item: Item) {
        self.state.write().await.items.insert(item.id, item);
    }

    pub async fn insert_account(&self, account: Account) {
        self.state.write().await.accounts.insert(account.id, account);
    }

    /// Current stored copy of an item.
    pub async fn item_snapshot(&self, id: Uuid) -> Option<Item> {
        self.state.read().await.items.get(&id).cloned()
    }

    /// Current stored copy of a booking.
    pub async fn booking_snapshot(&self, id: Uuid) -> Option<RoomBooking> {
        self.state.read().await.bookings.get(&id).cloned()
    }

    /// Current stored copy of an account.
    pub async fn account_snapshot(&self, id: Uuid) -> Option<Account> {
        self.state.read().await.accounts.get(&id).cloned()
    }
}

#[async_trait]
impl BookingRepository for MockStore {
    async fn get_room(&self, id: Uuid) -> Result<Option<Room>, DbError> {
        Ok(self.state.read().await.rooms.get(&id).cloned())
    }

    async fn create_room(&self, room: &Room) -> Result<Room, DbError> {
        self.state.write().await.rooms.insert(room.id, room.clone());
        Ok(room.clone())
    }

    async fn submit(
        &self,
        booking: &RoomBooking,
        blocking: &[BookingStatus],
    ) -> Result<BookingSubmitOutcome, DbError> {
        let mut state = self.state.write().await;

        let existing: Vec<RoomBooking> = state
            .bookings
            .values()
            .filter(|b| {
                b.room_id == booking.room_id
                    && b.date == booking.date
                    && blocking.contains(&b.status)
            })
            .cloned()
            .collect();

        if let Some(reason) =
            find_window_conflict(booking.start_time, booking.end_time, &existing)
        {
            return Ok(BookingSubmitOutcome::Conflict(reason));
        }

        state.bookings.insert(booking.id, booking.clone());
        Ok(BookingSubmitOutcome::Created(booking.clone()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<RoomBooking>, DbError> {
        Ok(self.state.read().await.bookings.get(&id).cloned())
    }

    async fn list_for_room(
        &self,
        room_id: Uuid,
        date: NaiveDate,
        statuses: &[BookingStatus],
    ) -> Result<Vec<RoomBooking>, DbError> {
        let state = self.state.read().await;
        let mut found: Vec<RoomBooking> = state
            .bookings
            .values()
            .filter(|b| b.room_id == room_id && b.date == date && statuses.contains(&b.status))
            .cloned()
            .collect();
        found.sort_by_key(|b| b.start_time);
        Ok(found)
    }

    async fn list_for_requester(
        &self,
        requester_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Vec<RoomBooking>, DbError> {
        let state = self.state.read().await;
        let mut found: Vec<RoomBooking> = state
            .bookings
            .values()
            .filter(|b| b.requester_id == requester_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .collect())
    }

    async fn count_for_requester(&self, requester_id: Uuid) -> Result<u64, DbError> {
        let state = self.state.read().await;
        Ok(state
            .bookings
            .values()
            .filter(|b| b.requester_id == requester_id)
            .count() as u64)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        decided_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<RoomBooking>, DbError> {
        let mut state = self.state.write().await;
        let booking = match state.bookings.get_mut(&id) {
            Some(b) if b.status == from => b,
            _ => return Ok(None),
        };
        booking.status = to;
        if let Some(approver) = decided_by {
            booking.decided_by = Some(approver);
            booking.decided_at = Some(now);
        }
        booking.updated_at = now;
        Ok(Some(booking.clone()))
    }
}

#[async_trait]
impl ItemRepository for MockStore {
    async fn create(&self, item: &Item) -> Result<Item, DbError> {
        self.state.write().await.items.insert(item.id, item.clone());
        Ok(item.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Item>, DbError> {
        Ok(self.state.read().await.items.get(&id).cloned())
    }

    async fn list(&self, pagination: &Pagination) -> Result<Vec<Item>, DbError> {
        let state = self.state.read().await;
        let mut found: Vec<Item> = state
            .items
            .values()
            .filter(|i| !i.is_deleted())
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .collect())
    }

    async fn count(&self) -> Result<u64, DbError> {
        let state = self.state.read().await;
        Ok(state.items.values().filter(|i| !i.is_deleted()).count() as u64)
    }

    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, DbError> {
        let mut state = self.state.write().await;
        match state.items.get_mut(&id) {
            Some(item) if !item.is_deleted() => {
                item.deleted_at = Some(now);
                item.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl LoanRepository for MockStore {
    async fn submit(
        &self,
        submission: &LoanSubmission,
        now: DateTime<Utc>,
    ) -> Result<LoanSubmitOutcome, DbError> {
        let mut state = self.state.write().await;

        // Validation happens under the same write lock as the stock
        // decrement, matching the transactional SQLite path.
        for &(item_id, quantity) in &submission.lines {
            let available = match state.items.get(&item_id).filter(|i| !i.is_deleted()) {
                Some(item) => item.total_quantity,
                None => return Ok(LoanSubmitOutcome::ItemNotFound(item_id)),
            };
            if available < quantity {
                return Ok(LoanSubmitOutcome::InsufficientStock {
                    item_id,
                    requested: quantity,
                    available,
                });
            }

            let duplicate = state.lines.values().any(|line| {
                line.item_id == item_id
                    && line.status.is_active()
                    && state
                        .headers
                        .get(&line.header_id)
                        .is_some_and(|h| h.borrower_id == submission.borrower_id)
            });
            if duplicate {
                return Ok(LoanSubmitOutcome::DuplicateActiveLoan { item_id });
            }
        }

        let header = LoanHeader::submitted(
            submission.borrower_id,
            submission.request_date,
            submission.return_date,
            submission.purpose.clone(),
            now,
        );
        let mut lines = Vec::with_capacity(submission.lines.len());
        for &(item_id, quantity) in &submission.lines {
            let line = LoanLine::submitted(header.id, item_id, quantity);
            if let Some(item) = state.items.get_mut(&item_id) {
                item.total_quantity -= quantity;
                item.updated_at = now;
            }
            state.lines.insert(line.id, line.clone());
            lines.push(line);
        }
        state.headers.insert(header.id, header.clone());

        Ok(LoanSubmitOutcome::Created { header, lines })
    }

    async fn resolve_line(
        &self,
        line_id: Uuid,
        decision: LineDecision,
        approver_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LineUpdateOutcome, DbError> {
        let mut state = self.state.write().await;

        let line = match state.lines.get(&line_id) {
            Some(line) => line.clone(),
            None => return Ok(LineUpdateOutcome::LineNotFound(line_id)),
        };
        if line.status != LoanLineStatus::Submitted {
            return Ok(LineUpdateOutcome::InvalidState {
                line_id,
                status: line.status,
            });
        }

        let target = decision.target_status();
        if target == LoanLineStatus::Rejected {
            if let Some(item) = state.items.get_mut(&line.item_id) {
                item.total_quantity += line.quantity;
                item.updated_at = now;
            }
        }

        let stored = state.lines.get_mut(&line_id).expect("line exists");
        stored.status = target;
        stored.decided_by = Some(approver_id);
        stored.decided_at = Some(now);
        let updated = stored.clone();

        let header = refresh_header(&mut state, line.header_id, Some(approver_id), now)?;
        Ok(LineUpdateOutcome::Updated {
            header,
            line: updated,
        })
    }

    async fn return_line(
        &self,
        line_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LineUpdateOutcome, DbError> {
        let mut state = self.state.write().await;

        let line = match state.lines.get(&line_id) {
            Some(line) => line.clone(),
            None => return Ok(LineUpdateOutcome::LineNotFound(line_id)),
        };
        if line.status != LoanLineStatus::Approved {
            return Ok(LineUpdateOutcome::InvalidState {
                line_id,
                status: line.status,
            });
        }

        if let Some(item) = state.items.get_mut(&line.item_id) {
            item.total_quantity += line.quantity;
            item.updated_at = now;
        }
        let stored = state.lines.get_mut(&line_id).expect("line exists");
        stored.status = LoanLineStatus::Returned;
        let updated = stored.clone();

        let header = refresh_header(&mut state, line.header_id, None, now)?;
        Ok(LineUpdateOutcome::Updated {
            header,
            line: updated,
        })
    }

    async fn get_header(
        &self,
        id: Uuid,
    ) -> Result<Option<(LoanHeader, Vec<LoanLine>)>, DbError> {
        let state = self.state.read().await;
        let header = match state.headers.get(&id) {
            Some(header) => header.clone(),
            None => return Ok(None),
        };
        let lines = state
            .lines
            .values()
            .filter(|line| line.header_id == id)
            .cloned()
            .collect();
        Ok(Some((header, lines)))
    }

    async fn get_line(&self, id: Uuid) -> Result<Option<LoanLine>, DbError> {
        Ok(self.state.read().await.lines.get(&id).cloned())
    }

    async fn list_for_borrower(
        &self,
        borrower_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Vec<LoanHeader>, DbError> {
        let state = self.state.read().await;
        let mut found: Vec<LoanHeader> = state
            .headers
            .values()
            .filter(|h| h.borrower_id == borrower_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .collect())
    }

    async fn count_for_borrower(&self, borrower_id: Uuid) -> Result<u64, DbError> {
        let state = self.state.read().await;
        Ok(state
            .headers
            .values()
            .filter(|h| h.borrower_id == borrower_id)
            .count() as u64)
    }
}

fn refresh_header(
    state: &mut MockState,
    header_id: Uuid,
    decided_by: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<LoanHeader, DbError> {
    let statuses: Vec<LoanLineStatus> = state
        .lines
        .values()
        .filter(|line| line.header_id == header_id)
        .map(|line| line.status)
        .collect();
    let status = derive_header_status(&statuses);
    let header = state
        .headers
        .get_mut(&header_id)
        .ok_or_else(|| DbError::not_found("loan_header", header_id))?;
    header.status = status;
    if let Some(approver) = decided_by {
        header.decided_by = Some(approver);
        header.decided_at = Some(now);
    }
    header.updated_at = now;
    Ok(header.clone())
}

#[async_trait]
impl UserRepository for MockStore {
    async fn create(&self, account: &Account) -> Result<Account, DbError> {
        self.state
            .write()
            .await
            .accounts
            .insert(account.id, account.clone());
        Ok(account.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>, DbError> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn add_warning(&self, id: Uuid, now: DateTime<Utc>) -> Result<Account, DbError> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found("account", id))?;
        account.warning_count += 1;
        if account.warning_count >= WARNING_BLOCK_THRESHOLD {
            account.blocked = true;
        }
        account.updated_at = now;
        Ok(account.clone())
    }
}
