//! Room and booking repository.

use super::{DbError, Pagination};
#[cfg(feature = "database")]
use crate::availability::find_window_conflict;
use crate::availability::ConflictReason;
use crate::models::{BookingStatus, Room, RoomBooking};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Result of a conflict-checked booking insert.
#[derive(Debug, Clone)]
pub enum BookingSubmitOutcome {
    /// The booking was persisted.
    Created(RoomBooking),
    /// An existing booking blocks the window; nothing was written.
    Conflict(ConflictReason),
}

/// Repository trait for rooms and their bookings.
///
/// `submit` performs the conflict check and the insert inside one
/// transaction scope: the check a submission passes is the same check the
/// committed state reflects. `transition` is a single conditional update,
/// so a booking resolves exactly once even under concurrent verifiers.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Gets a room by id (including soft-deleted rooms).
    async fn get_room(&self, id: Uuid) -> Result<Option<Room>, DbError>;

    /// Creates a room.
    async fn create_room(&self, room: &Room) -> Result<Room, DbError>;

    /// Inserts a booking unless a blocking booking conflicts with its
    /// window. Check and insert share one transaction.
    async fn submit(
        &self,
        booking: &RoomBooking,
        blocking: &[BookingStatus],
    ) -> Result<BookingSubmitOutcome, DbError>;

    /// Gets a booking by id.
    async fn get(&self, id: Uuid) -> Result<Option<RoomBooking>, DbError>;

    /// Lists bookings for a room on a date whose status is in `statuses`.
    async fn list_for_room(
        &self,
        room_id: Uuid,
        date: NaiveDate,
        statuses: &[BookingStatus],
    ) -> Result<Vec<RoomBooking>, DbError>;

    /// Lists a requester's bookings, newest first.
    async fn list_for_requester(
        &self,
        requester_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Vec<RoomBooking>, DbError>;

    /// Counts a requester's bookings.
    async fn count_for_requester(&self, requester_id: Uuid) -> Result<u64, DbError>;

    /// Moves a booking from `from` to `to` in one conditional update.
    ///
    /// Returns `None` when no booking currently in `from` matched the id;
    /// the caller distinguishes "missing" from "already resolved".
    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        decided_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<RoomBooking>, DbError>;
}

/// SQLite implementation of [`BookingRepository`].
#[cfg(feature = "database")]
pub struct SqliteBookingRepository {
    pool: sqlx::SqlitePool,
}

#[cfg(feature = "database")]
impl SqliteBookingRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "database")]
fn status_list(statuses: &[BookingStatus]) -> String {
    // Status strings are static enum values, safe to inline.
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_db_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(feature = "database")]
fn row_to_room(row: &sqlx::sqlite::SqliteRow) -> Result<Room, DbError> {
    use sqlx::Row;

    let id: String = row.try_get("id")?;
    let deleted_at: Option<String> = row.try_get("deleted_at")?;
    Ok(Room {
        id: parse_uuid("id", &id)?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        capacity: row.try_get::<i64, _>("capacity")? as u32,
        location: row.try_get("location")?,
        deleted_at: deleted_at.as_deref().map(|s| parse_ts("deleted_at", s)).transpose()?,
        created_at: parse_ts("created_at", &row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts("updated_at", &row.try_get::<String, _>("updated_at")?)?,
    })
}

#[cfg(feature = "database")]
fn row_to_booking(row: &sqlx::sqlite::SqliteRow) -> Result<RoomBooking, DbError> {
    use sqlx::Row;

    let status: String = row.try_get("status")?;
    let decided_by: Option<String> = row.try_get("decided_by")?;
    let decided_at: Option<String> = row.try_get("decided_at")?;
    Ok(RoomBooking {
        id: parse_uuid("id", &row.try_get::<String, _>("id")?)?,
        room_id: parse_uuid("room_id", &row.try_get::<String, _>("room_id")?)?,
        requester_id: parse_uuid("requester_id", &row.try_get::<String, _>("requester_id")?)?,
        date: parse_date("date", &row.try_get::<String, _>("date")?)?,
        start_time: parse_time("start_time", &row.try_get::<String, _>("start_time")?)?,
        end_time: parse_time("end_time", &row.try_get::<String, _>("end_time")?)?,
        status: BookingStatus::from_db_str(&status)
            .ok_or_else(|| DbError::corrupt_column("status", &status))?,
        activity: row.try_get("activity")?,
        decided_by: decided_by.as_deref().map(|s| parse_uuid("decided_by", s)).transpose()?,
        decided_at: decided_at.as_deref().map(|s| parse_ts("decided_at", s)).transpose()?,
        created_at: parse_ts("created_at", &row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts("updated_at", &row.try_get::<String, _>("updated_at")?)?,
    })
}

#[cfg(feature = "database")]
pub(crate) fn parse_uuid(column: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|_| DbError::corrupt_column(column, value))
}

#[cfg(feature = "database")]
pub(crate) fn parse_ts(column: &str, value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DbError::corrupt_column(column, value))
}

#[cfg(feature = "database")]
pub(crate) fn parse_date(column: &str, value: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| DbError::corrupt_column(column, value))
}

#[cfg(feature = "database")]
pub(crate) fn parse_time(column: &str, value: &str) -> Result<chrono::NaiveTime, DbError> {
    chrono::NaiveTime::parse_from_str(value, "%H:%M:%S")
        .map_err(|_| DbError::corrupt_column(column, value))
}

#[cfg(feature = "database")]
#[async_trait]
impl BookingRepository for SqliteBookingRepository {
    async fn get_room(&self, id: Uuid) -> Result<Option<Room>, DbError> {
        let row = sqlx::query("SELECT * FROM rooms WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_room).transpose()
    }

    async fn create_room(&self, room: &Room) -> Result<Room, DbError> {
        sqlx::query(
            r#"
            INSERT INTO rooms (id, name, code, capacity, location, deleted_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(room.id.to_string())
        .bind(&room.name)
        .bind(&room.code)
        .bind(room.capacity as i64)
        .bind(&room.location)
        .bind(room.deleted_at.map(|t| t.to_rfc3339()))
        .bind(room.created_at.to_rfc3339())
        .bind(room.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(room.clone())
    }

    async fn submit(
        &self,
        booking: &RoomBooking,
        blocking: &[BookingStatus],
    ) -> Result<BookingSubmitOutcome, DbError> {
        let mut tx = self.pool.begin().await?;

        // Re-run the conflict check inside the transaction so the insert
        // lands against the same state the check saw.
        let query = format!(
            "SELECT * FROM bookings WHERE room_id = ? AND date = ? AND status IN ({})",
            status_list(blocking)
        );
        let rows = sqlx::query(&query)
            .bind(booking.room_id.to_string())
            .bind(booking.date.format("%Y-%m-%d").to_string())
            .fetch_all(&mut *tx)
            .await?;
        let existing = rows
            .iter()
            .map(row_to_booking)
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(reason) =
            find_window_conflict(booking.start_time, booking.end_time, &existing)
        {
            tx.rollback().await?;
            return Ok(BookingSubmitOutcome::Conflict(reason));
        }

        sqlx::query(
            r#"
            INSERT INTO bookings (id, room_id, requester_id, date, start_time, end_time,
                                  status, activity, decided_by, decided_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(booking.id.to_string())
        .bind(booking.room_id.to_string())
        .bind(booking.requester_id.to_string())
        .bind(booking.date.format("%Y-%m-%d").to_string())
        .bind(booking.start_time.format("%H:%M:%S").to_string())
        .bind(booking.end_time.format("%H:%M:%S").to_string())
        .bind(booking.status.as_db_str())
        .bind(&booking.activity)
        .bind(booking.decided_by.map(|u| u.to_string()))
        .bind(booking.decided_at.map(|t| t.to_rfc3339()))
        .bind(booking.created_at.to_rfc3339())
        .bind(booking.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(BookingSubmitOutcome::Created(booking.clone()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<RoomBooking>, DbError> {
        let row = sqlx::query("SELECT * FROM bookings WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_booking).transpose()
    }

    async fn list_for_room(
        &self,
        room_id: Uuid,
        date: NaiveDate,
        statuses: &[BookingStatus],
    ) -> Result<Vec<RoomBooking>, DbError> {
        let query = format!(
            "SELECT * FROM bookings WHERE room_id = ? AND date = ? AND status IN ({}) ORDER BY start_time",
            status_list(statuses)
        );
        let rows = sqlx::query(&query)
            .bind(room_id.to_string())
            .bind(date.format("%Y-%m-%d").to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_booking).collect()
    }

    async fn list_for_requester(
        &self,
        requester_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Vec<RoomBooking>, DbError> {
        let rows = sqlx::query(
            "SELECT * FROM bookings WHERE requester_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(requester_id.to_string())
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_booking).collect()
    }

    async fn count_for_requester(&self, requester_id: Uuid) -> Result<u64, DbError> {
        use sqlx::Row;
        let row = sqlx::query("SELECT COUNT(*) AS n FROM bookings WHERE requester_id = ?")
            .bind(requester_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        decided_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<RoomBooking>, DbError> {
        let result = if let Some(approver) = decided_by {
            sqlx::query(
                "UPDATE bookings SET status = ?, decided_by = ?, decided_at = ?, updated_at = ? WHERE id = ? AND status = ?",
            )
            .bind(to.as_db_str())
            .bind(approver.to_string())
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .bind(id.to_string())
            .bind(from.as_db_str())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            )
            .bind(to.as_db_str())
            .bind(now.to_rfc3339())
            .bind(id.to_string())
            .bind(from.as_db_str())
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }
}
