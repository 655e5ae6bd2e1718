//! Loan header/line repository.
//!
//! Stock is reserved when a loan is submitted and released when a line is
//! rejected or returned. Every one of those moves pairs the stock write
//! with the line write inside a single transaction, so two concurrent
//! submissions can never both spend the last unit.

use super::{DbError, Pagination};
use crate::models::{
    derive_header_status, LineDecision, LoanHeader, LoanLine, LoanLineStatus, LoanSubmission,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Result of a transactional loan submission.
#[derive(Debug, Clone)]
pub enum LoanSubmitOutcome {
    /// Every line passed validation; stock was decremented and the loan
    /// persisted.
    Created {
        header: LoanHeader,
        lines: Vec<LoanLine>,
    },
    /// A requested item does not exist or is soft-deleted. Nothing was
    /// written.
    ItemNotFound(Uuid),
    /// A requested item has fewer units left than the line asks for.
    InsufficientStock {
        item_id: Uuid,
        requested: i64,
        available: i64,
    },
    /// The borrower already holds an unresolved loan line for this item.
    DuplicateActiveLoan { item_id: Uuid },
}

/// Result of a line decision or return.
#[derive(Debug, Clone)]
pub enum LineUpdateOutcome {
    /// The line moved and the header status was re-derived.
    Updated {
        header: LoanHeader,
        line: LoanLine,
    },
    /// No line with this id exists.
    LineNotFound(Uuid),
    /// The line is not in a state the requested move accepts.
    InvalidState {
        line_id: Uuid,
        status: LoanLineStatus,
    },
}

/// Repository trait for loan headers and lines.
#[async_trait]
pub trait LoanRepository: Send + Sync {
    /// Validates every line, reserves stock, and persists the loan, all
    /// inside one transaction. Any failed line aborts the whole
    /// submission.
    async fn submit(
        &self,
        submission: &LoanSubmission,
        now: DateTime<Utc>,
    ) -> Result<LoanSubmitOutcome, DbError>;

    /// Approves or rejects a submitted line. Rejection restores the
    /// line's reserved stock. The header status is re-derived from all
    /// of its lines in the same transaction.
    async fn resolve_line(
        &self,
        line_id: Uuid,
        decision: LineDecision,
        approver_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LineUpdateOutcome, DbError>;

    /// Marks an approved line returned and restores its stock.
    async fn return_line(
        &self,
        line_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LineUpdateOutcome, DbError>;

    /// Gets a header together with all of its lines.
    async fn get_header(&self, id: Uuid)
        -> Result<Option<(LoanHeader, Vec<LoanLine>)>, DbError>;

    /// Gets a single line by id.
    async fn get_line(&self, id: Uuid) -> Result<Option<LoanLine>, DbError>;

    /// Lists a borrower's headers, newest first.
    async fn list_for_borrower(
        &self,
        borrower_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Vec<LoanHeader>, DbError>;

    /// Counts a borrower's headers.
    async fn count_for_borrower(&self, borrower_id: Uuid) -> Result<u64, DbError>;
}

/// SQLite implementation of [`LoanRepository`].
#[cfg(feature = "database")]
pub struct SqliteLoanRepository {
    pool: sqlx::SqlitePool,
}

#[cfg(feature = "database")]
impl SqliteLoanRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "database")]
mod rows {
    use super::super::booking_repo::{parse_date, parse_ts, parse_uuid};
    use super::DbError;
    use crate::models::{LoanHeader, LoanLine, LoanLineStatus, LoanStatus};
    use sqlx::Row;

    pub fn to_header(row: &sqlx::sqlite::SqliteRow) -> Result<LoanHeader, DbError> {
        let status: String = row.try_get("status")?;
        let return_date: Option<String> = row.try_get("return_date")?;
        let decided_by: Option<String> = row.try_get("decided_by")?;
        let decided_at: Option<String> = row.try_get("decided_at")?;
        Ok(LoanHeader {
            id: parse_uuid("id", &row.try_get::<String, _>("id")?)?,
            code: row.try_get("code")?,
            borrower_id: parse_uuid("borrower_id", &row.try_get::<String, _>("borrower_id")?)?,
            request_date: parse_date("request_date", &row.try_get::<String, _>("request_date")?)?,
            return_date: return_date
                .as_deref()
                .map(|s| parse_date("return_date", s))
                .transpose()?,
            purpose: row.try_get("purpose")?,
            status: LoanStatus::from_db_str(&status)
                .ok_or_else(|| DbError::corrupt_column("status", &status))?,
            decided_by: decided_by.as_deref().map(|s| parse_uuid("decided_by", s)).transpose()?,
            decided_at: decided_at.as_deref().map(|s| parse_ts("decided_at", s)).transpose()?,
            created_at: parse_ts("created_at", &row.try_get::<String, _>("created_at")?)?,
            updated_at: parse_ts("updated_at", &row.try_get::<String, _>("updated_at")?)?,
        })
    }

    pub fn to_line(row: &sqlx::sqlite::SqliteRow) -> Result<LoanLine, DbError> {
        let status: String = row.try_get("status")?;
        let decided_by: Option<String> = row.try_get("decided_by")?;
        let decided_at: Option<String> = row.try_get("decided_at")?;
        Ok(LoanLine {
            id: parse_uuid("id", &row.try_get::<String, _>("id")?)?,
            header_id: parse_uuid("header_id", &row.try_get::<String, _>("header_id")?)?,
            item_id: parse_uuid("item_id", &row.try_get::<String, _>("item_id")?)?,
            quantity: row.try_get("quantity")?,
            status: LoanLineStatus::from_db_str(&status)
                .ok_or_else(|| DbError::corrupt_column("status", &status))?,
            decided_by: decided_by.as_deref().map(|s| parse_uuid("decided_by", s)).transpose()?,
            decided_at: decided_at.as_deref().map(|s| parse_ts("decided_at", s)).transpose()?,
        })
    }
}

#[cfg(feature = "database")]
impl SqliteLoanRepository {
    async fn line_statuses_for_header(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        header_id: Uuid,
    ) -> Result<Vec<LoanLineStatus>, DbError> {
        use sqlx::Row;
        let rows = sqlx::query("SELECT status FROM loan_lines WHERE header_id = ?")
            .bind(header_id.to_string())
            .fetch_all(&mut **tx)
            .await?;
        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status")?;
                LoanLineStatus::from_db_str(&status)
                    .ok_or_else(|| DbError::corrupt_column("status", &status))
            })
            .collect()
    }

    /// Re-derives and persists the header status, returning the updated
    /// header row. When an approver is given the header records who made
    /// the latest decision.
    async fn refresh_header(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        header_id: Uuid,
        decided_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<LoanHeader, DbError> {
        let statuses = Self::line_statuses_for_header(tx, header_id).await?;
        let status = derive_header_status(&statuses);
        if let Some(approver) = decided_by {
            sqlx::query(
                "UPDATE loan_headers SET status = ?, decided_by = ?, decided_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(status.as_db_str())
            .bind(approver.to_string())
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .bind(header_id.to_string())
            .execute(&mut **tx)
            .await?;
        } else {
            sqlx::query("UPDATE loan_headers SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_db_str())
                .bind(now.to_rfc3339())
                .bind(header_id.to_string())
                .execute(&mut **tx)
                .await?;
        }
        let row = sqlx::query("SELECT * FROM loan_headers WHERE id = ?")
            .bind(header_id.to_string())
            .fetch_one(&mut **tx)
            .await?;
        rows::to_header(&row)
    }
}

#[cfg(feature = "database")]
#[async_trait]
impl LoanRepository for SqliteLoanRepository {
    async fn submit(
        &self,
        submission: &LoanSubmission,
        now: DateTime<Utc>,
    ) -> Result<LoanSubmitOutcome, DbError> {
        use sqlx::Row;

        let mut tx = self.pool.begin().await?;

        // Validate every line against in-transaction state before any
        // write, so a failing line leaves no partial reservation.
        for &(item_id, quantity) in &submission.lines {
            let item = sqlx::query(
                "SELECT total_quantity FROM items WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(item_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
            let available: i64 = match item {
                Some(row) => row.try_get("total_quantity")?,
                None => {
                    tx.rollback().await?;
                    return Ok(LoanSubmitOutcome::ItemNotFound(item_id));
                }
            };
            if available < quantity {
                tx.rollback().await?;
                return Ok(LoanSubmitOutcome::InsufficientStock {
                    item_id,
                    requested: quantity,
                    available,
                });
            }

            let active: i64 = sqlx::query(
                r#"
                SELECT COUNT(*) AS n FROM loan_lines ll
                JOIN loan_headers lh ON lh.id = ll.header_id
                WHERE lh.borrower_id = ? AND ll.item_id = ? AND ll.status IN ('submitted', 'approved')
                "#,
            )
            .bind(submission.borrower_id.to_string())
            .bind(item_id.to_string())
            .fetch_one(&mut *tx)
            .await?
            .try_get("n")?;
            if active > 0 {
                tx.rollback().await?;
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
        sqlx::query(
            r#"
            INSERT INTO loan_headers (id, code, borrower_id, request_date, return_date,
                                      purpose, status, decided_by, decided_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?)
            "#,
        )
        .bind(header.id.to_string())
        .bind(&header.code)
        .bind(header.borrower_id.to_string())
        .bind(header.request_date.format("%Y-%m-%d").to_string())
        .bind(header.return_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(&header.purpose)
        .bind(header.status.as_db_str())
        .bind(header.created_at.to_rfc3339())
        .bind(header.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let mut lines = Vec::with_capacity(submission.lines.len());
        for &(item_id, quantity) in &submission.lines {
            let line = LoanLine::submitted(header.id, item_id, quantity);
            sqlx::query(
                r#"
                INSERT INTO loan_lines (id, header_id, item_id, quantity, status, decided_by, decided_at)
                VALUES (?, ?, ?, ?, ?, NULL, NULL)
                "#,
            )
            .bind(line.id.to_string())
            .bind(line.header_id.to_string())
            .bind(line.item_id.to_string())
            .bind(line.quantity)
            .bind(line.status.as_db_str())
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE items SET total_quantity = total_quantity - ?, updated_at = ? WHERE id = ?",
            )
            .bind(quantity)
            .bind(now.to_rfc3339())
            .bind(item_id.to_string())
            .execute(&mut *tx)
            .await?;

            lines.push(line);
        }

        tx.commit().await?;
        Ok(LoanSubmitOutcome::Created { header, lines })
    }

    async fn resolve_line(
        &self,
        line_id: Uuid,
        decision: LineDecision,
        approver_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LineUpdateOutcome, DbError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM loan_lines WHERE id = ?")
            .bind(line_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let line = match row.as_ref().map(rows::to_line).transpose()? {
            Some(line) => line,
            None => {
                tx.rollback().await?;
                return Ok(LineUpdateOutcome::LineNotFound(line_id));
            }
        };
        if line.status != LoanLineStatus::Submitted {
            tx.rollback().await?;
            return Ok(LineUpdateOutcome::InvalidState {
                line_id,
                status: line.status,
            });
        }

        let target = decision.target_status();
        sqlx::query(
            "UPDATE loan_lines SET status = ?, decided_by = ?, decided_at = ? WHERE id = ?",
        )
        .bind(target.as_db_str())
        .bind(approver_id.to_string())
        .bind(now.to_rfc3339())
        .bind(line_id.to_string())
        .execute(&mut *tx)
        .await?;

        // A rejected line never leaves the shelf; hand its units back.
        if target == LoanLineStatus::Rejected {
            sqlx::query(
                "UPDATE items SET total_quantity = total_quantity + ?, updated_at = ? WHERE id = ?",
            )
            .bind(line.quantity)
            .bind(now.to_rfc3339())
            .bind(line.item_id.to_string())
            .execute(&mut *tx)
            .await?;
        }

        let header = Self::refresh_header(&mut tx, line.header_id, Some(approver_id), now).await?;
        let updated = LoanLine {
            status: target,
            decided_by: Some(approver_id),
            decided_at: Some(now),
            ..line
        };

        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM loan_lines WHERE id = ?")
            .bind(line_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let line = match row.as_ref().map(rows::to_line).transpose()? {
            Some(line) => line,
            None => {
                tx.rollback().await?;
                return Ok(LineUpdateOutcome::LineNotFound(line_id));
            }
        };
        if line.status != LoanLineStatus::Approved {
            tx.rollback().await?;
            return Ok(LineUpdateOutcome::InvalidState {
                line_id,
                status: line.status,
            });
        }

        sqlx::query("UPDATE loan_lines SET status = ? WHERE id = ?")
            .bind(LoanLineStatus::Returned.as_db_str())
            .bind(line_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE items SET total_quantity = total_quantity + ?, updated_at = ? WHERE id = ?",
        )
        .bind(line.quantity)
        .bind(now.to_rfc3339())
        .bind(line.item_id.to_string())
        .execute(&mut *tx)
        .await?;

        let header = Self::refresh_header(&mut tx, line.header_id, None, now).await?;
        let updated = LoanLine {
            status: LoanLineStatus::Returned,
            ..line
        };

        tx.commit().await?;
        Ok(LineUpdateOutcome::Updated {
            header,
            line: updated,
        })
    }

    async fn get_header(
        &self,
        id: Uuid,
    ) -> Result<Option<(LoanHeader, Vec<LoanLine>)>, DbError> {
        let row = sqlx::query("SELECT * FROM loan_headers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let header = match row.as_ref().map(rows::to_header).transpose()? {
            Some(header) => header,
            None => return Ok(None),
        };
        let rows = sqlx::query("SELECT * FROM loan_lines WHERE header_id = ?")
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;
        let lines = rows.iter().map(rows::to_line).collect::<Result<_, _>>()?;
        Ok(Some((header, lines)))
    }

    async fn get_line(&self, id: Uuid) -> Result<Option<LoanLine>, DbError> {
        let row = sqlx::query("SELECT * FROM loan_lines WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(rows::to_line).transpose()
    }

    async fn list_for_borrower(
        &self,
        borrower_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Vec<LoanHeader>, DbError> {
        let rows = sqlx::query(
            "SELECT * FROM loan_headers WHERE borrower_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(borrower_id.to_string())
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(rows::to_header).collect()
    }

    async fn count_for_borrower(&self, borrower_id: Uuid) -> Result<u64, DbError> {
        use sqlx::Row;
        let row = sqlx::query("SELECT COUNT(*) AS n FROM loan_headers WHERE borrower_id = ?")
            .bind(borrower_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }
}
