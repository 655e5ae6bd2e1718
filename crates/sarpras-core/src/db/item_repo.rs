//! Equipment item repository.

use super::{DbError, Pagination};
use crate::models::Item;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Repository trait for loanable equipment items.
///
/// Stock mutations do not live here: `total_quantity` is only changed by
/// [`LoanRepository`](super::LoanRepository) inside its loan transactions,
/// so stock and line state can never drift apart.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Creates an item.
    async fn create(&self, item: &Item) -> Result<Item, DbError>;

    /// Gets an item by id (including soft-deleted items).
    async fn get(&self, id: Uuid) -> Result<Option<Item>, DbError>;

    /// Lists non-deleted items ordered by name.
    async fn list(&self, pagination: &Pagination) -> Result<Vec<Item>, DbError>;

    /// Counts non-deleted items.
    async fn count(&self) -> Result<u64, DbError>;

    /// Soft-deletes an item. Returns false when the id is unknown or the
    /// item is already deleted.
    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, DbError>;
}

/// SQLite implementation of [`ItemRepository`].
#[cfg(feature = "database")]
pub struct SqliteItemRepository {
    pool: sqlx::SqlitePool,
}

#[cfg(feature = "database")]
impl SqliteItemRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "database")]
pub(crate) fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<Item, DbError> {
    use super::booking_repo::{parse_ts, parse_uuid};
    use sqlx::Row;

    let deleted_at: Option<String> = row.try_get("deleted_at")?;
    Ok(Item {
        id: parse_uuid("id", &row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        total_quantity: row.try_get("total_quantity")?,
        deleted_at: deleted_at.as_deref().map(|s| parse_ts("deleted_at", s)).transpose()?,
        created_at: parse_ts("created_at", &row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts("updated_at", &row.try_get::<String, _>("updated_at")?)?,
    })
}

#[cfg(feature = "database")]
#[async_trait]
impl ItemRepository for SqliteItemRepository {
    async fn create(&self, item: &Item) -> Result<Item, DbError> {
        sqlx::query(
            r#"
            INSERT INTO items (id, name, code, total_quantity, deleted_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(&item.name)
        .bind(&item.code)
        .bind(item.total_quantity)
        .bind(item.deleted_at.map(|t| t.to_rfc3339()))
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(item.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Item>, DbError> {
        let row = sqlx::query("SELECT * FROM items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn list(&self, pagination: &Pagination) -> Result<Vec<Item>, DbError> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE deleted_at IS NULL ORDER BY name LIMIT ? OFFSET ?",
        )
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn count(&self) -> Result<u64, DbError> {
        use sqlx::Row;
        let row = sqlx::query("SELECT COUNT(*) AS n FROM items WHERE deleted_at IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }

    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE items SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
