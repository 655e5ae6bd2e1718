//! Account repository.

use super::DbError;
use crate::identity::Account;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Warnings at or above this count block the account from new bookings.
pub const WARNING_BLOCK_THRESHOLD: i64 = 3;

/// Repository trait for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Creates an account.
    async fn create(&self, account: &Account) -> Result<Account, DbError>;

    /// Gets an account by id.
    async fn get(&self, id: Uuid) -> Result<Option<Account>, DbError>;

    /// Increments the account's warning count, blocking the account once
    /// it reaches [`WARNING_BLOCK_THRESHOLD`]. Returns the updated
    /// account.
    async fn add_warning(&self, id: Uuid, now: DateTime<Utc>) -> Result<Account, DbError>;
}

/// SQLite implementation of [`UserRepository`].
#[cfg(feature = "database")]
pub struct SqliteUserRepository {
    pool: sqlx::SqlitePool,
}

#[cfg(feature = "database")]
impl SqliteUserRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "database")]
fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account, DbError> {
    use super::booking_repo::{parse_ts, parse_uuid};
    use crate::identity::Role;
    use sqlx::Row;

    let role: String = row.try_get("role")?;
    Ok(Account {
        id: parse_uuid("id", &row.try_get::<String, _>("id")?)?,
        display_name: row.try_get("display_name")?,
        role: Role::from_db_str(&role).ok_or_else(|| DbError::corrupt_column("role", &role))?,
        active: row.try_get("active")?,
        blocked: row.try_get("blocked")?,
        warning_count: row.try_get("warning_count")?,
        created_at: parse_ts("created_at", &row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts("updated_at", &row.try_get::<String, _>("updated_at")?)?,
    })
}

#[cfg(feature = "database")]
#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, account: &Account) -> Result<Account, DbError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, display_name, role, active, blocked, warning_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.display_name)
        .bind(account.role.as_db_str())
        .bind(account.active)
        .bind(account.blocked)
        .bind(account.warning_count)
        .bind(account.created_at.to_rfc3339())
        .bind(account.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(account.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>, DbError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn add_warning(&self, id: Uuid, now: DateTime<Utc>) -> Result<Account, DbError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let account = match row.as_ref().map(row_to_account).transpose()? {
            Some(account) => account,
            None => {
                tx.rollback().await?;
                return Err(DbError::not_found("account", id.to_string()));
            }
        };

        let warning_count = account.warning_count + 1;
        let blocked = account.blocked || warning_count >= WARNING_BLOCK_THRESHOLD;
        sqlx::query(
            "UPDATE accounts SET warning_count = ?, blocked = ?, updated_at = ? WHERE id = ?",
        )
        .bind(warning_count)
        .bind(blocked)
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Account {
            warning_count,
            blocked,
            updated_at: now,
            ..account
        })
    }
}
