//! Schema bootstrap.
//!
//! Statements are idempotent (`IF NOT EXISTS`) and executed one at a time
//! so a fresh pool can always be brought up to the current schema.

use super::DbError;
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id            TEXT PRIMARY KEY,
        display_name  TEXT NOT NULL,
        role          TEXT NOT NULL,
        active        INTEGER NOT NULL DEFAULT 1,
        blocked       INTEGER NOT NULL DEFAULT 0,
        warning_count INTEGER NOT NULL DEFAULT 0,
        created_at    TEXT NOT NULL,
        updated_at    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS rooms (
        id         TEXT PRIMARY KEY,
        name       TEXT NOT NULL,
        code       TEXT NOT NULL UNIQUE,
        capacity   INTEGER NOT NULL,
        location   TEXT,
        deleted_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id             TEXT PRIMARY KEY,
        name           TEXT NOT NULL,
        code           TEXT NOT NULL UNIQUE,
        total_quantity INTEGER NOT NULL,
        deleted_at     TEXT,
        created_at     TEXT NOT NULL,
        updated_at     TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bookings (
        id           TEXT PRIMARY KEY,
        room_id      TEXT NOT NULL REFERENCES rooms(id),
        requester_id TEXT NOT NULL REFERENCES accounts(id),
        date         TEXT NOT NULL,
        start_time   TEXT NOT NULL,
        end_time     TEXT NOT NULL,
        status       TEXT NOT NULL,
        activity     TEXT,
        decided_by   TEXT,
        decided_at   TEXT,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS loan_headers (
        id           TEXT PRIMARY KEY,
        code         TEXT NOT NULL UNIQUE,
        borrower_id  TEXT NOT NULL REFERENCES accounts(id),
        request_date TEXT NOT NULL,
        return_date  TEXT,
        purpose      TEXT,
        status       TEXT NOT NULL,
        decided_by   TEXT,
        decided_at   TEXT,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS loan_lines (
        id         TEXT PRIMARY KEY,
        header_id  TEXT NOT NULL REFERENCES loan_headers(id),
        item_id    TEXT NOT NULL REFERENCES items(id),
        quantity   INTEGER NOT NULL,
        status     TEXT NOT NULL,
        decided_by TEXT,
        decided_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_bookings_room_date ON bookings (room_id, date, status)",
    "CREATE INDEX IF NOT EXISTS idx_bookings_requester ON bookings (requester_id)",
    "CREATE INDEX IF NOT EXISTS idx_loan_headers_borrower ON loan_headers (borrower_id)",
    "CREATE INDEX IF NOT EXISTS idx_loan_lines_header ON loan_lines (header_id)",
    "CREATE INDEX IF NOT EXISTS idx_loan_lines_item ON loan_lines (item_id, status)",
];

/// Creates all tables and indexes if they do not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DbError::Schema(e.to_string()))?;
    }
    Ok(())
}
