//! Persistence layer.
//!
//! Repository traits are the seam between services and storage. The
//! SQLite implementations live behind the `database` feature; the
//! in-memory [`mocks`] back the test suites. Operations that must be
//! atomic (conflict-checked booking inserts, stock-reserving loan
//! submissions, line decisions) are single repository calls, so a
//! backend can wrap each one in a transaction.

mod booking_repo;
mod error;
mod item_repo;
mod loan_repo;
pub mod mocks;
mod pagination;
#[cfg(feature = "database")]
mod pool;
#[cfg(feature = "database")]
mod schema;
mod user_repo;

pub use booking_repo::{BookingRepository, BookingSubmitOutcome};
pub use error::DbError;
pub use item_repo::ItemRepository;
pub use loan_repo::{LineUpdateOutcome, LoanRepository, LoanSubmitOutcome};
pub use pagination::{PaginatedResult, Pagination};
pub use user_repo::{UserRepository, WARNING_BLOCK_THRESHOLD};

#[cfg(feature = "database")]
pub use booking_repo::SqliteBookingRepository;
#[cfg(feature = "database")]
pub use item_repo::SqliteItemRepository;
#[cfg(feature = "database")]
pub use loan_repo::SqliteLoanRepository;
#[cfg(feature = "database")]
pub use pool::{create_pool, DbConfig};
#[cfg(feature = "database")]
pub use schema::run_migrations;
#[cfg(feature = "database")]
pub use user_repo::SqliteUserRepository;
