//! Core domain logic for the sarpras facility-loan backend.
//!
//! The crate covers three concerns:
//!
//! - **Caching**: a per-domain TTL cache layer ([`cache`]) with a shared
//!   registry, canonical JSON keys, pattern invalidation, and a
//!   background sweeper.
//! - **Room bookings**: conflict-checked booking submission and
//!   verification ([`availability`], [`bookings`]).
//! - **Equipment loans**: transactional stock reservation with per-line
//!   approval and returns ([`loans`]).
//!
//! Persistence sits behind the repository traits in [`db`]; the SQLite
//! implementations are gated behind the `database` feature, and
//! [`db::mocks`] provides in-memory implementations for tests.

pub mod availability;
pub mod bookings;
pub mod cache;
pub mod clock;
pub mod db;
pub mod error;
pub mod identity;
pub mod loans;
pub mod models;

pub use availability::{AvailabilityChecker, AvailabilityOutcome, CheckMode, ConflictReason};
pub use bookings::{BookingRequest, BookingService};
pub use cache::{cache_key, CacheConfig, CacheError, CacheRegistry, CacheStats, TtlCache};
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use error::{ServiceError, StatusClass};
pub use loans::{LoanRequest, LoanService};
