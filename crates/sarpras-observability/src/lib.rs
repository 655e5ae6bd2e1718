//! # sarpras-observability
//!
//! Logging bootstrap for the sarpras loan service. The core crates emit
//! `tracing` events; this crate installs the subscriber for whichever
//! binary hosts them. Metrics and audit aggregation are handled by the
//! surrounding deployment, not here.

pub mod logging;

pub use logging::{init, init_with_config, LogFormat, LoggingConfig};
