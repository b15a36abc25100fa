//! Registry Stats - download and manifest-view statistics for a package registry
//!
//! This library collects per-package download and manifest-view counters,
//! aggregates them in memory across time periods (overall / yearly / monthly /
//! weekly / daily) and persists them in batched transactions.
//!
//! # Architecture
//! - `period`: period types and bucket-label calculation
//! - `stats`: pending buffer, counter API and flush scheduling
//! - `storage`: SeaORM backend (SQLite / MySQL / PostgreSQL)
//! - `database`: the facade the host registry wires in
//! - `hooks`: response-completion entry points for the host
//! - `config`: configuration management

pub mod config;
pub mod database;
pub mod errors;
pub mod hooks;
pub mod logging;
pub mod period;
pub mod stats;
pub mod storage;
pub mod utils;

pub use config::StatsConfig;
pub use database::StatsDatabase;
pub use errors::{RegistryStatsError, Result};
pub use period::{PeriodType, current_period_value, period_value};
pub use stats::{FlushMode, PendingEntry, StatsKind, StatsManager, StatsSink};
pub use storage::StatsStorage;
