//! Storage layer for PTO observations
//!
//! SQLite-backed persistence of conditions, paths, observation sets and
//! observations.

pub mod ingest;
pub mod observation_store;
pub mod schema;

pub use ingest::IngestReport;
pub use observation_store::{ObservationStore, StoreStats};
pub use schema::{create_tables, drop_tables, insert_once};
