//! PTO Core - observation store for path transparency measurements
//!
//! PTO Core holds normalized network measurement observations: each one says
//! that a given *condition* held on a given *path* during a time interval.
//! Observations are grouped into *observation sets* that share provenance
//! metadata.
//!
//! # Architecture
//!
//! ```text
//!   wire JSON ──codec──▶ model ──▶ ObservationStore ──▶ SQLite
//!                          ▲             │
//!                          │             ▼
//!   .osf files ───osf──────┘      ConditionCache (shared)
//! ```
//!
//! 1. **Model** (`model`): conditions, paths, sets and observations
//! 2. **Codec** (`codec`): set JSON objects and observation JSON arrays
//! 3. **Observation set files** (`osf`): line-oriented bulk format
//! 4. **Condition cache** (`cache`): name → id map shared by all stores
//! 5. **Storage** (`storage`): schema, upserts, transactional inserts, ingest
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use pto_core::{decode_observation, decode_set, ConditionCache, ObservationStore};
//!
//! let cache = Arc::new(ConditionCache::new());
//! let mut store = ObservationStore::open_in_memory(cache).unwrap();
//!
//! let mut set = decode_set(
//!     br#"{"_sources":["agentA"],"_analyzer":"pto-basic","_conditions":["icmp.unreachable"]}"#,
//! )
//! .unwrap();
//! store.resolve_all_in_set(&mut set).unwrap();
//!
//! let mut obs = decode_observation(
//!     br#"["0","2020-01-01T00:00:00Z","2020-01-01T00:05:00Z","1.2.3.0/24","icmp.unreachable"]"#,
//! )
//! .unwrap();
//! store.insert_observation_in_set(&mut obs, &mut set).unwrap();
//!
//! assert!(set.id.is_some());
//! assert_eq!(store.count_observations(&mut set).unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod osf;
pub mod storage;

// Re-export commonly used types for convenience
pub use cache::ConditionCache;
pub use codec::{decode_observation, decode_set, encode_observation, encode_set};
pub use config::PtoConfig;
pub use error::{ErrorKind, PtoError, Result, ResultExt, ValidationError};
pub use model::{link_for_set_id, Condition, Dimension, Observation, ObservationSet, Path, SetLinks};
pub use storage::{IngestReport, ObservationStore, StoreStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
