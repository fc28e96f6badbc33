//! Entity model
//!
//! In-memory representations of the four stored entities:
//!
//! ```text
//!   ObservationSet ──declares──▶ Condition ◀──references── Observation
//!         ▲                                                    │
//!         └───────────────────────belongs to──────────────────┤
//!                                                              ▼
//!                                                            Path
//! ```
//!
//! Conditions and paths are shared dimension rows; sets own their declared
//! condition list by value; observations borrow their parent set only while
//! being inserted.

pub mod dimension;
pub mod observation;
pub mod observation_set;

pub use dimension::{Condition, Dimension, Path};
pub use observation::Observation;
pub use observation_set::{link_for_set_id, ObservationSet, SetLinks};
