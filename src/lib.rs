// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod cycle;
pub mod delivery;
pub mod digest;
pub mod listener;
pub mod metrics;
pub mod scheduler;
pub mod source;
pub mod supervisor;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::cycle::{Aggregator, CycleReport, Trigger};
pub use crate::digest::{compose, Digest, Section, SourceLabel};
pub use crate::source::{FetchError, Item, SourceFetcher, SourceResult};
