//! Strata end-to-end test support
//!
//! - [`harness`]: isolated memory systems over in-memory, SQLite or failing tiers
//! - [`mocks`]: counting analyzer, fixture embedder, failing collection, trace factory
//!
//! Scenario tests live in `tests/`.

pub mod harness;
pub mod mocks;

pub use harness::{Backend, TestMemory};
pub use mocks::{CountingAnalyzer, FailingCollection, FixtureEmbedder, TraceFactory};
