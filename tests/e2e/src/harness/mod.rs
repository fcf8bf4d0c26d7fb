//! Test harness

mod test_memory;

pub use test_memory::{Backend, TestMemory};
