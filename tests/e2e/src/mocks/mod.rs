//! Mock collaborators and test data

mod analyzer;
mod fixtures;

pub use analyzer::CountingAnalyzer;
pub use collection::FailingCollection;
pub use embedder::FixtureEmbedder;
pub use fixtures::TraceFactory;
