//! Grounding context sources for the context strategies
//!
//! - `corpus`: lexical retrieval over a directory of reference texts
//! - `concept_db`: concept-map rows stored in SQLite
//! - `import`: builds the concept-map database from CSV exports

pub mod concept_db;
pub mod corpus;
pub mod import;

pub use concept_db::{ConceptDb, SubtopicRow, TopicRow};
pub use corpus::CorpusRetriever;
pub use import::{import_concepts, ImportSummary};

/// Returns reference text for a query. An empty string means nothing
/// relevant was found; `Err` means the source itself failed.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str) -> anyhow::Result<String>;
}
