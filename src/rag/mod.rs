//! Document retrieval for grounded answers.
//!
//! - `pipeline`: indexing (upload → chunks in the store) and query (question → fused hits)
//! - `store`: the `DocumentStore` seam and its in-memory implementation
//! - `bm25` / `fusion`: keyword scoring and reciprocal rank fusion
//! - `context_builder`: turns hits into the prompt context block

pub mod bm25;
pub mod context_builder;
pub mod convert;
pub mod fusion;
pub mod pipeline;
pub mod splitter;
pub mod store;

pub use context_builder::ContextBuilder;
pub use pipeline::{IndexingPipeline, IngestReport, QueryPipeline};
pub use store::{DocumentStore, InMemoryDocumentStore, ScoredDocument, SourceSummary};
