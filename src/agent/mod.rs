//! Intent routing and the tools it dispatches to.

pub mod router;
pub mod summarizer;
pub mod tools;

pub use router::{Intent, IntentRouter};
pub use summarizer::MapReduceSummarizer;
pub use tools::ToolHandlers;
