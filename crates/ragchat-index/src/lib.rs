//! ragchat-index
//!
//! Loads the serialized TF-IDF index written by the offline indexer and ranks
//! its chunks against a query by cosine similarity.
pub mod cache;
pub mod index;
pub mod tokenize;

pub use cache::IndexCache;
pub use index::{Chunk, ScoredResult, SemanticIndex};
