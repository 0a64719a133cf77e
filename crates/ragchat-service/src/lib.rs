//! Retrieval-augmented answering: search the knowledge-base index, build the
//! grounded conversation and hand it to the configured responder.

pub mod context;
pub mod service;

pub use service::RagChatService;
