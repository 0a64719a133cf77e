//! Answer generators for the RAG chat.
//!
//! Three interchangeable backends sit behind [`ragchat_core::traits::ChatResponder`]:
//! a deterministic local summary, a generic JSON endpoint and an
//! OpenAI-compatible chat-completions endpoint. [`build_responder`] picks one
//! from the merged chat settings.

pub mod content;
pub mod factory;
pub mod http;
pub mod local;
pub mod openai;
mod transport;

pub use factory::{build_responder, select_kind, Responder, ResponderKind};
pub use http::HttpChatResponder;
pub use local::LocalExtractiveResponder;
pub use openai::{OpenAiChatResponder, OpenAiOptions};
