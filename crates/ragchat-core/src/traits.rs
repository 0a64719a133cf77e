use crate::error::Result;
use crate::types::{ChatMessage, ContextPassage};

/// Turns a conversation plus retrieved passages into an answer.
///
/// Implementations must not rewrite the messages they are given beyond what
/// their wire contract requires; the caller returns the answer verbatim.
pub trait ChatResponder: Send + Sync {
    fn respond(&self, messages: &[ChatMessage], context: &[ContextPassage]) -> Result<String>;
}

impl<T: ChatResponder + ?Sized> ChatResponder for std::sync::Arc<T> {
    fn respond(&self, messages: &[ChatMessage], context: &[ContextPassage]) -> Result<String> {
        (**self).respond(messages, context)
    }
}
