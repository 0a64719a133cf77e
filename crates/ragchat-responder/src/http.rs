use std::time::Duration;

use ragchat_core::traits::ChatResponder;
use ragchat_core::types::{ChatMessage, ContextPassage};
use ragchat_core::{Error, Result};
use serde_json::{json, Value};

use crate::content::content_text;
use crate::transport::Transport;

/// Posts `{messages, context}` to a generic JSON chat endpoint.
#[derive(Debug, Clone)]
pub struct HttpChatResponder {
    transport: Transport,
}

impl HttpChatResponder {
    pub fn new(endpoint: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self { transport: Transport::new(endpoint.into(), token, timeout)? })
    }

    pub fn endpoint(&self) -> &str { self.transport.endpoint() }

    pub fn token(&self) -> Option<&str> { self.transport.token() }

    pub fn timeout(&self) -> Duration { self.transport.timeout() }

    pub fn payload(messages: &[ChatMessage], context: &[ContextPassage]) -> Value {
        json!({ "messages": messages, "context": context })
    }
}

impl ChatResponder for HttpChatResponder {
    fn respond(&self, messages: &[ChatMessage], context: &[ContextPassage]) -> Result<String> {
        let body = self.transport.post_json(&Self::payload(messages, context))?;
        extract_answer(&body)
            .ok_or_else(|| Error::provider("Chat service response did not contain an answer."))
    }
}

/// Finds the answer text in a chat service response.
///
/// Plain `answer`, `response` and `result` strings win; after that the
/// chat-completion shapes `message.content`, `choices[].message.content`,
/// `choices[].text` and the responses-style `output`/`output_text` fields are
/// tried in order.
pub fn extract_answer(body: &Value) -> Option<String> {
    for key in ["answer", "response", "result"] {
        if let Some(s) = body.get(key).and_then(Value::as_str) {
            if !s.trim().is_empty() {
                return Some(s.to_string());
            }
        }
    }

    if let Some(text) = body.pointer("/message/content").and_then(content_text) {
        return Some(text);
    }

    if let Some(choices) = body.get("choices").and_then(Value::as_array) {
        for choice in choices {
            if let Some(text) = choice.pointer("/message/content").and_then(content_text) {
                return Some(text);
            }
            if let Some(text) = choice.get("text").and_then(content_text) {
                return Some(text);
            }
        }
    }

    body.get("output")
        .and_then(content_text)
        .or_else(|| body.get("output_text").and_then(content_text))
}
