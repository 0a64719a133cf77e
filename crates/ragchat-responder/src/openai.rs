//! OpenAI-compatible chat-completions backend.
//!
//! The knowledge-base context travels inside the message list, never as a
//! separate payload field. When the endpoint is a proxy that injects its own
//! context, the grounding message is dropped instead.

use std::time::Duration;

use ragchat_core::locale::Locale;
use ragchat_core::text::context_block;
use ragchat_core::traits::ChatResponder;
use ragchat_core::types::{ChatMessage, ContextPassage, Role};
use ragchat_core::{Error, Result};
use reqwest::Url;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::content::content_text;
use crate::local::DEFAULT_SNIPPET_CHARS;
use crate::transport::Transport;

pub const OPENAI_HOST: &str = "api.openai.com";
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const DEFAULT_MAX_COMPLETION_TOKENS: u32 = 4096;

/// Sampling parameters copied into the request when set.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiOptions {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub max_completion_tokens: u32,
}

impl Default for OpenAiOptions {
    fn default() -> Self {
        Self {
            temperature: None,
            top_p: None,
            presence_penalty: None,
            frequency_penalty: None,
            max_completion_tokens: DEFAULT_MAX_COMPLETION_TOKENS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiChatResponder {
    transport: Transport,
    model: String,
    options: OpenAiOptions,
    forward_context: bool,
    locale: Locale,
}

impl OpenAiChatResponder {
    /// `forward_context` is false for proxies that inject the context
    /// themselves.
    pub fn new(
        endpoint: &Url,
        token: Option<String>,
        model: Option<String>,
        options: OpenAiOptions,
        forward_context: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let model = model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .ok_or_else(|| Error::provider("OpenAI responder requires a model."))?;
        let endpoint = normalise_endpoint(endpoint.clone());
        Ok(Self {
            transport: Transport::new(endpoint.to_string(), token, timeout)?,
            model,
            options,
            forward_context,
            locale: Locale::default(),
        })
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn endpoint(&self) -> &str { self.transport.endpoint() }

    pub fn model(&self) -> &str { &self.model }

    pub fn forwards_context(&self) -> bool { self.forward_context }

    pub fn payload(&self, messages: &[ChatMessage], context: &[ContextPassage]) -> Value {
        let messages = if self.forward_context {
            self.with_grounding(messages, context)
        } else {
            messages.iter().filter(|m| !m.grounding).cloned().collect()
        };

        let mut body = Map::new();
        body.insert("model".into(), json!(self.model));
        let optional = [
            ("temperature", self.options.temperature),
            ("top_p", self.options.top_p),
            ("presence_penalty", self.options.presence_penalty),
            ("frequency_penalty", self.options.frequency_penalty),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                body.insert(key.into(), json!(v));
            }
        }
        body.insert("max_completion_tokens".into(), json!(self.options.max_completion_tokens));
        body.insert("messages".into(), json!(messages));
        Value::Object(body)
    }

    /// Adds a grounding message before the last user turn if the caller did
    /// not supply one.
    fn with_grounding(&self, messages: &[ChatMessage], context: &[ContextPassage]) -> Vec<ChatMessage> {
        let mut out = messages.to_vec();
        if context.is_empty() || out.iter().any(|m| m.grounding) {
            return out;
        }
        let block = ChatMessage::grounding(context_block(self.locale, context, DEFAULT_SNIPPET_CHARS));
        match out.iter().rposition(|m| m.role == Role::User) {
            Some(at) => out.insert(at, block),
            None => out.push(block),
        }
        out
    }
}

impl ChatResponder for OpenAiChatResponder {
    fn respond(&self, messages: &[ChatMessage], context: &[ContextPassage]) -> Result<String> {
        let payload = self.payload(messages, context);
        debug!(model = %self.model, proxy = !self.forward_context, "sending chat completion");
        let body = self.transport.post_json(&payload)?;
        body.get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.pointer("/message/content"))
            .and_then(content_text)
            .ok_or_else(|| Error::provider("Chat completion did not contain an answer."))
    }
}

/// Bare hosts and `/v1`-style base URLs point at the chat-completions route.
pub fn normalise_endpoint(mut url: Url) -> Url {
    let path = url.path().trim_end_matches('/').to_string();
    if matches!(path.as_str(), "" | "/v1" | "/v1/models") {
        url.set_path(CHAT_COMPLETIONS_PATH);
    }
    url
}

/// True when the endpoint injects its own knowledge-base context.
///
/// An `openai` driver pointing anywhere but the public API counts as a
/// proxy, as does any host with a `proxy` label.
pub fn is_context_proxy(driver: Option<&str>, url: &Url) -> bool {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    if host == OPENAI_HOST {
        return false;
    }
    driver == Some("openai") || host.split(['.', '-']).any(|label| label == "proxy")
}
