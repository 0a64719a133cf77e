use ragchat_core::config::ChatSettings;
use ragchat_core::locale::Locale;
use ragchat_core::traits::ChatResponder;
use ragchat_core::types::{ChatMessage, ContextPassage};
use ragchat_core::{Error, Result};
use reqwest::Url;
use tracing::{info, warn};

use crate::http::HttpChatResponder;
use crate::local::LocalExtractiveResponder;
use crate::openai::{is_context_proxy, OpenAiChatResponder, OpenAiOptions, DEFAULT_MAX_COMPLETION_TOKENS, OPENAI_HOST};
use crate::transport::timeout_from_secs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderKind {
    Local,
    Http,
    OpenAi,
}

/// The responder chosen for one tenant.
#[derive(Debug, Clone)]
pub enum Responder {
    Local(LocalExtractiveResponder),
    Http(HttpChatResponder),
    OpenAi(OpenAiChatResponder),
}

impl Responder {
    pub fn kind(&self) -> ResponderKind {
        match self {
            Responder::Local(_) => ResponderKind::Local,
            Responder::Http(_) => ResponderKind::Http,
            Responder::OpenAi(_) => ResponderKind::OpenAi,
        }
    }
}

impl ChatResponder for Responder {
    fn respond(&self, messages: &[ChatMessage], context: &[ContextPassage]) -> Result<String> {
        match self {
            Responder::Local(r) => r.respond(messages, context),
            Responder::Http(r) => r.respond(messages, context),
            Responder::OpenAi(r) => r.respond(messages, context),
        }
    }
}

/// Dispatch rule:
/// - no endpoint: local
/// - driver `http`: generic HTTP
/// - driver `openai`, the public OpenAI host, a `/chat/completions` path or
///   `force_openai`: OpenAI-compatible
/// - anything else: local
pub fn select_kind(settings: &ChatSettings) -> ResponderKind {
    let Some(endpoint) = settings.endpoint() else {
        return ResponderKind::Local;
    };
    let driver = settings.driver();
    match driver.as_deref() {
        Some("http") => return ResponderKind::Http,
        Some("openai") => return ResponderKind::OpenAi,
        _ => {}
    }
    if settings.force_openai.unwrap_or(false) {
        return ResponderKind::OpenAi;
    }
    match Url::parse(endpoint) {
        Ok(url) => {
            let host = url.host_str().unwrap_or_default().to_lowercase();
            if host == OPENAI_HOST || url.path().trim_end_matches('/').ends_with("/chat/completions") {
                ResponderKind::OpenAi
            } else {
                ResponderKind::Local
            }
        }
        Err(_) => ResponderKind::Local,
    }
}

/// Builds the responder for already merged (tenant over default) settings.
pub fn build_responder(settings: &ChatSettings, locale: Locale) -> Result<Responder> {
    let kind = select_kind(settings);
    let timeout = timeout_from_secs(settings.timeout_secs);
    let responder = match (kind, settings.endpoint()) {
        (ResponderKind::Http, Some(endpoint)) => {
            Responder::Http(HttpChatResponder::new(endpoint, settings.token.clone(), timeout)?)
        }
        (ResponderKind::OpenAi, Some(endpoint)) => {
            let url = Url::parse(endpoint)
                .map_err(|e| Error::provider(format!("Invalid chat endpoint '{endpoint}': {e}")))?;
            let driver = settings.driver();
            let forward_context = !is_context_proxy(driver.as_deref(), &url);
            let options = OpenAiOptions {
                temperature: settings.temperature,
                top_p: settings.top_p,
                presence_penalty: settings.presence_penalty,
                frequency_penalty: settings.frequency_penalty,
                max_completion_tokens: settings.max_completion_tokens.unwrap_or(DEFAULT_MAX_COMPLETION_TOKENS),
            };
            let responder = OpenAiChatResponder::new(
                &url,
                settings.token.clone(),
                settings.model.clone(),
                options,
                forward_context,
                timeout,
            )?;
            Responder::OpenAi(responder.with_locale(locale))
        }
        _ => {
            if let Some(endpoint) = settings.endpoint() {
                warn!(endpoint, "chat endpoint matches no known driver, answering locally");
            }
            Responder::Local(LocalExtractiveResponder::new(locale))
        }
    };
    info!(kind = ?responder.kind(), "chat responder ready");
    Ok(responder)
}
