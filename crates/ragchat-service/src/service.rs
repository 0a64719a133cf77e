use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ragchat_core::config::{AppConfig, Config};
use ragchat_core::locale::Locale;
use ragchat_core::text::context_block;
use ragchat_core::traits::ChatResponder;
use ragchat_core::types::{ChatMessage, ContextItem, ContextPassage, RagChatResponse};
use ragchat_core::{Error, Result};
use ragchat_docs::storage::INDEX_FILE;
use ragchat_docs::DomainResolver;
use ragchat_index::IndexCache;
use ragchat_responder::{build_responder, LocalExtractiveResponder, Responder, ResponderKind};
use tracing::{debug, info, warn};

use crate::context::build_entry;

/// Answers questions from the knowledge-base index.
pub struct RagChatService {
    config: AppConfig,
    domains: DomainResolver,
    cache: Option<Arc<IndexCache>>,
    responder: Option<Arc<dyn ChatResponder>>,
    /// Built responders per configured tenant (`None` for the defaults) and locale.
    responders: Mutex<HashMap<(Option<String>, Locale), Arc<Responder>>>,
}

impl RagChatService {
    pub fn new(config: AppConfig) -> Self {
        let domains = DomainResolver::from_config(&config.domains);
        Self { config, domains, cache: None, responder: None, responders: Mutex::default() }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.app()?))
    }

    /// Uses a private index cache instead of the process-wide one.
    pub fn with_cache(mut self, cache: Arc<IndexCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Answers with `responder` regardless of the chat settings.
    pub fn with_responder(mut self, responder: Arc<dyn ChatResponder>) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn config(&self) -> &AppConfig { &self.config }

    fn cache(&self) -> &IndexCache {
        match &self.cache {
            Some(cache) => cache,
            None => IndexCache::global(),
        }
    }

    /// Answers from the global index.
    pub fn answer(&self, question: &str, locale: Locale) -> Result<RagChatResponse> {
        self.answer_for_domain(question, locale, None)
    }

    /// Answers from the tenant's own index when `domain` is given.
    ///
    /// The slug and its first label are tried in turn; the first index with
    /// hits wins and its items are tagged with `metadata.domain`. A tenant
    /// without hits gets the empty-context answer rather than global results.
    pub fn answer_for_domain(
        &self,
        question: &str,
        locale: Locale,
        domain: Option<&str>,
    ) -> Result<RagChatResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::validation("Question must not be empty."));
        }

        let (slug, items, passages) = match domain.map(str::trim).filter(|d| !d.is_empty()) {
            Some(domain) => {
                let slug = self.domains.canonicalize(domain)?;
                let (items, passages) = self.search_domain(question, locale, &slug);
                (Some(slug), items, passages)
            }
            None => {
                let (items, passages) = self.search_index(&self.config.paths.index_path(), question, locale, None)?;
                (None, items, passages)
            }
        };
        debug!(hits = passages.len(), tenant = ?slug, "retrieved context");

        let messages = self.messages(question, locale, &passages);
        let answer = self.respond(slug.as_deref(), locale, &messages, &passages)?;
        Ok(RagChatResponse { question: question.to_string(), answer, context: items })
    }

    fn search_domain(&self, question: &str, locale: Locale, slug: &str) -> (Vec<ContextItem>, Vec<ContextPassage>) {
        let mut candidates = vec![slug.to_string()];
        if let Some((label, _)) = slug.split_once('.') {
            candidates.push(label.to_string());
        }
        for candidate in candidates {
            let path = self.domain_index_path(&candidate);
            if !path.is_file() {
                continue;
            }
            match self.search_index(&path, question, locale, Some(&candidate)) {
                Ok((items, passages)) if !passages.is_empty() => return (items, passages),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable domain index"),
            }
        }
        (Vec::new(), Vec::new())
    }

    fn domain_index_path(&self, candidate: &str) -> PathBuf {
        self.config.paths.index_base().join(candidate).join(INDEX_FILE)
    }

    fn search_index(
        &self,
        path: &Path,
        question: &str,
        locale: Locale,
        origin: Option<&str>,
    ) -> Result<(Vec<ContextItem>, Vec<ContextPassage>)> {
        let index = self.cache().get(path)?;
        let retrieval = &self.config.retrieval;
        Ok(index
            .search_with(question, retrieval.top_k, retrieval.min_score)
            .iter()
            .enumerate()
            .map(|(i, hit)| build_entry(hit, i, locale, origin, retrieval.snippet_chars))
            .unzip())
    }

    fn messages(&self, question: &str, locale: Locale, passages: &[ContextPassage]) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(locale.system_prompt())];
        if !passages.is_empty() {
            messages.push(ChatMessage::grounding(context_block(
                locale,
                passages,
                self.config.retrieval.snippet_chars,
            )));
        }
        messages.push(ChatMessage::user(question));
        messages
    }

    /// Responder for the tenant's merged settings, built once per tenant and locale.
    fn responder_for(&self, tenant: Option<&str>, locale: Locale) -> Result<Arc<Responder>> {
        let tenant = tenant.filter(|t| self.config.tenants.contains_key(*t)).map(str::to_string);
        let key = (tenant, locale);
        let mut responders = self.responders.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(responder) = responders.get(&key) {
            return Ok(Arc::clone(responder));
        }
        let responder = Arc::new(build_responder(&self.config.chat_for(key.0.as_deref()), locale)?);
        responders.insert(key, Arc::clone(&responder));
        Ok(responder)
    }

    fn respond(
        &self,
        tenant: Option<&str>,
        locale: Locale,
        messages: &[ChatMessage],
        passages: &[ContextPassage],
    ) -> Result<String> {
        let settings = self.config.chat_for(tenant);
        let fallback = settings.fallback_to_local.unwrap_or(false);
        let local = LocalExtractiveResponder::new(locale).with_snippet_chars(self.config.retrieval.snippet_chars);

        let result = match &self.responder {
            Some(responder) => responder.respond(messages, passages),
            None => {
                let responder = self.responder_for(tenant, locale)?;
                if responder.kind() == ResponderKind::Local {
                    return local.respond(messages, passages);
                }
                responder.respond(messages, passages)
            }
        };

        match result {
            Err(Error::Provider(reason)) if fallback => {
                warn!(%reason, "chat provider failed, answering locally");
                local.respond(messages, passages)
            }
            Err(e) => {
                warn!(error = %e, "chat provider failed");
                Err(e)
            }
            Ok(answer) => {
                info!(chars = answer.len(), "answered question");
                Ok(answer)
            }
        }
    }
}
