//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`,
//! `APP_*` env vars (`__` nests) and the legacy `RAG_CHAT_SERVICE_*` variables,
//! which land in the `chat` table.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    pub fn load_from(dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment
            .merge(Env::prefixed("APP_").split("__"))
            .merge(Env::prefixed("RAG_CHAT_SERVICE_").map(|key| {
                if key == "timeout" {
                    "chat.timeout_secs".into()
                } else {
                    format!("chat.{key}").into()
                }
            }));

        let config = Self { figment };
        config.app()?.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    pub fn app(&self) -> Result<AppConfig> {
        self.figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub retrieval: RetrievalConfig,
    pub chat: ChatSettings,
    pub tenants: HashMap<String, TenantConfig>,
    pub domains: DomainsConfig,
    pub documents: DocumentsConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be at least 1".into()));
        }
        if self.retrieval.min_score < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "retrieval.min_score must not be negative, got {}",
                self.retrieval.min_score
            )));
        }
        if self.documents.allowed_extensions.is_empty() {
            return Err(Error::InvalidConfig("documents.allowed_extensions must not be empty".into()));
        }
        Ok(())
    }

    /// Resolves relative `paths.*` against the directory the config was read from.
    pub fn rooted_at(mut self, base: &Path) -> Self {
        self.paths = self.paths.rooted_at(base);
        self
    }

    /// Chat settings for `tenant`, its overrides taking precedence field by field.
    pub fn chat_for(&self, tenant: Option<&str>) -> ChatSettings {
        match tenant.and_then(|t| self.tenants.get(t)) {
            Some(t) => t.chat.clone().or(&self.chat),
            None => self.chat.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub index_path: String,
    pub doc_base: String,
    /// Root of per-tenant `index.json` files; `doc_base` when unset.
    pub index_base: Option<String>,
    /// Pre-migration root still holding per-domain folders.
    pub legacy_base: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            index_path: "data/rag-chatbot/index.json".to_string(),
            doc_base: "data/rag-chatbot/domains".to_string(),
            index_base: None,
            legacy_base: None,
        }
    }
}

impl PathsConfig {
    pub fn index_path(&self) -> PathBuf { expand_path(&self.index_path) }

    pub fn doc_base(&self) -> PathBuf { expand_path(&self.doc_base) }

    pub fn index_base(&self) -> PathBuf {
        self.index_base.as_deref().map(expand_path).unwrap_or_else(|| self.doc_base())
    }

    pub fn legacy_base(&self) -> Option<PathBuf> { self.legacy_base.as_deref().map(expand_path) }

    /// Same paths with relative entries anchored at `base`.
    pub fn rooted_at(&self, base: &Path) -> PathsConfig {
        let root = |p: &str| resolve_with_base(base, p).to_string_lossy().into_owned();
        PathsConfig {
            index_path: root(&self.index_path),
            doc_base: root(&self.doc_base),
            index_base: self.index_base.as_deref().map(root),
            legacy_base: self.legacy_base.as_deref().map(root),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Results must score strictly above this floor.
    pub min_score: f64,
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5, min_score: 0.0, snippet_chars: 320 }
    }
}

/// Responder settings; every field is optional so tenant overrides can be
/// layered over the process defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatSettings {
    pub url: Option<String>,
    pub driver: Option<String>,
    pub token: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_completion_tokens: Option<u32>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub force_openai: Option<bool>,
    pub timeout_secs: Option<f64>,
    pub fallback_to_local: Option<bool>,
}

impl ChatSettings {
    /// Fill every unset field from `defaults`.
    pub fn or(self, defaults: &ChatSettings) -> ChatSettings {
        ChatSettings {
            url: non_blank(self.url).or_else(|| non_blank(defaults.url.clone())),
            driver: non_blank(self.driver).or_else(|| non_blank(defaults.driver.clone())),
            token: non_blank(self.token).or_else(|| non_blank(defaults.token.clone())),
            model: non_blank(self.model).or_else(|| non_blank(defaults.model.clone())),
            temperature: self.temperature.or(defaults.temperature),
            top_p: self.top_p.or(defaults.top_p),
            max_completion_tokens: self.max_completion_tokens.or(defaults.max_completion_tokens),
            presence_penalty: self.presence_penalty.or(defaults.presence_penalty),
            frequency_penalty: self.frequency_penalty.or(defaults.frequency_penalty),
            force_openai: self.force_openai.or(defaults.force_openai),
            timeout_secs: self.timeout_secs.or(defaults.timeout_secs),
            fallback_to_local: self.fallback_to_local.or(defaults.fallback_to_local),
        }
    }

    /// The configured endpoint, ignoring blank values.
    pub fn endpoint(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn driver(&self) -> Option<String> {
        self.driver.as_deref().map(|d| d.trim().to_lowercase()).filter(|d| !d.is_empty())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    pub chat: ChatSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainsConfig {
    /// Marketing hosts whose first label is the canonical product slug.
    pub marketing: Vec<String>,
    pub strip_prefixes: Vec<String>,
}

impl Default for DomainsConfig {
    fn default() -> Self {
        Self {
            marketing: Vec::new(),
            strip_prefixes: vec!["www.".to_string(), "admin.".to_string(), "assistant.".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    pub allowed_extensions: Vec<String>,
    pub max_file_size: u64,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: ["md", "markdown", "html", "htm", "txt"].iter().map(|s| s.to_string()).collect(),
            max_file_size: 1_048_576,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
