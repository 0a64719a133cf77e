//! Mapping from user-supplied domains and URLs to storage slugs.

use ragchat_core::config::DomainsConfig;
use ragchat_core::{Error, Result};

/// Host part of `input`: lowercased, without scheme, userinfo, path, query,
/// fragment, port or trailing dot. Prefixes are left alone.
pub fn normalize_host(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let rest = match lowered.find("://") {
        Some(pos) => &lowered[pos + 3..],
        None => lowered.as_str(),
    };
    let rest = rest.trim_start_matches('/');
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    strip_port(host).trim_end_matches('.').to_string()
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('.')
        && slug.chars().all(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_'))
}

/// Canonicalizes domains against the configured marketing hosts.
#[derive(Debug, Clone)]
pub struct DomainResolver {
    marketing: Vec<String>,
    strip_prefixes: Vec<String>,
}

impl Default for DomainResolver {
    fn default() -> Self {
        Self::from_config(&DomainsConfig::default())
    }
}

impl DomainResolver {
    pub fn new<M, P>(marketing: M, strip_prefixes: P) -> Self
    where
        M: IntoIterator,
        M::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let strip_prefixes: Vec<String> = strip_prefixes
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        let mut resolver = Self { marketing: Vec::new(), strip_prefixes };
        let mut marketing: Vec<String> = marketing
            .into_iter()
            .map(|m| resolver.strip(normalize_host(m.as_ref())))
            .filter(|m| !m.is_empty())
            .collect();
        marketing.dedup();
        resolver.marketing = marketing;
        resolver
    }

    pub fn from_config(config: &DomainsConfig) -> Self {
        Self::new(&config.marketing, &config.strip_prefixes)
    }

    pub fn marketing_hosts(&self) -> &[String] { &self.marketing }

    /// Removes configured prefixes repeatedly, never down to an empty host.
    pub fn strip(&self, host: String) -> String {
        let mut host = host;
        while let Some(prefix) =
            self.strip_prefixes.iter().find(|p| host.len() > p.len() && host.starts_with(p.as_str()))
        {
            host = host[prefix.len()..].to_string();
        }
        host
    }

    /// The storage slug for `input`.
    ///
    /// A marketing host and every subdomain of it collapse to the host's
    /// first label. The result is stable under repeated application.
    pub fn canonicalize(&self, input: &str) -> Result<String> {
        let host = self.strip(normalize_host(input));
        let slug = self
            .marketing
            .iter()
            .find(|m| host == **m || host.ends_with(&format!(".{m}")))
            .map(|m| first_label(m).to_string())
            .unwrap_or(host);
        if is_valid_slug(&slug) {
            Ok(slug)
        } else {
            Err(Error::validation("Invalid domain supplied."))
        }
    }

    /// Marketing hosts that canonicalize to `slug`.
    pub fn marketing_aliases(&self, slug: &str) -> Vec<String> {
        self.marketing.iter().filter(|m| first_label(m) == slug).cloned().collect()
    }
}

fn first_label(host: &str) -> &str {
    host.split('.').next().unwrap_or(host)
}
