//! Per-tenant document library.
//!
//! Layout below `doc_base`:
//!
//! ```text
//! {slug}/documents.json        registry, see [`crate::registry`]
//! {slug}/uploads/{id}-{stem}.{ext}
//! .locks/{slug}.lock           advisory lock serializing writers of one slug
//! ```
//!
//! The offline indexer writes `index.json` and `corpus.jsonl` to
//! `{index_base}/{slug}/`, which defaults to the same directory.
//!
//! Every slug-scoped call first folds legacy directories of the same tenant
//! into the canonical one.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use rand::RngCore;
use ragchat_core::config::{AppConfig, DocumentsConfig};
use ragchat_core::types::Document;
use ragchat_core::{Error, Result};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::{normalize_host, DomainResolver};
use crate::registry::{self, RegistryEntry};

pub const UPLOADS_DIR: &str = "uploads";
pub const INDEX_FILE: &str = "index.json";
pub const CORPUS_FILE: &str = "corpus.jsonl";
const LOCKS_DIR: &str = ".locks";

/// A file handed over by the upload transport.
pub struct Upload<R> {
    pub filename: String,
    pub mime_type: String,
    pub reader: R,
}

impl<R: Read> Upload<R> {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, reader: R) -> Self {
        Self { filename: filename.into(), mime_type: mime_type.into(), reader }
    }
}

/// Exclusive lock on one slug, released on drop.
struct SlugLock {
    file: File,
}

impl SlugLock {
    fn acquire(doc_base: &Path, slug: &str) -> Result<Self> {
        let dir = doc_base.join(LOCKS_DIR);
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(format!("{slug}.lock")))?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }
}

impl Drop for SlugLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[derive(Debug, Clone)]
pub struct DomainDocumentStorage {
    doc_base: PathBuf,
    index_base: PathBuf,
    legacy_base: Option<PathBuf>,
    domains: DomainResolver,
    allowed_extensions: Vec<String>,
    max_file_size: u64,
}

impl DomainDocumentStorage {
    pub fn new(doc_base: impl Into<PathBuf>) -> Self {
        let doc_base = doc_base.into();
        let documents = DocumentsConfig::default();
        Self {
            index_base: doc_base.clone(),
            doc_base,
            legacy_base: None,
            domains: DomainResolver::default(),
            allowed_extensions: documents.allowed_extensions,
            max_file_size: documents.max_file_size,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.paths.doc_base())
            .with_index_base(config.paths.index_base())
            .with_legacy_base(config.paths.legacy_base())
            .with_domains(DomainResolver::from_config(&config.domains))
            .with_limits(&config.documents)
    }

    pub fn with_index_base(mut self, index_base: impl Into<PathBuf>) -> Self {
        self.index_base = index_base.into();
        self
    }

    pub fn with_legacy_base(mut self, legacy_base: Option<PathBuf>) -> Self {
        self.legacy_base = legacy_base;
        self
    }

    pub fn with_domains(mut self, domains: DomainResolver) -> Self {
        self.domains = domains;
        self
    }

    pub fn with_limits(mut self, documents: &DocumentsConfig) -> Self {
        self.allowed_extensions = documents.allowed_extensions.iter().map(|e| e.to_lowercase()).collect();
        self.max_file_size = documents.max_file_size;
        self
    }

    pub fn doc_base(&self) -> &Path { &self.doc_base }

    pub fn domains(&self) -> &DomainResolver { &self.domains }

    /// Canonical slug for `domain`, after migrating any legacy data.
    pub fn slug(&self, domain: &str) -> Result<String> {
        self.with_slug(domain, |slug| Ok(slug.to_string()))
    }

    pub fn list_documents(&self, domain: &str) -> Result<Vec<Document>> {
        self.with_slug(domain, |slug| {
            let dir = self.doc_base.join(slug);
            let uploads = dir.join(UPLOADS_DIR);
            let mut documents: Vec<Document> = registry::read(&dir)?
                .into_iter()
                .map(|(id, entry)| {
                    let mut doc = entry.into_document(id);
                    if let Ok(meta) = fs::metadata(uploads.join(&doc.filename)) {
                        if meta.is_file() {
                            doc.size = meta.len();
                            if let Ok(modified) = meta.modified() {
                                doc.updated_at = registry::timestamp(DateTime::<Utc>::from(modified));
                            }
                        }
                    }
                    doc
                })
                .collect();
            documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
            debug!(slug, count = documents.len(), "listed documents");
            Ok(documents)
        })
    }

    pub fn store_document<R: Read>(&self, domain: &str, upload: Upload<R>) -> Result<Document> {
        let Upload { filename, mime_type, mut reader } = upload;
        let client_name = filename.trim().to_string();
        if client_name.is_empty() {
            return Err(Error::validation("Missing filename."));
        }
        let base_name = Path::new(&client_name).file_name().map(Path::new).unwrap_or(Path::new(""));
        let extension = base_name
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if extension.is_empty() || !self.allowed_extensions.contains(&extension) {
            return Err(Error::UnsupportedType(client_name));
        }
        let stem = sanitize_stem(base_name.file_stem().and_then(|s| s.to_str()).unwrap_or_default());

        self.with_slug(domain, |slug| {
            let dir = self.doc_base.join(slug);
            let uploads = dir.join(UPLOADS_DIR);
            fs::create_dir_all(&uploads)?;

            let id = new_document_id();
            let stored_name = format!("{id}-{stem}.{extension}");
            let target = uploads.join(&stored_name);

            let mut tmp = NamedTempFile::new_in(&uploads)?;
            let copied = io::copy(&mut (&mut reader).take(self.max_file_size + 1), &mut tmp)?;
            if copied > self.max_file_size {
                return Err(Error::validation("File exceeds the allowed size."));
            }
            tmp.persist(&target).map_err(|e| e.error)?;

            let now = registry::timestamp(Utc::now());
            let mime_type = if mime_type.trim().is_empty() {
                guess_mime(&extension).to_string()
            } else {
                mime_type.trim().to_string()
            };
            let entry = RegistryEntry {
                name: client_name.clone(),
                filename: stored_name,
                mime_type,
                size: copied,
                uploaded_at: now.clone(),
                updated_at: now,
            };

            let written = registry::read(&dir).and_then(|mut reg| {
                reg.insert(id.clone(), entry.clone());
                registry::write(&dir, &reg)
            });
            if let Err(e) = written {
                let _ = fs::remove_file(&target);
                return Err(e);
            }
            info!(slug, id = %id, name = %client_name, size = copied, "stored document");
            Ok(entry.into_document(id))
        })
    }

    pub fn delete_document(&self, domain: &str, id: &str) -> Result<()> {
        self.with_slug(domain, |slug| {
            let dir = self.doc_base.join(slug);
            let mut reg = registry::read(&dir)?;
            let entry = reg.remove(id).ok_or_else(|| Error::NotFound("Document not found.".into()))?;
            registry::write(&dir, &reg)?;
            let path = dir.join(UPLOADS_DIR).join(&entry.filename);
            if path.is_file() {
                fs::remove_file(&path)?;
            }
            info!(slug, id, "deleted document");
            Ok(())
        })
    }

    pub fn uploads_directory(&self, domain: &str) -> Result<PathBuf> {
        let slug = self.slug(domain)?;
        Ok(self.doc_base.join(slug).join(UPLOADS_DIR))
    }

    /// Tenant directory below `doc_base`, created if missing.
    pub fn domain_directory(&self, domain: &str) -> Result<PathBuf> {
        let slug = self.slug(domain)?;
        let dir = self.doc_base.join(slug);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Where the offline indexer puts the tenant's index. The directory is
    /// created, the file is not.
    pub fn get_index_path(&self, domain: &str) -> Result<PathBuf> {
        Ok(self.index_directory(domain)?.join(INDEX_FILE))
    }

    pub fn corpus_path(&self, domain: &str) -> Result<PathBuf> {
        Ok(self.index_directory(domain)?.join(CORPUS_FILE))
    }

    /// Stored files that still exist, in registry order.
    pub fn document_files(&self, domain: &str) -> Result<Vec<PathBuf>> {
        self.with_slug(domain, |slug| {
            let dir = self.doc_base.join(slug);
            let uploads = dir.join(UPLOADS_DIR);
            Ok(registry::read(&dir)?
                .into_values()
                .map(|entry| uploads.join(entry.filename))
                .filter(|p| p.is_file())
                .collect())
        })
    }

    pub fn remove_index(&self, domain: &str) -> Result<()> {
        let slug = self.slug(domain)?;
        let dir = self.index_base.join(slug);
        for name in [INDEX_FILE, CORPUS_FILE] {
            let path = dir.join(name);
            if path.is_file() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn index_directory(&self, domain: &str) -> Result<PathBuf> {
        let slug = self.slug(domain)?;
        let dir = self.index_base.join(slug);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn with_slug<T>(&self, domain: &str, f: impl FnOnce(&str) -> Result<T>) -> Result<T> {
        let slug = self.domains.canonicalize(domain)?;
        let _lock = SlugLock::acquire(&self.doc_base, &slug)?;
        let canonical = self.doc_base.join(&slug);
        for legacy in self.legacy_candidates(domain, &slug) {
            self.migrate_legacy_if_present(&legacy, &canonical)?;
        }
        f(&slug)
    }

    /// Directories that may hold data of `slug` under an older name.
    fn legacy_candidates(&self, domain: &str, slug: &str) -> Vec<PathBuf> {
        let raw = normalize_host(domain);
        let mut names = BTreeSet::new();
        names.insert(raw.clone());
        names.insert(self.domains.strip(raw));
        names.extend(self.domains.marketing_aliases(slug));
        // Only product slugs own `{slug}.*`; a full host must not absorb its
        // longer neighbours.
        if !slug.contains('.') {
            names.extend(prefixed_dirs(&self.doc_base, slug));
        }
        names.retain(|n| !n.is_empty() && !n.contains(['/', '\\']) && n != "." && n != "..");

        let mut candidates: Vec<PathBuf> =
            names.iter().filter(|n| n.as_str() != slug).map(|n| self.doc_base.join(n)).collect();
        if let Some(legacy_base) = self.legacy_base.as_deref().filter(|b| *b != self.doc_base) {
            if !slug.contains('.') {
                names.extend(prefixed_dirs(legacy_base, slug));
            }
            names.insert(slug.to_string());
            candidates.extend(names.iter().map(|n| legacy_base.join(n)));
        }
        // `doc_base` or one of its ancestors is never a tenant directory.
        candidates.retain(|c| !self.doc_base.starts_with(c));
        candidates
    }

    /// Folds `legacy` into `canonical`.
    ///
    /// With no canonical directory the legacy one is renamed (or copied when
    /// renaming fails). Otherwise missing files are copied over, registry
    /// entries are merged with the canonical side winning, and the legacy
    /// directory is removed. A legacy directory whose registry cannot be
    /// parsed is left untouched, as are pairs nested in one another.
    /// Returns whether anything was migrated.
    pub fn migrate_legacy_if_present(&self, legacy: &Path, canonical: &Path) -> Result<bool> {
        if !legacy.is_dir() {
            return Ok(false);
        }
        if canonical.starts_with(legacy) || legacy.starts_with(canonical) {
            debug!(legacy = %legacy.display(), canonical = %canonical.display(), "skipping nested legacy directory");
            return Ok(false);
        }
        if fs::symlink_metadata(canonical).map(|m| m.file_type().is_symlink()).unwrap_or(false) {
            return Ok(false);
        }

        if !canonical.exists() {
            if let Some(parent) = canonical.parent() {
                fs::create_dir_all(parent)?;
            }
            if let Err(e) = fs::rename(legacy, canonical) {
                debug!(error = %e, "rename failed, copying legacy directory");
                copy_missing(legacy, canonical)?;
                fs::remove_dir_all(legacy)?;
            }
            info!(from = %legacy.display(), to = %canonical.display(), "migrated legacy document directory");
            return Ok(true);
        }

        let legacy_registry = match registry::read(legacy) {
            Ok(registry) => registry,
            Err(e) => {
                warn!(path = %legacy.display(), error = %e, "legacy registry unreadable, leaving directory in place");
                return Ok(false);
            }
        };
        copy_missing(legacy, canonical)?;
        if !legacy_registry.is_empty() {
            let mut merged = registry::read(canonical)?;
            for (id, entry) in legacy_registry {
                merged.entry(id).or_insert(entry);
            }
            registry::write(canonical, &merged)?;
        }
        fs::remove_dir_all(legacy)?;
        info!(from = %legacy.display(), to = %canonical.display(), "merged legacy document directory");
        Ok(true)
    }
}

/// Copies every file of `from` that does not yet exist below `to`.
fn copy_missing(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).into_iter().filter_map(|e| e.ok()) {
        let Ok(relative) = entry.path().strip_prefix(from) else { continue };
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if !target.exists() {
                fs::copy(entry.path(), &target)?;
            }
        }
    }
    Ok(())
}

fn prefixed_dirs(base: &Path, slug: &str) -> Vec<String> {
    let prefix = format!("{slug}.");
    let Ok(entries) = fs::read_dir(base) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().to_str().map(str::to_lowercase))
        .filter(|name| name.starts_with(&prefix))
        .collect()
}

fn new_document_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Lowercase ASCII alphanumerics with runs of anything else turned into
/// single dashes.
fn sanitize_stem(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    for c in stem.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() { "document".to_string() } else { trimmed.to_string() }
}

fn guess_mime(extension: &str) -> &'static str {
    match extension {
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_are_sanitized() {
        assert_eq!(sanitize_stem("User Guide (v2)"), "user-guide-v2");
        assert_eq!(sanitize_stem("Über"), "ber");
        assert_eq!(sanitize_stem("--"), "document");
        assert_eq!(sanitize_stem(""), "document");
    }

    #[test]
    fn ids_are_sixteen_hex_chars() {
        let id = new_document_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_document_id());
    }
}
