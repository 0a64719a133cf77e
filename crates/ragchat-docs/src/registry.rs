//! `documents.json`: the per-tenant map from document id to its metadata.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use ragchat_core::types::Document;
use ragchat_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

pub const REGISTRY_FILE: &str = "documents.json";

pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn now() -> String {
    timestamp(Utc::now())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default = "now")]
    pub uploaded_at: String,
    #[serde(default = "now")]
    pub updated_at: String,
}

impl RegistryEntry {
    pub fn into_document(self, id: String) -> Document {
        Document {
            id,
            name: self.name,
            filename: self.filename,
            mime_type: self.mime_type,
            size: self.size,
            uploaded_at: self.uploaded_at,
            updated_at: self.updated_at,
        }
    }
}

pub type Registry = BTreeMap<String, RegistryEntry>;

/// Reads the registry in `dir`. A missing file is an empty registry;
/// entries that are not objects are skipped.
pub fn read(dir: &Path) -> Result<Registry> {
    let path = dir.join(REGISTRY_FILE);
    if !path.is_file() {
        return Ok(Registry::new());
    }
    let raw = fs::read_to_string(&path)?;
    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| Error::parse(format!("Invalid document metadata in {}: {e}", path.display())))?;
    let Value::Object(map) = value else {
        return Ok(Registry::new());
    };
    Ok(map
        .into_iter()
        .filter_map(|(id, entry)| {
            if !entry.is_object() {
                return None;
            }
            serde_json::from_value(entry).ok().map(|e| (id, e))
        })
        .collect())
}

/// Replaces the registry in `dir` atomically.
pub fn write(dir: &Path, registry: &Registry) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, registry)
        .map_err(|e| Error::parse(format!("Failed to encode document metadata: {e}")))?;
    tmp.write_all(b"\n")?;
    tmp.persist(dir.join(REGISTRY_FILE)).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_registry_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(read(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn lenient_read_skips_malformed_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(REGISTRY_FILE),
            r#"{"a": {"name": "A.md", "filename": "a-a.md"}, "b": "garbage", "c": {"size": "big"}}"#,
        )
        .unwrap();
        let registry = read(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);
        let a = &registry["a"];
        assert_eq!(a.name, "A.md");
        assert_eq!(a.size, 0);
        assert!(!a.uploaded_at.is_empty());
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(REGISTRY_FILE), "{").unwrap();
        assert!(matches!(read(dir.path()), Err(Error::Parse(_))));
    }

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new();
        registry.insert(
            "0011aabb".into(),
            RegistryEntry {
                name: "Guide.md".into(),
                filename: "0011aabb-guide.md".into(),
                mime_type: "text/markdown".into(),
                size: 12,
                uploaded_at: "2024-05-01T10:00:00+00:00".into(),
                updated_at: "2024-05-01T10:00:00+00:00".into(),
            },
        );
        write(dir.path(), &registry).unwrap();
        assert_eq!(read(dir.path()).unwrap(), registry);
        let text = fs::read_to_string(dir.path().join(REGISTRY_FILE)).unwrap();
        assert!(text.contains("\n  \"0011aabb\": {"));
    }
}
