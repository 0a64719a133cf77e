//! Process-wide cache of loaded indexes, keyed by path.
//!
//! Each path owns a `OnceCell`, so concurrent first callers share one disk
//! read and parse. The slot remembers the file's mtime; a newer file replaces
//! the slot and the next caller loads it. Failed loads leave the cell empty.
use once_cell::sync::{Lazy, OnceCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::debug;

use ragchat_core::error::Result;

use crate::index::SemanticIndex;

static GLOBAL: Lazy<IndexCache> = Lazy::new(IndexCache::new);

struct Slot {
    modified: Option<SystemTime>,
    cell: Arc<OnceCell<Arc<SemanticIndex>>>,
}

impl Slot {
    fn new(modified: Option<SystemTime>) -> Self {
        Self { modified, cell: Arc::new(OnceCell::new()) }
    }
}

#[derive(Default)]
pub struct IndexCache {
    slots: Mutex<HashMap<PathBuf, Slot>>,
}

impl IndexCache {
    pub fn new() -> Self { Self::default() }

    pub fn global() -> &'static IndexCache { &GLOBAL }

    pub fn get(&self, path: &Path) -> Result<Arc<SemanticIndex>> {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        let cell = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            let slot = slots.entry(path.to_path_buf()).or_insert_with(|| Slot::new(modified));
            if slot.modified != modified {
                debug!(path = %path.display(), "index changed on disk, reloading");
                *slot = Slot::new(modified);
            }
            Arc::clone(&slot.cell)
        };

        let mut loaded = false;
        let index = cell.get_or_try_init(|| {
            loaded = true;
            SemanticIndex::load(path).map(Arc::new)
        })?;
        if loaded {
            debug!(path = %path.display(), chunks = index.len(), "index loaded");
        }
        Ok(Arc::clone(index))
    }

    pub fn invalidate(&self, path: &Path) {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).remove(path);
    }
}
