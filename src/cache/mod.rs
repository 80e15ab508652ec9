//! Component cache
//!
//! Stores loaded component files keyed by absolute path. An entry is
//! either the raw template text (stored when a file is first read, or
//! when it is only ever included verbatim) or the fully parsed layout
//! and node tree. Entries upgrade from raw to parsed but never
//! downgrade, and a raw store never clobbers a parsed entry.
//!
//! Concurrent renders may race on a cold entry; both sides compute the
//! same value, so last-write-wins is harmless.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::template::Node;

/// A cached component, raw or parsed
#[derive(Debug)]
pub enum CacheEntry {
    /// File text as read from disk, not yet parsed
    Unparsed { template: String },
    /// Parsed layout with its node tree, plus the raw text for
    /// `$include` of the same file
    Parsed {
        template: String,
        layout: String,
        nodes: Arc<Vec<Node>>,
    },
}

impl CacheEntry {
    pub fn template(&self) -> &str {
        match self {
            CacheEntry::Unparsed { template } => template,
            CacheEntry::Parsed { template, .. } => template,
        }
    }
}

/// Shared component cache
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: RwLock<HashMap<PathBuf, Arc<CacheEntry>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<Arc<CacheEntry>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    /// Store raw template text. Keeps an existing entry (raw or
    /// parsed) if one is already present, and returns whichever entry
    /// ends up in the cache.
    pub fn store_template(&self, path: &Path, template: String) -> Arc<CacheEntry> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(CacheEntry::Unparsed { template }))
            .clone()
    }

    /// Store a parsed component, replacing any raw entry for the path.
    pub fn store_parsed(
        &self,
        path: &Path,
        template: String,
        layout: String,
        nodes: Arc<Vec<Node>>,
    ) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry::Parsed {
            template,
            layout,
            nodes,
        });
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(path.to_path_buf(), entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
