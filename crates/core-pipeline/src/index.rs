//! Lazy slug/href/path lookup index over the document set.
//!
//! Avoids every plugin rebuilding its own `slug → document` map. The index
//! is materialized on first access after document counts stabilize and
//! invalidated whenever the document set changes; the next access rebuilds
//! under the write lock with a double-checked read.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use core_model::{Document, slugify};

type Handle = Arc<RwLock<Document>>;

/// Immutable lookup tables built from one snapshot of the document set.
#[derive(Debug, Default)]
pub struct PostIndex {
    by_slug: HashMap<String, Handle>,
    by_slugified: HashMap<String, Handle>,
    by_href: HashMap<String, Handle>,
    by_path: HashMap<String, Handle>,
}

impl PostIndex {
    pub(crate) fn build(handles: &[Handle]) -> Self {
        let mut index = PostIndex::default();
        for handle in handles {
            let doc = handle.read().expect("document lock poisoned");
            let slug = doc.slug.to_lowercase();
            if !slug.is_empty() {
                index.by_slug.insert(slug.clone(), Arc::clone(handle));
                index.by_slugified.insert(slugify(&slug), Arc::clone(handle));
            }
            if !doc.href.is_empty() {
                index.by_href.insert(doc.href.clone(), Arc::clone(handle));
            }
            index.by_path.insert(doc.path.clone(), Arc::clone(handle));
            // Historical identifiers resolve to the current document.
            for alias in &doc.aliases {
                if alias.starts_with('/') {
                    index.by_href.entry(alias.clone()).or_insert_with(|| Arc::clone(handle));
                } else {
                    index
                        .by_slug
                        .entry(alias.to_lowercase())
                        .or_insert_with(|| Arc::clone(handle));
                }
            }
        }
        index
    }

    /// Exact lowercase slug first, then the slugified form
    /// (spaces/underscores to hyphens).
    pub fn by_slug(&self, slug: &str) -> Option<Document> {
        let lower = slug.to_lowercase();
        let handle = self
            .by_slug
            .get(&lower)
            .or_else(|| self.by_slugified.get(&slugify(&lower)))?;
        Some(handle.read().expect("document lock poisoned").clone())
    }

    pub fn by_href(&self, href: &str) -> Option<Document> {
        let handle = self.by_href.get(href)?;
        Some(handle.read().expect("document lock poisoned").clone())
    }

    pub fn by_path(&self, path: &str) -> Option<Document> {
        let handle = self.by_path.get(path)?;
        Some(handle.read().expect("document lock poisoned").clone())
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}
