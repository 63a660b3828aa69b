//! Content data model shared by every pipeline stage.
//!
//! A [`Document`] is one parsed content file: front-matter metadata, the raw
//! markdown body, and an open `extra` map plugins use to attach derived data
//! (rendered HTML, word counts, link lists). Documents are owned by the
//! pipeline manager for the duration of a build; plugins receive snapshots.
//!
//! Core invariants:
//! * `path` is the stable repo-relative identifier and the cache key.
//! * `raw_frontmatter` preserves the original front-matter text verbatim so
//!   input hashes stay stable across front-matter parser changes.
//! * `slug` is unique across the document set and is the namespace the link
//!   graph resolves targets in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod feed;
mod frontmatter;

pub use feed::Feed;
pub use frontmatter::{FRONTMATTER_FENCE, split_frontmatter};

/// A single parsed content unit (markdown + front-matter).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Repo-relative source path. Stable across builds; used as the cache key.
    pub path: String,
    /// Short unique handle used as the target namespace in the link graph.
    pub slug: String,
    /// Output URL path (leading slash, no trailing `index.html`).
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Publication date as written in front-matter (RFC-3339 prefix expected,
    /// but never required; comparisons treat it as an opaque sortable string).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Historical slugs/hrefs this document should also resolve under.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Raw markdown body (everything after the front-matter fence).
    pub content: String,
    /// Template identifier chosen for this document.
    pub template: String,
    /// Original front-matter text, verbatim, fences excluded.
    pub raw_frontmatter: String,
    /// Open key→value map for plugin-contributed data. Concurrent mutation of
    /// a single key must be serialized by the plugin that owns that key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub private: bool,
    /// Excluded from all outputs (still loaded so links can resolve).
    #[serde(default)]
    pub skip: bool,
}

impl Document {
    /// String-valued `extra` entry, if present and a string.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    /// Insert a plugin-contributed value under `key`.
    pub fn set_extra(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.extra.insert(key.into(), value);
    }

    /// Whether this document participates in rendered output.
    pub fn is_listed(&self) -> bool {
        self.published && !self.draft && !self.skip
    }
}

/// Normalize a name into slug form: lowercase, spaces and underscores become
/// hyphens, runs of hyphens collapse. Non-alphanumeric characters other than
/// hyphens are dropped.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_hyphen = false;
    for ch in name.trim().chars() {
        let mapped = match ch {
            ' ' | '_' | '-' => Some('-'),
            c if c.is_alphanumeric() => Some(c.to_ascii_lowercase()),
            _ => None,
        };
        if let Some(c) = mapped {
            if c == '-' {
                if !last_hyphen && !out.is_empty() {
                    out.push('-');
                }
                last_hyphen = true;
            } else {
                out.push(c);
                last_hyphen = false;
            }
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
