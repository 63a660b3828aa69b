//! Persistent incremental build cache.
//!
//! Memoizes per-document work across process restarts: input hashes answer
//! "did this source change?", side-car files hold rendered artifacts keyed
//! by content, global hashes (config, templates, assets) invalidate the
//! whole document set in bulk, and the co-resident dependency graph turns a
//! changed slug into the transitive set of paths that must rebuild.
//!
//! The cache is advisory by design: a missing, malformed, or
//! version-mismatched cache file yields a fresh empty cache, never an error.
//! `save` failures are surfaced but leave the in-memory state untouched.
//!
//! Locking: one reader-writer lock over the top-level structure, atomic
//! counters for statistics, lock-free maps inside the side-car caches. The
//! graph carries its own lock (see `core-graph`).

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use core_graph::{DependencyGraph, GraphData};
use core_model::Document;

pub mod hash;
mod record;
mod sidecar;

pub use hash::{feed_membership_hash, hash_asset_map, hash_content, hash_dir, hash_hex, hash_input};
pub use record::{FeedRecord, PostRecord, TransformKind};

use sidecar::SideCache;

/// On-disk format version; any mismatch forces a clean slate.
pub const CACHE_VERSION: u32 = 1;
/// Top-level cache file name inside the cache directory.
pub const CACHE_FILE: &str = "build-cache.json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to serialize build cache")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write build cache to {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Rebuilt/skipped counters published by [`BuildCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub rebuilt: u64,
    pub skipped: u64,
}

/// Which semantic hashes changed for one document; see
/// [`BuildCache::update_post_semantic_hashes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SemanticChanges {
    pub feed: bool,
    pub tag: bool,
    pub garden: bool,
}

/// One entry of a batched rebuild probe.
#[derive(Debug, Clone)]
pub struct RebuildProbe {
    pub path: String,
    /// Empty when the caller has no slug yet; dependency invalidation is
    /// then skipped for this entry.
    pub slug: String,
    pub input_hash: String,
    pub template: String,
}

/// Serialized shape of `build-cache.json`. Unknown top-level fields are
/// carried through untouched so older and newer binaries can share a cache
/// directory.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    config_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    templates_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    assets_hash: String,
    #[serde(default)]
    posts: BTreeMap<String, PostRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    feeds: BTreeMap<String, FeedRecord>,
    /// `dependents` is derived and never persisted.
    #[serde(default)]
    graph: GraphData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    glob_files: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    glob_pattern_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    tags_listing_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    garden_hash: String,
    #[serde(flatten)]
    unknown: BTreeMap<String, serde_json::Value>,
}

/// Mutable top-level state behind the cache lock. Build-tracking sets and
/// the dirty flag are transient: zeroed on load, never persisted.
#[derive(Debug, Default)]
struct CacheState {
    config_hash: String,
    templates_hash: String,
    assets_hash: String,
    posts: BTreeMap<String, PostRecord>,
    feeds: BTreeMap<String, FeedRecord>,
    glob_files: Vec<String>,
    glob_pattern_hash: String,
    tags_listing_hash: String,
    garden_hash: String,
    unknown: BTreeMap<String, serde_json::Value>,

    changed_slugs: BTreeSet<String>,
    changed_feed_slugs: BTreeSet<String>,
    tags_dirty: bool,
    garden_dirty: bool,
    dirty: bool,
}

/// Persistent build cache co-resident with the dependency graph.
pub struct BuildCache {
    dir: PathBuf,
    state: RwLock<CacheState>,
    graph: DependencyGraph,
    rebuilt: AtomicU64,
    skipped: AtomicU64,
    article_html: SideCache,
    full_html: SideCache,
    encrypted_html: SideCache,
    post_data: SideCache,
}

impl BuildCache {
    /// Open the cache rooted at `dir`, loading `build-cache.json` when
    /// present. Unreadable or mismatched caches silently reset; the cache
    /// never fails a build.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(CACHE_FILE);
        let (state, graph_data) = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<CacheFile>(&text) {
                Ok(file) if file.version == CACHE_VERSION => {
                    info!(
                        target: "cache",
                        path = %path.display(),
                        posts = file.posts.len(),
                        graph_sources = file.graph.dependencies.len(),
                        "cache_loaded"
                    );
                    let CacheFile {
                        version: _,
                        config_hash,
                        templates_hash,
                        assets_hash,
                        posts,
                        feeds,
                        graph,
                        glob_files,
                        glob_pattern_hash,
                        tags_listing_hash,
                        garden_hash,
                        unknown,
                    } = file;
                    (
                        CacheState {
                            config_hash,
                            templates_hash,
                            assets_hash,
                            posts,
                            feeds,
                            glob_files,
                            glob_pattern_hash,
                            tags_listing_hash,
                            garden_hash,
                            unknown,
                            ..CacheState::default()
                        },
                        graph,
                    )
                }
                Ok(file) => {
                    info!(
                        target: "cache",
                        found = file.version,
                        expected = CACHE_VERSION,
                        "cache_version_mismatch_starting_fresh"
                    );
                    (CacheState::default(), GraphData::default())
                }
                Err(e) => {
                    warn!(target: "cache", error = %e, "cache_unreadable_starting_fresh");
                    (CacheState::default(), GraphData::default())
                }
            },
            Err(_) => (CacheState::default(), GraphData::default()),
        };

        Self {
            article_html: SideCache::new(&dir, "html-cache", "html"),
            full_html: SideCache::new(&dir, "fullhtml-cache", "html"),
            encrypted_html: SideCache::new(&dir, "encrypted-html-cache", "html"),
            post_data: SideCache::new(&dir, "post-cache", "json"),
            graph: DependencyGraph::from_data(graph_data),
            state: RwLock::new(state),
            rebuilt: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            dir,
        }
    }

    pub fn cache_file_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    /// The co-resident link graph. Plugins record link discoveries here;
    /// the cache consults it for transitive invalidation.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Persist to `build-cache.json` if anything changed since load. The
    /// write goes to a sibling temp file first, then renames into place.
    pub fn save(&self) -> Result<(), CacheError> {
        let mut state = self.state.write().expect("cache lock poisoned");
        if !state.dirty {
            return Ok(());
        }
        let file = CacheFile {
            version: CACHE_VERSION,
            config_hash: state.config_hash.clone(),
            templates_hash: state.templates_hash.clone(),
            assets_hash: state.assets_hash.clone(),
            posts: state.posts.clone(),
            feeds: state.feeds.clone(),
            graph: self.graph.data(),
            glob_files: state.glob_files.clone(),
            glob_pattern_hash: state.glob_pattern_hash.clone(),
            tags_listing_hash: state.tags_listing_hash.clone(),
            garden_hash: state.garden_hash.clone(),
            unknown: state.unknown.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let path = self.cache_file_path();
        let tmp = self.dir.join(format!("{CACHE_FILE}.tmp"));
        let write = fs::create_dir_all(&self.dir)
            .and_then(|_| fs::write(&tmp, json.as_bytes()))
            .and_then(|_| fs::rename(&tmp, &path));
        match write {
            Ok(()) => {
                state.dirty = false;
                debug!(target: "cache", path = %path.display(), posts = state.posts.len(), "cache_saved");
                Ok(())
            }
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    pub fn mark_dirty(&self) {
        self.state.write().expect("cache lock poisoned").dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.state.read().expect("cache lock poisoned").dirty
    }

    // --- Bulk invalidation -----------------------------------------------

    /// Record the current config hash; on change every document record is
    /// dropped. Config can affect the output of any document, so per-record
    /// invalidation would be unsound here.
    pub fn set_config_hash(&self, hash: &str) {
        self.set_global_hash(hash, GlobalHash::Config);
    }

    pub fn set_templates_hash(&self, hash: &str) {
        self.set_global_hash(hash, GlobalHash::Templates);
    }

    pub fn set_assets_hash(&self, hash: &str) {
        self.set_global_hash(hash, GlobalHash::Assets);
    }

    fn set_global_hash(&self, hash: &str, which: GlobalHash) {
        let mut state = self.state.write().expect("cache lock poisoned");
        let slot = match which {
            GlobalHash::Config => &mut state.config_hash,
            GlobalHash::Templates => &mut state.templates_hash,
            GlobalHash::Assets => &mut state.assets_hash,
        };
        if *slot == hash {
            return;
        }
        *slot = hash.to_string();
        let dropped = state.posts.len();
        state.posts.clear();
        state.dirty = true;
        info!(target: "cache", which = which.name(), dropped, "global_hash_changed_posts_invalidated");
    }

    pub fn config_hash(&self) -> String {
        self.state
            .read()
            .expect("cache lock poisoned")
            .config_hash
            .clone()
    }

    pub fn templates_hash(&self) -> String {
        self.state
            .read()
            .expect("cache lock poisoned")
            .templates_hash
            .clone()
    }

    pub fn assets_hash(&self) -> String {
        self.state
            .read()
            .expect("cache lock poisoned")
            .assets_hash
            .clone()
    }

    // --- Per-document queries --------------------------------------------

    /// True iff `path` is absent, its stored input hash differs, or its
    /// template changed. A malformed stored hash counts as a miss.
    pub fn should_rebuild(&self, path: &str, input_hash: &str, template: &str) -> bool {
        let state = self.state.read().expect("cache lock poisoned");
        Self::needs_rebuild(&state, path, input_hash, template)
    }

    /// As [`should_rebuild`](Self::should_rebuild), and additionally true
    /// when any slug this path depends on was rebuilt earlier in the current
    /// build.
    ///
    /// Ordering contract: only markings made before this call are observed.
    /// Plugins must mark rebuilds in one stage and take rebuild decisions in
    /// a later stage; interleaving the two within a stage is unspecified.
    pub fn should_rebuild_with_slug(
        &self,
        path: &str,
        _slug: &str,
        input_hash: &str,
        template: &str,
    ) -> bool {
        let state = self.state.read().expect("cache lock poisoned");
        if Self::needs_rebuild(&state, path, input_hash, template) {
            return true;
        }
        if state.changed_slugs.is_empty() {
            return false;
        }
        self.graph
            .get_dependencies(path)
            .iter()
            .any(|dep| state.changed_slugs.contains(dep))
    }

    /// Batched variant: one lock acquisition, returns the subset of paths
    /// that need rebuilding.
    pub fn should_rebuild_batch(&self, probes: &[RebuildProbe]) -> Vec<String> {
        let state = self.state.read().expect("cache lock poisoned");
        probes
            .iter()
            .filter(|probe| {
                if Self::needs_rebuild(&state, &probe.path, &probe.input_hash, &probe.template) {
                    return true;
                }
                if probe.slug.is_empty() || state.changed_slugs.is_empty() {
                    return false;
                }
                self.graph
                    .get_dependencies(&probe.path)
                    .iter()
                    .any(|dep| state.changed_slugs.contains(dep))
            })
            .map(|probe| probe.path.clone())
            .collect()
    }

    fn needs_rebuild(state: &CacheState, path: &str, input_hash: &str, template: &str) -> bool {
        match state.posts.get(path) {
            Some(record) => {
                !hash_well_formed(&record.input_hash)
                    || record.input_hash != input_hash
                    || record.template != template
            }
            None => true,
        }
    }

    /// Cheap mtime gate. On mismatch callers fall back to content hashing.
    pub fn is_file_unchanged(&self, path: &str, mod_time: i64) -> bool {
        let state = self.state.read().expect("cache lock poisoned");
        state
            .posts
            .get(path)
            .and_then(|r| r.mod_time)
            .is_some_and(|cached| cached == mod_time)
    }

    // --- Recording rebuilds ----------------------------------------------

    /// Replace the record for `path` after a rebuild.
    pub fn mark_rebuilt(&self, path: &str, input_hash: &str, output_path: &str, template: &str) {
        self.mark_rebuilt_inner(path, input_hash, output_path, template, None);
    }

    /// As [`mark_rebuilt`](Self::mark_rebuilt), and records `slug` into the
    /// build's changed-slug set so dependents invalidate within the same
    /// build.
    pub fn mark_rebuilt_with_slug(
        &self,
        path: &str,
        input_hash: &str,
        output_path: &str,
        template: &str,
        slug: &str,
    ) {
        self.mark_rebuilt_inner(path, input_hash, output_path, template, Some(slug));
    }

    fn mark_rebuilt_inner(
        &self,
        path: &str,
        input_hash: &str,
        output_path: &str,
        template: &str,
        slug: Option<&str>,
    ) {
        let mut state = self.state.write().expect("cache lock poisoned");
        let record = state.posts.entry(path.to_string()).or_default();
        record.input_hash = input_hash.to_string();
        record.output_path = output_path.to_string();
        record.template = template.to_string();
        if let Some(slug) = slug {
            record.slug = Some(slug.to_string());
            state.changed_slugs.insert(slug.to_string());
        }
        state.dirty = true;
        drop(state);
        self.rebuilt.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            rebuilt: self.rebuilt.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.rebuilt.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
    }

    // --- Change tracking (transient, reset per process) ------------------

    /// Slugs rebuilt so far this build.
    pub fn changed_slugs(&self) -> Vec<String> {
        let state = self.state.read().expect("cache lock poisoned");
        state.changed_slugs.iter().cloned().collect()
    }

    /// Subset of changed slugs whose changes affect feed output.
    pub fn changed_feed_slugs(&self) -> Vec<String> {
        let state = self.state.read().expect("cache lock poisoned");
        state.changed_feed_slugs.iter().cloned().collect()
    }

    pub fn tags_dirty(&self) -> bool {
        self.state.read().expect("cache lock poisoned").tags_dirty
    }

    pub fn garden_dirty(&self) -> bool {
        self.state.read().expect("cache lock poisoned").garden_dirty
    }

    /// Compare the supplied semantic hashes against the stored per-post
    /// values, store the new ones, raise the global dirtiness flags, and
    /// report which of the three changed. This is how feed-only and
    /// tag-only changes are told apart from full-document changes.
    pub fn update_post_semantic_hashes(
        &self,
        path: &str,
        feed_hash: &str,
        tag_hash: &str,
        garden_hash: &str,
    ) -> SemanticChanges {
        let mut state = self.state.write().expect("cache lock poisoned");
        let record = state.posts.entry(path.to_string()).or_default();
        let changes = SemanticChanges {
            feed: record.feed_item_hash.as_deref() != Some(feed_hash),
            tag: record.tag_index_hash.as_deref() != Some(tag_hash),
            garden: record.garden_hash.as_deref() != Some(garden_hash),
        };
        record.feed_item_hash = Some(feed_hash.to_string());
        record.tag_index_hash = Some(tag_hash.to_string());
        record.garden_hash = Some(garden_hash.to_string());
        let slug = record.slug.clone();
        if changes.feed {
            if let Some(slug) = slug {
                state.changed_feed_slugs.insert(slug);
            }
        }
        if changes.tag {
            state.tags_dirty = true;
        }
        if changes.garden {
            state.garden_dirty = true;
        }
        if changes.feed || changes.tag || changes.garden {
            state.dirty = true;
        }
        changes
    }

    // --- Stale sweep ------------------------------------------------------

    /// Drop every record whose path is not in `current`, removing the
    /// matching graph entries too: the path's outbound edges, its slug
    /// mapping, and any dangling inbound edges pointing at its slug.
    /// Returns the count removed.
    pub fn remove_stale(&self, current: &HashSet<String>) -> usize {
        let mut state = self.state.write().expect("cache lock poisoned");
        let stale: Vec<String> = state
            .posts
            .keys()
            .filter(|path| !current.contains(*path))
            .cloned()
            .collect();
        for path in &stale {
            state.posts.remove(path);
            let slug = self.graph.slug_of(path);
            self.graph.remove_source(path);
            if let Some(slug) = slug {
                self.graph.remove_target(&slug);
            }
        }
        if !stale.is_empty() {
            state.dirty = true;
            info!(target: "cache", removed = stale.len(), "stale_records_swept");
        }
        stale.len()
    }

    // --- Record access ----------------------------------------------------

    /// Snapshot of one document's record.
    pub fn record(&self, path: &str) -> Option<PostRecord> {
        let state = self.state.read().expect("cache lock poisoned");
        state.posts.get(path).cloned()
    }

    /// Mutate (or create) the record for `path` in place.
    pub fn update_record(&self, path: &str, f: impl FnOnce(&mut PostRecord)) {
        let mut state = self.state.write().expect("cache lock poisoned");
        f(state.posts.entry(path.to_string()).or_default());
        state.dirty = true;
    }

    pub fn posts_len(&self) -> usize {
        self.state.read().expect("cache lock poisoned").posts.len()
    }

    // --- Feed records ------------------------------------------------------

    pub fn feed_record(&self, slug: &str) -> Option<FeedRecord> {
        let state = self.state.read().expect("cache lock poisoned");
        state.feeds.get(slug).cloned()
    }

    pub fn set_feed_record(&self, slug: &str, record: FeedRecord) {
        let mut state = self.state.write().expect("cache lock poisoned");
        state.feeds.insert(slug.to_string(), record);
        state.dirty = true;
    }

    // --- Glob and listing snapshots ---------------------------------------

    /// Cached file list from the previous glob walk plus the hash of the
    /// patterns that produced it.
    pub fn glob_snapshot(&self) -> (Vec<String>, String) {
        let state = self.state.read().expect("cache lock poisoned");
        (state.glob_files.clone(), state.glob_pattern_hash.clone())
    }

    pub fn set_glob_snapshot(&self, files: Vec<String>, pattern_hash: &str) {
        let mut state = self.state.write().expect("cache lock poisoned");
        state.glob_files = files;
        state.glob_pattern_hash = pattern_hash.to_string();
        state.dirty = true;
    }

    pub fn tags_listing_hash(&self) -> String {
        self.state
            .read()
            .expect("cache lock poisoned")
            .tags_listing_hash
            .clone()
    }

    pub fn set_tags_listing_hash(&self, hash: &str) {
        let mut state = self.state.write().expect("cache lock poisoned");
        if state.tags_listing_hash != hash {
            state.tags_listing_hash = hash.to_string();
            state.dirty = true;
        }
    }

    pub fn garden_listing_hash(&self) -> String {
        self.state
            .read()
            .expect("cache lock poisoned")
            .garden_hash
            .clone()
    }

    pub fn set_garden_listing_hash(&self, hash: &str) {
        let mut state = self.state.write().expect("cache lock poisoned");
        if state.garden_hash != hash {
            state.garden_hash = hash.to_string();
            state.dirty = true;
        }
    }

    // --- Side-car artifact caches -----------------------------------------

    /// Rendered article HTML keyed by content hash.
    pub fn cached_article_html(&self, content_hash: &str) -> Option<String> {
        self.article_html.read(content_hash)
    }

    /// Store rendered article HTML and point `path`'s record at it.
    pub fn store_article_html(&self, path: &str, content_hash: &str, html: &str) {
        let stored = self.article_html.write(content_hash, html);
        self.update_record(path, |record| {
            record.content_hash = Some(content_hash.to_string());
            record.article_html_path = stored.map(|p| p.to_string_lossy().into_owned());
        });
    }

    /// Full page HTML keyed by input hash.
    pub fn cached_full_html(&self, input_hash: &str) -> Option<String> {
        self.full_html.read(input_hash)
    }

    pub fn store_full_html(&self, path: &str, input_hash: &str, html: &str) {
        let stored = self.full_html.write(input_hash, html);
        self.update_record(path, |record| {
            record.full_html_path = stored.map(|p| p.to_string_lossy().into_owned());
        });
    }

    /// Parsed document from the post side-car, gated on an exact mtime
    /// match.
    pub fn cached_post(&self, path: &str, mod_time: i64) -> Option<Document> {
        if !self.is_file_unchanged(path, mod_time) {
            return None;
        }
        let body = self.post_data.read(&hash_hex(path.as_bytes()))?;
        match serde_json::from_str(&body) {
            Ok(doc) => Some(doc),
            Err(e) => {
                // Treated as a miss, never surfaced.
                debug!(target: "cache", path, error = %e, "post_sidecar_unreadable");
                None
            }
        }
    }

    /// Store the parsed document and remember the source mtime.
    pub fn store_post(&self, path: &str, mod_time: i64, doc: &Document) {
        match serde_json::to_string(doc) {
            Ok(body) => {
                self.post_data.write(&hash_hex(path.as_bytes()), &body);
                self.update_record(path, |record| {
                    record.mod_time = Some(mod_time);
                    record.slug = Some(doc.slug.clone());
                });
            }
            Err(e) => {
                warn!(target: "cache", path, error = %e, "post_serialize_failed");
            }
        }
    }

    // --- Link-href cache ---------------------------------------------------

    /// Outbound link targets extracted from the rendered article, valid iff
    /// the stored hash matches `hash`.
    pub fn cached_link_hrefs(&self, path: &str, hash: &str) -> Option<Vec<String>> {
        let state = self.state.read().expect("cache lock poisoned");
        let record = state.posts.get(path)?;
        if record.link_hrefs_hash.as_deref() == Some(hash) {
            Some(record.link_hrefs.clone())
        } else {
            None
        }
    }

    pub fn store_link_hrefs(&self, path: &str, hash: &str, hrefs: Vec<String>) {
        self.update_record(path, |record| {
            record.link_hrefs_hash = Some(hash.to_string());
            record.link_hrefs = hrefs;
        });
    }

    // --- Transform sub-caches ----------------------------------------------

    /// Cached transform output for `path`, valid iff the stored sub-hash
    /// matches `hash`.
    pub fn cached_transform(&self, path: &str, kind: TransformKind, hash: &str) -> Option<String> {
        let inline = {
            let state = self.state.read().expect("cache lock poisoned");
            let record = state.posts.get(path)?;
            let stored_hash = match kind {
                TransformKind::Embeds => &record.embeds_hash,
                TransformKind::Glossary => &record.glossary_hash,
                TransformKind::LinkAvatars => &record.link_avatars_hash,
                TransformKind::Encrypted => &record.encrypted_hash,
            };
            if stored_hash.as_deref() != Some(hash) {
                return None;
            }
            match kind {
                TransformKind::Embeds => record.embeds_content.clone(),
                TransformKind::Glossary => record.glossary_html.clone(),
                TransformKind::LinkAvatars => record.link_avatars_html.clone(),
                TransformKind::Encrypted => None,
            }
        };
        match kind {
            TransformKind::Encrypted => self.encrypted_html.read(hash),
            _ => inline,
        }
    }

    /// Store a transform output under its sub-hash. Encrypted payloads go
    /// to their side-car; the others are inlined in the record.
    pub fn store_transform(&self, path: &str, kind: TransformKind, hash: &str, payload: &str) {
        let encrypted_path = match kind {
            TransformKind::Encrypted => self
                .encrypted_html
                .write(hash, payload)
                .map(|p| p.to_string_lossy().into_owned()),
            _ => None,
        };
        self.update_record(path, |record| match kind {
            TransformKind::Embeds => {
                record.embeds_hash = Some(hash.to_string());
                record.embeds_content = Some(payload.to_string());
            }
            TransformKind::Glossary => {
                record.glossary_hash = Some(hash.to_string());
                record.glossary_html = Some(payload.to_string());
            }
            TransformKind::LinkAvatars => {
                record.link_avatars_hash = Some(hash.to_string());
                record.link_avatars_html = Some(payload.to_string());
            }
            TransformKind::Encrypted => {
                record.encrypted_hash = Some(hash.to_string());
                record.encrypted_html_path = encrypted_path;
            }
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum GlobalHash {
    Config,
    Templates,
    Assets,
}

impl GlobalHash {
    fn name(self) -> &'static str {
        match self {
            GlobalHash::Config => "config",
            GlobalHash::Templates => "templates",
            GlobalHash::Assets => "assets",
        }
    }
}

fn hash_well_formed(hash: &str) -> bool {
    hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests;
