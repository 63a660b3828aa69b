//! Build pipeline orchestration.
//!
//! The [`Manager`] owns the document set, the feed list, and the shared
//! in-memory value cache; it drives the fixed stage sequence and dispatches
//! registered plugins in priority order. Critical stages (configure,
//! validate, glob, load) abort on first error; later stages collect
//! warnings and keep going, so one broken transform never loses a build.
//!
//! Shared state sits behind a single reader-writer lock with copy-on-read
//! semantics: accessors hand out snapshots, never references into the lock.
//! Documents themselves are individually locked so the bounded worker pool
//! can mutate distinct documents in parallel.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use core_cache::BuildCache;
use core_config::Config;
use core_filter::{FilterError, field_value};
use core_model::{Document, Feed};
use core_plugin::{HookError, HookErrors, Stage, Warning};

mod index;
mod plugin;
mod pool;

pub use index::PostIndex;
pub use plugin::{Plugin, StageHook};
pub use pool::ProcessError;

type Handle = Arc<RwLock<Document>>;

/// Thread-safe inter-stage scratch map, distinct from the persistent build
/// cache: values live for one process only.
#[derive(Debug, Default)]
pub struct ValueCache {
    map: DashMap<String, serde_json::Value>,
}

impl ValueCache {
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.map.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.map.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.map.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
}

#[derive(Debug, Default)]
struct ManagerState {
    config: Config,
    posts: Vec<Handle>,
    feeds: Vec<Feed>,
    files: Vec<PathBuf>,
    warnings: Vec<Warning>,
    stages_run: BTreeSet<Stage>,
    current_stage: Option<Stage>,
}

/// The pipeline orchestrator.
pub struct Manager {
    state: RwLock<ManagerState>,
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
    index: RwLock<Option<Arc<PostIndex>>>,
    values: ValueCache,
    cache: Arc<BuildCache>,
    concurrency: usize,
}

impl Manager {
    pub fn new(config: Config, cache: Arc<BuildCache>) -> Self {
        let concurrency = config.effective_concurrency(num_cpus::get());
        Self {
            state: RwLock::new(ManagerState {
                config,
                ..ManagerState::default()
            }),
            plugins: RwLock::new(Vec::new()),
            index: RwLock::new(None),
            values: ValueCache::default(),
            cache,
            concurrency,
        }
    }

    /// Override the worker pool size (used by tests and the CLI flag).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Register a plugin. Registration order is the tiebreak for equal
    /// priorities.
    pub fn register<P: Plugin + 'static>(&self, plugin: P) {
        self.register_arc(Arc::new(plugin));
    }

    pub fn register_arc(&self, plugin: Arc<dyn Plugin>) {
        self.plugins
            .write()
            .expect("plugin list lock poisoned")
            .push(plugin);
    }

    // --- Shared state accessors (snapshots) -------------------------------

    pub fn config(&self) -> Config {
        self.state
            .read()
            .expect("manager lock poisoned")
            .config
            .clone()
    }

    /// Snapshot of every document.
    pub fn posts(&self) -> Vec<Document> {
        let state = self.state.read().expect("manager lock poisoned");
        state
            .posts
            .iter()
            .map(|h| h.read().expect("document lock poisoned").clone())
            .collect()
    }

    /// Shared handles for per-document concurrent passes.
    pub fn posts_handles(&self) -> Vec<Handle> {
        let state = self.state.read().expect("manager lock poisoned");
        state.posts.iter().map(Arc::clone).collect()
    }

    /// Replace the document set. Invalidates the post index.
    pub fn set_posts(&self, posts: Vec<Document>) {
        {
            let mut state = self.state.write().expect("manager lock poisoned");
            state.posts = posts
                .into_iter()
                .map(|d| Arc::new(RwLock::new(d)))
                .collect();
        }
        self.invalidate_index();
    }

    pub fn add_post(&self, post: Document) {
        {
            let mut state = self.state.write().expect("manager lock poisoned");
            state.posts.push(Arc::new(RwLock::new(post)));
        }
        self.invalidate_index();
    }

    /// Mutate one document in place by path. Returns false when absent.
    pub fn update_post(&self, path: &str, f: impl FnOnce(&mut Document)) -> bool {
        let handle = {
            let state = self.state.read().expect("manager lock poisoned");
            state
                .posts
                .iter()
                .find(|h| h.read().expect("document lock poisoned").path == path)
                .map(Arc::clone)
        };
        match handle {
            Some(handle) => {
                f(&mut handle.write().expect("document lock poisoned"));
                true
            }
            None => false,
        }
    }

    /// Documents matching `pred`, as snapshots.
    pub fn filter_posts(&self, pred: impl Fn(&Document) -> bool) -> Vec<Document> {
        let state = self.state.read().expect("manager lock poisoned");
        state
            .posts
            .iter()
            .filter_map(|h| {
                let doc = h.read().expect("document lock poisoned");
                pred(&doc).then(|| doc.clone())
            })
            .collect()
    }

    /// Handles for the matching subset, for
    /// [`process_posts_slice_concurrently`](Self::process_posts_slice_concurrently).
    pub fn filter_post_handles(&self, pred: impl Fn(&Document) -> bool) -> Vec<Handle> {
        let state = self.state.read().expect("manager lock poisoned");
        state
            .posts
            .iter()
            .filter(|h| pred(&h.read().expect("document lock poisoned")))
            .map(Arc::clone)
            .collect()
    }

    pub fn feeds(&self) -> Vec<Feed> {
        self.state
            .read()
            .expect("manager lock poisoned")
            .feeds
            .clone()
    }

    pub fn set_feeds(&self, feeds: Vec<Feed>) {
        self.state.write().expect("manager lock poisoned").feeds = feeds;
    }

    pub fn add_feed(&self, feed: Feed) {
        self.state
            .write()
            .expect("manager lock poisoned")
            .feeds
            .push(feed);
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.state
            .read()
            .expect("manager lock poisoned")
            .files
            .clone()
    }

    pub fn set_files(&self, files: Vec<PathBuf>) {
        self.state.write().expect("manager lock poisoned").files = files;
    }

    /// Warnings collected from non-critical stages so far.
    pub fn warnings(&self) -> Vec<Warning> {
        self.state
            .read()
            .expect("manager lock poisoned")
            .warnings
            .clone()
    }

    /// Record a non-fatal problem against the current stage.
    pub fn push_warning(&self, warning: Warning) {
        warn!(target: "pipeline", %warning, "plugin_warning");
        self.state
            .write()
            .expect("manager lock poisoned")
            .warnings
            .push(warning);
    }

    pub fn current_stage(&self) -> Option<Stage> {
        self.state
            .read()
            .expect("manager lock poisoned")
            .current_stage
    }

    pub fn stage_completed(&self, stage: Stage) -> bool {
        self.state
            .read()
            .expect("manager lock poisoned")
            .stages_run
            .contains(&stage)
    }

    /// The inter-stage value cache.
    pub fn cache(&self) -> &ValueCache {
        &self.values
    }

    /// The persistent build cache (and, through it, the dependency graph).
    pub fn build_cache(&self) -> &Arc<BuildCache> {
        &self.cache
    }

    // --- Post index --------------------------------------------------------

    /// Lazily build (or fetch) the lookup index over the current document
    /// set. Any `set_posts`/`add_post` invalidates it.
    pub fn post_index(&self) -> Arc<PostIndex> {
        if let Some(idx) = self.index.read().expect("index lock poisoned").as_ref() {
            return Arc::clone(idx);
        }
        let mut slot = self.index.write().expect("index lock poisoned");
        // Double-checked: another thread may have built it while we waited.
        if let Some(idx) = slot.as_ref() {
            return Arc::clone(idx);
        }
        let handles = self.posts_handles();
        let idx = Arc::new(PostIndex::build(&handles));
        debug!(target: "pipeline", posts = idx.len(), "post_index_built");
        *slot = Some(Arc::clone(&idx));
        idx
    }

    fn invalidate_index(&self) {
        *self.index.write().expect("index lock poisoned") = None;
    }

    // --- Concurrency -------------------------------------------------------

    /// Run `f` over every document on the bounded worker pool. Every
    /// document is attempted; failures aggregate into one [`ProcessError`].
    /// Ordering between documents is unspecified when `concurrency > 1`.
    pub fn process_posts_concurrently(
        &self,
        f: impl Fn(&mut Document) -> anyhow::Result<()> + Sync,
    ) -> Result<(), ProcessError> {
        let handles = self.posts_handles();
        pool::process_slice(&handles, self.concurrency, f)
    }

    /// As above over a pre-filtered slice, for "only the changed subset"
    /// passes.
    pub fn process_posts_slice_concurrently(
        &self,
        handles: &[Handle],
        f: impl Fn(&mut Document) -> anyhow::Result<()> + Sync,
    ) -> Result<(), ProcessError> {
        pool::process_slice(handles, self.concurrency, f)
    }

    // --- Filter expressions ------------------------------------------------

    /// Evaluate a filter expression over the document set. Parse errors are
    /// returned; per-document evaluation errors are logged and the document
    /// excluded.
    pub fn filter(&self, expr: &str) -> Result<Vec<Document>, FilterError> {
        let filter = core_filter::parse(expr)?;
        let docs = self.posts();
        let (matched, errors) = filter.match_all(&docs);
        for e in &errors {
            warn!(target: "pipeline", error = %e, "filter_eval_warning");
        }
        Ok(matched)
    }

    /// Extract one field across the filtered-and-sorted document set.
    pub fn map(
        &self,
        field: &str,
        expr: &str,
        sort: &str,
        reverse: bool,
    ) -> Result<Vec<serde_json::Value>, FilterError> {
        let mut docs = self.filter(expr)?;
        if !sort.is_empty() {
            docs.sort_by(|a, b| compare_field(a, b, sort));
        }
        if reverse {
            docs.reverse();
        }
        Ok(docs.iter().map(|d| field_value(d, field)).collect())
    }

    // --- Stage machine -----------------------------------------------------

    /// Run the full pipeline.
    pub fn run(&self) -> Result<(), HookErrors> {
        self.run_to(Stage::Cleanup)
    }

    /// Execute every unfinished stage up to and including `target`.
    /// Already-completed stages are skipped so incremental server loops can
    /// re-enter.
    pub fn run_to(&self, target: Stage) -> Result<(), HookErrors> {
        for stage in Stage::ALL {
            if stage > target {
                break;
            }
            if self.stage_completed(stage) {
                continue;
            }
            self.run_stage(stage)?;
        }
        Ok(())
    }

    fn run_stage(&self, stage: Stage) -> Result<(), HookErrors> {
        self.state
            .write()
            .expect("manager lock poisoned")
            .current_stage = Some(stage);

        // Participants: plugins exposing a hook for this stage, priority
        // ascending, registration order breaking ties (stable sort).
        let mut participants: Vec<Arc<dyn Plugin>> = self
            .plugins
            .read()
            .expect("plugin list lock poisoned")
            .iter()
            .filter(|p| plugin::stage_hook(p.as_ref(), stage).is_some())
            .map(Arc::clone)
            .collect();
        participants.sort_by_key(|p| p.priority());

        info!(
            target: "pipeline",
            stage = %stage,
            plugins = participants.len(),
            "stage_start"
        );
        for plugin in &participants {
            let hook = plugin::stage_hook(plugin.as_ref(), stage)
                .expect("participant lost its hook between probe and dispatch");
            debug!(target: "pipeline", stage = %stage, plugin = plugin.name(), "plugin_start");
            match hook.run(self) {
                Ok(()) => {}
                Err(e) if stage.is_critical() => {
                    error!(
                        target: "pipeline",
                        stage = %stage,
                        plugin = plugin.name(),
                        error = %format!("{e:#}"),
                        "stage_aborted"
                    );
                    return Err(HookErrors {
                        errors: vec![HookError::new(stage, plugin.name(), e)],
                        critical: true,
                    });
                }
                Err(e) => {
                    self.push_warning(Warning::new(stage, plugin.name(), &e));
                }
            }
        }

        self.state
            .write()
            .expect("manager lock poisoned")
            .stages_run
            .insert(stage);
        info!(target: "pipeline", stage = %stage, "stage_complete");
        Ok(())
    }
}

fn compare_field(a: &Document, b: &Document, field: &str) -> std::cmp::Ordering {
    use serde_json::Value;
    let (va, vb) = (field_value(a, field), field_value(b, field));
    match (&va, &vb) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(std::cmp::Ordering::Equal),
        // Missing values sort last so "newest first" lists stay stable.
        (Value::Null, Value::Null) => std::cmp::Ordering::Equal,
        (Value::Null, _) => std::cmp::Ordering::Greater,
        (_, Value::Null) => std::cmp::Ordering::Less,
        _ => std::cmp::Ordering::Equal,
    }
}
