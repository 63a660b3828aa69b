//! Bidirectional link graph between documents.
//!
//! Forward edges map a source *path* to the *slugs* it links to; the reverse
//! index maps a slug back to the set of source paths that reference it. The
//! `path_to_slug` mapping closes the loop so transitive traversal can hop
//! from a dependent path to its own slug and continue outward.
//!
//! Invariants:
//! * `dependents` is always the exact inverse of `dependencies`.
//! * Forward target lists are sorted and deduplicated.
//! * A slug missing from `path_to_slug` terminates its traversal chain
//!   silently; it is never an error.
//!
//! One reader-writer lock covers all three maps. Read operations return
//! snapshot copies so callers never hold the lock across plugin work.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Persisted portion of the graph. The reverse index is derived and is
/// rebuilt after deserialization rather than stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    /// Outbound links: source path → sorted, deduplicated target slugs.
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
    /// Source path → its own slug; required for transitive closure.
    #[serde(default)]
    pub path_to_slug: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct GraphInner {
    data: GraphData,
    /// Derived: target slug → source paths that link to it.
    dependents: HashMap<String, BTreeSet<String>>,
}

impl GraphInner {
    fn remove_forward_edges(&mut self, path: &str) {
        if let Some(old) = self.data.dependencies.remove(path) {
            for slug in old {
                if let Some(sources) = self.dependents.get_mut(&slug) {
                    sources.remove(path);
                    if sources.is_empty() {
                        self.dependents.remove(&slug);
                    }
                }
            }
        }
    }

    fn rebuild_dependents(&mut self) {
        self.dependents.clear();
        for (path, targets) in &self.data.dependencies {
            for slug in targets {
                self.dependents
                    .entry(slug.clone())
                    .or_default()
                    .insert(path.clone());
            }
        }
    }
}

/// Thread-safe dependency graph. Writes are short; reads copy out.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    inner: RwLock<GraphInner>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from its persisted form, reconstructing the reverse
    /// index.
    pub fn from_data(data: GraphData) -> Self {
        let graph = Self::new();
        graph.load_data(data);
        graph
    }

    /// Replace all graph state with `data` and rebuild the reverse index.
    /// Called once after cache load.
    pub fn load_data(&self, data: GraphData) {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        inner.data = data;
        inner.rebuild_dependents();
    }

    /// Snapshot of the persisted portion (for serialization).
    pub fn data(&self) -> GraphData {
        self.inner.read().expect("graph lock poisoned").data.clone()
    }

    /// Replace the adjacency for `path`. Targets are deduplicated and
    /// sorted; stale reverse edges are dropped; `path → slug` is recorded.
    /// An empty target list deletes the forward entry entirely.
    pub fn set_dependencies(&self, path: &str, slug: &str, targets: &[String]) {
        let mut sorted: Vec<String> = targets.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut inner = self.inner.write().expect("graph lock poisoned");
        inner.remove_forward_edges(path);
        inner
            .data
            .path_to_slug
            .insert(path.to_string(), slug.to_string());
        if sorted.is_empty() {
            return;
        }
        for target in &sorted {
            inner
                .dependents
                .entry(target.clone())
                .or_default()
                .insert(path.to_string());
        }
        inner.data.dependencies.insert(path.to_string(), sorted);
    }

    /// Outbound target slugs for `path` (snapshot).
    pub fn get_dependencies(&self, path: &str) -> Vec<String> {
        let inner = self.inner.read().expect("graph lock poisoned");
        inner
            .data
            .dependencies
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    /// Source paths that link directly to `target` (snapshot, sorted).
    pub fn get_direct_dependents(&self, target: &str) -> Vec<String> {
        let inner = self.inner.read().expect("graph lock poisoned");
        inner
            .dependents
            .get(target)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Delete all edges originating at `path` and its slug mapping.
    pub fn remove_source(&self, path: &str) {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        inner.remove_forward_edges(path);
        inner.data.path_to_slug.remove(path);
    }

    /// The slug recorded for `path`, if any.
    pub fn slug_of(&self, path: &str) -> Option<String> {
        let inner = self.inner.read().expect("graph lock poisoned");
        inner.data.path_to_slug.get(path).cloned()
    }

    /// Prune `slug` as a link target: every forward list drops it and its
    /// reverse entry disappears. Used when the document owning `slug` is
    /// deleted, so dangling links stop triggering rebuilds.
    pub fn remove_target(&self, slug: &str) {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        let Some(sources) = inner.dependents.remove(slug) else {
            return;
        };
        for path in sources {
            if let Some(targets) = inner.data.dependencies.get_mut(&path) {
                targets.retain(|t| t != slug);
                if targets.is_empty() {
                    inner.data.dependencies.remove(&path);
                }
            }
        }
    }

    /// Rebuild the reverse index from the forward map.
    pub fn rebuild_reverse(&self) {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        inner.rebuild_dependents();
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        inner.data.dependencies.clear();
        inner.data.path_to_slug.clear();
        inner.dependents.clear();
    }

    /// Number of source paths with outbound edges.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("graph lock poisoned")
            .data
            .dependencies
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_dependencies(&self, path: &str) -> bool {
        self.inner
            .read()
            .expect("graph lock poisoned")
            .data
            .dependencies
            .contains_key(path)
    }

    pub fn has_dependents(&self, target: &str) -> bool {
        self.inner
            .read()
            .expect("graph lock poisoned")
            .dependents
            .contains_key(target)
    }

    /// Transitive set of source paths that must rebuild when `changed` slugs
    /// change, excluding paths whose own slug is in `changed` (those are
    /// already being rebuilt). Output is sorted and deterministic.
    ///
    /// Breadth-first with a visited set; cycles and diamond fan-in are
    /// explored once per node, self-references never re-enqueue their owner.
    pub fn affected_posts(&self, changed: &[String]) -> Vec<String> {
        let inner = self.inner.read().expect("graph lock poisoned");
        let changed_set: HashSet<&str> = changed.iter().map(String::as_str).collect();

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        for slug in &changed_set {
            if let Some(sources) = inner.dependents.get(*slug) {
                for path in sources {
                    if visited.insert(path.clone()) {
                        queue.push_back(path.clone());
                    }
                }
            }
        }

        let mut affected: Vec<String> = Vec::new();
        while let Some(current) = queue.pop_front() {
            // Hop from the dependent path to its own slug to continue outward.
            // A missing mapping silently terminates this chain.
            if let Some(slug) = inner.data.path_to_slug.get(&current) {
                if let Some(sources) = inner.dependents.get(slug) {
                    for path in sources {
                        if visited.insert(path.clone()) {
                            queue.push_back(path.clone());
                        }
                    }
                }
            }
            affected.push(current);
        }

        // A changed document may have been reached through another path
        // during traversal; it is already in flight, drop it here.
        affected.retain(|path| {
            inner
                .data
                .path_to_slug
                .get(path)
                .is_none_or(|slug| !changed_set.contains(slug.as_str()))
        });

        affected.sort();
        affected
    }
}
