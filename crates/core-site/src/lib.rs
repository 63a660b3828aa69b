//! Built-in site plugins: the minimal set that takes a content directory to
//! an output tree through the incremental pipeline.
//!
//! * [`LoaderPlugin`] (configure/validate/glob/load): finds content files,
//!   parses front-matter through the parsed-post side-car, seeds the
//!   global invalidation hashes.
//! * [`RenderPlugin`] (render): markdown to HTML through the content-hash
//!   side-car, link extraction into the dependency graph, transitive
//!   re-render marking.
//! * [`CollectPlugin`] (collect): tag and author feeds, feed-membership and
//!   semantic hashes.
//! * [`WritePlugin`] (write/cleanup): page shells into the output tree,
//!   stale sweep, cache flush.
//!
//! Anything fancier (template engines, importers, asset pipelines) registers
//! alongside these with an appropriate priority and composes through the
//! same manager surface.

mod collect;
mod loader;
mod page;
mod render;
mod write;

pub use collect::CollectPlugin;
pub use loader::{LoaderPlugin, parse_document};
pub use render::{ARTICLE_HTML_KEY, RenderPlugin, markdown};
pub use write::WritePlugin;

use core_pipeline::Manager;

/// Value-cache key carrying the JSON array of paths whose output pages must
/// be rewritten this build. The render plugin seeds it, the collect plugin
/// extends it with feed-membership changes, the write plugin consumes it.
pub const REBUILD_PATHS_KEY: &str = "site.rebuild_paths";

/// Register the full built-in plugin set on a manager.
pub fn register_default_plugins(manager: &Manager) {
    manager.register(LoaderPlugin::new());
    manager.register(RenderPlugin::new());
    manager.register(CollectPlugin::new());
    manager.register(WritePlugin::new());
}

pub(crate) fn rebuild_paths(manager: &Manager) -> Vec<String> {
    manager
        .cache()
        .get(REBUILD_PATHS_KEY)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

pub(crate) fn set_rebuild_paths(manager: &Manager, paths: &[String]) {
    manager
        .cache()
        .set(REBUILD_PATHS_KEY, serde_json::json!(paths));
}
