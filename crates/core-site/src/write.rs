//! Output emission and end-of-build cache maintenance.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use core_cache::hash_input;
use core_model::Document;
use core_pipeline::{Manager, Plugin, StageHook};
use core_plugin::PRIORITY_LAST;

use crate::render::ARTICLE_HTML_KEY;

/// Built-in writer. Emits `<output>/<href>/index.html` per listed document
/// and one listing page per feed, then at cleanup sweeps stale cache
/// records and flushes the cache to disk.
///
/// A page is rewritten when the render/collect stages flagged its path, or
/// when the output file is missing; anything else is guaranteed
/// byte-identical and left alone.
pub struct WritePlugin {
    write: WriteHook,
    cleanup: CleanupHook,
}

impl WritePlugin {
    pub fn new() -> Self {
        Self {
            write: WriteHook,
            cleanup: CleanupHook,
        }
    }
}

impl Default for WritePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for WritePlugin {
    fn name(&self) -> &'static str {
        "writer"
    }
    fn priority(&self) -> i32 {
        PRIORITY_LAST
    }
    fn write_hook(&self) -> Option<&dyn StageHook> {
        Some(&self.write)
    }
    fn cleanup_hook(&self) -> Option<&dyn StageHook> {
        Some(&self.cleanup)
    }
}

struct WriteHook;

impl StageHook for WriteHook {
    fn run(&self, manager: &Manager) -> Result<()> {
        let config = manager.config();
        let cache = manager.build_cache();
        let out_root = config.file.build.output_dir.clone();
        let site_title = config.file.site.title.clone();
        let force: HashSet<String> = crate::rebuild_paths(manager).into_iter().collect();

        let mut written = 0usize;
        let mut unchanged = 0usize;
        for doc in manager.filter_posts(|d| d.is_listed()) {
            let target = out_root.join(output_rel_path(&doc));
            if !force.contains(&doc.path) && target.exists() {
                unchanged += 1;
                continue;
            }
            let article = doc.extra_str(ARTICLE_HTML_KEY).unwrap_or_default();
            let input_hash = hash_input(&doc.content, &doc.raw_frontmatter, &doc.template);
            let page = crate::page::render_page(&site_title, &doc, article);
            cache.store_full_html(&doc.path, &input_hash, &page);
            write_file(&target, &page)?;
            written += 1;
        }

        // Feed pages rewrite whenever any member page did, or on first run.
        for feed in manager.feeds() {
            let target = out_root.join(&feed.output_path);
            let member_changed = feed.posts.iter().any(|d| force.contains(&d.path));
            if !member_changed && target.exists() {
                continue;
            }
            let page = crate::page::render_feed_page(&site_title, &feed);
            write_file(&target, &page)?;
            written += 1;
        }

        cache.mark_dirty();
        info!(target: "io", written, unchanged, "output_tree_written");
        Ok(())
    }
}

struct CleanupHook;

impl StageHook for CleanupHook {
    fn run(&self, manager: &Manager) -> Result<()> {
        let cache = manager.build_cache();
        let current: HashSet<String> = manager.posts().iter().map(|d| d.path.clone()).collect();
        let removed = cache.remove_stale(&current);
        if removed > 0 {
            debug!(target: "cache", removed, "stale_posts_removed");
        }
        cache.save().context("flushing build cache")?;
        Ok(())
    }
}

fn output_rel_path(doc: &Document) -> String {
    format!("{}index.html", doc.href.trim_start_matches('/'))
}

fn write_file(target: &Path, body: &str) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(target, body).with_context(|| format!("writing {}", target.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_rel_path_from_href() {
        let doc = Document {
            href: "/my-post/".into(),
            ..Default::default()
        };
        assert_eq!(output_rel_path(&doc), "my-post/index.html");
    }
}
