//! Markdown rendering and link-graph population.

use std::collections::HashSet;

use anyhow::Result;
use pulldown_cmark::{Event, Options, Parser, Tag, html};
use tracing::{debug, info};

use core_cache::{BuildCache, RebuildProbe, hash_content, hash_input};
use core_model::Document;
use core_pipeline::{Manager, Plugin, StageHook};

/// Key under which the rendered article HTML lands in a document's `extra`
/// map.
pub const ARTICLE_HTML_KEY: &str = "article_html";

/// Black-box markdown conversion. Also returns the outbound link targets
/// discovered while parsing: site-internal destinations reduced to their
/// slug (`/other-post/` and `other-post` both yield `other-post`); external
/// and fragment links are ignored.
pub fn markdown(text: &str) -> (String, Vec<String>) {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    let parser = Parser::new_ext(text, options);

    let mut targets = Vec::new();
    let mut seen = HashSet::new();
    let events: Vec<Event> = parser
        .inspect(|event| {
            if let Event::Start(Tag::Link { dest_url, .. }) = event {
                if let Some(slug) = link_target_slug(dest_url) {
                    if seen.insert(slug.clone()) {
                        targets.push(slug);
                    }
                }
            }
        })
        .collect();

    let mut out = String::with_capacity(text.len() * 2);
    html::push_html(&mut out, events.into_iter());
    (out, targets)
}

/// Reduce a link destination to a slug, or `None` for destinations that are
/// not site-internal document links.
fn link_target_slug(dest: &str) -> Option<String> {
    if dest.is_empty()
        || dest.starts_with('#')
        || dest.contains("://")
        || dest.starts_with("mailto:")
    {
        return None;
    }
    let trimmed = dest.trim_matches('/');
    let trimmed = trimmed.split(['#', '?']).next().unwrap_or(trimmed);
    // Multi-segment paths are section pages, not documents.
    if trimmed.is_empty() || trimmed.contains('/') {
        return None;
    }
    Some(trimmed.to_string())
}

/// Built-in render plugin.
///
/// Three passes over the document set: (1) documents whose input hash
/// changed render and mark their slug; (2) documents transitively affected
/// through the link graph re-mark so their pages rewrite; (3) everything
/// else hydrates from the article side-car and counts as skipped. Marking
/// happens entirely within this stage; decisions that consume
/// `changed_slugs` (the affected query) run after the marking pass
/// completes, which is what makes the within-build invalidation sound.
pub struct RenderPlugin {
    hook: RenderHook,
}

impl RenderPlugin {
    pub fn new() -> Self {
        Self { hook: RenderHook }
    }
}

impl Default for RenderPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for RenderPlugin {
    fn name(&self) -> &'static str {
        "render"
    }
    fn render_hook(&self) -> Option<&dyn StageHook> {
        Some(&self.hook)
    }
}

struct RenderHook;

impl StageHook for RenderHook {
    fn run(&self, manager: &Manager) -> Result<()> {
        let cache = manager.build_cache();

        let probes: Vec<RebuildProbe> = manager
            .posts()
            .iter()
            .map(|doc| RebuildProbe {
                path: doc.path.clone(),
                slug: doc.slug.clone(),
                input_hash: hash_input(&doc.content, &doc.raw_frontmatter, &doc.template),
                template: doc.template.clone(),
            })
            .collect();
        let changed: HashSet<String> = cache.should_rebuild_batch(&probes).into_iter().collect();

        // Pass 1: render every changed document and mark its slug.
        let changed_handles = manager.filter_post_handles(|d| changed.contains(&d.path));
        manager.process_posts_slice_concurrently(&changed_handles, |doc| {
            render_document(cache, doc);
            Ok(())
        })?;

        // Pass 2: everything reachable from the changed slugs through the
        // reverse graph gets re-marked; content is unchanged but inbound
        // link context is not.
        let affected: Vec<String> = cache
            .graph()
            .affected_posts(&cache.changed_slugs())
            .into_iter()
            .filter(|path| !changed.contains(path))
            .collect();
        let affected_set: HashSet<String> = affected.iter().cloned().collect();
        let affected_handles = manager.filter_post_handles(|d| affected_set.contains(&d.path));
        manager.process_posts_slice_concurrently(&affected_handles, |doc| {
            hydrate_document(cache, doc);
            let input_hash = hash_input(&doc.content, &doc.raw_frontmatter, &doc.template);
            cache.mark_rebuilt_with_slug(
                &doc.path,
                &input_hash,
                &output_path(doc),
                &doc.template,
                &doc.slug,
            );
            Ok(())
        })?;

        // Pass 3: untouched documents hydrate and count as skipped.
        let untouched = manager.filter_post_handles(|d| {
            !changed.contains(&d.path) && !affected_set.contains(&d.path)
        });
        manager.process_posts_slice_concurrently(&untouched, |doc| {
            hydrate_document(cache, doc);
            cache.mark_skipped();
            Ok(())
        })?;

        let mut rebuild: Vec<String> = changed.into_iter().collect();
        rebuild.extend(affected);
        rebuild.sort();
        info!(
            target: "pipeline",
            rebuilt = rebuild.len(),
            total = probes.len(),
            "render_pass_complete"
        );
        crate::set_rebuild_paths(manager, &rebuild);
        Ok(())
    }
}

fn output_path(doc: &Document) -> String {
    format!("{}index.html", doc.href.trim_start_matches('/'))
}

/// Render one document: article HTML through the content-hash side-car,
/// link extraction into the graph, rebuild marking.
fn render_document(cache: &BuildCache, doc: &mut Document) {
    let content_hash = hash_content(&doc.content);
    let input_hash = hash_input(&doc.content, &doc.raw_frontmatter, &doc.template);

    let (article, targets) = match (
        cache.cached_article_html(&content_hash),
        cache.cached_link_hrefs(&doc.path, &content_hash),
    ) {
        (Some(html), Some(links)) => (html, links),
        _ => {
            let (html, links) = markdown(&doc.content);
            cache.store_article_html(&doc.path, &content_hash, &html);
            cache.store_link_hrefs(&doc.path, &content_hash, links.clone());
            (html, links)
        }
    };

    cache.graph().set_dependencies(&doc.path, &doc.slug, &targets);
    doc.set_extra(ARTICLE_HTML_KEY, serde_json::json!(article));
    cache.mark_rebuilt_with_slug(
        &doc.path,
        &input_hash,
        &output_path(doc),
        &doc.template,
        &doc.slug,
    );
    debug!(target: "pipeline", path = doc.path.as_str(), links = targets.len(), "document_rendered");
}

/// Load the cached article for an unchanged document; falls back to a fresh
/// render when the side-car was reaped.
fn hydrate_document(cache: &BuildCache, doc: &mut Document) {
    let content_hash = hash_content(&doc.content);
    let article = cache.cached_article_html(&content_hash).unwrap_or_else(|| {
        let (html, links) = markdown(&doc.content);
        cache.store_article_html(&doc.path, &content_hash, &html);
        cache.store_link_hrefs(&doc.path, &content_hash, links);
        html
    });
    // The graph entry must exist even on warm runs where nothing rendered:
    // it was loaded with the cache, so only fill in documents the cache has
    // never seen.
    if !cache.graph().has_dependencies(&doc.path) && cache.graph().slug_of(&doc.path).is_none() {
        if let Some(links) = cache.cached_link_hrefs(&doc.path, &content_hash) {
            cache.graph().set_dependencies(&doc.path, &doc.slug, &links);
        }
    }
    doc.set_extra(ARTICLE_HTML_KEY, serde_json::json!(article));
}
