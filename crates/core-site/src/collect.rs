//! Feed aggregation: tag and author projections plus semantic hashing.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{debug, info};

use core_cache::{FeedRecord, feed_membership_hash, hash_hex};
use core_model::{Document, Feed, slugify};
use core_pipeline::{Manager, Plugin, StageHook};

/// Built-in collect plugin. Produces one feed per tag (`tag:<slug>`) and
/// one per author (`author:<slug>`), newest first. Per document it computes
/// the feed-membership hash (the document's own slug included, so moving a
/// document between tags changes the hash for siblings in both feeds) and
/// the semantic hashes that tell feed-only changes apart from content
/// changes.
pub struct CollectPlugin {
    hook: CollectHook,
}

impl CollectPlugin {
    pub fn new() -> Self {
        Self { hook: CollectHook }
    }
}

impl Default for CollectPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for CollectPlugin {
    fn name(&self) -> &'static str {
        "collect"
    }
    fn collect_hook(&self) -> Option<&dyn StageHook> {
        Some(&self.hook)
    }
}

struct CollectHook;

impl StageHook for CollectHook {
    fn run(&self, manager: &Manager) -> Result<()> {
        let cache = manager.build_cache();
        // Private documents never appear in shared listings.
        let listed = manager.filter_posts(|d| d.is_listed() && !d.private);

        let mut feeds: BTreeMap<String, Feed> = BTreeMap::new();
        for doc in &listed {
            for tag in &doc.tags {
                let slug = slugify(tag);
                feeds
                    .entry(format!("tag:{slug}"))
                    .or_insert_with(|| {
                        Feed::new(
                            format!("tag:{slug}"),
                            tag.as_str(),
                            format!("tags/{slug}/index.html"),
                        )
                    })
                    .posts
                    .push(doc.clone());
            }
            for author in &doc.authors {
                let slug = slugify(author);
                feeds
                    .entry(format!("author:{slug}"))
                    .or_insert_with(|| {
                        Feed::new(
                            format!("author:{slug}"),
                            author.as_str(),
                            format!("authors/{slug}/index.html"),
                        )
                    })
                    .posts
                    .push(doc.clone());
            }
        }

        // Per-document feed co-membership: union of member slugs across
        // every feed the document belongs to, itself included.
        let mut co_members: BTreeMap<String, Vec<String>> = listed
            .iter()
            .map(|d| (d.path.clone(), vec![d.slug.clone()]))
            .collect();
        for feed in feeds.values_mut() {
            feed.posts.sort_by(newest_first);
            let slugs = feed.member_slugs();
            for doc in &feed.posts {
                if let Some(members) = co_members.get_mut(&doc.path) {
                    members.extend(slugs.iter().cloned());
                }
            }
        }

        let mut force_rewrite = crate::rebuild_paths(manager);
        for doc in &listed {
            let mut members = co_members.remove(&doc.path).unwrap_or_default();
            members.sort();
            members.dedup();
            let feed_hash = feed_membership_hash(&members);
            let tag_hash = hash_hex(doc.tags.join("\0").as_bytes());
            let garden_hash = garden_item_hash(doc);
            let changes =
                cache.update_post_semantic_hashes(&doc.path, &feed_hash, &tag_hash, &garden_hash);
            cache.update_record(&doc.path, |record| {
                record.feed_membership_hash = Some(feed_hash.clone());
            });
            // A sidebar-only change still means this page must rewrite.
            if changes.feed && !force_rewrite.contains(&doc.path) {
                force_rewrite.push(doc.path.clone());
                debug!(target: "pipeline", path = doc.path.as_str(), "feed_membership_changed");
            }
        }
        force_rewrite.sort();
        crate::set_rebuild_paths(manager, &force_rewrite);

        for feed in feeds.values() {
            cache.set_feed_record(
                &feed.name,
                FeedRecord {
                    membership_hash: feed_membership_hash(&feed.member_slugs()),
                    output_path: feed.output_path.clone(),
                    output_hash: None,
                },
            );
        }
        info!(target: "pipeline", feeds = feeds.len(), posts = listed.len(), "feeds_collected");
        manager.set_feeds(feeds.into_values().collect());
        Ok(())
    }
}

/// Feed ordering: date descending, path ascending as the tiebreak so the
/// order is total and deterministic.
fn newest_first(a: &Document, b: &Document) -> std::cmp::Ordering {
    match (&a.date, &b.date) {
        (Some(x), Some(y)) => y.cmp(x).then_with(|| a.path.cmp(&b.path)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.path.cmp(&b.path),
    }
}

fn garden_item_hash(doc: &Document) -> String {
    let mut seed = String::new();
    seed.push_str(&doc.slug);
    seed.push('\0');
    seed.push_str(doc.title.as_deref().unwrap_or(""));
    seed.push('\0');
    seed.push_str(doc.description.as_deref().unwrap_or(""));
    hash_hex(seed.as_bytes())
}
