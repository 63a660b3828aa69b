use std::collections::HashSet;

use tempfile::tempdir;

use super::*;

fn h(text: &str) -> String {
    hash_content(text)
}

fn mark(cache: &BuildCache, path: &str, slug: &str, body: &str) {
    cache.mark_rebuilt_with_slug(path, &h(body), &format!("out/{slug}/index.html"), "post.html", slug);
}

#[test]
fn fresh_cache_rebuilds_everything() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    assert!(cache.should_rebuild("a.md", &h("x"), "post.html"));
    assert_eq!(cache.posts_len(), 0);
}

#[test]
fn should_rebuild_false_only_on_exact_match() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    let input = h("body");
    cache.mark_rebuilt("a.md", &input, "out/a/index.html", "post.html");

    assert!(!cache.should_rebuild("a.md", &input, "post.html"));
    assert!(cache.should_rebuild("a.md", &h("other"), "post.html"));
    assert!(cache.should_rebuild("a.md", &input, "page.html"));
    assert!(cache.should_rebuild("b.md", &input, "post.html"));
}

#[test]
fn malformed_stored_hash_counts_as_miss() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    cache.mark_rebuilt("a.md", "not-a-hash", "out", "post.html");
    assert!(cache.should_rebuild("a.md", "not-a-hash", "post.html"));
}

#[test]
fn changed_slug_invalidates_dependents_within_build() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    let input_a = h("a");
    let input_c = h("c");
    // a.md links to c; both recorded in a previous build.
    cache.mark_rebuilt("a.md", &input_a, "out/a", "post.html");
    cache.mark_rebuilt("c.md", &input_c, "out/c", "post.html");
    cache.graph().set_dependencies("a.md", "a", &["c".to_string()]);

    // Unchanged and no changed slugs yet: skip.
    assert!(!cache.should_rebuild_with_slug("a.md", "a", &input_a, "post.html"));

    // C rebuilds and marks its slug; A must now rebuild despite matching.
    mark(&cache, "c.md", "c", "c v2");
    assert!(cache.should_rebuild_with_slug("a.md", "a", &input_a, "post.html"));
    assert_eq!(cache.changed_slugs(), vec!["c".to_string()]);
}

#[test]
fn batch_matches_individual_checks() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    let fresh = h("fresh");
    let stale = h("stale");
    cache.mark_rebuilt("fresh.md", &fresh, "out", "post.html");

    let probes = vec![
        RebuildProbe {
            path: "fresh.md".into(),
            slug: "fresh".into(),
            input_hash: fresh.clone(),
            template: "post.html".into(),
        },
        RebuildProbe {
            path: "stale.md".into(),
            slug: "stale".into(),
            input_hash: stale.clone(),
            template: "post.html".into(),
        },
    ];
    assert_eq!(cache.should_rebuild_batch(&probes), vec!["stale.md"]);
}

#[test]
fn global_hash_change_clears_posts_same_value_is_noop() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    cache.set_templates_hash("t1");
    mark(&cache, "a.md", "a", "a");
    assert_eq!(cache.posts_len(), 1);

    cache.set_templates_hash("t1");
    assert_eq!(cache.posts_len(), 1, "same value must be a no-op");

    cache.set_templates_hash("t2");
    assert_eq!(cache.posts_len(), 0, "new value must clear all records");
    assert_eq!(cache.templates_hash(), "t2");
}

#[test]
fn save_load_round_trips_posts_and_graph() {
    let dir = tempdir().unwrap();
    {
        let cache = BuildCache::open(dir.path());
        mark(&cache, "a.md", "a", "a body");
        cache.graph().set_dependencies("a.md", "a", &["b".to_string()]);
        cache.graph().set_dependencies("b.md", "b", &[]);
        cache.save().unwrap();
        assert!(dir.path().join(CACHE_FILE).exists());
    }
    let cache = BuildCache::open(dir.path());
    assert_eq!(cache.posts_len(), 1);
    assert!(!cache.should_rebuild("a.md", &h("a body"), "post.html"));
    // dependents reconstructed from the persisted forward map
    assert_eq!(cache.graph().get_direct_dependents("b"), vec!["a.md"]);
    assert_eq!(
        cache.graph().affected_posts(&["b".to_string()]),
        vec!["a.md".to_string()]
    );
}

#[test]
fn save_skips_when_clean() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    cache.save().unwrap();
    assert!(!dir.path().join(CACHE_FILE).exists(), "clean cache must not write");
}

#[test]
fn version_mismatch_yields_fresh_cache() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join(CACHE_FILE),
        r#"{"version": 999, "posts": {"a.md": {"input_hash": "x"}}}"#,
    )
    .unwrap();
    let cache = BuildCache::open(dir.path());
    assert_eq!(cache.posts_len(), 0);
}

#[test]
fn malformed_json_yields_fresh_cache() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join(CACHE_FILE), "{not json").unwrap();
    let cache = BuildCache::open(dir.path());
    assert_eq!(cache.posts_len(), 0);
}

#[test]
fn unknown_top_level_fields_pass_through_save() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join(CACHE_FILE),
        r#"{"version": 1, "posts": {}, "future_field": {"nested": true}}"#,
    )
    .unwrap();
    {
        let cache = BuildCache::open(dir.path());
        cache.mark_dirty();
        cache.save().unwrap();
    }
    let text = std::fs::read_to_string(dir.path().join(CACHE_FILE)).unwrap();
    assert!(text.contains("future_field"), "got: {text}");
}

#[test]
fn remove_stale_drops_records_and_graph_entries() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    for (path, slug) in [("a.md", "a"), ("b.md", "b"), ("c.md", "c")] {
        mark(&cache, path, slug, slug);
    }
    cache.graph().set_dependencies("a.md", "a", &["b".to_string()]);
    cache.graph().set_dependencies("b.md", "b", &["c".to_string()]);
    cache.graph().set_dependencies("c.md", "c", &[]);

    let keep: HashSet<String> = ["a.md".to_string(), "b.md".to_string()].into();
    assert_eq!(cache.remove_stale(&keep), 1);
    assert_eq!(cache.posts_len(), 2);
    assert!(cache.record("c.md").is_none());
    // Links into the deleted document dangle; "c" no longer triggers
    // rebuilds, while the surviving a -> b edge still works.
    assert!(cache.graph().affected_posts(&["c".to_string()]).is_empty());
    assert_eq!(
        cache.graph().affected_posts(&["b".to_string()]),
        vec!["a.md".to_string()]
    );
    assert!(!cache.graph().has_dependencies("c.md"));
}

#[test]
fn counters_track_rebuilt_and_skipped() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    mark(&cache, "a.md", "a", "a");
    mark(&cache, "b.md", "b", "b");
    cache.mark_skipped();
    assert_eq!(
        cache.stats(),
        CacheStats {
            rebuilt: 2,
            skipped: 1
        }
    );
    cache.reset_stats();
    assert_eq!(cache.stats(), CacheStats::default());
}

#[test]
fn semantic_hashes_detect_feed_tag_garden_changes() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    mark(&cache, "a.md", "a", "a");

    let first = cache.update_post_semantic_hashes("a.md", "f1", "t1", "g1");
    assert_eq!(
        first,
        SemanticChanges {
            feed: true,
            tag: true,
            garden: true
        }
    );
    assert!(cache.tags_dirty());
    assert!(cache.garden_dirty());
    assert_eq!(cache.changed_feed_slugs(), vec!["a".to_string()]);

    let second = cache.update_post_semantic_hashes("a.md", "f1", "t1", "g1");
    assert_eq!(second, SemanticChanges::default());

    let third = cache.update_post_semantic_hashes("a.md", "f2", "t1", "g1");
    assert!(third.feed);
    assert!(!third.tag);
}

#[test]
fn article_sidecar_keyed_by_content_hash() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    let content_hash = h("shared body");
    cache.store_article_html("a.md", &content_hash, "<p>shared</p>");

    // A second document with the identical body hits the same entry.
    assert_eq!(
        cache.cached_article_html(&content_hash).as_deref(),
        Some("<p>shared</p>")
    );
    let record = cache.record("a.md").unwrap();
    assert_eq!(record.content_hash.as_deref(), Some(content_hash.as_str()));
    let sidecar = record.article_html_path.expect("sidecar path recorded");
    assert!(sidecar.contains("html-cache"), "got: {sidecar}");
}

#[test]
fn post_sidecar_gated_on_mtime() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    let doc = Document {
        path: "a.md".into(),
        slug: "a".into(),
        content: "body".into(),
        template: "post.html".into(),
        published: true,
        ..Default::default()
    };
    cache.store_post("a.md", 42, &doc);

    assert_eq!(cache.cached_post("a.md", 42), Some(doc));
    assert!(cache.cached_post("a.md", 43).is_none(), "mtime mismatch is a miss");
}

#[test]
fn link_hrefs_cache_validates_hash() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    cache.store_link_hrefs("a.md", "h1", vec!["b".into(), "c".into()]);
    assert_eq!(
        cache.cached_link_hrefs("a.md", "h1"),
        Some(vec!["b".to_string(), "c".to_string()])
    );
    assert!(cache.cached_link_hrefs("a.md", "h2").is_none());
}

#[test]
fn transform_subcaches_inline_and_sidecar() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());

    cache.store_transform("a.md", TransformKind::Glossary, "g1", "<dl>…</dl>");
    assert_eq!(
        cache
            .cached_transform("a.md", TransformKind::Glossary, "g1")
            .as_deref(),
        Some("<dl>…</dl>")
    );
    assert!(
        cache
            .cached_transform("a.md", TransformKind::Glossary, "g2")
            .is_none()
    );

    cache.store_transform("a.md", TransformKind::Encrypted, &h("secret"), "wrapped");
    assert_eq!(
        cache
            .cached_transform("a.md", TransformKind::Encrypted, &h("secret"))
            .as_deref(),
        Some("wrapped")
    );
    let record = cache.record("a.md").unwrap();
    assert!(
        record
            .encrypted_html_path
            .as_deref()
            .is_some_and(|p| p.contains("encrypted-html-cache"))
    );
}

#[test]
fn feed_records_round_trip() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    cache.set_feed_record(
        "tag:go",
        FeedRecord {
            membership_hash: "m1".into(),
            output_path: "tags/go/index.html".into(),
            output_hash: None,
        },
    );
    let record = cache.feed_record("tag:go").unwrap();
    assert_eq!(record.membership_hash, "m1");
    assert!(cache.feed_record("tag:rust").is_none());
}

#[test]
fn glob_snapshot_round_trips() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    cache.set_glob_snapshot(vec!["a.md".into()], "p1");
    let (files, pattern) = cache.glob_snapshot();
    assert_eq!(files, vec!["a.md".to_string()]);
    assert_eq!(pattern, "p1");
}

#[test]
fn listing_hashes_round_trip_and_mark_dirty() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    assert_eq!(cache.tags_listing_hash(), "");
    cache.set_tags_listing_hash("t1");
    cache.set_garden_listing_hash("g1");
    assert_eq!(cache.tags_listing_hash(), "t1");
    assert_eq!(cache.garden_listing_hash(), "g1");
    assert!(cache.is_dirty());
    cache.save().unwrap();

    let reopened = BuildCache::open(dir.path());
    assert_eq!(reopened.tags_listing_hash(), "t1");
    assert_eq!(reopened.garden_listing_hash(), "g1");
}

#[test]
fn is_file_unchanged_requires_exact_mtime() {
    let dir = tempdir().unwrap();
    let cache = BuildCache::open(dir.path());
    assert!(!cache.is_file_unchanged("a.md", 10));
    cache.update_record("a.md", |r| r.mod_time = Some(10));
    assert!(cache.is_file_unchanged("a.md", 10));
    assert!(!cache.is_file_unchanged("a.md", 11));
}
