//! Stage machine and plugin dispatch behavior.

use std::sync::{Arc, Mutex};

use core_cache::BuildCache;
use core_config::Config;
use core_model::Document;
use core_pipeline::{Manager, Plugin, StageHook};
use core_plugin::{PRIORITY_EARLY, PRIORITY_LATE, Stage};

fn manager() -> (Manager, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(BuildCache::open(dir.path()));
    (
        Manager::new(Config::default(), cache).with_concurrency(2),
        dir,
    )
}

/// Records `(stage, name)` invocations into a shared log.
struct Recorder {
    name: &'static str,
    priority: i32,
    stages: &'static [Stage],
    hook: RecorderHook,
}

struct RecorderHook {
    name: &'static str,
    log: Arc<Mutex<Vec<(Stage, &'static str)>>>,
    fail: bool,
}

impl StageHook for RecorderHook {
    fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        let stage = manager.current_stage().expect("stage set during dispatch");
        self.log.lock().unwrap().push((stage, self.name));
        if self.fail {
            anyhow::bail!("{} failed", self.name)
        }
        Ok(())
    }
}

impl Recorder {
    fn new(
        name: &'static str,
        priority: i32,
        stages: &'static [Stage],
        log: Arc<Mutex<Vec<(Stage, &'static str)>>>,
        fail: bool,
    ) -> Self {
        Self {
            name,
            priority,
            stages,
            hook: RecorderHook { name, log, fail },
        }
    }

    fn probe(&self, stage: Stage) -> Option<&dyn StageHook> {
        self.stages
            .contains(&stage)
            .then_some(&self.hook as &dyn StageHook)
    }
}

impl Plugin for Recorder {
    fn name(&self) -> &'static str {
        self.name
    }
    fn priority(&self) -> i32 {
        self.priority
    }
    fn configure_hook(&self) -> Option<&dyn StageHook> {
        self.probe(Stage::Configure)
    }
    fn validate_hook(&self) -> Option<&dyn StageHook> {
        self.probe(Stage::Validate)
    }
    fn glob_hook(&self) -> Option<&dyn StageHook> {
        self.probe(Stage::Glob)
    }
    fn load_hook(&self) -> Option<&dyn StageHook> {
        self.probe(Stage::Load)
    }
    fn transform_hook(&self) -> Option<&dyn StageHook> {
        self.probe(Stage::Transform)
    }
    fn render_hook(&self) -> Option<&dyn StageHook> {
        self.probe(Stage::Render)
    }
    fn collect_hook(&self) -> Option<&dyn StageHook> {
        self.probe(Stage::Collect)
    }
    fn write_hook(&self) -> Option<&dyn StageHook> {
        self.probe(Stage::Write)
    }
    fn cleanup_hook(&self) -> Option<&dyn StageHook> {
        self.probe(Stage::Cleanup)
    }
}

#[test]
fn stages_run_in_fixed_order() {
    let (manager, _dir) = manager();
    let log = Arc::new(Mutex::new(Vec::new()));
    manager.register(Recorder::new("all", 0, &Stage::ALL, Arc::clone(&log), false));

    manager.run().unwrap();
    let stages: Vec<Stage> = log.lock().unwrap().iter().map(|(s, _)| *s).collect();
    assert_eq!(stages, Stage::ALL.to_vec());
}

#[test]
fn priority_orders_within_stage_ties_break_on_registration() {
    let (manager, _dir) = manager();
    let log = Arc::new(Mutex::new(Vec::new()));
    let only_load: &'static [Stage] = &[Stage::Load];
    manager.register(Recorder::new("late", PRIORITY_LATE, only_load, Arc::clone(&log), false));
    manager.register(Recorder::new("tie_a", 0, only_load, Arc::clone(&log), false));
    manager.register(Recorder::new("early", PRIORITY_EARLY, only_load, Arc::clone(&log), false));
    manager.register(Recorder::new("tie_b", 0, only_load, Arc::clone(&log), false));

    manager.run_to(Stage::Load).unwrap();
    let names: Vec<&str> = log.lock().unwrap().iter().map(|(_, n)| *n).collect();
    assert_eq!(names, vec!["early", "tie_a", "tie_b", "late"]);
}

#[test]
fn critical_stage_error_aborts_and_is_tagged() {
    let (manager, _dir) = manager();
    let log = Arc::new(Mutex::new(Vec::new()));
    let stages: &'static [Stage] = &[Stage::Load, Stage::Transform];
    manager.register(Recorder::new("loader", 0, stages, Arc::clone(&log), true));

    let err = manager.run().unwrap_err();
    assert!(err.critical);
    assert_eq!(err.errors.len(), 1);
    assert_eq!(err.errors[0].stage, Stage::Load);
    assert_eq!(err.errors[0].plugin, "loader");
    // The failing stage never completed, and transform never ran.
    assert!(!manager.stage_completed(Stage::Load));
    let stages_seen: Vec<Stage> = log.lock().unwrap().iter().map(|(s, _)| *s).collect();
    assert!(!stages_seen.contains(&Stage::Transform));
}

#[test]
fn non_critical_errors_become_warnings_and_stage_continues() {
    let (manager, _dir) = manager();
    let log = Arc::new(Mutex::new(Vec::new()));
    let transform: &'static [Stage] = &[Stage::Transform];
    manager.register(Recorder::new("broken", 0, transform, Arc::clone(&log), true));
    manager.register(Recorder::new("healthy", 1, transform, Arc::clone(&log), false));

    manager.run().unwrap();
    let names: Vec<&str> = log.lock().unwrap().iter().map(|(_, n)| *n).collect();
    assert_eq!(names, vec!["broken", "healthy"], "stage continues past failure");

    let warnings = manager.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].stage, Stage::Transform);
    assert_eq!(warnings[0].plugin, "broken");
    assert!(manager.stage_completed(Stage::Transform));
}

#[test]
fn cleanup_errors_are_always_warnings() {
    let (manager, _dir) = manager();
    let log = Arc::new(Mutex::new(Vec::new()));
    let cleanup: &'static [Stage] = &[Stage::Cleanup];
    manager.register(Recorder::new("sweeper", 0, cleanup, Arc::clone(&log), true));

    manager.run().unwrap();
    assert_eq!(manager.warnings().len(), 1);
    assert_eq!(manager.warnings()[0].stage, Stage::Cleanup);
}

#[test]
fn run_to_skips_completed_stages_on_reentry() {
    let (manager, _dir) = manager();
    let log = Arc::new(Mutex::new(Vec::new()));
    let load: &'static [Stage] = &[Stage::Load];
    manager.register(Recorder::new("loader", 0, load, Arc::clone(&log), false));

    manager.run_to(Stage::Load).unwrap();
    manager.run_to(Stage::Load).unwrap();
    manager.run_to(Stage::Render).unwrap();
    assert_eq!(log.lock().unwrap().len(), 1, "load must run exactly once");
    assert!(manager.stage_completed(Stage::Render));
    assert!(!manager.stage_completed(Stage::Write));
}

#[test]
fn post_index_rebuilds_after_set_posts() {
    let (manager, _dir) = manager();
    manager.set_posts(vec![Document {
        path: "a.md".into(),
        slug: "a".into(),
        href: "/a/".into(),
        ..Default::default()
    }]);
    let index = manager.post_index();
    assert!(index.by_slug("a").is_some());
    assert!(index.by_slug("b").is_none());

    manager.add_post(Document {
        path: "b.md".into(),
        slug: "b".into(),
        href: "/b/".into(),
        ..Default::default()
    });
    let index = manager.post_index();
    assert_eq!(index.len(), 2);
    assert!(index.by_slug("b").is_some());
}

#[test]
fn filter_and_map_operations() {
    let (manager, _dir) = manager();
    manager.set_posts(vec![
        Document {
            path: "a.md".into(),
            slug: "a".into(),
            title: Some("Alpha".into()),
            date: Some("2024-02-01".into()),
            tags: vec!["go".into()],
            published: true,
            ..Default::default()
        },
        Document {
            path: "b.md".into(),
            slug: "b".into(),
            title: Some("Beta".into()),
            date: Some("2024-01-01".into()),
            tags: vec!["go".into(), "web".into()],
            published: true,
            ..Default::default()
        },
        Document {
            path: "c.md".into(),
            slug: "c".into(),
            title: Some("Gamma".into()),
            published: false,
            ..Default::default()
        },
    ]);

    let matched = manager.filter("published == true and 'go' in tags").unwrap();
    assert_eq!(matched.len(), 2);

    let titles = manager
        .map("title", "published == true", "date", true)
        .unwrap();
    assert_eq!(
        titles,
        vec![serde_json::json!("Alpha"), serde_json::json!("Beta")]
    );

    assert!(manager.filter("tags >=").is_err(), "parse error surfaces");
}

#[test]
fn concurrent_pass_mutates_documents_in_place() {
    let (manager, _dir) = manager();
    manager.set_posts(
        (0..20)
            .map(|i| Document {
                path: format!("p{i}.md"),
                content: "word ".repeat(i + 1),
                ..Default::default()
            })
            .collect(),
    );
    manager
        .process_posts_concurrently(|doc| {
            let words = doc.content.split_whitespace().count();
            doc.set_extra("word_count", serde_json::json!(words));
            Ok(())
        })
        .unwrap();
    for doc in manager.posts() {
        assert!(doc.extra.contains_key("word_count"), "{} missed", doc.path);
    }
}
