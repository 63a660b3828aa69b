//! Content discovery and front-matter parsing.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info};

use core_cache::hash_hex;
use core_model::{Document, slugify, split_frontmatter};
use core_pipeline::{Manager, Plugin, StageHook};
use core_plugin::PRIORITY_FIRST;

/// Parse one content file into a [`Document`]. Front-matter is TOML between
/// `+++` fences; the raw text between the fences is preserved verbatim so
/// input hashes stay parser-independent. The slug falls back to the
/// slugified file stem, the href to `/<slug>/`.
pub fn parse_document(path: &str, text: &str, default_template: &str) -> Result<Document> {
    let (raw_frontmatter, body) = split_frontmatter(text);
    let meta: toml::Table = toml::from_str(raw_frontmatter)
        .with_context(|| format!("malformed front-matter in {path}"))?;

    let str_field = |key: &str| meta.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let list_field = |key: &str| -> Vec<String> {
        meta.get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    let bool_field = |key: &str, default: bool| {
        meta.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    };

    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled");
    let slug = str_field("slug").unwrap_or_else(|| slugify(stem));

    Ok(Document {
        href: format!("/{slug}/"),
        title: str_field("title"),
        date: str_field("date"),
        description: str_field("description"),
        tags: list_field("tags"),
        authors: list_field("authors"),
        aliases: list_field("aliases"),
        template: str_field("template").unwrap_or_else(|| default_template.to_string()),
        // `published` defaults true so bare notes still build; drafts opt out.
        published: bool_field("published", true),
        draft: bool_field("draft", false),
        private: bool_field("private", false),
        skip: bool_field("skip", false),
        content: body.to_string(),
        raw_frontmatter: raw_frontmatter.to_string(),
        slug,
        path: path.to_string(),
        extra: Default::default(),
    })
}

/// Built-in source plugin: configure, validate, glob, and load.
pub struct LoaderPlugin {
    configure: ConfigureHook,
    validate: ValidateHook,
    glob: GlobHook,
    load: LoadHook,
}

impl LoaderPlugin {
    pub fn new() -> Self {
        Self {
            configure: ConfigureHook,
            validate: ValidateHook,
            glob: GlobHook,
            load: LoadHook,
        }
    }
}

impl Default for LoaderPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for LoaderPlugin {
    fn name(&self) -> &'static str {
        "loader"
    }
    fn priority(&self) -> i32 {
        PRIORITY_FIRST
    }
    fn configure_hook(&self) -> Option<&dyn StageHook> {
        Some(&self.configure)
    }
    fn validate_hook(&self) -> Option<&dyn StageHook> {
        Some(&self.validate)
    }
    fn glob_hook(&self) -> Option<&dyn StageHook> {
        Some(&self.glob)
    }
    fn load_hook(&self) -> Option<&dyn StageHook> {
        Some(&self.load)
    }
}

struct ConfigureHook;

impl StageHook for ConfigureHook {
    /// Seed the bulk-invalidation hashes. A config edit or a change to the
    /// built-in page template invalidates every cached document record.
    fn run(&self, manager: &Manager) -> Result<()> {
        let config = manager.config();
        let cache = manager.build_cache();
        let config_text = config.raw.clone().unwrap_or_default();
        cache.set_config_hash(&hash_hex(config_text.as_bytes()));
        cache.set_templates_hash(&hash_hex(crate::page::PAGE_SHELL.as_bytes()));
        Ok(())
    }
}

struct ValidateHook;

impl StageHook for ValidateHook {
    fn run(&self, manager: &Manager) -> Result<()> {
        let config = manager.config();
        let dir = &config.file.build.content_dir;
        anyhow::ensure!(
            dir.is_dir(),
            "content directory {} does not exist",
            dir.display()
        );
        Ok(())
    }
}

struct GlobHook;

impl StageHook for GlobHook {
    fn run(&self, manager: &Manager) -> Result<()> {
        let config = manager.config();
        let patterns = &config.file.build.glob_patterns;
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(
                Glob::new(pattern).with_context(|| format!("invalid glob pattern {pattern:?}"))?,
            );
        }
        let set = builder.build()?;

        let root = &config.file.build.content_dir;
        let mut files = Vec::new();
        walk(root, root, &set, &mut files)?;
        files.sort();

        let pattern_hash = hash_hex(patterns.join("\0").as_bytes());
        manager.build_cache().set_glob_snapshot(
            files
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            &pattern_hash,
        );
        info!(target: "io", files = files.len(), "content_files_globbed");
        manager.set_files(files);
        Ok(())
    }
}

fn walk(
    root: &Path,
    dir: &Path,
    set: &GlobSet,
    out: &mut Vec<std::path::PathBuf>,
) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, set, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            // Patterns match the path relative to the content root, so
            // `*.md` and `posts/**/*.md` both behave.
            if set.is_match(rel) || rel.file_name().is_some_and(|n| set.is_match(n)) {
                out.push(path);
            }
        }
    }
    Ok(())
}

struct LoadHook;

impl StageHook for LoadHook {
    /// Read every globbed file into a document, consulting the parsed-post
    /// side-car keyed by path + mtime before parsing front-matter. Load is
    /// a critical stage: the first unreadable file aborts the build.
    fn run(&self, manager: &Manager) -> Result<()> {
        let config = manager.config();
        let cache = manager.build_cache();
        let root = &config.file.build.content_dir;
        let default_template = &config.file.build.default_template;

        let mut docs = Vec::new();
        let mut parsed = 0usize;
        let mut from_cache = 0usize;
        for file in manager.files() {
            let rel = file
                .strip_prefix(root)
                .unwrap_or(&file)
                .to_string_lossy()
                .replace('\\', "/");
            let meta =
                fs::metadata(&file).with_context(|| format!("stat {}", file.display()))?;
            let mod_time = mtime_nanos(&meta);

            if let Some(doc) = cache.cached_post(&rel, mod_time) {
                from_cache += 1;
                docs.push(doc);
                continue;
            }
            let text = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let doc = parse_document(&rel, &text, default_template)?;
            cache.store_post(&rel, mod_time, &doc);
            parsed += 1;
            docs.push(doc);
        }
        debug!(target: "io", parsed, from_cache, "documents_loaded");
        manager.set_posts(docs);
        Ok(())
    }
}

pub(crate) fn mtime_nanos(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_frontmatter() {
        let text = "+++\ntitle = \"Hello\"\ndate = \"2024-03-01\"\ntags = [\"go\", \"web\"]\nauthors = [\"alice\"]\naliases = [\"old-hello\"]\ndraft = true\n+++\n# Heading\n";
        let doc = parse_document("posts/hello-world.md", text, "post.html").unwrap();
        assert_eq!(doc.slug, "hello-world");
        assert_eq!(doc.href, "/hello-world/");
        assert_eq!(doc.title.as_deref(), Some("Hello"));
        assert_eq!(doc.tags, vec!["go", "web"]);
        assert_eq!(doc.aliases, vec!["old-hello"]);
        assert!(doc.draft);
        assert!(doc.published, "published defaults true");
        assert_eq!(doc.content, "# Heading\n");
        assert_eq!(doc.template, "post.html");
        assert!(doc.raw_frontmatter.contains("title = \"Hello\""));
    }

    #[test]
    fn slug_override_and_template_override() {
        let text = "+++\nslug = \"custom\"\ntemplate = \"page.html\"\n+++\nbody";
        let doc = parse_document("whatever.md", text, "post.html").unwrap();
        assert_eq!(doc.slug, "custom");
        assert_eq!(doc.template, "page.html");
    }

    #[test]
    fn bare_markdown_has_empty_frontmatter() {
        let doc = parse_document("My Note.md", "just text", "post.html").unwrap();
        assert_eq!(doc.raw_frontmatter, "");
        assert_eq!(doc.slug, "my-note");
        assert_eq!(doc.content, "just text");
    }

    #[test]
    fn malformed_frontmatter_is_an_error() {
        let text = "+++\nnot = toml =\n+++\nbody";
        assert!(parse_document("a.md", text, "post.html").is_err());
    }
}
