//! Configuration loading and parsing.
//!
//! Parses `quern.toml` (or an override path provided by the binary). Every
//! field has a default so a missing or malformed file never blocks a build;
//! parse failures degrade to defaults with a warning. Unknown fields are
//! ignored (TOML deserialization tolerance) to allow forward evolution.

use std::{fs, path::PathBuf};

use anyhow::Result;
use serde::Deserialize;
use tracing::{info, warn};

/// Parsed `[build]` table.
#[derive(Debug, Deserialize, Clone)]
pub struct BuildConfig {
    /// Directory scanned for content files.
    #[serde(default = "BuildConfig::default_content_dir")]
    pub content_dir: PathBuf,
    /// Directory the output tree is written into.
    #[serde(default = "BuildConfig::default_output_dir")]
    pub output_dir: PathBuf,
    /// Directory holding `build-cache.json` and the side-car caches.
    #[serde(default = "BuildConfig::default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Glob patterns selecting content files, relative to `content_dir`.
    #[serde(default = "BuildConfig::default_glob_patterns")]
    pub glob_patterns: Vec<String>,
    /// Worker pool size for per-document stages. 0 means auto
    /// (`min(cpu count, 16)`, at least 1).
    #[serde(default)]
    pub concurrency: usize,
    /// Template identifier assigned to documents that declare none.
    #[serde(default = "BuildConfig::default_template")]
    pub default_template: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            content_dir: Self::default_content_dir(),
            output_dir: Self::default_output_dir(),
            cache_dir: Self::default_cache_dir(),
            glob_patterns: Self::default_glob_patterns(),
            concurrency: 0,
            default_template: Self::default_template(),
        }
    }
}

impl BuildConfig {
    fn default_content_dir() -> PathBuf {
        PathBuf::from("content")
    }
    fn default_output_dir() -> PathBuf {
        PathBuf::from("public")
    }
    fn default_cache_dir() -> PathBuf {
        PathBuf::from(".quern-cache")
    }
    fn default_glob_patterns() -> Vec<String> {
        vec!["*.md".to_string()]
    }
    fn default_template() -> String {
        "post.html".to_string()
    }
}

/// Parsed `[site]` table.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SiteConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub site: SiteConfig,
    /// Free-form plugin settings keyed by plugin name.
    #[serde(default)]
    pub extra: toml::Table,
}

/// Effective engine configuration handed to the pipeline manager.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub file: ConfigFile,    // parsed (or default) data
}

impl Config {
    /// Worker pool size after applying the auto rule. Always at least 1 and
    /// never larger than 16 unless explicitly configured.
    pub fn effective_concurrency(&self, cpu_count: usize) -> usize {
        match self.file.build.concurrency {
            0 => cpu_count.clamp(1, 16),
            n => n,
        }
    }

    /// Free-form settings for one plugin, if configured.
    pub fn plugin_table(&self, plugin: &str) -> Option<&toml::Table> {
        self.file.extra.get(plugin).and_then(|v| v.as_table())
    }
}

/// Best-effort config path: a local `quern.toml` wins, then the platform
/// config dir (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from("quern.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("quern").join("quern.toml");
    }
    PathBuf::from("quern.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(target: "config", path = %path.display(), "config_loaded");
                Ok(Config {
                    raw: Some(content),
                    file,
                })
            }
            Err(e) => {
                warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
                Ok(Config::default())
            }
        }
    } else {
        Ok(Config::default())
    }
}
