//! Quern entrypoint.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use core_cache::BuildCache;
use core_pipeline::Manager;
use core_site::register_default_plugins;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "quern", version, about = "Incremental static-site build engine")]
struct Args {
    /// Optional configuration file path (overrides discovery of `quern.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Content directory override.
    #[arg(long = "content")]
    content: Option<PathBuf>,
    /// Output directory override.
    #[arg(long = "out")]
    out: Option<PathBuf>,
    /// Cache directory override.
    #[arg(long = "cache-dir")]
    cache_dir: Option<PathBuf>,
    /// Worker pool size override (0 = auto).
    #[arg(long = "concurrency")]
    concurrency: Option<usize>,
    /// Stop after this stage (configure, validate, glob, load, transform,
    /// render, collect, write, cleanup).
    #[arg(long = "to")]
    to: Option<String>,
    /// After the build, list documents matching this filter expression.
    #[arg(long = "filter")]
    filter: Option<String>,
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join("quern.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(log_dir, "quern.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(_) => Some(guard),
        Err(_err) => {
            // Global tracing subscriber already installed; drop guard so writer shuts down.
            None
        }
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn main() -> Result<()> {
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", "startup");

    let args = Args::parse();
    let mut config = core_config::load_from(args.config.clone())?;
    if let Some(dir) = args.content {
        config.file.build.content_dir = dir;
    }
    if let Some(dir) = args.out {
        config.file.build.output_dir = dir;
    }
    if let Some(dir) = args.cache_dir {
        config.file.build.cache_dir = dir;
    }
    if let Some(n) = args.concurrency {
        config.file.build.concurrency = n;
    }

    let cache = Arc::new(BuildCache::open(&config.file.build.cache_dir));
    let manager = Manager::new(config, Arc::clone(&cache));
    register_default_plugins(&manager);

    info!(
        target: "runtime",
        concurrency = manager.concurrency(),
        "build_start"
    );
    let started = std::time::Instant::now();
    let target = match args.to.as_deref() {
        Some(name) => name.parse::<core_plugin::Stage>()?,
        None => core_plugin::Stage::Cleanup,
    };
    if let Err(e) = manager.run_to(target) {
        error!(target: "runtime", error = %e, "build_failed");
        anyhow::bail!("build failed: {e}");
    }

    for warning in manager.warnings() {
        eprintln!("warning: {warning}");
    }

    let stats = cache.stats();
    println!(
        "built {} document(s) in {:.2?}: {} rebuilt, {} skipped, {} warning(s)",
        manager.posts().len(),
        started.elapsed(),
        stats.rebuilt,
        stats.skipped,
        manager.warnings().len(),
    );

    if let Some(expr) = args.filter.as_deref() {
        let matched = manager
            .filter(expr)
            .map_err(|e| anyhow::anyhow!("invalid filter: {e}"))?;
        for doc in matched {
            println!("{}\t{}", doc.path, doc.title.as_deref().unwrap_or(""));
        }
    }
    Ok(())
}
