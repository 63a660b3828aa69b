//! The plugin trait and its per-stage capability probes.
//!
//! A plugin participates in a stage iff the matching probe returns a hook.
//! Default implementations return `None`, so implementors override only the
//! stages they care about; the manager discovers capabilities by probing,
//! never by configuration.
//!
//! Hooks run on the manager thread in priority order (ascending, stable on
//! registration order). A hook that needs per-document parallelism calls
//! back into [`Manager::process_posts_concurrently`] rather than spawning
//! its own threads.
//!
//! [`Manager::process_posts_concurrently`]: crate::Manager::process_posts_concurrently

use crate::Manager;

/// One stage handler. The same trait serves every stage; which stage a hook
/// runs in is decided by which probe returned it.
pub trait StageHook: Send + Sync {
    fn run(&self, manager: &Manager) -> anyhow::Result<()>;
}

/// Blanket impl so plain closures can serve as hooks.
impl<F> StageHook for F
where
    F: Fn(&Manager) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        self(manager)
    }
}

/// An extensible pipeline participant.
///
/// Ordering contract for incremental plugins: rebuild *markings*
/// (`mark_rebuilt_with_slug`) belong in the stage that does the work;
/// rebuild *decisions* (`should_rebuild_with_slug`) must happen in a later
/// stage. Interleaving both within one stage observes an unspecified subset
/// of markings.
pub trait Plugin: Send + Sync {
    /// Stable identifier used in logs, warnings, and error tags.
    fn name(&self) -> &'static str;

    /// Intra-stage ordering; lower runs first, ties break on registration
    /// order. See the `PRIORITY_*` constants in `core-plugin`.
    fn priority(&self) -> i32 {
        core_plugin::PRIORITY_DEFAULT
    }

    fn configure_hook(&self) -> Option<&dyn StageHook> {
        None
    }
    fn validate_hook(&self) -> Option<&dyn StageHook> {
        None
    }
    fn glob_hook(&self) -> Option<&dyn StageHook> {
        None
    }
    fn load_hook(&self) -> Option<&dyn StageHook> {
        None
    }
    fn transform_hook(&self) -> Option<&dyn StageHook> {
        None
    }
    fn render_hook(&self) -> Option<&dyn StageHook> {
        None
    }
    fn collect_hook(&self) -> Option<&dyn StageHook> {
        None
    }
    fn write_hook(&self) -> Option<&dyn StageHook> {
        None
    }
    fn cleanup_hook(&self) -> Option<&dyn StageHook> {
        None
    }
}

pub(crate) fn stage_hook<'a>(
    plugin: &'a dyn Plugin,
    stage: core_plugin::Stage,
) -> Option<&'a dyn StageHook> {
    use core_plugin::Stage;
    match stage {
        Stage::Configure => plugin.configure_hook(),
        Stage::Validate => plugin.validate_hook(),
        Stage::Glob => plugin.glob_hook(),
        Stage::Load => plugin.load_hook(),
        Stage::Transform => plugin.transform_hook(),
        Stage::Render => plugin.render_hook(),
        Stage::Collect => plugin.collect_hook(),
        Stage::Write => plugin.write_hook(),
        Stage::Cleanup => plugin.cleanup_hook(),
    }
}
