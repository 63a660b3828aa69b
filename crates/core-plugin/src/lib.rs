//! Pipeline stage vocabulary and the plugin error taxonomy.
//!
//! A build advances through a fixed sequence of named stages; plugins opt
//! into the subset they implement. This crate owns the stage enum, the
//! intra-stage priority constants, and the typed errors a stage run can
//! produce. The plugin trait itself lives beside the pipeline manager, whose
//! hooks it receives.
//!
//! Failure classes:
//! * Critical stages (configure, validate, glob, load): the first error
//!   aborts the build and surfaces as [`HookErrors`] with `critical = true`.
//! * Non-critical stages (transform, render, collect, write): errors are
//!   collected as [`Warning`]s and the stage continues.
//! * Cleanup errors are always warnings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named phases of the build pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Configure,
    Validate,
    Glob,
    Load,
    Transform,
    Render,
    Collect,
    Write,
    Cleanup,
}

impl Stage {
    /// Every stage in strict execution order.
    pub const ALL: [Stage; 9] = [
        Stage::Configure,
        Stage::Validate,
        Stage::Glob,
        Stage::Load,
        Stage::Transform,
        Stage::Render,
        Stage::Collect,
        Stage::Write,
        Stage::Cleanup,
    ];

    /// Whether a plugin error in this stage aborts the build.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            Stage::Configure | Stage::Validate | Stage::Glob | Stage::Load
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Configure => "configure",
            Stage::Validate => "validate",
            Stage::Glob => "glob",
            Stage::Load => "load",
            Stage::Transform => "transform",
            Stage::Render => "render",
            Stage::Collect => "collect",
            Stage::Write => "write",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for a stage name that is not part of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown pipeline stage: {0:?}")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

// Intra-stage plugin ordering: lower runs first, ties break on registration
// order (stable sort).
pub const PRIORITY_FIRST: i32 = -1000;
pub const PRIORITY_EARLY: i32 = -100;
pub const PRIORITY_DEFAULT: i32 = 0;
pub const PRIORITY_LATE: i32 = 100;
pub const PRIORITY_LAST: i32 = 1000;

/// One plugin failure, tagged with where it happened.
#[derive(Debug, Error)]
#[error("plugin {plugin:?} failed during {stage}: {source}")]
pub struct HookError {
    pub stage: Stage,
    pub plugin: String,
    #[source]
    pub source: anyhow::Error,
}

impl HookError {
    pub fn new(stage: Stage, plugin: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            stage,
            plugin: plugin.into(),
            source,
        }
    }
}

/// Aggregate failure surfaced to the build caller. `critical` is set when
/// the originating stage aborts the build.
#[derive(Debug)]
pub struct HookErrors {
    pub errors: Vec<HookError>,
    pub critical: bool,
}

impl std::error::Error for HookErrors {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Display for HookErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.critical { "fatal" } else { "non-fatal" };
        write!(f, "{} plugin error(s) ({kind})", self.errors.len())?;
        if let Some(first) = self.errors.first() {
            write!(f, ": {first}")?;
        }
        Ok(())
    }
}

/// A non-fatal error collected during a non-critical stage. Same shape as
/// [`HookError`] but kept separate so warnings never type-confuse with the
/// abort path.
#[derive(Debug, Clone)]
pub struct Warning {
    pub stage: Stage,
    pub plugin: String,
    pub message: String,
}

impl Warning {
    pub fn new(stage: Stage, plugin: impl Into<String>, err: &anyhow::Error) -> Self {
        Self {
            stage,
            plugin: plugin.into(),
            message: format!("{err:#}"),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.plugin, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_total_and_fixed() {
        let mut sorted = Stage::ALL;
        sorted.sort();
        assert_eq!(sorted, Stage::ALL, "declaration order must match Ord");
        assert!(Stage::Configure < Stage::Cleanup);
    }

    #[test]
    fn criticality_split() {
        for stage in [Stage::Configure, Stage::Validate, Stage::Glob, Stage::Load] {
            assert!(stage.is_critical(), "{stage} must be critical");
        }
        for stage in [
            Stage::Transform,
            Stage::Render,
            Stage::Collect,
            Stage::Write,
            Stage::Cleanup,
        ] {
            assert!(!stage.is_critical(), "{stage} must be non-critical");
        }
    }

    #[test]
    fn stage_parses_from_name() {
        for stage in Stage::ALL {
            assert_eq!(stage.name().parse::<Stage>().unwrap(), stage);
        }
        let err = "deploy".parse::<Stage>().unwrap_err();
        assert_eq!(err, UnknownStage("deploy".to_string()));
    }

    #[test]
    fn hook_errors_display_reports_first_cause() {
        let errs = HookErrors {
            errors: vec![HookError::new(
                Stage::Load,
                "loader",
                anyhow::anyhow!("boom"),
            )],
            critical: true,
        };
        let text = errs.to_string();
        assert!(text.contains("fatal"), "got: {text}");
        assert!(text.contains("loader"), "got: {text}");
        assert!(text.contains("boom"), "got: {text}");
    }
}
