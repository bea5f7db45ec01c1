//! Build orchestration.
//!
//! ```text
//! Idle -> Validating -> Building -> [Signing] -> Reporting -> Done
//!            |             |            |
//!            +-------------+------------+-----> Failed(reason)
//! ```
//!
//! One [`Orchestrator`] drives exactly one build. Warnings collected during
//! validation are only reported once the archive has been sealed.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::archive::ArchiveBuilder;
use crate::error::{BaleError, BuildError};
use crate::spec::{load_spec, resolve_spec_path, Specification};
use crate::validate::{validate, Warning};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Validating,
    Building,
    Signing,
    Reporting,
    Done,
    Failed(String),
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Validating => f.write_str("validating"),
            Self::Building => f.write_str("building"),
            Self::Signing => f.write_str("signing"),
            Self::Reporting => f.write_str("reporting"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directory the archive is written to.
    pub output_dir: PathBuf,
    /// Overwrite an existing archive.
    pub force: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            force: false,
        }
    }
}

impl BuildOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            force: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Outcome of a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub success: bool,
    pub name: String,
    pub version: String,
    pub output_path: PathBuf,
    pub signed: bool,
    pub digest: String,
    pub warnings: Vec<String>,
}

impl BuildReport {
    /// Archive file name without directory.
    pub fn file_name(&self) -> String {
        self.output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The four-line success summary.
    pub fn success_lines(&self) -> [String; 4] {
        [
            "  Successfully built bale".to_string(),
            format!("  Name: {}", self.name),
            format!("  Version: {}", self.version),
            format!("  File: {}", self.file_name()),
        ]
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.success_lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

pub struct Orchestrator {
    options: BuildOptions,
    state: BuildState,
}

impl Orchestrator {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            state: BuildState::Idle,
        }
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    /// Resolve, load and build a spec file.
    pub fn build_file(&mut self, path: &Path) -> Result<BuildReport, BaleError> {
        self.ensure_idle()?;
        let spec = resolve_spec_path(path)
            .map_err(BaleError::from)
            .and_then(|resolved| load_spec(&resolved).map_err(BaleError::from));
        match spec {
            Ok(spec) => self.run(&spec),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Build an in-memory specification.
    pub fn run(&mut self, spec: &Specification) -> Result<BuildReport, BaleError> {
        self.ensure_idle()?;
        self.execute(spec).map_err(|e| self.fail(e))
    }

    fn execute(&mut self, spec: &Specification) -> Result<BuildReport, BaleError> {
        self.transition(BuildState::Validating);
        let validated = validate(spec)?;

        self.transition(BuildState::Building);
        let builder = ArchiveBuilder::new(&self.options.output_dir).force(self.options.force);
        let archive = builder.build_with(&validated, || self.transition(BuildState::Signing))?;

        self.transition(BuildState::Reporting);
        let report = BuildReport {
            success: true,
            name: validated.name().to_string(),
            version: validated.version().to_string(),
            output_path: archive.path,
            signed: archive.signed,
            digest: archive.digest.to_string(),
            warnings: validated.warnings().iter().map(Warning::to_string).collect(),
        };

        self.transition(BuildState::Done);
        info!(
            name = %report.name,
            version = %report.version,
            path = %report.output_path.display(),
            signed = report.signed,
            "build finished"
        );
        Ok(report)
    }

    fn ensure_idle(&self) -> Result<(), BaleError> {
        if self.state.is_terminal() {
            Err(BuildError::PipelineFinished.into())
        } else {
            Ok(())
        }
    }

    fn transition(&mut self, next: BuildState) {
        debug!(from = %self.state, to = %next, "build state");
        self.state = next;
    }

    fn fail(&mut self, error: BaleError) -> BaleError {
        self.transition(BuildState::Failed(error.to_string()));
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use std::fs;
    use tempfile::TempDir;

    fn spec() -> Specification {
        Specification::new("some_gem", "2").with_summary("this is a summary")
    }

    #[test]
    fn test_success_reaches_done_with_deferred_warning() {
        let out = TempDir::new().unwrap();
        let mut orchestrator = Orchestrator::new(BuildOptions::new(out.path()));

        let report = orchestrator.run(&spec()).unwrap();
        assert_eq!(orchestrator.state(), &BuildState::Done);
        assert_eq!(report.warnings, vec!["licenses is empty"]);
        assert!(!report.signed);
        assert_eq!(
            report.success_lines(),
            [
                "  Successfully built bale",
                "  Name: some_gem",
                "  Version: 2",
                "  File: some_gem-2.bale",
            ]
        );
        assert!(out.path().join("some_gem-2.bale").exists());
    }

    #[test]
    fn test_validation_failure_is_terminal_and_writes_nothing() {
        let out = TempDir::new().unwrap();
        let mut orchestrator = Orchestrator::new(BuildOptions::new(out.path()));

        let err = orchestrator.run(&spec().with_date("2010-11-8")).unwrap_err();
        assert!(matches!(
            err,
            BaleError::Validation(ValidationError::InvalidDateFormat { .. })
        ));
        assert!(matches!(orchestrator.state(), BuildState::Failed(_)));
        assert!(orchestrator.state().is_terminal());
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);

        let err = orchestrator.run(&spec()).unwrap_err();
        assert!(matches!(err, BaleError::Build(BuildError::PipelineFinished)));
    }

    #[test]
    fn test_second_run_is_rejected() {
        let out = TempDir::new().unwrap();
        let mut orchestrator = Orchestrator::new(BuildOptions::new(out.path()));
        orchestrator.run(&spec()).unwrap();

        let err = orchestrator.run(&spec()).unwrap_err();
        assert!(matches!(err, BaleError::Build(BuildError::PipelineFinished)));
        // The terminal state is not overwritten by the rejected run.
        assert_eq!(orchestrator.state(), &BuildState::Done);
    }

    #[test]
    fn test_missing_spec_file_fails_before_validation() {
        let tmp = TempDir::new().unwrap();
        let mut orchestrator = Orchestrator::new(BuildOptions::new(tmp.path()));

        let err = orchestrator
            .build_file(&tmp.path().join("some_gem"))
            .unwrap_err();
        assert!(matches!(
            err,
            BaleError::Build(BuildError::FileNotFound { .. })
        ));
        assert_eq!(err.exit_code(), 1);
        assert!(matches!(orchestrator.state(), BuildState::Failed(_)));
    }

    #[test]
    fn test_build_file_without_extension() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("some_gem.balespec"),
            "name: some_gem\nversion: 2\nsummary: this is a summary\nlicenses: [MIT]\n",
        )
        .unwrap();

        let mut orchestrator = Orchestrator::new(BuildOptions::new(tmp.path()));
        let report = orchestrator
            .build_file(&tmp.path().join("some_gem"))
            .unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(report.output_path, tmp.path().join("some_gem-2.bale"));
    }
}
