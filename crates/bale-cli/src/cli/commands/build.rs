//! `bale build` - Build archives from spec files.
//!
//! Each spec gets its own orchestrator on tokio's blocking pool. Results are
//! printed in argument order once every build has finished.

use std::path::{Path, PathBuf};

use anyhow::Context;
use bale_core::{
    resolve_spec_path, BaleConfig, BaleError, BuildError, BuildOptions, BuildReport, Orchestrator,
};

use crate::cli::args::BuildArgs;
use crate::exit_codes;

enum Outcome {
    SpecNotFound,
    Built(BuildReport),
    Failed(BaleError),
}

pub async fn run(args: BuildArgs) -> anyhow::Result<i32> {
    let mut config = BaleConfig::from_env();
    if let Some(dir) = &args.output_dir {
        config = config.with_output_dir(dir);
    }
    let options = config.build_options(args.force);

    let tasks: Vec<_> = args
        .specs
        .iter()
        .cloned()
        .map(|spec| {
            let options = options.clone();
            tokio::task::spawn_blocking(move || build_one(&spec, options))
        })
        .collect();

    let mut code = exit_codes::SUCCESS;
    for (spec, task) in args.specs.iter().zip(tasks) {
        let outcome = task
            .await
            .with_context(|| format!("build task for {} panicked", spec.display()))?;
        let status = print_outcome(spec, outcome, args.json)?;
        if code == exit_codes::SUCCESS {
            code = status;
        }
    }
    Ok(code)
}

fn build_one(spec: &Path, options: BuildOptions) -> Outcome {
    let resolved: PathBuf = match resolve_spec_path(spec) {
        Ok(path) => path,
        Err(BuildError::FileNotFound { .. }) => return Outcome::SpecNotFound,
        Err(e) => return Outcome::Failed(e.into()),
    };
    match Orchestrator::new(options).build_file(&resolved) {
        Ok(report) => Outcome::Built(report),
        Err(e) => Outcome::Failed(e),
    }
}

fn print_outcome(spec: &Path, outcome: Outcome, json: bool) -> anyhow::Result<i32> {
    match outcome {
        Outcome::SpecNotFound => {
            eprintln!("ERROR:  Spec file not found: {}", spec.display());
            Ok(exit_codes::SPEC_ERROR)
        }
        Outcome::Built(report) => {
            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                print!("{report}");
            }
            for warning in &report.warnings {
                eprintln!("WARNING:  {warning}");
            }
            Ok(exit_codes::SUCCESS)
        }
        Outcome::Failed(e) if e.is_spec_error() => {
            eprintln!("{e}");
            eprintln!("ERROR:  Error loading spec. Aborting.");
            Ok(e.exit_code())
        }
        Outcome::Failed(e) => {
            eprintln!("ERROR:  {e}");
            Ok(e.exit_code())
        }
    }
}
