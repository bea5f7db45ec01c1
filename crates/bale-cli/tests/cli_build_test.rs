//! Integration tests for `bale build`.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const SOME_GEM: &str = "\
name: some_gem
version: 2
summary: this is a summary
licenses: [MIT]
files:
  - lib/some_gem.rb
";

fn bale_cmd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bale"));
    cmd.env_remove("BALE_OUTPUT_DIR")
        .env_remove("BALE_SECURITY_POLICY")
        .env_remove("BALE_TRUST_DIR")
        .env("RUST_LOG", "off");
    cmd
}

fn write_package(dir: &Path, spec_source: &str) {
    fs::create_dir_all(dir.join("lib")).unwrap();
    fs::write(dir.join("lib/some_gem.rb"), "module SomeGem; end\n").unwrap();
    fs::write(dir.join("some_gem.balespec"), spec_source).unwrap();
}

#[test]
fn test_build_prints_four_line_summary() {
    let tmp = TempDir::new().unwrap();
    write_package(tmp.path(), SOME_GEM);

    let output = bale_cmd()
        .current_dir(tmp.path())
        .args(["build", "some_gem"])
        .output()
        .expect("failed to run bale build");

    assert!(output.status.success(), "build should succeed");
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "  Successfully built bale\n  Name: some_gem\n  Version: 2\n  File: some_gem-2.bale\n"
    );
    assert!(output.stderr.is_empty(), "no warnings expected");
    assert!(tmp.path().join("some_gem-2.bale").exists());
}

#[test]
fn test_missing_spec_reports_argument() {
    let tmp = TempDir::new().unwrap();

    bale_cmd()
        .current_dir(tmp.path())
        .args(["build", "some_gem"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ERROR:  Spec file not found: some_gem"));
}

#[test]
fn test_invalid_date_aborts_with_message() {
    let tmp = TempDir::new().unwrap();
    write_package(
        tmp.path(),
        &SOME_GEM.replace("licenses: [MIT]\n", "licenses: [MIT]\ndate: 2010-11-8\n"),
    );

    bale_cmd()
        .current_dir(tmp.path())
        .args(["build", "some_gem.balespec"])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(
            predicate::str::contains("invalid date format in specification: \"2010-11-8\"")
                .and(predicate::str::contains("ERROR:  Error loading spec. Aborting.")),
        );
    assert!(!tmp.path().join("some_gem-2.bale").exists());
}

#[test]
fn test_empty_licenses_warns_on_stderr_only() {
    let tmp = TempDir::new().unwrap();
    write_package(tmp.path(), &SOME_GEM.replace("licenses: [MIT]\n", ""));

    bale_cmd()
        .current_dir(tmp.path())
        .args(["build", "some_gem"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Successfully built bale").and(
            predicate::str::contains("WARNING").not(),
        ))
        .stderr(predicate::str::contains("WARNING:  licenses is empty"));
}

#[test]
fn test_existing_archive_needs_force() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("pkg");
    write_package(tmp.path(), SOME_GEM);

    let build = |force: bool| {
        let mut cmd = bale_cmd();
        cmd.current_dir(tmp.path())
            .args(["build", "some_gem", "--output-dir"])
            .arg(&out);
        if force {
            cmd.arg("--force");
        }
        cmd.output().expect("failed to run bale build")
    };

    assert!(build(false).status.success());
    let second = build(false);
    assert_eq!(second.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&second.stderr).contains("already exists"));
    assert!(build(true).status.success());
}

#[test]
fn test_output_dir_from_env() {
    let tmp = TempDir::new().unwrap();
    write_package(tmp.path(), SOME_GEM);

    bale_cmd()
        .current_dir(tmp.path())
        .env("BALE_OUTPUT_DIR", "dist")
        .args(["build", "some_gem"])
        .assert()
        .success();
    assert!(tmp.path().join("dist/some_gem-2.bale").exists());
}

#[test]
fn test_json_report() {
    let tmp = TempDir::new().unwrap();
    write_package(tmp.path(), SOME_GEM);

    let output = bale_cmd()
        .current_dir(tmp.path())
        .args(["build", "--json", "some_gem"])
        .output()
        .expect("failed to run bale build --json");
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["success"], true);
    assert_eq!(report["name"], "some_gem");
    assert_eq!(report["version"], "2");
    assert_eq!(report["signed"], false);
    assert!(report["output_path"]
        .as_str()
        .unwrap()
        .ends_with("some_gem-2.bale"));
    assert_eq!(report["warnings"], serde_json::json!([]));
}

#[test]
fn test_several_specs_report_in_order_and_first_failure_wins() {
    let tmp = TempDir::new().unwrap();
    write_package(tmp.path(), SOME_GEM);
    fs::write(
        tmp.path().join("other.balespec"),
        "name: other\nversion: 1.0.a\nsummary: another\nlicenses: [MIT]\n",
    )
    .unwrap();

    let output = bale_cmd()
        .current_dir(tmp.path())
        .args(["build", "some_gem", "missing", "other"])
        .output()
        .expect("failed to run bale build");

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.find("File: some_gem-2.bale").unwrap();
    let second = stdout.find("File: other-1.0.a.bale").unwrap();
    assert!(first < second);
    assert!(String::from_utf8_lossy(&output.stderr).contains("Spec file not found: missing"));
}
