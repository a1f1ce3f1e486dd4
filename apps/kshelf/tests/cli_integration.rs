#![warn(clippy::pedantic)]

//! Integration tests for the kshelf CLI.
//!
//! These tests spawn the compiled binary against an isolated `KSHELF_HOME`
//! and validate stdout, stderr, exit codes and the files left behind.
//!
//! ## Test Strategy
//!
//! 1. **Help and headless mode**: CLI metadata, no TUI without a terminal
//! 2. **Listing**: releases from a seeded snapshot, text and JSON
//! 3. **Choosing**: requires a downloaded release, persisted across runs
//! 4. **Removing**: deletes the artifact and clears the choice
//! 5. **Offline behavior**: an unreachable registry fails cleanly and keeps
//!    the known state
//!
//! ## Test Infrastructure
//!
//! - `assert_cmd` spawns the binary
//! - `assert_fs` builds the home directory
//! - `predicates` matches output
//! - `KSHELF_REGISTRY` and `KSHELF_REPOSITORY` point at a closed port so no
//!   test reaches the network

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

const UNREACHABLE: &str = "http://127.0.0.1:1";

const SNAPSHOT: &str = r#"[
  {"version": "2.0.20", "timestamp": 1724320800000},
  {"version": "2.0.10", "timestamp": 1722470400000}
]"#;

const DOWNLOADED_JAR: &str = "compilers/2.0.20-1724320800000.jar";

/// A home directory with a two-release snapshot; 2.0.20 is downloaded.
fn seeded_home() -> assert_fs::TempDir {
    let home = assert_fs::TempDir::new().unwrap();
    home.child("releases.json").write_str(SNAPSHOT).unwrap();
    home.child(DOWNLOADED_JAR).write_binary(b"PK\x03\x04").unwrap();
    home
}

fn kshelf(home: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("kshelf"));
    cmd.env("KSHELF_HOME", home.path())
        .env("KSHELF_REGISTRY", UNREACHABLE)
        .env("KSHELF_REPOSITORY", UNREACHABLE)
        .env("KSHELF_NO_TUI", "1")
        .env_remove("KSHELF_LOG");
    cmd
}

// -----------------------------------------------------------------------------
// Help and Headless Mode
// -----------------------------------------------------------------------------

#[test]
fn help_shows_available_commands() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("kshelf"));
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("versions"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("choose"))
        .stdout(predicate::str::contains("KSHELF_HOME"));
}

#[test]
fn headless_mode_without_command_shows_info() {
    let home = assert_fs::TempDir::new().unwrap();
    let mut cmd = kshelf(&home);
    cmd.env_remove("KSHELF_NO_TUI").arg("--headless");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("kshelf"))
        .stdout(predicate::str::contains("--help"));
}

/// `KSHELF_NO_TUI` alone must keep the TUI from starting.
#[test]
fn no_tui_environment_shows_info() {
    let home = assert_fs::TempDir::new().unwrap();

    kshelf(&home)
        .assert()
        .success()
        .stdout(predicate::str::contains("kshelf --help"));
}

#[test]
fn download_requires_version() {
    let home = assert_fs::TempDir::new().unwrap();

    kshelf(&home)
        .arg("download")
        .assert()
        .failure()
        .stderr(predicate::str::contains("VERSION"));
}

// -----------------------------------------------------------------------------
// Listing
// -----------------------------------------------------------------------------

#[test]
fn versions_lists_snapshot_newest_first() {
    let home = seeded_home();

    let output = kshelf(&home).arg("versions").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();

    let newer = stdout.find("2.0.20  2024-08-22  downloaded").unwrap();
    let older = stdout.find("2.0.10  2024-08-01  not downloaded").unwrap();
    assert!(newer < older);
}

#[test]
fn versions_downloaded_filter() {
    let home = seeded_home();

    kshelf(&home)
        .args(["versions", "--downloaded"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2.0.20"))
        .stdout(predicate::str::contains("2.0.10").not());
}

#[test]
fn versions_json_output() {
    let home = seeded_home();

    let output = kshelf(&home).args(["versions", "--json"]).output().unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(rows[0]["version"], "2.0.20");
    assert_eq!(rows[0]["state"], "downloaded");
    assert_eq!(rows[0]["chosen"], false);
    assert_eq!(rows[1]["version"], "2.0.10");
    assert_eq!(rows[1]["state"], "not_downloaded");
}

/// An artifact deleted behind kshelf's back shows as not downloaded.
#[test]
fn missing_artifact_reads_as_not_downloaded() {
    let home = seeded_home();
    std::fs::remove_file(home.path().join(DOWNLOADED_JAR)).unwrap();

    kshelf(&home)
        .arg("versions")
        .assert()
        .success()
        .stdout(predicate::str::contains("2.0.20  2024-08-22  not downloaded"));
}

// -----------------------------------------------------------------------------
// Choosing
// -----------------------------------------------------------------------------

#[test]
fn choose_persists_across_runs() {
    let home = seeded_home();

    kshelf(&home)
        .args(["choose", "2.0.20"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2.0.20 is now chosen"));

    home.child("chosen.json")
        .assert(r#"{"version":"2.0.20","timestamp":1724320800000}"#);

    kshelf(&home)
        .arg("current")
        .assert()
        .success()
        .stdout(predicate::str::contains("Chosen release: 2.0.20 (2024-08-22)"))
        .stdout(predicate::str::contains("2.0.20-1724320800000.jar"));

    kshelf(&home)
        .arg("versions")
        .assert()
        .success()
        .stdout(predicate::str::contains("* 2.0.20"));
}

#[test]
fn choose_rejects_release_not_downloaded() {
    let home = seeded_home();

    kshelf(&home)
        .args(["choose", "2.0.10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not downloaded"));

    home.child("chosen.json").assert(predicate::path::missing());
}

#[test]
fn choose_clear_resets_choice() {
    let home = seeded_home();
    home.child("chosen.json")
        .write_str(r#"{"version":"2.0.20","timestamp":1724320800000}"#)
        .unwrap();

    kshelf(&home)
        .args(["choose", "--clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cleared"));

    home.child("chosen.json").assert("null");
}

/// A chosen record naming a release that is no longer downloaded is dropped
/// on load.
#[test]
fn stale_chosen_record_is_dropped() {
    let home = seeded_home();
    home.child("chosen.json")
        .write_str(r#"{"version":"2.0.10","timestamp":1722470400000}"#)
        .unwrap();

    kshelf(&home)
        .arg("current")
        .assert()
        .success()
        .stdout(predicate::str::contains("No release is chosen"));

    home.child("chosen.json").assert("null");
}

#[test]
fn current_path_fails_without_choice() {
    let home = seeded_home();

    kshelf(&home)
        .args(["current", "--path"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no release is chosen"));
}

#[test]
fn unknown_version_is_reported() {
    let home = seeded_home();

    kshelf(&home)
        .args(["choose", "9.9.9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("release 9.9.9 not found"));
}

// -----------------------------------------------------------------------------
// Removing
// -----------------------------------------------------------------------------

#[test]
fn remove_deletes_artifact_and_clears_choice() {
    let home = seeded_home();
    home.child("chosen.json")
        .write_str(r#"{"version":"2.0.20","timestamp":1724320800000}"#)
        .unwrap();

    kshelf(&home)
        .args(["remove", "2.0.20"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Release 2.0.20 removed"))
        .stdout(predicate::str::contains("no release is chosen now"));

    home.child(DOWNLOADED_JAR).assert(predicate::path::missing());
    home.child("chosen.json").assert("null");
}

#[test]
fn remove_rejects_release_not_downloaded() {
    let home = seeded_home();

    kshelf(&home)
        .args(["remove", "2.0.10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not downloaded"));
}

// -----------------------------------------------------------------------------
// Offline Behavior
// -----------------------------------------------------------------------------

/// A failed fetch leaves the snapshot and artifacts alone.
#[test]
fn refresh_without_network_keeps_state() {
    let home = seeded_home();

    kshelf(&home)
        .arg("refresh")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));

    home.child("releases.json").assert(SNAPSHOT);
    home.child(DOWNLOADED_JAR).assert(predicate::path::exists());
}

#[test]
fn cold_start_without_snapshot_needs_network() {
    let home = assert_fs::TempDir::new().unwrap();

    kshelf(&home)
        .arg("versions")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load the release list"));

    home.child("releases.json").assert(predicate::path::missing());
}

#[test]
fn invalid_config_is_reported() {
    let home = seeded_home();
    home.child("config.toml").write_str("rows = 0\n").unwrap();

    kshelf(&home)
        .arg("versions")
        .assert()
        .failure()
        .stderr(predicate::str::contains("rows must be at least 1"));
}
