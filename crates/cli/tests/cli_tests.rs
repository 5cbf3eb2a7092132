// Integration tests for the `fleetgrid` binary against a temporary store file.
// Run with: cargo test -p fleetgrid-cli --test cli_tests -- --nocapture

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("settings.json"), "{}\n").expect("write settings");
        Self { dir }
    }

    fn store(&self) -> PathBuf {
        self.dir.path().join("grid.json")
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("settings.json")
    }

    fn cmd(&self, kind: &str) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_fleetgrid"));
        cmd.env_remove("RUST_LOG")
            .env_remove("FLEETGRID_STORE")
            .arg("--store")
            .arg(self.store())
            .arg("--config")
            .arg(self.config())
            .arg("--kind")
            .arg(kind);
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.cmd("maintenance").args(args).output().expect("run fleetgrid")
    }

    fn run_with_stdin(&self, args: &[&str], stdin: &str) -> Output {
        let mut child = self
            .cmd("maintenance")
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn fleetgrid");
        child.stdin.take().unwrap().write_all(stdin.as_bytes()).unwrap();
        child.wait_with_output().expect("wait fleetgrid")
    }

    fn rows(&self) -> Vec<Vec<String>> {
        let out = self.run(&["list"]);
        assert!(out.status.success(), "list failed: {}", stderr(&out));
        stdout(&out)
            .lines()
            .skip(1)
            .map(|line| line.split('\t').map(str::to_string).collect())
            .collect()
    }
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn assert_ok(out: &Output) {
    assert!(out.status.success(), "exit {:?}: {}", out.status.code(), stderr(out));
}

fn exists(path: &Path) -> bool {
    path.exists()
}

// ---------------------------------------------------------------------------
// Row supply
// ---------------------------------------------------------------------------

#[test]
fn supply_creates_the_blank_floor() {
    let ws = Workspace::new();
    assert!(!exists(&ws.store()));

    assert_ok(&ws.run(&["supply"]));
    assert!(exists(&ws.store()));

    let out = ws.run(&["list", "--json"]);
    assert_ok(&out);
    let rows: Vec<serde_json::Value> = serde_json::from_str(&stdout(&out)).expect("valid JSON");
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r["empty"] == true));
}

#[test]
fn list_does_not_write_the_store() {
    let ws = Workspace::new();
    assert_ok(&ws.run(&["list"]));
    assert!(!exists(&ws.store()));
}

// ---------------------------------------------------------------------------
// Editing
// ---------------------------------------------------------------------------

#[test]
fn paste_from_stdin_then_floor_is_restored() {
    let ws = Workspace::new();
    assert_ok(&ws.run(&["supply"]));

    assert_ok(&ws.run_with_stdin(&["paste", "0", "0"], "F1\tE1\nF2\tE2\n"));

    let rows = ws.rows();
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[0][..3], ["1", "F1", "E1"]);
    assert_eq!(rows[1][..3], ["2", "F2", "E2"]);
    assert!(rows[2..].iter().all(|r| r[1..].iter().all(String::is_empty)));
}

#[test]
fn fill_copies_down() {
    let ws = Workspace::new();
    assert_ok(&ws.run(&["supply"]));
    assert_ok(&ws.run(&["set", "0", "flotte", "T-400"]));
    assert_ok(&ws.run(&["fill", "0:0", "0:0", "--to", "2"]));

    let rows = ws.rows();
    let flotte: Vec<&str> = rows.iter().take(3).map(|r| r[1].as_str()).collect();
    assert_eq!(flotte, ["T-400", "T-400", "T-400"]);
}

#[test]
fn copy_prints_clipboard_text() {
    let ws = Workspace::new();
    assert_ok(&ws.run(&["supply"]));
    assert_ok(&ws.run_with_stdin(&["paste", "0", "0"], "A\tB\nC\tD\n"));

    let out = ws.run(&["copy", "0:0", "1:1"]);
    assert_ok(&out);
    assert_eq!(stdout(&out), "A\tB\nC\tD\n");
}

#[test]
fn reversed_dates_are_rejected() {
    let ws = Workspace::new();
    assert_ok(&ws.run(&["supply"]));
    assert_ok(&ws.run(&["set", "0", "entree", "10/01/2024 09:00"]));

    let out = ws.run(&["set", "0", "sortie", "05/01/2024 17:00"]);
    assert_eq!(out.status.code(), Some(10));
    assert!(stderr(&out).contains("Date validation"), "{}", stderr(&out));

    let rows = ws.rows();
    assert_eq!(rows[0][5], "10/01/2024 09:00");
    assert_eq!(rows[0][6], "");
}

#[test]
fn unknown_status_is_a_usage_error() {
    let ws = Workspace::new();
    assert_ok(&ws.run(&["supply"]));
    let out = ws.run(&["set", "0", "validationRdv", "maybe"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("unknown status"));
}

#[test]
fn cell_outside_grid_is_a_usage_error() {
    let ws = Workspace::new();
    let out = ws.run(&["copy", "0:0", "3:3"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("outside the grid"));
}

// ---------------------------------------------------------------------------
// Store file
// ---------------------------------------------------------------------------

#[test]
fn wrong_kind_is_refused() {
    let ws = Workspace::new();
    assert_ok(&ws.run(&["supply"]));

    let out = ws.cmd("contacts").arg("list").output().expect("run fleetgrid");
    assert_eq!(out.status.code(), Some(4));
    assert!(stderr(&out).contains("--kind"));
}

#[test]
fn contacts_reorder() {
    let ws = Workspace::new();
    let contacts = |args: &[&str]| ws.cmd("contacts").args(args).output().expect("run fleetgrid");

    assert_ok(&contacts(&["add-rows", "3"]));
    for (row, name) in ["Ana", "Ben", "Cleo"].iter().enumerate() {
        assert_ok(&contacts(&["set", &row.to_string(), "nom", name]));
    }
    assert_ok(&contacts(&["reorder", "3", "1", "2"]));

    let out = contacts(&["list"]);
    assert_ok(&out);
    let names: Vec<String> = stdout(&out)
        .lines()
        .skip(1)
        .map(|line| line.split('\t').nth(2).unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, ["Cleo", "Ana", "Ben"]);
}
