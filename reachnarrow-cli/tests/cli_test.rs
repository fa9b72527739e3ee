//! Black-box tests of the `reachnarrow` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    Command::cargo_bin("reachnarrow").unwrap()
}

#[test]
fn help_lists_the_analysis_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--target"))
        .stdout(predicate::str::contains("--osv-id"))
        .stdout(predicate::str::contains("--module-backtracking"))
        .stdout(predicate::str::contains("--input-file"));
}

#[test]
fn missing_entry_file_exits_with_two() {
    cmd()
        .args(["/nonexistent/main.py", "--target", "anything"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("entry file"));
}

#[test]
fn missing_targets_exit_with_one() {
    let dir = tempfile::tempdir().unwrap();
    let entry = dir.path().join("main.py");
    std::fs::write(&entry, "def foo():\n    pass\n").unwrap();

    cmd()
        .arg(&entry)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no target"));
}

#[test]
fn reachable_target_exits_with_zero() {
    let dir = tempfile::tempdir().unwrap();
    let entry = dir.path().join("main.py");
    std::fs::write(
        &entry,
        "def foo():\n    bar()\n\n\ndef bar():\n    pass\n\n\nfoo()\n",
    )
    .unwrap();

    cmd()
        .args([entry.to_str().unwrap(), "--target", "bar"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("bar"));
}

#[test]
fn unreachable_target_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();
    let entry = dir.path().join("main.py");
    std::fs::write(&entry, "def foo():\n    pass\n\n\nfoo()\n").unwrap();

    cmd()
        .args([entry.to_str().unwrap(), "--target", "does_not_exist"])
        .assert()
        .code(1);
}

#[test]
fn print_cfg_renders_the_graph() {
    let dir = tempfile::tempdir().unwrap();
    let entry = dir.path().join("main.py");
    std::fs::write(&entry, "def foo():\n    pass\n\n\nfoo()\n").unwrap();

    cmd()
        .args([
            entry.to_str().unwrap(),
            "--target",
            "nothing_here",
            "--print-cfg",
            "true",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("unknown.foo.0"));
}

#[test]
fn print_all_paths_lists_call_chains() {
    let dir = tempfile::tempdir().unwrap();
    let entry = dir.path().join("main.py");
    std::fs::write(
        &entry,
        "def foo():\n    bar()\n\n\ndef bar():\n    pass\n\n\nfoo()\n",
    )
    .unwrap();

    cmd()
        .args([
            entry.to_str().unwrap(),
            "--target",
            "bar",
            "--print-all-paths",
            "true",
        ])
        .assert()
        .code(0)
        .stdout(predicate::str::contains(
            "__entry__ -> unknown.foo.0 -> unknown.bar.0",
        ));
}

#[test]
fn config_file_defaults_apply() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".reachnarrow.toml"),
        "[reachnarrow]\nprint_cfg = true\n",
    )
    .unwrap();
    let entry = dir.path().join("main.py");
    std::fs::write(&entry, "def foo():\n    pass\n\n\nfoo()\n").unwrap();

    cmd()
        .args([entry.to_str().unwrap(), "--target", "nothing_here"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("unknown.foo.0"));
}

#[test]
fn quiet_suppresses_the_detection_line() {
    let dir = tempfile::tempdir().unwrap();
    let entry = dir.path().join("main.py");
    std::fs::write(&entry, "def foo():\n    pass\n\n\nfoo()\n").unwrap();

    cmd()
        .args([entry.to_str().unwrap(), "--target", "foo", "--quiet"])
        .assert()
        .code(0)
        .stdout(predicate::str::is_empty());
}

#[test]
fn malformed_sbom_exits_with_two() {
    let dir = tempfile::tempdir().unwrap();
    let entry = dir.path().join("main.py");
    std::fs::write(&entry, "def foo():\n    pass\n").unwrap();
    let sbom = dir.path().join("sbom.json");
    std::fs::write(&sbom, r#"{"not": "an sbom"}"#).unwrap();

    cmd()
        .args([
            entry.to_str().unwrap(),
            "--input-file",
            sbom.to_str().unwrap(),
            "--quiet",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("schema"));
}

#[test]
fn empty_sbom_round_trips_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let entry = dir.path().join("main.py");
    std::fs::write(&entry, "def foo():\n    pass\n").unwrap();
    let sbom = dir.path().join("sbom.json");
    std::fs::write(&sbom, r#"{"vulnerabilities": []}"#).unwrap();

    cmd()
        .args([
            entry.to_str().unwrap(),
            "--input-file",
            sbom.to_str().unwrap(),
            "--quiet",
        ])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("vulnerabilities"));
}
