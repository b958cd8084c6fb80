use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn write(root: &Path, path: &str, text: &str) {
    let full = root.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, text).unwrap();
}

fn sample_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pkg/a.py", "def helper():\n    return 1\n");
    write(
        dir.path(),
        "pkg/b.py",
        "import requests\nfrom pkg.a import helper\n\ndef main():\n    helper()\n    requests.get('x')\n",
    );
    write(dir.path(), "pkg/broken.py", "))) ((( ]]] ::: ))) ((( ]]] :::\n");
    dir
}

fn repograph(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("repograph").unwrap();
    cmd.env("REPOGRAPH_DB", db).env_remove("RUST_LOG");
    cmd
}

fn ingest(repo: &Path, db: &Path) {
    repograph(db)
        .args(["ingest", "--repository", "demo", "--quiet"])
        .arg(repo)
        .assert()
        .success();
}

#[test]
fn ingest_then_list_functions() {
    let repo = sample_repo();
    let db = repo.path().join("graphs.db");
    ingest(repo.path(), &db);

    repograph(&db)
        .args(["functions", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pkg.a.helper"))
        .stdout(predicate::str::contains("pkg.b.main"))
        .stdout(predicate::str::contains("2 functions"));
}

#[test]
fn ingest_json_reports_skipped_file() {
    let repo = sample_repo();
    let db = repo.path().join("graphs.db");

    let output = repograph(&db)
        .args(["ingest", "--repository", "demo", "--json"])
        .arg(repo.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let job: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(job["status"], "complete");
    assert_eq!(job["errors"][0]["path"], "pkg/broken.py");
    assert_eq!(job["errors"][0]["kind"], "file_parse_error");
}

#[test]
fn edges_show_statuses() {
    let repo = sample_repo();
    let db = repo.path().join("graphs.db");
    ingest(repo.path(), &db);

    repograph(&db)
        .args(["edges", "demo", "main", "--direction", "out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-> pkg.a.helper  [resolved_cross_file]"))
        .stdout(predicate::str::contains("-> requests.get  [resolved_external_library]"));

    repograph(&db)
        .args(["edges", "demo", "pkg.a.helper", "--direction", "in"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<- pkg.b.main"));
}

#[test]
fn export_dot_and_json() {
    let repo = sample_repo();
    let db = repo.path().join("graphs.db");
    ingest(repo.path(), &db);

    repograph(&db)
        .args(["export", "demo", "--format", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph {"))
        .stdout(predicate::str::contains("style=dashed"));

    let out = repo.path().join("graph.json");
    repograph(&db)
        .args(["export", "demo", "--output"])
        .arg(&out)
        .assert()
        .success();
    let graph: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
    assert_eq!(graph["summary"]["total_files"], 3);
    assert_eq!(graph["summary"]["total_functions"], 2);
}

#[test]
fn units_emit_one_line_per_function() {
    let repo = sample_repo();
    let db = repo.path().join("graphs.db");
    ingest(repo.path(), &db);

    let output = repograph(&db).args(["units", "demo"]).output().unwrap();
    assert!(output.status.success());
    let lines: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|u| u["snippet"].as_str().is_some()));
}

#[test]
fn repos_lists_ingested_repository() {
    let repo = sample_repo();
    let db = repo.path().join("graphs.db");
    ingest(repo.path(), &db);

    repograph(&db)
        .arg("repos")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("2 functions"));
}

#[test]
fn missing_path_exits_with_3() {
    let dir = tempfile::tempdir().unwrap();
    repograph(&dir.path().join("graphs.db"))
        .args(["ingest", "/definitely/not/here"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Cannot resolve path"));
}

#[test]
fn bad_config_exits_with_2() {
    let repo = sample_repo();
    write(repo.path(), "repograph.toml", "[parse]\ntimeout_ms = 0\n");
    repograph(&repo.path().join("graphs.db"))
        .arg("ingest")
        .arg(repo.path())
        .assert()
        .code(2);
}

#[test]
fn missing_database_exits_with_4() {
    let dir = tempfile::tempdir().unwrap();
    repograph(&dir.path().join("absent.db"))
        .args(["functions", "demo"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Database not found"));
}

#[test]
fn unknown_repository_exits_with_3() {
    let repo = sample_repo();
    let db = repo.path().join("graphs.db");
    ingest(repo.path(), &db);

    repograph(&db)
        .args(["export", "other"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Graph not found"));
}

#[test]
fn repos_delete_removes_graph() {
    let repo = sample_repo();
    let db = repo.path().join("graphs.db");
    ingest(repo.path(), &db);

    repograph(&db)
        .args(["repos", "--delete", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted demo"));
    repograph(&db)
        .args(["functions", "demo"])
        .assert()
        .code(3);
    repograph(&db)
        .args(["repos", "--delete", "demo"])
        .assert()
        .code(3);
}
