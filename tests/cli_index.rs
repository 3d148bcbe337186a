use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn copy_fixture_repo(name: &str, dst_root: &Path) {
    let src_root = PathBuf::from("tests/fixtures").join(name);
    fs::create_dir_all(dst_root).expect("create dst_root");
    for entry in fs::read_dir(&src_root).expect("read src_root") {
        let entry = entry.expect("entry");
        if entry.file_type().expect("file_type").is_file() {
            let dst_path = dst_root.join(entry.file_name());
            fs::copy(entry.path(), &dst_path).expect("copy file");
        }
    }
}

fn wicked_search() -> Command {
    Command::cargo_bin("wicked-search").expect("binary builds")
}

#[test]
fn cli_index_builds_sqlite_store_under_default_path() {
    let tmp = tempdir().expect("tempdir");
    let repo_root = tmp.path().join("rust_repo");
    copy_fixture_repo("rust_repo", &repo_root);

    let mut cmd = wicked_search();
    cmd.args(["index", "--root", repo_root.to_str().unwrap()]);

    let assert = cmd.assert().success();
    let stdout: Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("valid json summary");

    assert_eq!(stdout["project"], "default");
    assert!(stdout["files_added"].as_u64().unwrap() >= 1);
    assert!(stdout["symbol_count"].as_u64().unwrap() >= 1);

    let db_path = repo_root.join(".wicked-search").join("index.sqlite3");
    assert!(db_path.exists(), "index.sqlite3 should exist after indexing");
}

#[test]
fn cli_index_is_incremental_on_second_run() {
    let tmp = tempdir().expect("tempdir");
    let repo_root = tmp.path().join("rust_repo");
    copy_fixture_repo("rust_repo", &repo_root);

    let mut first = wicked_search();
    first.args(["index", "--root", repo_root.to_str().unwrap()]);
    let first_assert = first.assert().success();
    let first_value: Value =
        serde_json::from_slice(&first_assert.get_output().stdout).expect("valid json");
    assert_eq!(first_value["full_index"], true);

    let mut second = wicked_search();
    second.args(["index", "--root", repo_root.to_str().unwrap()]);
    let second_assert = second.assert().success();
    let second_value: Value =
        serde_json::from_slice(&second_assert.get_output().stdout).expect("valid json");

    assert_eq!(second_value["full_index"], false);
    assert_eq!(second_value["files_added"], 0);
    assert_eq!(second_value["files_modified"], 0);
}

#[test]
fn cli_index_with_full_flag_forces_full_reindex() {
    let tmp = tempdir().expect("tempdir");
    let repo_root = tmp.path().join("rust_repo");
    copy_fixture_repo("rust_repo", &repo_root);

    wicked_search()
        .args(["index", "--root", repo_root.to_str().unwrap()])
        .assert()
        .success();

    let mut cmd = wicked_search();
    cmd.args(["index", "--root", repo_root.to_str().unwrap(), "--full"]);
    let assert = cmd.assert().success();
    let value: Value = serde_json::from_slice(&assert.get_output().stdout).expect("valid json");

    assert_eq!(value["full_index"], true);
}

#[test]
fn cli_index_honors_project_flag() {
    let tmp = tempdir().expect("tempdir");
    let repo_root = tmp.path().join("rust_repo");
    copy_fixture_repo("rust_repo", &repo_root);

    let mut cmd = wicked_search();
    cmd.args([
        "index",
        "--root",
        repo_root.to_str().unwrap(),
        "--project",
        "alpha",
    ]);
    let assert = cmd.assert().success();
    let value: Value = serde_json::from_slice(&assert.get_output().stdout).expect("valid json");

    assert_eq!(value["project"], "alpha");
}

#[test]
fn cli_list_after_index_returns_indexed_symbols() {
    let tmp = tempdir().expect("tempdir");
    let repo_root = tmp.path().join("rust_repo");
    copy_fixture_repo("rust_repo", &repo_root);

    wicked_search()
        .args(["index", "--root", repo_root.to_str().unwrap()])
        .assert()
        .success();

    let mut cmd = wicked_search();
    cmd.args(["list", "wicked-search", "--root", repo_root.to_str().unwrap()]);
    let assert = cmd.assert().success();
    let value: Value = serde_json::from_slice(&assert.get_output().stdout).expect("valid json");

    let items = value["items"].as_array().expect("items array");
    assert!(items.iter().any(|s| s["name"] == "add_with_doc"));
}

#[test]
fn cli_search_after_index_finds_symbol_by_name() {
    let tmp = tempdir().expect("tempdir");
    let repo_root = tmp.path().join("rust_repo");
    copy_fixture_repo("rust_repo", &repo_root);

    wicked_search()
        .args(["index", "--root", repo_root.to_str().unwrap()])
        .assert()
        .success();

    let mut cmd = wicked_search();
    cmd.args([
        "search",
        "wicked-search",
        "--root",
        repo_root.to_str().unwrap(),
        "--query",
        "Widget",
    ]);
    let assert = cmd.assert().success();
    let value: Value = serde_json::from_slice(&assert.get_output().stdout).expect("valid json");

    let items = value["items"].as_array().expect("items array");
    assert!(items.iter().any(|s| s["name"] == "Widget"));
}

#[test]
fn cli_get_unknown_id_exits_with_not_found_code() {
    let tmp = tempdir().expect("tempdir");
    let repo_root = tmp.path().join("rust_repo");
    copy_fixture_repo("rust_repo", &repo_root);

    wicked_search()
        .args(["index", "--root", repo_root.to_str().unwrap()])
        .assert()
        .success();

    let mut cmd = wicked_search();
    cmd.args([
        "get",
        "wicked-search",
        "--root",
        repo_root.to_str().unwrap(),
        "--id",
        "does-not-exist",
    ]);
    cmd.assert().code(1);
}

#[test]
fn cli_get_without_id_exits_with_bad_input_code() {
    let tmp = tempdir().expect("tempdir");
    let repo_root = tmp.path().join("rust_repo");
    copy_fixture_repo("rust_repo", &repo_root);

    wicked_search()
        .args(["index", "--root", repo_root.to_str().unwrap()])
        .assert()
        .success();

    let mut cmd = wicked_search();
    cmd.args(["get", "wicked-search", "--root", repo_root.to_str().unwrap()]);
    cmd.assert().code(2).stderr(predicate::str::contains("missing --id"));
}

#[test]
fn cli_list_with_invalid_project_name_exits_with_bad_input_code() {
    let tmp = tempdir().expect("tempdir");
    let repo_root = tmp.path().join("rust_repo");
    copy_fixture_repo("rust_repo", &repo_root);

    wicked_search()
        .args(["index", "--root", repo_root.to_str().unwrap()])
        .assert()
        .success();

    let mut cmd = wicked_search();
    cmd.args([
        "list",
        "wicked-search",
        "--root",
        repo_root.to_str().unwrap(),
        "--project",
        "not valid!",
    ]);
    cmd.assert().code(2);
}

#[test]
fn cli_stats_reports_symbol_histogram() {
    let tmp = tempdir().expect("tempdir");
    let repo_root = tmp.path().join("rust_repo");
    copy_fixture_repo("rust_repo", &repo_root);

    wicked_search()
        .args(["index", "--root", repo_root.to_str().unwrap()])
        .assert()
        .success();

    let mut cmd = wicked_search();
    cmd.args(["stats", "wicked-search", "--root", repo_root.to_str().unwrap()]);
    let assert = cmd.assert().success();
    let value: Value = serde_json::from_slice(&assert.get_output().stdout).expect("valid json");

    assert!(value.is_object());
    assert!(!value.as_object().unwrap().is_empty());
}

#[test]
fn cli_without_subcommand_prints_help() {
    let mut cmd = wicked_search();
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("wicked-search"));
}
