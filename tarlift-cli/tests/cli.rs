use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn tarlift() -> Command {
    Command::cargo_bin("tarlift").unwrap()
}

fn source(td: &assert_fs::TempDir) -> assert_fs::fixture::ChildPath {
    let src = td.child("src");
    src.create_dir_all().unwrap();
    src.child("a.bin").write_binary(&vec![1u8; 600]).unwrap();
    src.child("b/b.bin").write_binary(&vec![2u8; 500]).unwrap();
    src.child("b/c.txt").write_binary(&vec![3u8; 300]).unwrap();
    src
}

#[test]
fn plan_splits_by_ceiling() {
    let td = assert_fs::TempDir::new().unwrap();
    let src = source(&td);
    tarlift()
        .args(["plan", "--source-dir", src.path().to_str().unwrap(), "--max-part-size", "1000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 files, 1400 bytes"))
        .stdout(predicate::str::contains("part 1: 2 files, 900 bytes"))
        .stdout(predicate::str::contains("part 2: 1 files, 500 bytes"));
}

#[test]
fn plan_json_lists_files() {
    let td = assert_fs::TempDir::new().unwrap();
    let src = source(&td);
    let out = tarlift()
        .args(["plan", "--source-dir", src.path().to_str().unwrap(), "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let parts: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(parts.as_array().unwrap().len(), 1);
    assert_eq!(parts[0]["files"][0]["rel_path"], "a.bin");
    assert_eq!(parts[0]["total_size"], 1400);
}

#[test]
fn plan_flags_oversize_files() {
    let td = assert_fs::TempDir::new().unwrap();
    let src = source(&td);
    tarlift()
        .args(["plan", "--source-dir", src.path().to_str().unwrap(), "--max-part-size", "550"])
        .assert()
        .success()
        .stdout(predicate::str::contains("part 1: 1 files, 600 bytes  OVERSIZE"))
        .stderr(predicate::str::contains("exceeds the part ceiling"));
}

#[test]
fn status_reports_incomplete_parts() {
    let td = assert_fs::TempDir::new().unwrap();
    let master = td.child("up_master.json");
    master
        .write_str(
            r#"{
  "upload_name": "up",
  "source_dir": "/data",
  "parts": [
    {"part_id": 1, "destination": "nas:/srv/p1", "total_size": 10, "file_count": 1,
     "tar_file": "up_part1.tar.gz", "manifest": "up_part1.tar.gz.json"},
    {"part_id": 2, "destination": "nas:/srv/p2", "total_size": 5, "file_count": 2}
  ],
  "total_size": 15,
  "total_files": 3
}"#,
        )
        .unwrap();
    tarlift()
        .args(["status", master.path().to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("part 1: 1 files, 10 bytes -> nas:/srv/p1 [VERIFIED]"))
        .stdout(predicate::str::contains("[INCOMPLETE]"))
        .stderr(predicate::str::contains("1 of 2 part(s) incomplete"));
}

#[test]
fn config_round_trip() {
    let td = assert_fs::TempDir::new().unwrap();
    let cfg = td.child("conf/config.json");
    tarlift()
        .env("TARLIFT_CONFIG", cfg.path())
        .args(["config", "set-remote-root", "/srv/uploads/"])
        .assert()
        .success();
    cfg.assert(predicate::str::contains("/srv/uploads/"));
    tarlift()
        .env("TARLIFT_CONFIG", cfg.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("remote_root: /srv/uploads/"));
}

#[test]
fn upload_of_missing_source_fails_before_any_output() {
    let td = assert_fs::TempDir::new().unwrap();
    let work = td.child("work");
    tarlift()
        .env("TARLIFT_CONFIG", td.child("config.json").path())
        .args([
            "upload",
            "--source-dir",
            td.child("nope").path().to_str().unwrap(),
            "--upload-name",
            "up",
            "--remote-host",
            "nas",
            "--work-dir",
            work.path().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
    work.assert(predicate::path::missing());
}

#[test]
fn upload_without_answers_does_not_hang() {
    let td = assert_fs::TempDir::new().unwrap();
    tarlift()
        .env("TARLIFT_CONFIG", td.child("config.json").path())
        .args(["upload", "--gui"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("graphical mode is not available"))
        .stderr(predicate::str::contains("no answer given for: Enter source directory"));
}

#[test]
fn upload_asks_for_missing_destinations() {
    let td = assert_fs::TempDir::new().unwrap();
    let src = source(&td);
    tarlift()
        .env("TARLIFT_CONFIG", td.child("config.json").path())
        .args([
            "upload",
            "--source_dir",
            src.path().to_str().unwrap(),
            "--upload_name",
            "up",
            "--remote_host",
            "nas",
            "--max-part-size",
            "1000",
            "--dest",
            "p1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Enter destination path for part 2"));
}
