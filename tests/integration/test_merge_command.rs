//! Integration tests for the merge command.

use std::fs;

use s5tools::{Header, PressMethod, ReadGroup, Record, Writer};
use tempfile::TempDir;

use crate::helpers::{path_str, read_file, run, write_input};

#[test]
fn test_merge_shared_run_id() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.blow5"), &["r1", "r1"], 5);
    let b = write_input(&temp_dir.path().join("b.blow5"), &["r1"], 5);
    let output = temp_dir.path().join("merged.blow5");

    let args = ["merge", path_str(&a), path_str(&b), "-o", path_str(&output), "-t", "2"];
    let result = run(&args);
    assert!(result.status.success(), "merge failed: {}", String::from_utf8_lossy(&result.stderr));

    let (header, records) = read_file(&output);
    assert_eq!(header.num_read_groups(), 1);
    assert_eq!(records.len(), 15);
    assert!(records.iter().all(|r| r.read_group == 0));
}

#[test]
fn test_merge_distinct_run_id() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.blow5"), &["r1", "r1"], 5);
    let b = write_input(&temp_dir.path().join("b.blow5"), &["r1x"], 5);
    let output = temp_dir.path().join("merged.blow5");

    let result = run(&["merge", path_str(&a), path_str(&b), "-o", path_str(&output)]);
    assert!(result.status.success());

    let (header, records) = read_file(&output);
    assert_eq!(header.num_read_groups(), 2);
    assert_eq!(header.get("run_id", 1), Some("r1x"));
    for record in &records {
        let expected = if record.read_id.starts_with("b_") { 1 } else { 0 };
        assert_eq!(record.read_group, expected, "{}", record.read_id);
    }
}

#[test]
fn test_remerge_is_idempotent() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.blow5"), &["r1", "r2"], 3);
    let b = write_input(&temp_dir.path().join("b.blow5"), &["r2", "r3"], 3);
    let merged = temp_dir.path().join("merged.blow5");
    let remerged = temp_dir.path().join("remerged.blow5");

    let args = ["merge", path_str(&a), path_str(&b), "-o", path_str(&merged)];
    assert!(run(&args).status.success());
    assert!(
        run(&["merge", path_str(&merged), path_str(&merged), "-o", path_str(&remerged)])
            .status
            .success()
    );

    let (first, records) = read_file(&merged);
    let (second, doubled) = read_file(&remerged);
    assert_eq!(first.num_read_groups(), 3);
    assert_eq!(second.num_read_groups(), 3);
    assert_eq!(doubled.len(), 2 * records.len());
}

#[test]
fn test_single_worker_strategies_identical() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.blow5"), &["r1"], 20);
    let b = write_input(&temp_dir.path().join("b.slow5"), &["r2"], 20);
    let sharded = temp_dir.path().join("sharded.blow5");
    let sequential = temp_dir.path().join("sequential.blow5");

    let base = ["merge", path_str(&a), path_str(&b), "-t", "1"];
    let mut args = base.to_vec();
    args.extend(["-o", path_str(&sharded), "--strategy", "sharded"]);
    assert!(run(&args).status.success());
    let mut args = base.to_vec();
    args.extend(["-o", path_str(&sequential), "--strategy", "sequential"]);
    assert!(run(&args).status.success());

    assert_eq!(fs::read(&sharded).unwrap(), fs::read(&sequential).unwrap());
}

#[test]
fn test_merge_directory_to_text() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input_dir = temp_dir.path().join("inputs");
    fs::create_dir(&input_dir).unwrap();
    for (i, run_id) in ["r1", "r2", "r3", "r4"].iter().enumerate() {
        write_input(&input_dir.join(format!("part{i}.blow5")), &[run_id], 4);
    }
    let output = temp_dir.path().join("merged.slow5");

    let args = ["merge", path_str(&input_dir), "-o", path_str(&output), "-c", "none", "-t", "3"];
    let result = run(&args);
    assert!(result.status.success(), "merge failed: {}", String::from_utf8_lossy(&result.stderr));

    let (header, records) = read_file(&output);
    assert_eq!(header.num_read_groups(), 4);
    assert_eq!(records.len(), 16);
}

#[test]
fn test_merge_to_text_without_compress_flag() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.blow5"), &["r1"], 4);
    let b = write_input(&temp_dir.path().join("b.blow5"), &["r2"], 4);
    let output = temp_dir.path().join("x.slow5");

    let result = run(&["merge", path_str(&a), path_str(&b), "-o", path_str(&output)]);
    assert!(result.status.success(), "merge failed: {}", String::from_utf8_lossy(&result.stderr));

    let (header, records) = read_file(&output);
    assert_eq!(header.num_read_groups(), 2);
    assert_eq!(records.len(), 8);
    assert!(fs::read_to_string(&output).unwrap().starts_with("#slow5_version"));
}

#[test]
fn test_merge_to_text_with_zlib_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.blow5"), &["r1"], 4);
    let output = temp_dir.path().join("x.slow5");

    let result = run(&["merge", path_str(&a), "-o", path_str(&output), "-c", "zlib"]);
    assert!(!result.status.success());
    assert!(!output.exists());
}

#[test]
fn test_tmp_dir_cleaned_up() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.blow5"), &["r1"], 4);
    let b = write_input(&temp_dir.path().join("b.blow5"), &["r2"], 4);
    let scratch = temp_dir.path().join("scratch");
    fs::create_dir(&scratch).unwrap();
    let output = temp_dir.path().join("merged.blow5");

    let result = run(&[
        "merge",
        path_str(&a),
        path_str(&b),
        "-o",
        path_str(&output),
        "-t",
        "2",
        "--tmp-dir",
        path_str(&scratch),
    ]);
    assert!(result.status.success());
    assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
}

#[test]
fn test_missing_run_id_fails_without_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.blow5"), &["r1"], 4);

    let b = temp_dir.path().join("b.blow5");
    let mut header = Header::new();
    let mut rg = ReadGroup::new();
    rg.set("asic_id", "0004A30B");
    header.add_read_group(rg);
    let mut writer = Writer::from_path(&b, &header, PressMethod::Zlib).unwrap();
    writer.write_record(&Record::new("orphan", 0, vec![1, 2, 3])).unwrap();
    writer.finish().unwrap();
    drop(writer);

    let output = temp_dir.path().join("merged.blow5");
    let args = ["merge", path_str(&a), path_str(&b), "-o", path_str(&output), "-l", "false"];
    let result = run(&args);
    assert!(!result.status.success());
    assert!(!output.exists());
    assert!(String::from_utf8_lossy(&result.stderr).contains("run_id"));
}

#[test]
fn test_lossless_merge_requires_aux() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = temp_dir.path().join("a.blow5");
    let mut header = Header::new();
    header.add_read_group(ReadGroup::with_run_id("r1"));
    let mut writer = Writer::from_path(&a, &header, PressMethod::None).unwrap();
    writer.finish().unwrap();
    drop(writer);

    let output = temp_dir.path().join("merged.blow5");
    assert!(!run(&["merge", path_str(&a), "-o", path_str(&output)]).status.success());
    let lossy = ["merge", path_str(&a), "-o", path_str(&output), "-l", "false"];
    assert!(run(&lossy).status.success());
}
