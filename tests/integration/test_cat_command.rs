//! Integration tests for the cat command.

use std::io::Cursor;

use s5tools::Reader;
use tempfile::TempDir;

use crate::helpers::{path_str, read_file, run, write_input};

#[test]
fn test_cat_compatible_files() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.blow5"), &["r1", "r2"], 3);
    let b = write_input(&temp_dir.path().join("b.blow5"), &["r1", "r2"], 4);
    let output = temp_dir.path().join("all.blow5");

    let result = run(&["cat", path_str(&a), path_str(&b), "-o", path_str(&output)]);
    assert!(result.status.success(), "cat failed: {}", String::from_utf8_lossy(&result.stderr));

    let (header, records) = read_file(&output);
    assert_eq!(header.num_read_groups(), 2);
    assert_eq!(records.len(), 14);
    assert_eq!(records[0].read_id, "a_0_0");
    assert_eq!(records[6].read_id, "b_0_0");
}

#[test]
fn test_cat_incompatible_fails_without_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.blow5"), &["r1"], 3);
    let b = write_input(&temp_dir.path().join("b.blow5"), &["r1", "r2"], 3);
    let output = temp_dir.path().join("all.blow5");

    let result = run(&["cat", path_str(&a), path_str(&b), "-o", path_str(&output)]);
    assert!(!result.status.success());
    assert!(!output.exists());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Use merge instead"));
}

#[test]
fn test_cat_skip_incompatible() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.blow5"), &["r1"], 3);
    let b = write_input(&temp_dir.path().join("b.blow5"), &["r9"], 3);
    let c = write_input(&temp_dir.path().join("c.blow5"), &["r1"], 3);
    let output = temp_dir.path().join("all.blow5");

    let result = run(&[
        "cat",
        path_str(&a),
        path_str(&b),
        path_str(&c),
        "-o",
        path_str(&output),
        "--skip-incompatible",
    ]);
    assert!(result.status.success());
    let (_, records) = read_file(&output);
    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|r| !r.read_id.starts_with("b_")));
}

#[test]
fn test_cat_extension_mismatch() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.slow5"), &["r1"], 3);
    let output = temp_dir.path().join("all.blow5");

    let result = run(&["cat", path_str(&a), "-o", path_str(&output)]);
    assert!(!result.status.success());
    assert!(!output.exists());
}

#[test]
fn test_cat_to_stdout() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let a = write_input(&temp_dir.path().join("a.blow5"), &["r1"], 2);
    let b = write_input(&temp_dir.path().join("b.blow5"), &["r1"], 3);

    let result = run(&["cat", path_str(&a), path_str(&b)]);
    assert!(result.status.success(), "cat failed: {}", String::from_utf8_lossy(&result.stderr));

    let reader = Reader::new(Cursor::new(result.stdout)).expect("Output has a header");
    let ids: Vec<String> = reader.map(|r| r.expect("Record decodes").read_id).collect();
    assert_eq!(ids, ["a_0_0", "a_0_1", "b_0_0", "b_0_1", "b_0_2"]);
}
