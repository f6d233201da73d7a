//! Integration tests for the view command.

use std::fs;

use tempfile::TempDir;

use crate::helpers::{path_str, read_file, run, run_with_stdin, write_input};

#[test]
fn test_view_to_stdout() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(&temp_dir.path().join("in.blow5"), &["r1"], 3);

    let result = run(&["view", path_str(&input)]);
    assert!(result.status.success());
    let text = String::from_utf8(result.stdout).expect("Text output is UTF-8");
    assert!(text.starts_with("#slow5_version"));
    assert_eq!(text.lines().filter(|l| l.starts_with("in_0_")).count(), 3);
}

#[test]
fn test_view_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(&temp_dir.path().join("in.blow5"), &["r1", "r2"], 25);
    let text = temp_dir.path().join("in.slow5");
    let back = temp_dir.path().join("back.blow5");

    let args = ["view", path_str(&input), "-o", path_str(&text), "-t", "4", "-K", "8"];
    assert!(run(&args).status.success());
    let args = ["view", path_str(&text), "-o", path_str(&back), "-c", "none"];
    assert!(run(&args).status.success());

    let (header, records) = read_file(&input);
    let (back_header, back_records) = read_file(&back);
    assert_eq!(header, back_header);
    assert_eq!(records, back_records);
}

#[test]
fn test_view_from_stdin() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(&temp_dir.path().join("in.blow5"), &["r1"], 4);
    let output = temp_dir.path().join("out.slow5");

    let bytes = fs::read(&input).expect("Failed to read input");
    let result = run_with_stdin(&["view", "-", "-o", path_str(&output)], &bytes);
    assert!(result.status.success(), "view failed: {}", String::from_utf8_lossy(&result.stderr));

    let (header, records) = read_file(&input);
    let (out_header, out_records) = read_file(&output);
    assert_eq!(header, out_header);
    assert_eq!(records, out_records);
}
