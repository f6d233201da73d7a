//! Integration tests for the stats, quickcheck and skim commands.

use std::fs;

use tempfile::TempDir;

use crate::helpers::{path_str, run, run_with_stdin, write_input};

#[test]
fn test_stats() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(&temp_dir.path().join("in.blow5"), &["r1", "r2"], 3);

    let result = run(&["stats", path_str(&input)]);
    assert!(result.status.success());
    let text = String::from_utf8(result.stdout).expect("Stats are UTF-8");
    assert!(text.contains("file format\tBLOW5\n"));
    assert!(text.contains("record compression method\tzlib\n"));
    assert!(text.contains("number of read groups\t2\n"));
    assert!(text.contains("auxiliary fields\tchannel_number,start_time\n"));
    assert!(text.contains("number of records\t6\n"));
}

#[test]
fn test_quickcheck() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(&temp_dir.path().join("in.blow5"), &["r1"], 3);
    assert!(run(&["quickcheck", path_str(&input)]).status.success());

    let mut bytes = fs::read(&input).unwrap();
    bytes.truncate(bytes.len() - 2);
    fs::write(&input, bytes).unwrap();
    let result = run(&["quickcheck", path_str(&input)]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("end-of-file marker"));
}

#[test]
fn test_skim_modes() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(&temp_dir.path().join("in.blow5"), &["r1"], 3);

    let result = run(&["skim", path_str(&input), "-t", "2"]);
    assert!(result.status.success());
    let text = String::from_utf8(result.stdout).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("#read_id"));
    assert_eq!(lines[1].split('\t').nth(7), Some("."));

    let result = run(&["skim", "--rid", path_str(&input)]);
    assert_eq!(String::from_utf8(result.stdout).unwrap(), "in_0_0\nin_0_1\nin_0_2\n");

    let result = run(&["skim", "--hdr", path_str(&input)]);
    let text = String::from_utf8(result.stdout).unwrap();
    assert!(text.starts_with("#slow5_version"));
    assert!(!text.contains("in_0_0"));
}

#[test]
fn test_skim_from_stdin() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(&temp_dir.path().join("in.slow5"), &["r1"], 2);
    let bytes = fs::read(&input).unwrap();

    let result = run_with_stdin(&["skim", "--rid", "-"], &bytes);
    assert!(result.status.success());
    assert_eq!(String::from_utf8(result.stdout).unwrap(), "in_0_0\nin_0_1\n");
}
