//! Integration tests for the split command, which runs worker processes.

use tempfile::TempDir;

use crate::helpers::{path_str, read_file, run, write_input};

#[test]
fn test_split_reads_across_processes() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let inputs: Vec<_> = (0..4)
        .map(|i| write_input(&temp_dir.path().join(format!("in{i}.blow5")), &["r1"], 5))
        .collect();
    let out_dir = temp_dir.path().join("split");

    let mut args = vec!["split", "-d", path_str(&out_dir), "-r", "2", "-p", "2"];
    args.extend(inputs.iter().map(|p| path_str(p)));
    let result = run(&args);
    assert!(result.status.success(), "split failed: {}", String::from_utf8_lossy(&result.stderr));

    for i in 0..4 {
        let sizes: Vec<usize> = (0..3)
            .map(|k| read_file(&out_dir.join(format!("in{i}_{k}.blow5"))).1.len())
            .collect();
        assert_eq!(sizes, [2, 2, 1]);
        assert!(!out_dir.join(format!("in{i}_3.blow5")).exists());
    }
}

#[test]
fn test_split_groups() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(&temp_dir.path().join("multi.blow5"), &["r1", "r2", "r3"], 2);
    let out_dir = temp_dir.path().join("groups");

    let args = ["split", path_str(&input), "-d", path_str(&out_dir), "-g", "--to", "slow5"];
    let result = run(&args);
    assert!(result.status.success());

    for (k, run_id) in ["r1", "r2", "r3"].iter().enumerate() {
        let (header, records) = read_file(&out_dir.join(format!("multi_{k}.slow5")));
        assert_eq!(header.num_read_groups(), 1);
        assert_eq!(header.get("run_id", 0), Some(*run_id));
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.read_group == 0));
    }
}

#[test]
fn test_split_worker_failure_is_fatal() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let good = write_input(&temp_dir.path().join("good.blow5"), &["r1"], 4);
    let missing = temp_dir.path().join("missing.blow5");
    let out_dir = temp_dir.path().join("split");

    let result = run(&[
        "split",
        path_str(&good),
        path_str(&missing),
        "-d",
        path_str(&out_dir),
        "-f",
        "2",
        "-p",
        "2",
    ]);
    assert!(!result.status.success());
}

#[test]
fn test_split_requires_method() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(&temp_dir.path().join("in.blow5"), &["r1"], 4);
    let result = run(&["split", path_str(&input), "-d", path_str(temp_dir.path())]);
    assert!(!result.status.success());
}
