//! Integration tests for the demux command.

use std::fs;

use tempfile::TempDir;

use crate::helpers::{path_str, read_file, run, write_input};

fn write_summary(path: &std::path::Path, rows: &[(&str, &str)]) {
    let mut text = String::from("barcode_arrangement\tparent_read_id\tscore\n");
    for (rid, code) in rows {
        text.push_str(&format!("{code}\t{rid}\t60\n"));
    }
    fs::write(path, text).expect("Failed to write summary");
}

#[test]
fn test_demux_by_barcode() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(&temp_dir.path().join("reads.blow5"), &["r1"], 4);
    let summary = temp_dir.path().join("barcodes.tsv");
    write_summary(
        &summary,
        &[("reads_0_0", "bc01"), ("reads_0_1", "bc02"), ("reads_0_2", "bc01")],
    );
    let out_dir = temp_dir.path().join("demux");
    fs::create_dir(&out_dir).unwrap();

    let result = run(&[
        "demux",
        path_str(&input),
        "-s",
        path_str(&summary),
        "-d",
        path_str(&out_dir),
        "--missing",
        "unlisted",
        "-t",
        "2",
    ]);
    assert!(result.status.success(), "demux failed: {}", String::from_utf8_lossy(&result.stderr));

    let (header, bc01) = read_file(&out_dir.join("reads_bc01.blow5"));
    assert_eq!(header.get("run_id", 0), Some("r1"));
    let ids: Vec<&str> = bc01.iter().map(|r| r.read_id.as_str()).collect();
    assert_eq!(ids, ["reads_0_0", "reads_0_2"]);
    assert_eq!(read_file(&out_dir.join("reads_bc02.blow5")).1.len(), 1);
    assert_eq!(read_file(&out_dir.join("reads_unlisted.blow5")).1[0].read_id, "reads_0_3");
}

#[test]
fn test_demux_extra_summary_reads_fail() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(&temp_dir.path().join("reads.blow5"), &["r1"], 2);
    let summary = temp_dir.path().join("barcodes.tsv");
    write_summary(&summary, &[("reads_0_0", "bc01"), ("elsewhere", "bc01")]);

    let result = run(&["demux", path_str(&input), "-s", path_str(&summary)]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Extra read(s)"));
    assert!(!temp_dir.path().join("reads_bc01.blow5").exists());
}

#[test]
fn test_demux_to_text() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(&temp_dir.path().join("reads.blow5"), &["r1"], 2);
    let summary = temp_dir.path().join("barcodes.tsv");
    write_summary(&summary, &[("reads_0_0", "bc01"), ("reads_0_1", "bc01")]);

    let args = ["demux", path_str(&input), "-s", path_str(&summary), "--to", "slow5"];
    let result = run(&args);
    assert!(result.status.success(), "demux failed: {}", String::from_utf8_lossy(&result.stderr));
    assert_eq!(read_file(&temp_dir.path().join("reads_bc01.slow5")).1.len(), 2);
}
