use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use s5tools::{AuxField, AuxType, Header, PressMethod, ReadGroup, Reader, Record, Writer};

/// Writes `per_group` records for every run id, read group by read group.
pub fn write_input(path: &Path, run_ids: &[&str], per_group: usize) -> PathBuf {
    let mut header = Header::new();
    for run_id in run_ids {
        let mut rg = ReadGroup::with_run_id(run_id);
        rg.set("asic_id", "0004A30B");
        header.add_read_group(rg);
    }
    header.aux_fields.push(AuxField::new("channel_number", AuxType::Str));
    header.aux_fields.push(AuxField::new("start_time", AuxType::Uint64));

    let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
    let press = match path.extension().and_then(|e| e.to_str()) {
        Some("slow5") => PressMethod::None,
        _ => PressMethod::Zlib,
    };
    let mut writer = Writer::from_path(path, &header, press).expect("Failed to create input");
    for group in 0..run_ids.len() {
        for i in 0..per_group {
            let read_id = format!("{stem}_{group}_{i}");
            let record = Record::new(&read_id, group as u32, vec![i as i16; 16])
                .with_aux(vec![format!("{}", i + 1), format!("{}", 1000 * i)]);
            writer.write_record(&record).expect("Failed to write record");
        }
    }
    writer.finish().expect("Failed to finish input");
    path.to_path_buf()
}

/// Reads a whole file back.
pub fn read_file(path: &Path) -> (Header, Vec<Record>) {
    let mut reader = Reader::from_path(path).expect("Failed to open output");
    let records = reader.read_all().expect("Failed to read records");
    (reader.header().clone(), records)
}

/// Runs the binary with `args`.
pub fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_s5tools"))
        .args(args)
        .output()
        .expect("Failed to run s5tools")
}

/// Runs the binary with `args`, feeding `input` to its standard input.
pub fn run_with_stdin(args: &[&str], input: &[u8]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_s5tools"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to run s5tools");
    let mut stdin = child.stdin.take().expect("Standard input is piped");
    stdin.write_all(input).expect("Failed to write standard input");
    drop(stdin);
    child.wait_with_output().expect("Failed to wait for s5tools")
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().expect("Temporary paths are UTF-8")
}
