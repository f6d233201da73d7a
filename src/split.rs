//! Splitting files by record count, by output count or by read group.
//!
//! Each input is split independently, so inputs are spread over a
//! [`run_processes`] pool. The command line re-executes its own binary with
//! the hidden [`WORKER_SUBCOMMAND`] for every slice of inputs.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};

use crate::{
    run_processes, BoxedWriter, Format, Header, PressMethod, ProcessTask, Reader, Result,
    S5Error, Writer,
};

/// Name of the hidden subcommand a split worker process runs.
pub const WORKER_SUBCOMMAND: &str = "split-worker";

/// How each input is divided.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SplitMethod {
    /// Outputs of at most `n` records each
    Reads(usize),
    /// `n` outputs with records spread evenly
    Files(usize),
    /// One output per read group
    Groups,
}

/// Options for [`split_file`] and [`split_files`].
#[derive(Clone, Debug)]
pub struct SplitOptions {
    method: SplitMethod,
    format: Format,
    /// Defaults to the output format's method
    press: Option<PressMethod>,
    lossless: bool,
}
impl SplitOptions {
    #[must_use]
    pub fn new(method: SplitMethod) -> Self {
        Self {
            method,
            format: Format::Binary,
            press: None,
            lossless: true,
        }
    }
    #[must_use]
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
    #[must_use]
    pub fn press(mut self, press: PressMethod) -> Self {
        self.press = Some(press);
        self
    }
    #[must_use]
    pub fn lossless(mut self, lossless: bool) -> Self {
        self.lossless = lossless;
        self
    }
    pub fn method(&self) -> SplitMethod {
        self.method
    }
    /// Press method of the outputs.
    pub fn output_press(&self) -> PressMethod {
        self.press.unwrap_or_else(|| PressMethod::default_for(self.format))
    }

    fn validate(&self) -> Result<()> {
        self.output_press().validate_for(self.format)?;
        match self.method {
            SplitMethod::Reads(0) | SplitMethod::Files(0) => {
                Err(S5Error::Process("split count must be greater than zero".into()))
            }
            _ => Ok(()),
        }
    }

    /// Worker command line flags that reproduce these options.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["--to".to_string(), self.format.extension().to_string()];
        if let Some(press) = self.press {
            args.extend(["--compress".to_string(), press.name().to_string()]);
        }
        args.extend(["--lossless".to_string(), self.lossless.to_string()]);
        match self.method {
            SplitMethod::Reads(n) => args.extend(["--reads".to_string(), n.to_string()]),
            SplitMethod::Files(n) => args.extend(["--files".to_string(), n.to_string()]),
            SplitMethod::Groups => args.push("--groups".to_string()),
        }
        args
    }
}

/// File name of `input` without its format and stream compression extensions
pub(crate) fn stem(input: &Path) -> String {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name
        .strip_suffix(".gz")
        .or_else(|| name.strip_suffix(".zst"))
        .unwrap_or(&name);
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Record counts of `n` outputs sharing `total` records, remainder first.
/// Outputs that would be empty are omitted.
fn spread(total: usize, n: usize) -> Vec<usize> {
    let (limit, rem) = (total / n, total % n);
    (0..n)
        .map(|k| limit + usize::from(k < rem))
        .take_while(|&count| count > 0)
        .collect()
}

struct Splitter<'a> {
    reader: Reader<std::io::BufReader<crate::BoxedReader>>,
    out_dir: &'a Path,
    stem: String,
    options: &'a SplitOptions,
    outputs: Vec<PathBuf>,
}
impl Splitter<'_> {
    fn output_header(&self) -> Header {
        let mut header = self.reader.header().clone();
        if !self.options.lossless {
            header.aux_fields.clear();
        }
        header
    }

    fn create(&mut self, k: usize, header: &Header) -> Result<Writer<BoxedWriter>> {
        let path = self
            .out_dir
            .join(format!("{}_{k}.{}", self.stem, self.options.format.extension()));
        debug!("Writing {}", path.display());
        let writer = Writer::from_path(&path, header, self.options.output_press())?;
        self.outputs.push(path);
        Ok(writer)
    }

    fn next_record(&mut self) -> Result<Option<crate::Record>> {
        let Some(raw) = self.reader.next_raw()? else {
            return Ok(None);
        };
        let mut record = self.reader.decode(&raw)?;
        if !self.options.lossless {
            record.aux.clear();
        }
        Ok(Some(record))
    }

    fn by_counts(&mut self, counts: impl IntoIterator<Item = usize>) -> Result<()> {
        let header = self.output_header();
        for (k, count) in counts.into_iter().enumerate() {
            let Some(first) = self.next_record()? else {
                break;
            };
            let mut writer = self.create(k, &header)?;
            writer.write_record(&first)?;
            for _ in 1..count {
                match self.next_record()? {
                    Some(record) => writer.write_record(&record)?,
                    None => break,
                }
            }
            writer.finish()?;
        }
        Ok(())
    }

    fn by_groups(&mut self) -> Result<()> {
        let template = self.output_header();
        let mut writers = Vec::with_capacity(template.num_read_groups());
        for (k, rg) in template.read_groups.iter().enumerate() {
            let header = Header {
                version: template.version.clone(),
                read_groups: vec![rg.clone()],
                aux_fields: template.aux_fields.clone(),
            };
            writers.push(self.create(k, &header)?);
        }
        while let Some(mut record) = self.next_record()? {
            let group = record.read_group as usize;
            record.read_group = 0;
            writers[group].write_record(&record)?;
        }
        for writer in &mut writers {
            writer.finish()?;
        }
        Ok(())
    }
}

fn count_records(input: &Path) -> Result<usize> {
    let mut reader = Reader::from_path(input)?;
    let mut n = 0;
    while reader.next_raw()?.is_some() {
        n += 1;
    }
    Ok(n)
}

/// Splits one input into `out_dir`, returning the paths written.
///
/// Outputs are named `<stem>_<k>.<ext>`. An input whose read-group count does
/// not suit the method is skipped with a warning and yields no outputs.
pub fn split_file(input: &Path, out_dir: &Path, options: &SplitOptions) -> Result<Vec<PathBuf>> {
    options.validate()?;
    let reader = Reader::from_path(input)?;
    let groups = reader.header().num_read_groups();
    match options.method {
        SplitMethod::Groups if groups == 1 => {
            warn!("{} already has a single read group; skipping", input.display());
            return Ok(Vec::new());
        }
        SplitMethod::Reads(_) | SplitMethod::Files(_) if groups != 1 => {
            warn!(
                "{} has {groups} read groups; split it by read group first. Skipping",
                input.display()
            );
            return Ok(Vec::new());
        }
        _ => {}
    }

    let mut splitter = Splitter {
        reader,
        out_dir,
        stem: stem(input),
        options,
        outputs: Vec::new(),
    };
    match options.method {
        SplitMethod::Reads(n) => splitter.by_counts(std::iter::repeat(n))?,
        SplitMethod::Files(n) => splitter.by_counts(spread(count_records(input)?, n))?,
        SplitMethod::Groups => splitter.by_groups()?,
    }
    info!(
        "Split {} into {} files",
        input.display(),
        splitter.outputs.len()
    );
    Ok(splitter.outputs)
}

/// Splits a slice of inputs, either in-process or by re-executing `exe`.
#[derive(Clone, Debug)]
pub struct SplitTask {
    exe: PathBuf,
    out_dir: PathBuf,
    options: SplitOptions,
}
impl SplitTask {
    pub fn new(exe: PathBuf, out_dir: PathBuf, options: SplitOptions) -> Self {
        Self {
            exe,
            out_dir,
            options,
        }
    }
}
impl ProcessTask for SplitTask {
    fn command(&self, _worker: usize, files: &[PathBuf]) -> Result<Command> {
        let mut cmd = Command::new(&self.exe);
        cmd.arg(WORKER_SUBCOMMAND)
            .arg("--out-dir")
            .arg(&self.out_dir)
            .args(self.options.to_args())
            .arg("--")
            .args(files);
        Ok(cmd)
    }

    fn run_inline(&self, _worker: usize, files: &[PathBuf]) -> Result<()> {
        for file in files {
            split_file(file, &self.out_dir, &self.options)?;
        }
        Ok(())
    }
}

/// Splits every input into `out_dir` using up to `procs` processes.
pub fn split_files(
    inputs: &[PathBuf],
    out_dir: &Path,
    options: &SplitOptions,
    procs: usize,
) -> Result<()> {
    options.validate()?;
    fs::create_dir_all(out_dir)?;
    let task = SplitTask::new(std::env::current_exe()?, out_dir.to_path_buf(), options.clone());
    run_processes(inputs, procs, &task)
}
