//! Signal-free listings of a file's contents.

use std::io::Write;
use std::path::Path;

use log::debug;

use crate::view::open_input;
use crate::{
    BatchProcessor, BatchScheduler, Format, PressMethod, Record, Result, S5Error, BATCH_SIZE,
};

/// What [`skim_file`] prints.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SkimMode {
    /// The column line followed by every record with `.` for its signal
    #[default]
    Records,
    /// The header text only
    Header,
    /// One read id per line
    ReadIds,
}

/// Options for [`skim_file`].
#[derive(Clone, Debug)]
pub struct SkimOptions {
    threads: usize,
    batch_size: usize,
    mode: SkimMode,
}
impl Default for SkimOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            batch_size: BATCH_SIZE,
            mode: SkimMode::Records,
        }
    }
}
impl SkimOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
    #[must_use]
    pub fn mode(mut self, mode: SkimMode) -> Self {
        self.mode = mode;
        self
    }
}

struct Skimmer {
    format: Format,
    press: PressMethod,
    num_aux: usize,
    num_groups: usize,
    mode: SkimMode,
}
impl BatchProcessor for Skimmer {
    type Item = Vec<u8>;
    type Output = String;

    fn process(&self, raw: &Vec<u8>) -> Result<String> {
        let record = Record::decode(raw, self.format, self.press, self.num_aux)?;
        if record.read_group as usize >= self.num_groups {
            return Err(S5Error::InvalidReadGroup {
                idx: record.read_group,
                max: self.num_groups,
            });
        }
        Ok(match self.mode {
            SkimMode::ReadIds => record.read_id,
            _ => record.to_summary_line(),
        })
    }
}

/// Writes a listing of `input` to `out` and returns the number of records
/// listed. An `input` of `-` reads standard input.
///
/// # Examples
///
/// ```rust
/// use s5tools::{skim_file, Header, PressMethod, ReadGroup, Record, SkimMode, SkimOptions, Writer};
///
/// # fn main() -> s5tools::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let input = dir.path().join("reads.blow5");
/// let mut header = Header::new();
/// header.add_read_group(ReadGroup::with_run_id("r1"));
/// let mut writer = Writer::from_path(&input, &header, PressMethod::Zlib)?;
/// writer.write_record(&Record::new("read_0", 0, vec![1, 2, 3]))?;
/// writer.finish()?;
///
/// let mut out = Vec::new();
/// skim_file(&input, &mut out, &SkimOptions::new().mode(SkimMode::ReadIds))?;
/// assert_eq!(out, b"read_0\n");
/// # Ok(())
/// # }
/// ```
pub fn skim_file<W: Write>(input: &Path, out: &mut W, options: &SkimOptions) -> Result<u64> {
    let mut reader = open_input(input)?;
    let text = reader.header().to_text();
    match options.mode {
        SkimMode::Header => {
            out.write_all(text.as_bytes())?;
            out.flush()?;
            return Ok(0);
        }
        SkimMode::Records => {
            if let Some(columns) = text.lines().last() {
                writeln!(out, "{columns}")?;
            }
        }
        SkimMode::ReadIds => {}
    }

    let skimmer = Skimmer {
        format: reader.format(),
        press: reader.press(),
        num_aux: reader.header().aux_fields.len(),
        num_groups: reader.header().num_read_groups(),
        mode: options.mode,
    };
    let scheduler = BatchScheduler::new(options.threads);
    let mut listed = 0;
    loop {
        let batch = reader.next_raw_batch(options.batch_size)?;
        if batch.is_empty() {
            break;
        }
        for line in scheduler.run(&batch, &skimmer)? {
            writeln!(out, "{line}")?;
            listed += 1;
        }
    }
    out.flush()?;
    debug!("Listed {listed} records from {}", input.display());
    Ok(listed)
}
