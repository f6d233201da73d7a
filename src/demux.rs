//! Demultiplexing one file by a barcode summary.
//!
//! A barcode summary is a tab separated table with a header line. Two of its
//! columns name a read and the barcode arrangement it was assigned. Every
//! distinct arrangement becomes an output category; reads listed with more
//! than one arrangement and reads missing from the summary can be routed to
//! two extra categories.
//!
//! Each category's output is created on its first record and is named
//! `<stem>_<category>.<ext>`.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::split::stem;
use crate::{
    BatchProcessor, BatchScheduler, BoxedWriter, Format, Header, PressMethod, Reader, Record,
    Result, S5Error, Writer, BATCH_SIZE,
};

/// Default read identifier column of a barcode summary
pub const READ_ID_COLUMN: &str = "parent_read_id";
/// Default barcode arrangement column of a barcode summary
pub const BARCODE_COLUMN: &str = "barcode_arrangement";

/// Barcode arrangements of every read listed in a summary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BarcodeSummary {
    /// Distinct arrangements in order of first appearance
    codes: Vec<String>,
    /// Read id to indices into `codes`, without repeats
    reads: HashMap<String, Vec<usize>>,
}
impl BarcodeSummary {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        read_id_column: &str,
        barcode_column: &str,
    ) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), read_id_column, barcode_column)
    }

    /// Parses a summary whose first line names its columns.
    ///
    /// ```rust
    /// use s5tools::BarcodeSummary;
    ///
    /// let tsv = "parent_read_id\tbarcode_arrangement\nr0\tbc01\nr1\tbc02\nr1\tbc01\n";
    /// let summary =
    ///     BarcodeSummary::from_reader(tsv.as_bytes(), "parent_read_id", "barcode_arrangement")
    ///         .unwrap();
    /// assert_eq!(summary.codes(), ["bc01", "bc02"]);
    /// assert_eq!(summary.categories("r1"), Some(&[1, 0][..]));
    /// assert_eq!(summary.num_reads(), 2);
    /// ```
    pub fn from_reader<R: BufRead>(
        reader: R,
        read_id_column: &str,
        barcode_column: &str,
    ) -> Result<Self> {
        let mut lines = reader.lines();
        let header = lines.next().transpose()?.ok_or_else(|| S5Error::MalformedSummary {
            line: 1,
            reason: "the summary is empty".to_string(),
        })?;
        let columns: Vec<&str> = header.split('\t').collect();
        let position = |name: &str| {
            columns
                .iter()
                .position(|c| *c == name)
                .ok_or_else(|| S5Error::MalformedSummary {
                    line: 1,
                    reason: format!("missing column '{name}'"),
                })
        };
        let (rid_pos, code_pos) = (position(read_id_column)?, position(barcode_column)?);
        let min_fields = rid_pos.max(code_pos) + 1;

        let mut summary = Self::default();
        let mut code_index: HashMap<String, usize> = HashMap::new();
        for (idx, line) in lines.enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < min_fields {
                return Err(S5Error::MalformedSummary {
                    line: idx + 2,
                    reason: format!("expected at least {min_fields} columns"),
                });
            }
            let code = fields[code_pos];
            let next = summary.codes.len();
            let code = *code_index.entry(code.to_string()).or_insert(next);
            if code == next {
                summary.codes.push(fields[code_pos].to_string());
            }
            let codes = summary.reads.entry(fields[rid_pos].to_string()).or_default();
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        Ok(summary)
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }
    pub fn num_reads(&self) -> usize {
        self.reads.len()
    }
    /// Arrangement indices of a read, in the order they were listed.
    pub fn categories(&self, read_id: &str) -> Option<&[usize]> {
        self.reads.get(read_id).map(Vec::as_slice)
    }
}

/// Options for [`demux_file`].
#[derive(Clone, Debug)]
pub struct DemuxOptions {
    threads: usize,
    batch_size: usize,
    format: Format,
    /// Defaults to the output format's method
    press: Option<PressMethod>,
    lossless: bool,
    read_id_column: String,
    barcode_column: String,
    /// Category for reads absent from the summary; they are dropped when unset
    missing: Option<String>,
    /// Category for reads with several arrangements; they go to each when unset
    multi: Option<String>,
    delete_on_failure: bool,
}
impl Default for DemuxOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            batch_size: BATCH_SIZE,
            format: Format::Binary,
            press: None,
            lossless: true,
            read_id_column: READ_ID_COLUMN.to_string(),
            barcode_column: BARCODE_COLUMN.to_string(),
            missing: None,
            multi: None,
            delete_on_failure: true,
        }
    }
}
impl DemuxOptions {
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
    #[must_use]
    pub fn read_id_column(mut self, name: &str) -> Self {
        self.read_id_column = name.to_string();
        self
    }
    #[must_use]
    pub fn barcode_column(mut self, name: &str) -> Self {
        self.barcode_column = name.to_string();
        self
    }
    #[must_use]
    pub fn missing(mut self, name: &str) -> Self {
        self.missing = Some(name.to_string());
        self
    }
    #[must_use]
    pub fn multi(mut self, name: &str) -> Self {
        self.multi = Some(name.to_string());
        self
    }
    #[must_use]
    pub fn delete_on_failure(mut self, enabled: bool) -> Self {
        self.delete_on_failure = enabled;
        self
    }

    fn output_press(&self) -> PressMethod {
        self.press.unwrap_or_else(|| PressMethod::default_for(self.format))
    }
}

/// One output written by [`demux_file`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemuxOutput {
    pub category: String,
    pub path: PathBuf,
    pub records: u64,
}

/// Outcome of a successful demultiplex.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DemuxSummary {
    pub records_read: u64,
    /// Reads absent from the summary with no category to receive them
    pub records_dropped: u64,
    /// Outputs in category order
    pub outputs: Vec<DemuxOutput>,
}

/// Summary arrangements followed by the optional multi and missing categories
fn category_names(summary: &BarcodeSummary, options: &DemuxOptions) -> Result<Vec<String>> {
    let mut names = summary.codes().to_vec();
    for extra in [&options.multi, &options.missing].into_iter().flatten() {
        if names.contains(extra) {
            return Err(S5Error::CategoryExists(extra.clone()));
        }
        names.push(extra.clone());
    }
    Ok(names)
}

/// Where a record goes
struct Routed {
    read_id: String,
    listed: bool,
    targets: Vec<usize>,
    encoded: Vec<u8>,
}

struct Demuxer<'a> {
    in_format: Format,
    in_press: PressMethod,
    num_aux: usize,
    num_groups: usize,
    summary: &'a BarcodeSummary,
    multi: Option<usize>,
    missing: Option<usize>,
    out_format: Format,
    out_press: PressMethod,
    lossless: bool,
}
impl Demuxer<'_> {
    fn route(&self, read_id: &str) -> (bool, Vec<usize>) {
        match self.summary.categories(read_id) {
            Some(codes) if codes.len() > 1 => match self.multi {
                Some(multi) => (true, vec![multi]),
                None => (true, codes.to_vec()),
            },
            Some(codes) => (true, codes.to_vec()),
            None => (false, self.missing.into_iter().collect()),
        }
    }
}
impl BatchProcessor for Demuxer<'_> {
    type Item = Vec<u8>;
    type Output = Routed;

    fn process(&self, raw: &Vec<u8>) -> Result<Routed> {
        let mut record = Record::decode(raw, self.in_format, self.in_press, self.num_aux)?;
        if record.read_group as usize >= self.num_groups {
            return Err(S5Error::InvalidReadGroup {
                idx: record.read_group,
                max: self.num_groups,
            });
        }
        let (listed, targets) = self.route(&record.read_id);
        if !self.lossless {
            record.aux.clear();
        }
        let encoded = if targets.is_empty() {
            Vec::new()
        } else {
            record.encode(self.out_format, self.out_press)?
        };
        Ok(Routed {
            read_id: record.read_id,
            listed,
            targets,
            encoded,
        })
    }
}

/// Category outputs, created on first use
struct Outputs<'a> {
    dir: &'a Path,
    stem: String,
    header: Header,
    format: Format,
    press: PressMethod,
    names: Vec<String>,
    writers: Vec<Option<Writer<BoxedWriter>>>,
    paths: Vec<Option<PathBuf>>,
}
impl Outputs<'_> {
    fn write(&mut self, category: usize, encoded: &[u8]) -> Result<()> {
        if self.writers[category].is_none() {
            let name = format!(
                "{}_{}.{}",
                self.stem,
                self.names[category],
                self.format.extension()
            );
            let path = self.dir.join(name);
            debug!("Writing category {} to {}", self.names[category], path.display());
            self.paths[category] = Some(path.clone());
            self.writers[category] = Some(Writer::from_path(&path, &self.header, self.press)?);
        }
        match self.writers[category].as_mut() {
            Some(writer) => writer.write_encoded(encoded),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> Result<Vec<DemuxOutput>> {
        let mut outputs = Vec::new();
        for (category, slot) in self.writers.iter_mut().enumerate() {
            let (Some(writer), Some(path)) = (slot.as_mut(), &self.paths[category]) else {
                continue;
            };
            writer.finish()?;
            outputs.push(DemuxOutput {
                category: self.names[category].clone(),
                path: path.clone(),
                records: writer.records_written(),
            });
        }
        Ok(outputs)
    }

    /// Closes every writer and disposes of the files created so far.
    fn abandon(mut self, delete: bool) {
        self.writers.clear();
        for path in self.paths.iter().flatten() {
            if !delete {
                warn!("Leaving partial output {} in place", path.display());
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => info!("Removed partial output {}", path.display()),
                Err(e) => warn!("Could not remove partial output {}: {e}", path.display()),
            }
        }
    }
}

/// Splits `input` into one output per category of the barcode summary at
/// `summary_path`.
///
/// Outputs are written to `out_dir`, or beside the input when it is `None`.
/// Every summary read must be found in the input. Outputs created before a
/// failure are removed unless [`DemuxOptions::delete_on_failure`] is off.
///
/// # Examples
///
/// ```rust
/// use s5tools::{demux_file, DemuxOptions, Header, PressMethod, ReadGroup, Record, Writer};
///
/// # fn main() -> s5tools::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let input = dir.path().join("reads.blow5");
/// let mut header = Header::new();
/// header.add_read_group(ReadGroup::with_run_id("r1"));
/// let mut writer = Writer::from_path(&input, &header, PressMethod::Zlib)?;
/// for id in ["a", "b", "c"] {
///     writer.write_record(&Record::new(id, 0, vec![1, 2]))?;
/// }
/// writer.finish()?;
///
/// let tsv = dir.path().join("barcodes.tsv");
/// std::fs::write(&tsv, "parent_read_id\tbarcode_arrangement\na\tbc01\nb\tbc02\nc\tbc01\n")?;
///
/// let summary = demux_file(&input, &tsv, None, &DemuxOptions::new())?;
/// assert_eq!(summary.outputs.len(), 2);
/// assert_eq!(summary.outputs[0].path, dir.path().join("reads_bc01.blow5"));
/// assert_eq!(summary.outputs[0].records, 2);
/// # Ok(())
/// # }
/// ```
pub fn demux_file(
    input: &Path,
    summary_path: &Path,
    out_dir: Option<&Path>,
    options: &DemuxOptions,
) -> Result<DemuxSummary> {
    let out_press = options.output_press();
    out_press.validate_for(options.format)?;
    let summary =
        BarcodeSummary::from_path(summary_path, &options.read_id_column, &options.barcode_column)?;
    let names = category_names(&summary, options)?;
    let mut reader = Reader::from_path(input)?;
    info!(
        "Demultiplexing {} into {} categories from {} listed reads",
        input.display(),
        names.len(),
        summary.num_reads()
    );

    let mut header = reader.header().clone();
    if !options.lossless {
        header.aux_fields.clear();
    }
    let dir = match out_dir {
        Some(dir) => dir,
        None => input.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new(".")),
    };
    let num_codes = summary.codes().len();
    let demuxer = Demuxer {
        in_format: reader.format(),
        in_press: reader.press(),
        num_aux: reader.header().aux_fields.len(),
        num_groups: reader.header().num_read_groups(),
        summary: &summary,
        multi: options.multi.as_ref().map(|_| num_codes),
        missing: options
            .missing
            .as_ref()
            .map(|_| num_codes + usize::from(options.multi.is_some())),
        out_format: options.format,
        out_press,
        lossless: options.lossless,
    };
    let mut outputs = Outputs {
        dir,
        stem: stem(input),
        header,
        format: options.format,
        press: out_press,
        writers: names.iter().map(|_| None).collect(),
        paths: vec![None; names.len()],
        names,
    };

    let scheduler = BatchScheduler::new(options.threads);
    let mut result = DemuxSummary::default();
    let written = (|| -> Result<Vec<DemuxOutput>> {
        let mut listed = 0;
        loop {
            let batch = reader.next_raw_batch(options.batch_size)?;
            if batch.is_empty() {
                break;
            }
            for routed in scheduler.run(&batch, &demuxer)? {
                result.records_read += 1;
                listed += usize::from(routed.listed);
                if routed.targets.is_empty() {
                    warn!("Read ID '{}' is missing from the barcode summary", routed.read_id);
                    result.records_dropped += 1;
                }
                for category in routed.targets {
                    outputs.write(category, &routed.encoded)?;
                }
            }
        }
        if listed < summary.num_reads() {
            return Err(S5Error::ExtraSummaryReads {
                expected: summary.num_reads(),
                found: listed,
            });
        }
        outputs.finish()
    })();

    match written {
        Ok(written) => {
            result.outputs = written;
            info!(
                "Wrote {} outputs from {} records ({} dropped)",
                result.outputs.len(),
                result.records_read,
                result.records_dropped
            );
            Ok(result)
        }
        Err(e) => {
            outputs.abandon(options.delete_on_failure);
            Err(e)
        }
    }
}
