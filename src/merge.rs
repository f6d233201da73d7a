//! Multi-file merge into one read-group namespace.
//!
//! A merge runs in two phases:
//!
//! 1. **Discovery** (single-threaded): every input header is opened, its read
//!    groups are registered in a [`ReadGroupRegistry`] and the auxiliary field
//!    schemas are unioned. The registry is then frozen together with one
//!    auxiliary column map per file.
//! 2. **Write**: records are decoded, their read group (and auxiliary column
//!    order) rewritten from the frozen tables, and re-encoded with the output
//!    press method.
//!
//! With [`MergeStrategy::Sharded`] the input files are partitioned by count
//! across workers, each worker writes a private shard into a scratch
//! directory, and the shards are composed in worker order behind the
//! canonical header. With [`MergeStrategy::Sequential`] a single output stream
//! is written in input order while record batches are rewritten by the
//! [`BatchScheduler`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use tempfile::TempDir;

use crate::process::partition;
use crate::{
    parallel::resolve_threads, AttributeDivergence, AuxField, AuxType, BatchProcessor,
    BatchScheduler, Format, FrozenRegistry, Header, PressMethod, ReadGroupRegistry, Reader,
    Record, RemapTable, Result, S5Error, Writer, BATCH_SIZE,
};

const SCRATCH_PREFIX: &str = "s5merge";

/// How the write phase is carried out.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MergeStrategy {
    /// One shard per worker, composed at the end
    #[default]
    Sharded,
    /// One output stream, batches rewritten in parallel
    Sequential,
}
impl MergeStrategy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sharded" => Some(Self::Sharded),
            "sequential" => Some(Self::Sequential),
            _ => None,
        }
    }
}

/// Options for [`merge_files`].
#[derive(Clone, Debug)]
pub struct MergeOptions {
    /// Worker threads, `0` for every available core
    threads: usize,
    /// Records rewritten per scheduler call in the sequential strategy
    batch_size: usize,
    /// Press method of the output records, defaults to the output format's
    press: Option<PressMethod>,
    /// Keep auxiliary fields
    lossless: bool,
    strategy: MergeStrategy,
    /// Parent of the scratch directory, defaults to the output's directory
    tmp_dir: Option<PathBuf>,
    /// Remove partial output and scratch files when the merge fails
    delete_on_failure: bool,
}
impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            batch_size: BATCH_SIZE,
            press: None,
            lossless: true,
            strategy: MergeStrategy::default(),
            tmp_dir: None,
            delete_on_failure: true,
        }
    }
}
impl MergeOptions {
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
    pub fn strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }
    #[must_use]
    pub fn tmp_dir(mut self, path: PathBuf) -> Self {
        self.tmp_dir = Some(path);
        self
    }
    #[must_use]
    pub fn delete_on_failure(mut self, enabled: bool) -> Self {
        self.delete_on_failure = enabled;
        self
    }

    /// Press method used for an output of the given format.
    pub fn press_for(&self, format: Format) -> PressMethod {
        self.press.unwrap_or_else(|| PressMethod::default_for(format))
    }
}

/// Outcome of a successful merge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub files_merged: usize,
    pub files_skipped: usize,
    pub read_groups: usize,
    pub records_written: u64,
    pub divergences: Vec<AttributeDivergence>,
}

/// Per-run scratch directory holding one shard per worker.
///
/// Named `<base>/s5merge_<unix-seconds>_<pid>`. [`ScratchDir::remove`] deletes
/// it after a successful merge and reports failures. [`ScratchDir::abandon`]
/// is called when the merge fails: the directory is deleted only when
/// `delete_on_failure` was requested, otherwise it is kept for inspection.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
    delete_on_failure: bool,
}
impl ScratchDir {
    pub fn create(base: &Path, delete_on_failure: bool) -> Result<Self> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let dir = tempfile::Builder::new()
            .prefix(&format!("{SCRATCH_PREFIX}_{secs}_{}", std::process::id()))
            .rand_bytes(0)
            .tempdir_in(base)?;
        debug!("Created scratch directory {}", dir.path().display());
        Ok(Self {
            dir,
            delete_on_failure,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a worker's shard.
    pub fn shard_path(&self, worker: usize, format: Format) -> PathBuf {
        self.dir.path().join(format!("{worker}.{}", format.extension()))
    }

    /// Deletes the directory and every shard in it.
    pub fn remove(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }

    /// Disposes of the directory after a failed merge.
    pub fn abandon(self) {
        if self.delete_on_failure {
            return;
        }
        let path = self.dir.keep();
        warn!("Leaving scratch directory {} in place", path.display());
    }
}

/// Removes a partially written output unless it has been committed.
pub(crate) struct OutputGuard<'a> {
    path: &'a Path,
    delete_on_failure: bool,
    committed: bool,
}
impl<'a> OutputGuard<'a> {
    pub(crate) fn new(path: &'a Path, delete_on_failure: bool) -> Self {
        Self {
            path,
            delete_on_failure,
            committed: false,
        }
    }
    pub(crate) fn commit(mut self) {
        self.committed = true;
    }
}
impl Drop for OutputGuard<'_> {
    fn drop(&mut self) {
        if self.committed || !self.path.exists() {
            return;
        }
        if self.delete_on_failure {
            match fs::remove_file(self.path) {
                Ok(()) => info!("Removed partial output {}", self.path.display()),
                Err(e) => warn!("Could not remove partial output {}: {e}", self.path.display()),
            }
        } else {
            warn!("Leaving partial output {} in place", self.path.display());
        }
    }
}

/// Output column to input column, `None` where the input lacks the field
pub type AuxMap = Vec<Option<usize>>;

/// Accumulates the union of auxiliary schemas.
///
/// Enum fields keep their encounter order and must agree on their labels;
/// every other field follows, sorted by name.
#[derive(Debug, Default)]
struct AuxUnion {
    enums: Vec<AuxField>,
    others: BTreeMap<String, AuxField>,
}
impl AuxUnion {
    fn add(&mut self, fields: &[AuxField], source: &str) -> Result<()> {
        for field in fields {
            let existing = self
                .enums
                .iter()
                .find(|f| f.name == field.name)
                .or_else(|| self.others.get(&field.name))
                .cloned();
            match existing {
                None if field.ty == AuxType::Enum => self.enums.push(field.clone()),
                None => {
                    self.others.insert(field.name.clone(), field.clone());
                }
                Some(known) if known.ty != field.ty => {
                    return Err(S5Error::AuxSchemaMismatch {
                        path: source.to_string(),
                        reason: format!(
                            "field {} is {} but was {} in an earlier input",
                            field.name,
                            field.ty.tag(),
                            known.ty.tag()
                        ),
                    })
                }
                Some(known) if known.enum_labels != field.enum_labels => {
                    return Err(S5Error::AuxSchemaMismatch {
                        path: source.to_string(),
                        reason: format!(
                            "enum field {} has different labels or label order",
                            field.name
                        ),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn into_fields(self) -> Vec<AuxField> {
        self.enums.into_iter().chain(self.others.into_values()).collect()
    }
}

fn aux_map(output: &[AuxField], input: &[AuxField]) -> AuxMap {
    output
        .iter()
        .map(|field| input.iter().position(|f| f.name == field.name))
        .collect()
}

/// One input admitted by discovery
#[derive(Clone, Debug)]
struct MergeInput {
    path: PathBuf,
    aux_map: AuxMap,
}

/// Frozen result of discovery, shared read-only by all workers
#[derive(Clone, Debug)]
struct MergePlan {
    inputs: Vec<MergeInput>,
    registry: FrozenRegistry,
    header: Header,
    files_skipped: usize,
}

fn discover(paths: &[PathBuf], lossless: bool) -> Result<MergePlan> {
    let mut registry = ReadGroupRegistry::new();
    let mut union = AuxUnion::default();
    let mut admitted = Vec::with_capacity(paths.len());
    let mut files_skipped = 0;

    for path in paths {
        let reader = match Reader::from_path(path) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                files_skipped += 1;
                continue;
            }
        };
        let header = reader.header();
        let source = path.display().to_string();
        if lossless {
            if !header.is_lossless() {
                return Err(S5Error::NoAuxFields(source));
            }
            union.add(&header.aux_fields, &source)?;
        }
        registry.register_header(header, &source)?;
        admitted.push((path.clone(), header.aux_fields.clone()));
    }

    let aux_fields = if lossless { union.into_fields() } else { Vec::new() };
    let registry = registry.freeze();
    for divergence in registry.divergences() {
        warn!("{divergence}; keeping the first values");
    }
    let inputs = admitted
        .into_iter()
        .map(|(path, fields)| MergeInput {
            aux_map: aux_map(&aux_fields, &fields),
            path,
        })
        .collect();
    let header = registry.header(aux_fields);

    Ok(MergePlan {
        inputs,
        registry,
        header,
        files_skipped,
    })
}

/// Rewrites the encoded records of one input into the output encoding.
struct Rewriter<'a> {
    in_format: Format,
    in_press: PressMethod,
    in_aux: usize,
    remap: &'a RemapTable,
    aux_map: &'a [Option<usize>],
    out_format: Format,
    out_press: PressMethod,
}
impl Rewriter<'_> {
    fn apply(&self, record: &mut Record) -> Result<()> {
        record.read_group = self.remap.remap(record.read_group)?;
        let mut aux = std::mem::take(&mut record.aux);
        record.aux = self
            .aux_map
            .iter()
            .map(|col| match *col {
                Some(i) => std::mem::take(&mut aux[i]),
                None => String::new(),
            })
            .collect();
        Ok(())
    }
}
impl BatchProcessor for Rewriter<'_> {
    type Item = Vec<u8>;
    type Output = Vec<u8>;

    fn process(&self, raw: &Vec<u8>) -> Result<Vec<u8>> {
        let mut record = Record::decode(raw, self.in_format, self.in_press, self.in_aux)?;
        self.apply(&mut record)?;
        record.encode(self.out_format, self.out_press)
    }
}

impl MergePlan {
    fn rewriter<'a, R: std::io::BufRead>(
        &'a self,
        file_idx: usize,
        reader: &Reader<R>,
        out_format: Format,
        out_press: PressMethod,
    ) -> Result<Rewriter<'a>> {
        let remap = self.registry.remap_table(file_idx).ok_or_else(|| {
            S5Error::Process(format!("no remap table for input {file_idx}").into())
        })?;
        if remap.len() != reader.header().num_read_groups() {
            let path = self.inputs[file_idx].path.display();
            return Err(S5Error::MalformedHeader {
                line: 2,
                reason: format!("{path} changed during the merge"),
            });
        }
        Ok(Rewriter {
            in_format: reader.format(),
            in_press: reader.press(),
            in_aux: reader.header().aux_fields.len(),
            remap,
            aux_map: &self.inputs[file_idx].aux_map,
            out_format,
            out_press,
        })
    }
}

/// Merges `inputs` into `output`, whose extension selects the output format.
///
/// Files that cannot be opened are skipped with a warning. A missing run
/// identifier, a lossless merge over an input without auxiliary fields or an
/// incompatible auxiliary schema aborts the merge before anything is written.
///
/// # Examples
///
/// ```rust
/// use s5tools::{merge_files, Header, MergeOptions, PressMethod, ReadGroup, Record, Writer};
///
/// # fn main() -> s5tools::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let mut inputs = Vec::new();
/// for (name, run_id) in [("a.blow5", "r1"), ("b.blow5", "r2")] {
///     let mut header = Header::new();
///     header.add_read_group(ReadGroup::with_run_id(run_id));
///     let path = dir.path().join(name);
///     let mut writer = Writer::from_path(&path, &header, PressMethod::None)?;
///     writer.write_record(&Record::new(name, 0, vec![1, 2, 3]))?;
///     writer.finish()?;
///     inputs.push(path);
/// }
///
/// let output = dir.path().join("merged.blow5");
/// let options = MergeOptions::new().threads(2).lossless(false);
/// let summary = merge_files(&inputs, &output, &options)?;
/// assert_eq!(summary.read_groups, 2);
/// assert_eq!(summary.records_written, 2);
/// # Ok(())
/// # }
/// ```
pub fn merge_files(
    inputs: &[PathBuf],
    output: &Path,
    options: &MergeOptions,
) -> Result<MergeSummary> {
    let out_format = Format::from_path(output)?;
    let press = options.press_for(out_format);
    press.validate_for(out_format)?;
    if inputs.is_empty() {
        return Err(S5Error::NoInputFiles);
    }

    let plan = discover(inputs, options.lossless)?;
    if plan.inputs.is_empty() {
        return Err(S5Error::NoInputFiles);
    }
    info!(
        "Merging {} files into {} read groups ({} skipped)",
        plan.inputs.len(),
        plan.registry.num_groups(),
        plan.files_skipped
    );

    let encoding = (out_format, press);
    let records_written = match options.strategy {
        MergeStrategy::Sharded => merge_sharded(&plan, output, encoding, options)?,
        MergeStrategy::Sequential => merge_sequential(&plan, output, encoding, options)?,
    };
    info!("Wrote {records_written} records to {}", output.display());

    Ok(MergeSummary {
        files_merged: plan.inputs.len(),
        files_skipped: plan.files_skipped,
        read_groups: plan.registry.num_groups(),
        records_written,
        divergences: plan.registry.divergences().to_vec(),
    })
}

/// Streams a contiguous range of inputs into one shard.
fn write_shard(
    plan: &MergePlan,
    files: std::ops::Range<usize>,
    shard: &Path,
    format: Format,
    press: PressMethod,
) -> Result<u64> {
    let mut writer = Writer::shard_from_path(shard, format, press)?;
    for file_idx in files {
        let mut reader = Reader::from_path(&plan.inputs[file_idx].path)?;
        let rewriter = plan.rewriter(file_idx, &reader, format, press)?;
        while let Some(raw) = reader.next_raw()? {
            writer.write_encoded(&rewriter.process(&raw)?)?;
        }
    }
    writer.finish()?;
    Ok(writer.records_written())
}

fn merge_sharded(
    plan: &MergePlan,
    output: &Path,
    encoding: (Format, PressMethod),
    options: &MergeOptions,
) -> Result<u64> {
    let base = match &options.tmp_dir {
        Some(dir) => dir.clone(),
        None => output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let scratch = ScratchDir::create(&base, options.delete_on_failure)?;
    match write_and_compose(plan, output, encoding, options, &scratch) {
        Ok(records) => {
            scratch.remove()?;
            Ok(records)
        }
        Err(e) => {
            scratch.abandon();
            Err(e)
        }
    }
}

fn write_and_compose(
    plan: &MergePlan,
    output: &Path,
    (format, press): (Format, PressMethod),
    options: &MergeOptions,
    scratch: &ScratchDir,
) -> Result<u64> {
    let ranges = partition(plan.inputs.len(), resolve_threads(options.threads));
    let shards: Vec<PathBuf> = (0..ranges.len())
        .map(|worker| scratch.shard_path(worker, format))
        .collect();
    debug!(
        "Writing {} shards into {}",
        shards.len(),
        scratch.path().display()
    );

    let outcomes: Vec<thread::Result<Result<u64>>> = thread::scope(|s| {
        let handles: Vec<_> = ranges
            .iter()
            .cloned()
            .zip(&shards)
            .map(|(range, shard)| s.spawn(move || write_shard(plan, range, shard, format, press)))
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });
    let mut records = 0;
    for (worker, outcome) in outcomes.into_iter().enumerate() {
        records += outcome.map_err(|_| S5Error::WorkerPanicked(worker))??;
    }

    let guard = OutputGuard::new(output, options.delete_on_failure);
    let mut writer = Writer::from_path(output, &plan.header, press)?;
    for shard in &shards {
        writer.append_shard(shard)?;
    }
    writer.finish()?;
    drop(writer);
    guard.commit();
    Ok(records)
}

fn merge_sequential(
    plan: &MergePlan,
    output: &Path,
    (format, press): (Format, PressMethod),
    options: &MergeOptions,
) -> Result<u64> {
    let scheduler = BatchScheduler::new(options.threads);
    let guard = OutputGuard::new(output, options.delete_on_failure);
    let mut writer = Writer::from_path(output, &plan.header, press)?;

    for (file_idx, input) in plan.inputs.iter().enumerate() {
        let mut reader = Reader::from_path(&input.path)?;
        let rewriter = plan.rewriter(file_idx, &reader, format, press)?;
        loop {
            let batch = reader.next_raw_batch(options.batch_size)?;
            if batch.is_empty() {
                break;
            }
            for encoded in scheduler.run(&batch, &rewriter)? {
                writer.write_encoded(&encoded)?;
            }
        }
    }
    writer.finish()?;
    let records = writer.records_written();
    drop(writer);
    guard.commit();
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReadGroup;

    fn write_input(
        dir: &Path,
        name: &str,
        run_ids: &[&str],
        aux: &[AuxField],
        n: usize,
    ) -> PathBuf {
        let mut header = Header::new();
        for run_id in run_ids {
            header.add_read_group(ReadGroup::with_run_id(run_id));
        }
        header.aux_fields = aux.to_vec();
        let path = dir.join(name);
        let mut writer = Writer::from_path(&path, &header, PressMethod::None).unwrap();
        for i in 0..n {
            let aux_values = aux.iter().map(|f| format!("{}_{i}", f.name)).collect();
            let group = (i % run_ids.len()) as u32;
            let record =
                Record::new(&format!("{name}_{i}"), group, vec![i as i16; 3]).with_aux(aux_values);
            writer.write_record(&record).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    fn read_output(path: &Path) -> (Header, Vec<Record>) {
        let reader = Reader::from_path(path).unwrap();
        let header = reader.header().clone();
        (header, reader.collect::<Result<_>>().unwrap())
    }

    #[test]
    fn test_shared_run_id_single_group() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1", "r1"], &[], 4);
        let b = write_input(dir.path(), "b.blow5", &["r1"], &[], 2);
        let output = dir.path().join("out.blow5");

        let options = MergeOptions::new().lossless(false).threads(2);
        let summary = merge_files(&[a, b], &output, &options).unwrap();
        assert_eq!(summary.read_groups, 1);
        assert_eq!(summary.records_written, 6);

        let (header, records) = read_output(&output);
        assert_eq!(header.num_read_groups(), 1);
        assert!(records.iter().all(|r| r.read_group == 0));
    }

    #[test]
    fn test_distinct_run_id_remaps_records() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1", "r1"], &[], 4);
        let b = write_input(dir.path(), "b.blow5", &["r1x"], &[], 3);
        let output = dir.path().join("out.blow5");

        let options = MergeOptions::new().lossless(false).threads(2);
        merge_files(&[a, b], &output, &options).unwrap();

        let (header, records) = read_output(&output);
        assert_eq!(header.num_read_groups(), 2);
        for record in &records {
            let expected = if record.read_id.starts_with("a.blow5") { 0 } else { 1 };
            assert_eq!(record.read_group, expected, "{}", record.read_id);
        }
        assert_eq!(records.len(), 7);
    }

    #[test]
    fn test_single_worker_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let aux = [AuxField::new("channel_number", AuxType::Str)];
        let inputs: Vec<PathBuf> = (0..4)
            .map(|i| {
                let run_id = format!("r{}", i % 2);
                write_input(dir.path(), &format!("{i}.blow5"), &[run_id.as_str()], &aux, 50)
            })
            .collect();

        let sharded = dir.path().join("sharded.blow5");
        let sequential = dir.path().join("sequential.blow5");
        merge_files(&inputs, &sharded, &MergeOptions::new().threads(1)).unwrap();
        let options = MergeOptions::new()
            .threads(3)
            .batch_size(7)
            .strategy(MergeStrategy::Sequential);
        merge_files(&inputs, &sequential, &options).unwrap();
        assert_eq!(fs::read(&sharded).unwrap(), fs::read(&sequential).unwrap());
    }

    #[test]
    fn test_sharded_output_in_worker_order() {
        let dir = tempfile::tempdir().unwrap();
        let inputs: Vec<PathBuf> = (0..5)
            .map(|i| write_input(dir.path(), &format!("{i}.slow5"), &["r1"], &[], 3))
            .collect();
        let output = dir.path().join("out.slow5");
        let options = MergeOptions::new()
            .lossless(false)
            .threads(2)
            .press(PressMethod::None);
        merge_files(&inputs, &output, &options).unwrap();

        let (_, records) = read_output(&output);
        let prefixes: Vec<&str> = records.iter().map(|r| &r.read_id[..1]).collect();
        let expected: Vec<String> = (0..15).map(|i| (i / 3).to_string()).collect();
        assert_eq!(prefixes, expected);
    }

    #[test]
    fn test_scratch_directory_removed() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1"], &[], 2);
        let b = write_input(dir.path(), "b.blow5", &["r2"], &[], 2);
        let options = MergeOptions::new()
            .lossless(false)
            .threads(2)
            .tmp_dir(scratch.path().to_path_buf());
        merge_files(&[a, b], &dir.path().join("out.blow5"), &options).unwrap();
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_aux_union() {
        let dir = tempfile::tempdir().unwrap();
        let end_reason = AuxField::new_enum("end_reason", &["unknown", "signal_positive"]);
        let a = write_input(
            dir.path(),
            "a.blow5",
            &["r1"],
            &[AuxField::new("start_time", AuxType::Uint64), end_reason.clone()],
            2,
        );
        let b = write_input(
            dir.path(),
            "b.blow5",
            &["r2"],
            &[AuxField::new("channel_number", AuxType::Str), end_reason],
            2,
        );
        let output = dir.path().join("out.blow5");
        merge_files(&[a, b], &output, &MergeOptions::new()).unwrap();

        let (header, records) = read_output(&output);
        let names: Vec<&str> = header.aux_fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["end_reason", "channel_number", "start_time"]);

        let from_a = records.iter().find(|r| r.read_id == "a.blow5_1").unwrap();
        assert_eq!(from_a.aux, vec!["end_reason_1", "", "start_time_1"]);
        let from_b = records.iter().find(|r| r.read_id == "b.blow5_0").unwrap();
        assert_eq!(from_b.aux, vec!["end_reason_0", "channel_number_0", ""]);
    }

    #[test]
    fn test_enum_label_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let a_aux = [AuxField::new_enum("e", &["x", "y"])];
        let b_aux = [AuxField::new_enum("e", &["y", "x"])];
        let a = write_input(dir.path(), "a.blow5", &["r1"], &a_aux, 1);
        let b = write_input(dir.path(), "b.blow5", &["r2"], &b_aux, 1);
        let output = dir.path().join("out.blow5");
        let result = merge_files(&[a, b], &output, &MergeOptions::new());
        assert!(matches!(result, Err(S5Error::AuxSchemaMismatch { .. })));
        assert!(!output.exists());
    }

    #[test]
    fn test_lossless_requires_aux() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1"], &[], 1);
        let result = merge_files(&[a], &dir.path().join("out.blow5"), &MergeOptions::new());
        assert!(matches!(result, Err(S5Error::NoAuxFields(_))));
    }

    #[test]
    fn test_lossy_drops_aux() {
        let dir = tempfile::tempdir().unwrap();
        let aux = [AuxField::new("channel_number", AuxType::Str)];
        let a = write_input(dir.path(), "a.blow5", &["r1"], &aux, 3);
        let output = dir.path().join("out.blow5");
        merge_files(&[a], &output, &MergeOptions::new().lossless(false)).unwrap();
        let (header, records) = read_output(&output);
        assert!(header.aux_fields.is_empty());
        assert!(records.iter().all(|r| r.aux.is_empty()));
    }

    #[test]
    fn test_missing_run_id_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1"], &[], 1);
        let b = write_input(dir.path(), "b.blow5", &[""], &[], 1);
        let output = dir.path().join("out.blow5");
        let result = merge_files(&[a, b], &output, &MergeOptions::new().lossless(false));
        assert!(matches!(result, Err(S5Error::MissingRunId { .. })));
        assert!(!output.exists());
    }

    #[test]
    fn test_unreadable_input_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1"], &[], 2);
        let missing = dir.path().join("missing.blow5");
        let output = dir.path().join("out.blow5");
        let options = MergeOptions::new().lossless(false);
        let summary = merge_files(&[a, missing], &output, &options).unwrap();
        assert_eq!(summary.files_merged, 1);
        assert_eq!(summary.files_skipped, 1);
    }

    #[test]
    fn test_corrupt_input_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1"], &[], 3);
        let mut bytes = fs::read(&a).unwrap();
        bytes.truncate(bytes.len() - 5);
        fs::write(&a, bytes).unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.blow5");
        let options = MergeOptions::new()
            .lossless(false)
            .strategy(MergeStrategy::Sequential)
            .tmp_dir(scratch.path().to_path_buf());
        let result = merge_files(&[a], &output, &options);
        assert!(matches!(result, Err(S5Error::MissingEof(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_failed_shard_keeps_scratch_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1"], &[], 3);
        let mut bytes = fs::read(&a).unwrap();
        bytes.truncate(bytes.len() - 5);
        fs::write(&a, bytes).unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let options = MergeOptions::new()
            .lossless(false)
            .delete_on_failure(false)
            .tmp_dir(scratch.path().to_path_buf());
        let result = merge_files(&[a], &dir.path().join("out.blow5"), &options);
        assert!(result.is_err());

        let kept: Vec<PathBuf> = fs::read_dir(scratch.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(kept.len(), 1);
        let name = kept[0].file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("s5merge_"));
        assert!(name.ends_with(&format!("_{}", std::process::id())));
        assert!(kept[0].is_dir());
    }

    #[test]
    fn test_failed_shard_removes_scratch_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1"], &[], 3);
        let mut bytes = fs::read(&a).unwrap();
        bytes.truncate(bytes.len() - 5);
        fs::write(&a, bytes).unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let options = MergeOptions::new()
            .lossless(false)
            .tmp_dir(scratch.path().to_path_buf());
        assert!(merge_files(&[a], &dir.path().join("out.blow5"), &options).is_err());
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_kept_partial_output_has_no_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1"], &[], 3);
        let b = write_input(dir.path(), "b.blow5", &["r1"], &[], 3);
        let mut bytes = fs::read(&b).unwrap();
        bytes.truncate(bytes.len() - 5);
        fs::write(&b, bytes).unwrap();

        let output = dir.path().join("out.blow5");
        let options = MergeOptions::new()
            .lossless(false)
            .strategy(MergeStrategy::Sequential)
            .delete_on_failure(false);
        let result = merge_files(&[a, b], &output, &options);
        assert!(matches!(result, Err(S5Error::MissingEof(_))));

        assert!(output.exists());
        assert!(!fs::read(&output).unwrap().ends_with(&crate::EOF_MARKER));
        let read: Result<Vec<Record>> = Reader::from_path(&output).unwrap().collect();
        assert!(matches!(read, Err(S5Error::MissingEof(_))));
    }

    #[test]
    fn test_damaged_header_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1"], &[], 2);
        let b = write_input(dir.path(), "b.blow5", &["r2"], &[], 2);
        let mut bytes = fs::read(&b).unwrap();
        // header_len field of the preamble
        bytes[16..24].copy_from_slice(&u64::MAX.to_le_bytes());
        fs::write(&b, bytes).unwrap();

        let output = dir.path().join("out.blow5");
        let options = MergeOptions::new().lossless(false);
        let summary = merge_files(&[a, b], &output, &options).unwrap();
        assert_eq!(summary.files_merged, 1);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(read_output(&output).1.len(), 2);
    }

    #[test]
    fn test_text_output_defaults_to_no_press() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1"], &[], 2);
        let output = dir.path().join("out.slow5");
        let options = MergeOptions::new().lossless(false);
        assert_eq!(options.press_for(Format::Text), PressMethod::None);
        assert_eq!(options.press_for(Format::Binary), PressMethod::Zlib);
        merge_files(&[a], &output, &options).unwrap();
        assert_eq!(read_output(&output).1.len(), 2);
    }

    #[test]
    fn test_divergence_reported() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1"], &[], 1);

        let mut header = Header::new();
        let mut rg = ReadGroup::with_run_id("r1");
        rg.set("asic_id", "7");
        header.add_read_group(rg);
        let b = dir.path().join("b.blow5");
        Writer::from_path(&b, &header, PressMethod::None)
            .unwrap()
            .finish()
            .unwrap();

        let output = dir.path().join("out.blow5");
        let options = MergeOptions::new().lossless(false);
        let summary = merge_files(&[a, b], &output, &options).unwrap();
        assert_eq!(summary.read_groups, 1);
        assert_eq!(summary.divergences.len(), 1);
        let source = dir.path().join("b.blow5").display().to_string();
        assert_eq!(summary.divergences[0].source, source);
    }

    #[test]
    fn test_unknown_output_extension() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.blow5", &["r1"], &[], 1);
        let result = merge_files(&[a], &dir.path().join("out.fast5"), &MergeOptions::new());
        assert!(matches!(result, Err(S5Error::UnknownExtension(_))));
    }
}
