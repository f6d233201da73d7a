use std::fs;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use env_logger::Env;
use log::{info, warn};

use s5tools::{
    cat_files, demux_file, file_stats, merge_files, quickcheck, skim_file, split_file,
    split_files, view_file, CatOptions, DemuxOptions, Format, MergeOptions, MergeStrategy,
    PressMethod, SkimMode, SkimOptions, SplitMethod, SplitOptions, ViewOptions, BARCODE_COLUMN,
    BATCH_SIZE, BINARY_EXTENSION, READ_ID_COLUMN, TEXT_EXTENSION,
};

#[derive(Parser, Debug)]
#[command(version, about = "Tools for SLOW5-style raw signal files")]
struct Args {
    /// Log debug messages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(clap::Subcommand, Debug)]
enum Subcommand {
    /// Merge files into one read-group namespace
    Merge(Merge),
    /// Concatenate files that share their read groups and record layout
    Cat(Cat),
    /// Split files by records, by output count or by read group
    Split(Split),
    /// Convert a file between formats and compression methods
    View(View),
    /// Split a file into one output per barcode arrangement
    Demux(Demux),
    /// Print a summary of a file's header and record count
    Stats(Stats),
    /// Check a file's header and EOF trailer without reading records
    Quickcheck(Quickcheck),
    /// List a file's records without their signal
    Skim(Skim),
    #[command(name = "split-worker", hide = true)]
    SplitWorker(SplitWorker),
}

trait Command {
    fn execute(&self) -> Result<()>;
}

fn parse_press(name: &str) -> std::result::Result<PressMethod, String> {
    PressMethod::from_name(name).map_err(|e| e.to_string())
}

fn parse_format(name: &str) -> std::result::Result<Format, String> {
    match name {
        TEXT_EXTENSION => Ok(Format::Text),
        BINARY_EXTENSION => Ok(Format::Binary),
        _ => Err(format!("expected {TEXT_EXTENSION} or {BINARY_EXTENSION}")),
    }
}

fn parse_strategy(name: &str) -> std::result::Result<MergeStrategy, String> {
    MergeStrategy::from_name(name).ok_or_else(|| "expected sharded or sequential".to_string())
}

/// Expands directories into the format files they contain, sorted by name.
fn expand_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = fs::read_dir(path)
            .with_context(|| format!("Could not list {}", path.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| Format::from_path(p).is_ok())
            .collect();
        if found.is_empty() {
            warn!("No slow5/blow5 files found in {}", path.display());
        }
        found.sort();
        files.extend(found);
    }
    if files.is_empty() {
        bail!("No input files given");
    }
    Ok(files)
}

#[derive(clap::Args, Debug)]
struct Merge {
    /// Input files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file (.slow5 or .blow5)
    #[arg(short, long)]
    output: PathBuf,

    /// Number of worker threads (0 for all cores)
    #[arg(short, long, default_value_t = 8)]
    threads: usize,

    /// Records held in memory per batch
    #[arg(short = 'K', long = "batchsize", default_value_t = BATCH_SIZE)]
    batch_size: usize,

    /// Record compression method [none, zlib] (zlib for blow5, none for slow5)
    #[arg(short, long, value_parser = parse_press)]
    compress: Option<PressMethod>,

    /// Keep auxiliary fields
    #[arg(short, long, default_value_t = true, action = ArgAction::Set)]
    lossless: bool,

    /// Directory for temporary shards (defaults to the output's directory)
    #[arg(long)]
    tmp_dir: Option<PathBuf>,

    /// Write strategy [sharded, sequential]
    #[arg(long, default_value = "sharded", value_parser = parse_strategy)]
    strategy: MergeStrategy,

    /// Leave partial output and temporary files in place on failure
    #[arg(long)]
    keep_on_failure: bool,
}
impl Command for Merge {
    fn execute(&self) -> Result<()> {
        let inputs = expand_inputs(&self.inputs)?;
        let mut options = MergeOptions::new()
            .threads(self.threads)
            .batch_size(self.batch_size)
            .lossless(self.lossless)
            .strategy(self.strategy)
            .delete_on_failure(!self.keep_on_failure);
        if let Some(press) = self.compress {
            options = options.press(press);
        }
        if let Some(tmp_dir) = &self.tmp_dir {
            options = options.tmp_dir(tmp_dir.clone());
        }
        let summary = merge_files(&inputs, &self.output, &options)
            .with_context(|| format!("Merging into {} failed", self.output.display()))?;
        info!(
            "Merged {} files ({} skipped): {} read groups, {} records",
            summary.files_merged,
            summary.files_skipped,
            summary.read_groups,
            summary.records_written
        );
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
struct Cat {
    /// Input files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file, with the inputs' extension (standard output when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip incompatible inputs instead of failing
    #[arg(long)]
    skip_incompatible: bool,

    /// Leave partial output in place on failure
    #[arg(long)]
    keep_on_failure: bool,
}
impl Command for Cat {
    fn execute(&self) -> Result<()> {
        let inputs = expand_inputs(&self.inputs)?;
        let options = CatOptions::new()
            .skip_incompatible(self.skip_incompatible)
            .delete_on_failure(!self.keep_on_failure);
        cat_files(&inputs, self.output.as_deref(), &options).context("Concatenation failed")?;
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct MethodArgs {
    /// Records per output file
    #[arg(short, long)]
    reads: Option<usize>,

    /// Output files per input
    #[arg(short, long)]
    files: Option<usize>,

    /// One output per read group
    #[arg(short, long)]
    groups: bool,
}
impl MethodArgs {
    fn method(&self) -> SplitMethod {
        match (self.reads, self.files) {
            (Some(n), _) => SplitMethod::Reads(n),
            (None, Some(n)) => SplitMethod::Files(n),
            (None, None) => SplitMethod::Groups,
        }
    }
}

#[derive(clap::Args, Debug)]
struct SplitArgs {
    #[command(flatten)]
    method: MethodArgs,

    /// Output format [slow5, blow5]
    #[arg(long, default_value = BINARY_EXTENSION, value_parser = parse_format)]
    to: Format,

    /// Record compression method [none, zlib] (zlib for blow5, none for slow5)
    #[arg(short, long, value_parser = parse_press)]
    compress: Option<PressMethod>,

    /// Keep auxiliary fields
    #[arg(short, long, default_value_t = true, action = ArgAction::Set)]
    lossless: bool,
}
impl SplitArgs {
    fn options(&self) -> SplitOptions {
        let options = SplitOptions::new(self.method.method())
            .format(self.to)
            .lossless(self.lossless);
        match self.compress {
            Some(press) => options.press(press),
            None => options,
        }
    }
}

#[derive(clap::Args, Debug)]
struct Split {
    /// Input files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short = 'd', long)]
    out_dir: PathBuf,

    #[command(flatten)]
    split: SplitArgs,

    /// Number of worker processes (0 for all cores)
    #[arg(short, long, default_value_t = 8)]
    procs: usize,
}
impl Command for Split {
    fn execute(&self) -> Result<()> {
        let inputs = expand_inputs(&self.inputs)?;
        split_files(&inputs, &self.out_dir, &self.split.options(), self.procs)
            .with_context(|| format!("Splitting into {} failed", self.out_dir.display()))?;
        info!("Split {} files into {}", inputs.len(), self.out_dir.display());
        Ok(())
    }
}

/// Worker half of `split`, run once per slice of inputs.
#[derive(clap::Args, Debug)]
struct SplitWorker {
    #[arg(long)]
    out_dir: PathBuf,

    #[command(flatten)]
    split: SplitArgs,

    #[arg(id = "inputs", value_name = "FILES", last = true, required = true)]
    files: Vec<PathBuf>,
}
impl Command for SplitWorker {
    fn execute(&self) -> Result<()> {
        let options = self.split.options();
        for file in &self.files {
            split_file(file, &self.out_dir, &options)
                .with_context(|| format!("Splitting {} failed", file.display()))?;
        }
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
struct View {
    /// Input file, or `-` for standard input
    input: PathBuf,

    /// Output file (standard output when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format for standard output [slow5, blow5]
    #[arg(long, default_value = TEXT_EXTENSION, value_parser = parse_format)]
    to: Format,

    /// Record compression method [none, zlib]
    #[arg(short, long, value_parser = parse_press)]
    compress: Option<PressMethod>,

    /// Keep auxiliary fields
    #[arg(short, long, default_value_t = true, action = ArgAction::Set)]
    lossless: bool,

    /// Number of worker threads (0 for all cores)
    #[arg(short, long, default_value_t = 8)]
    threads: usize,

    /// Records held in memory per batch
    #[arg(short = 'K', long = "batchsize", default_value_t = BATCH_SIZE)]
    batch_size: usize,
}
impl Command for View {
    fn execute(&self) -> Result<()> {
        let mut options = ViewOptions::new()
            .threads(self.threads)
            .batch_size(self.batch_size)
            .format(self.to)
            .lossless(self.lossless);
        if let Some(press) = self.compress {
            options = options.press(press);
        }
        view_file(&self.input, self.output.as_deref(), &options)
            .with_context(|| format!("Converting {} failed", self.input.display()))?;
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
struct Demux {
    /// Input file
    input: PathBuf,

    /// Barcode summary: a tab separated table with a header line
    #[arg(short, long)]
    summary: PathBuf,

    /// Output directory (defaults to the input's directory)
    #[arg(short = 'd', long)]
    out_dir: Option<PathBuf>,

    /// Output format [slow5, blow5]
    #[arg(long, default_value = BINARY_EXTENSION, value_parser = parse_format)]
    to: Format,

    /// Record compression method [none, zlib] (zlib for blow5, none for slow5)
    #[arg(short, long, value_parser = parse_press)]
    compress: Option<PressMethod>,

    /// Keep auxiliary fields
    #[arg(short, long, default_value_t = true, action = ArgAction::Set)]
    lossless: bool,

    /// Summary column holding read ids
    #[arg(long, default_value = READ_ID_COLUMN)]
    rid_column: String,

    /// Summary column holding barcode arrangements
    #[arg(long, default_value = BARCODE_COLUMN)]
    barcode_column: String,

    /// Category for reads missing from the summary (they are dropped otherwise)
    #[arg(long)]
    missing: Option<String>,

    /// Category for reads with several arrangements (they go to each otherwise)
    #[arg(long)]
    multi: Option<String>,

    /// Number of worker threads (0 for all cores)
    #[arg(short, long, default_value_t = 8)]
    threads: usize,

    /// Records held in memory per batch
    #[arg(short = 'K', long = "batchsize", default_value_t = BATCH_SIZE)]
    batch_size: usize,

    /// Leave partial outputs in place on failure
    #[arg(long)]
    keep_on_failure: bool,
}
impl Command for Demux {
    fn execute(&self) -> Result<()> {
        let mut options = DemuxOptions::new()
            .threads(self.threads)
            .batch_size(self.batch_size)
            .format(self.to)
            .lossless(self.lossless)
            .read_id_column(&self.rid_column)
            .barcode_column(&self.barcode_column)
            .delete_on_failure(!self.keep_on_failure);
        if let Some(press) = self.compress {
            options = options.press(press);
        }
        if let Some(name) = &self.missing {
            options = options.missing(name);
        }
        if let Some(name) = &self.multi {
            options = options.multi(name);
        }
        let summary = demux_file(&self.input, &self.summary, self.out_dir.as_deref(), &options)
            .with_context(|| format!("Demultiplexing {} failed", self.input.display()))?;
        for output in &summary.outputs {
            info!("{}: {} records", output.path.display(), output.records);
        }
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
struct Stats {
    /// Input file
    input: PathBuf,
}
impl Command for Stats {
    fn execute(&self) -> Result<()> {
        let stats = file_stats(&self.input)
            .with_context(|| format!("Reading {} failed", self.input.display()))?;
        print!("{stats}");
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
struct Quickcheck {
    /// Input file
    input: PathBuf,
}
impl Command for Quickcheck {
    fn execute(&self) -> Result<()> {
        quickcheck(&self.input)
            .with_context(|| format!("{} failed the check", self.input.display()))?;
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
#[group(multiple = false)]
struct SkimModeArgs {
    /// Print the header only
    #[arg(long)]
    hdr: bool,

    /// Print read ids only
    #[arg(long)]
    rid: bool,
}

#[derive(clap::Args, Debug)]
struct Skim {
    /// Input file, or `-` for standard input
    input: PathBuf,

    #[command(flatten)]
    mode: SkimModeArgs,

    /// Number of worker threads (0 for all cores)
    #[arg(short, long, default_value_t = 8)]
    threads: usize,

    /// Records held in memory per batch
    #[arg(short = 'K', long = "batchsize", default_value_t = BATCH_SIZE)]
    batch_size: usize,
}
impl Command for Skim {
    fn execute(&self) -> Result<()> {
        let mode = match (self.mode.hdr, self.mode.rid) {
            (true, _) => SkimMode::Header,
            (_, true) => SkimMode::ReadIds,
            _ => SkimMode::Records,
        };
        let options = SkimOptions::new()
            .threads(self.threads)
            .batch_size(self.batch_size)
            .mode(mode);
        let mut out = BufWriter::new(io::stdout().lock());
        skim_file(&self.input, &mut out, &options)
            .with_context(|| format!("Listing {} failed", self.input.display()))?;
        Ok(())
    }
}

fn execute(subcommand: &Subcommand) -> Result<()> {
    match subcommand {
        Subcommand::Merge(cmd) => cmd.execute(),
        Subcommand::Cat(cmd) => cmd.execute(),
        Subcommand::Split(cmd) => cmd.execute(),
        Subcommand::View(cmd) => cmd.execute(),
        Subcommand::Demux(cmd) => cmd.execute(),
        Subcommand::Stats(cmd) => cmd.execute(),
        Subcommand::Quickcheck(cmd) => cmd.execute(),
        Subcommand::Skim(cmd) => cmd.execute(),
        Subcommand::SplitWorker(cmd) => cmd.execute(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
    execute(&args.subcommand)
}
