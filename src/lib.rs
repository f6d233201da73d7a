//! # s5tools - Concurrent processing of raw-signal record files
//!
//! `s5tools` reads, writes and consolidates files in a SLOW5-style raw-signal
//! format. Each file carries a header describing one or more *read groups*
//! (acquisition runs identified by a `run_id`) and an auxiliary field schema,
//! followed by one record per read.
//!
//! The library is built around a small batch-processing engine:
//!
//! - [`BatchScheduler`] / [`run_batch`]: a work-stealing pool that processes a
//!   batch of records on a fixed number of threads and returns the results in
//!   input order.
//! - [`ReadGroupRegistry`]: reconciles read groups of many files into one
//!   canonical namespace and produces a per-file [`RemapTable`].
//! - [`merge_files`]: merges many files into one, either through per-worker
//!   shards composed at the end or through a single batch-scheduled stream.
//! - [`run_processes`]: a process pool for work that must run in separate
//!   address spaces, used by [`split_files`].
//! - [`check_and_merge`]: header reconciliation for the raw-copy
//!   concatenation path, [`cat_files`].
//! - [`demux_file`]: routes records to one output per barcode arrangement of a
//!   [`BarcodeSummary`].
//! - [`file_stats`], [`quickcheck`] and [`skim_file`]: summaries and listings
//!   that never write a signal file.
//!
//! ## Format
//!
//! Two encodings share one header text:
//!
//! - `.slow5`: tab separated text, one line per record.
//! - `.blow5`: a 32-byte [`Preamble`], the header text, length-prefixed record
//!   payloads (optionally zlib compressed) and a 5-byte [`EOF_MARKER`].
//!
//! ## Basic Usage
//!
//! ```rust
//! use s5tools::{Format, Header, PressMethod, ReadGroup, Reader, Record, Writer};
//! use std::io::Cursor;
//!
//! # fn main() -> s5tools::Result<()> {
//! let mut header = Header::new();
//! header.add_read_group(ReadGroup::with_run_id("run_a"));
//!
//! let records = vec![
//!     Record::new("read_0", 0, vec![430, 472, 463]),
//!     Record::new("read_1", 0, vec![501, 498]),
//! ];
//!
//! let mut writer = Writer::new(Vec::new(), &header, Format::Binary, PressMethod::Zlib)?;
//! writer.write_batch(&records)?;
//! writer.finish()?;
//! let buffer = writer.into_inner();
//!
//! let reader = Reader::new(Cursor::new(buffer))?;
//! assert_eq!(reader.header().get("run_id", 0), Some("run_a"));
//! let read_records = reader.collect::<s5tools::Result<Vec<_>>>()?;
//! assert_eq!(records, read_records);
//! # Ok(())
//! # }
//! ```
//!
//! ## Merging
//!
//! ```rust,no_run
//! use s5tools::{merge_files, MergeOptions, MergeStrategy, PressMethod};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> s5tools::Result<()> {
//! let inputs = vec![PathBuf::from("a.blow5"), PathBuf::from("b.blow5")];
//! let options = MergeOptions::new()
//!     .threads(8)
//!     .press(PressMethod::Zlib)
//!     .strategy(MergeStrategy::Sharded);
//! let summary = merge_files(&inputs, Path::new("merged.blow5"), &options)?;
//! println!("{} read groups", summary.read_groups);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, S5Error>`:
//!
//! ```rust
//! use s5tools::{Reader, S5Error};
//! use std::io::Cursor;
//!
//! # fn main() {
//! match Reader::new(Cursor::new(b"not a header\n".to_vec())) {
//!     Err(S5Error::MalformedHeader { line, reason }) => {
//!         println!("Invalid header at line {line}: {reason}");
//!     }
//!     Err(e) => println!("Other error: {e}"),
//!     Ok(_) => unreachable!(),
//! }
//! # }
//! ```

mod cat;
mod consistency;
mod constructs;
mod demux;
mod error;
mod io;
mod merge;
mod parallel;
mod process;
mod registry;
mod skim;
mod split;
mod stats;
mod view;

pub use cat::{cat_files, CatOptions, CatSummary};
pub use consistency::{check_and_merge, HeaderWarning};
pub use constructs::{
    AuxField, AuxType, Format, Header, PressMethod, Preamble, ReadGroup, Record, ShardPreamble,
    BINARY_EXTENSION, EOF_MARKER, MAGIC, MAX_READ_GROUPS, PREAMBLE_SIZE, RECORD_META_SIZE, RUN_ID,
    SHARD_MAGIC, SHARD_PREAMBLE_SIZE, TEXT_EXTENSION, TEXT_VERSION, VERSION,
};
pub use demux::{
    demux_file, BarcodeSummary, DemuxOptions, DemuxOutput, DemuxSummary, BARCODE_COLUMN,
    READ_ID_COLUMN,
};
pub use error::{IntoS5Error, Result, S5Error};
pub use io::{BoxedReader, BoxedWriter, MmapReader, Reader, Writer};
pub use merge::{merge_files, AuxMap, MergeOptions, MergeStrategy, MergeSummary, ScratchDir};
pub use parallel::{
    resolve_threads, run_batch, BatchProcessor, BatchScheduler, BATCH_SIZE, STEAL_THRESHOLD,
};
pub use process::{partition, run_processes, ProcessTask};
pub use registry::{
    AttributeDivergence, CanonicalId, DivergenceKind, FrozenRegistry, ReadGroupRegistry,
    RemapTable,
};
pub use skim::{skim_file, SkimMode, SkimOptions};
pub use split::{split_file, split_files, SplitMethod, SplitOptions, SplitTask, WORKER_SUBCOMMAND};
pub use stats::{file_stats, quickcheck, FileStats};
pub use view::{view_file, ViewOptions, STDIN_PATH};
