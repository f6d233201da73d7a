//! Error handling for the s5tools library.
//!
//! This module defines every error that can occur while reading, writing,
//! merging, concatenating or splitting signal files. None of them are retried:
//! the command that receives one aborts and the binary exits non-zero.

use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for s5tools operations.
///
/// Equivalent to `std::result::Result<T, S5Error>`.
///
/// # Examples
///
/// ```rust
/// use s5tools::{PressMethod, Result};
///
/// fn parse_method(name: &str) -> Result<PressMethod> {
///     PressMethod::from_name(name)
/// }
///
/// assert!(parse_method("zlib").is_ok());
/// assert!(parse_method("lz4").is_err());
/// ```
pub type Result<T> = std::result::Result<T, S5Error>;

/// Error types for s5tools operations.
///
/// The variants fall into the four groups the commands care about: I/O
/// failures, format or consistency violations, resource failures (threads and
/// child processes), and errors raised by user-supplied batch functions.
///
/// # Examples
///
/// ```rust
/// use s5tools::{Reader, S5Error};
/// use std::io::Cursor;
///
/// // Four zero bytes are neither a binary magic number nor a text header
/// let invalid_data = vec![0u8; 64];
///
/// match Reader::new(Cursor::new(invalid_data)) {
///     Err(S5Error::MalformedHeader { line, reason }) => {
///         println!("Bad header at line {}: {}", line, reason);
///     }
///     Err(e) => println!("Other error: {}", e),
///     Ok(_) => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum S5Error {
    /// I/O error from the underlying reader or writer.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Stream decompression error from niffler.
    #[cfg(feature = "niffler")]
    #[error("Niffler error")]
    Niffler(#[from] niffler::Error),

    /// Invalid magic number at the start of a binary file or shard.
    #[error("Invalid magic number, expected ({expected:#x}), found ({actual:#x})")]
    InvalidMagicNumber { expected: u32, actual: u32 },

    /// The binary preamble declares a version this library cannot read.
    #[error("Invalid version found, expected ({expected}), found ({actual})")]
    InvalidVersion { expected: u32, actual: u32 },

    /// A header line could not be parsed.
    #[error("Malformed header at line {line}: {reason}")]
    MalformedHeader { line: usize, reason: String },

    /// A record could not be decoded.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// The stream ended in the middle of a record.
    #[error("Truncated record at position {pos}")]
    TruncatedRecord { pos: usize },

    /// A binary file does not end with the EOF trailer.
    #[error("Missing end-of-file marker in {0}")]
    MissingEof(PathBuf),

    /// The name of a compression method is not recognised.
    #[error("Unknown compression method: {0}")]
    UnknownPressMethod(String),

    /// The text format only stores uncompressed records.
    #[error("Compression method {0} is not supported by the text format")]
    PressNotSupported(String),

    /// The output path's extension does not name a known format.
    #[error("Cannot infer the output format from {0} (expected .slow5 or .blow5)")]
    UnknownExtension(PathBuf),

    /// A read group is missing the run identifier attribute.
    #[error("No run_id found in read group {group} of {path}")]
    MissingRunId { path: String, group: usize },

    /// A record references a read group the header does not declare.
    #[error("Invalid read group ({idx}) - Must be less than {max}")]
    InvalidReadGroup { idx: u32, max: usize },

    /// A lossless operation was given an input without auxiliary fields.
    #[error("{0} has no auxiliary fields. Use lossy mode to merge files with no auxiliary fields")]
    NoAuxFields(String),

    /// Two inputs declare different auxiliary field layouts.
    #[error("Auxiliary field schema of {path} does not match: {reason}")]
    AuxSchemaMismatch { path: String, reason: String },

    /// An input cannot be concatenated onto the running output.
    #[error("{path} cannot be concatenated: {reason}. Use merge instead")]
    Incompatible { path: String, reason: String },

    /// A shard does not carry the encoding declared for the output.
    #[error("Shard {path} cannot be composed: {reason}")]
    ShardMismatch { path: PathBuf, reason: String },

    /// A barcode summary line could not be parsed.
    #[error("Malformed barcode summary at line {line}: {reason}")]
    MalformedSummary { line: usize, reason: String },

    /// A demultiplexing category name is already taken.
    #[error("Category '{0}' already exists in the barcode summary")]
    CategoryExists(String),

    /// The barcode summary lists reads the input does not contain.
    #[error("Extra read(s) in the barcode summary: {expected} listed, {found} found in the input")]
    ExtraSummaryReads { expected: usize, found: usize },

    /// No usable input files were given.
    #[error("No input files to process")]
    NoInputFiles,

    /// A worker thread panicked.
    #[error("Worker thread {0} panicked")]
    WorkerPanicked(usize),

    /// A child process exited with a non-zero status.
    #[error("Child process {pid} exited with status={code}")]
    ChildFailed { pid: u32, code: i32 },

    /// A child process was terminated by a signal.
    #[error("Child process {pid} killed by signal {signal}")]
    ChildSignaled { pid: u32, signal: i32 },

    /// Error raised by a user-supplied batch or worker function.
    #[error("Processing error: {0}")]
    Process(Box<dyn StdError + Send + Sync>),
}

/// Trait for converting errors into `S5Error::Process` variants.
///
/// Batch functions handed to [`run_batch`](crate::run_batch) return
/// [`Result`]; this lets them forward their own error types.
///
/// # Examples
///
/// ```rust
/// use s5tools::{IntoS5Error, S5Error};
///
/// let parse_err = "x".parse::<u32>().unwrap_err();
/// match parse_err.into_s5_error() {
///     S5Error::Process(_) => {}
///     _ => unreachable!(),
/// }
/// ```
pub trait IntoS5Error {
    /// Converts the error into an `S5Error`.
    fn into_s5_error(self) -> S5Error;
}

impl<E> IntoS5Error for E
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_s5_error(self) -> S5Error {
        S5Error::Process(self.into())
    }
}
