//! File summaries and fast integrity checks.

use std::fmt;
use std::path::Path;

use log::info;

use crate::{Format, MmapReader, PressMethod, Result, S5Error};

/// Summary of one file, as printed by the `stats` command.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileStats {
    pub version: String,
    pub format: Format,
    pub press: PressMethod,
    pub num_read_groups: usize,
    pub aux_fields: Vec<String>,
    pub num_records: u64,
}
impl fmt::Display for FileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let format = match self.format {
            Format::Text => "SLOW5 ASCII",
            Format::Binary => "BLOW5",
        };
        writeln!(f, "file version\t{}", self.version)?;
        writeln!(f, "file format\t{format}")?;
        writeln!(f, "record compression method\t{}", self.press.name())?;
        writeln!(f, "number of read groups\t{}", self.num_read_groups)?;
        writeln!(f, "number of auxiliary fields\t{}", self.aux_fields.len())?;
        writeln!(f, "auxiliary fields\t{}", self.aux_fields.join(","))?;
        writeln!(f, "number of records\t{}", self.num_records)
    }
}

/// Counts the records of a text body: every non-empty line
fn count_lines(body: &[u8]) -> u64 {
    body.split(|&b| b == b'\n')
        .filter(|line| !line.is_empty() && *line != b"\r")
        .count() as u64
}

/// Counts the records of a binary body by walking its length prefixes.
fn count_prefixed(body: &[u8]) -> Result<u64> {
    let mut pos = 0usize;
    let mut n = 0;
    while pos < body.len() {
        let truncated = || S5Error::TruncatedRecord { pos };
        let prefix: [u8; 8] = body
            .get(pos..pos + 8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(truncated)?;
        let len = usize::try_from(u64::from_le_bytes(prefix)).map_err(|_| truncated())?;
        pos = pos
            .checked_add(8)
            .and_then(|p| p.checked_add(len))
            .filter(|&end| end <= body.len())
            .ok_or_else(truncated)?;
        n += 1;
    }
    Ok(n)
}

/// Reads the header of `path` and counts its records without decoding them.
///
/// # Examples
///
/// ```rust
/// use s5tools::{file_stats, Format, Header, PressMethod, ReadGroup, Record, Writer};
///
/// # fn main() -> s5tools::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let path = dir.path().join("reads.blow5");
/// let mut header = Header::new();
/// header.add_read_group(ReadGroup::with_run_id("r1"));
/// let mut writer = Writer::from_path(&path, &header, PressMethod::Zlib)?;
/// writer.write_record(&Record::new("read_0", 0, vec![1, 2, 3]))?;
/// writer.finish()?;
///
/// let stats = file_stats(&path)?;
/// assert_eq!(stats.format, Format::Binary);
/// assert_eq!(stats.num_records, 1);
/// # Ok(())
/// # }
/// ```
pub fn file_stats(path: &Path) -> Result<FileStats> {
    let reader = MmapReader::new(path)?;
    let body = reader.body()?;
    let num_records = match reader.format() {
        Format::Text => count_lines(body),
        Format::Binary => count_prefixed(body)?,
    };
    let header = reader.header();
    Ok(FileStats {
        version: header.version.clone(),
        format: reader.format(),
        press: reader.press(),
        num_read_groups: header.num_read_groups(),
        aux_fields: header.aux_fields.iter().map(|f| f.name.clone()).collect(),
        num_records,
    })
}

/// Checks the header of `path` and, for binary files, the EOF trailer.
///
/// Records are not read.
pub fn quickcheck(path: &Path) -> Result<Format> {
    let reader = MmapReader::new(path)?;
    reader.body()?;
    info!("{} passed the header and trailer checks", path.display());
    Ok(reader.format())
}
