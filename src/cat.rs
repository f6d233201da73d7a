//! Fast concatenation of files that already share one record layout.
//!
//! Unlike [`merge_files`](crate::merge_files), records are never decoded:
//! each input's encoded body is copied verbatim behind one reconciled header.
//! That only works when every input shares the first input's format, press
//! method, auxiliary fields, read-group count and run identifiers. All inputs
//! are checked before the output is created.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::merge::OutputGuard;
use crate::{
    check_and_merge, Format, Header, HeaderWarning, MmapReader, PressMethod, Result, S5Error,
    Writer,
};

/// Options for [`cat_files`].
#[derive(Clone, Debug)]
pub struct CatOptions {
    /// Skip incompatible inputs with a warning instead of failing
    skip_incompatible: bool,
    /// Remove the partial output when writing fails
    delete_on_failure: bool,
}
impl Default for CatOptions {
    fn default() -> Self {
        Self {
            skip_incompatible: false,
            delete_on_failure: true,
        }
    }
}
impl CatOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn skip_incompatible(mut self, enabled: bool) -> Self {
        self.skip_incompatible = enabled;
        self
    }
    #[must_use]
    pub fn delete_on_failure(mut self, enabled: bool) -> Self {
        self.delete_on_failure = enabled;
        self
    }
}

/// Outcome of a successful concatenation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatSummary {
    pub files_concatenated: usize,
    pub files_skipped: usize,
    pub warnings: Vec<HeaderWarning>,
}

/// Layout shared by every admitted input, fixed by the first one
struct Layout {
    format: Format,
    press: PressMethod,
    lossless: bool,
    run_ids: Vec<String>,
}
impl Layout {
    fn from_first(reader: &MmapReader) -> Result<Self> {
        Ok(Self {
            format: reader.format(),
            press: reader.press(),
            lossless: reader.header().is_lossless(),
            run_ids: run_ids(reader)?,
        })
    }

    fn check(&self, reader: &MmapReader) -> Result<()> {
        let header = reader.header();
        let reason = if self.lossless && !header.is_lossless() {
            "it has no auxiliary fields"
        } else if !self.lossless && header.is_lossless() {
            "it has auxiliary fields"
        } else if reader.format() != self.format {
            "it has a different file format"
        } else if reader.press() != self.press {
            "it has a different record compression"
        } else if header.num_read_groups() != self.run_ids.len() {
            "it has a different number of read groups than the first file"
        } else if run_ids(reader)? != self.run_ids {
            "it has a different run_id"
        } else {
            return Ok(());
        };
        Err(S5Error::Incompatible {
            path: reader.path().display().to_string(),
            reason: reason.to_string(),
        })
    }
}

fn run_ids(reader: &MmapReader) -> Result<Vec<String>> {
    reader
        .header()
        .read_groups
        .iter()
        .enumerate()
        .map(|(group, rg)| {
            rg.run_id().map(str::to_string).ok_or_else(|| S5Error::MissingRunId {
                path: reader.path().display().to_string(),
                group,
            })
        })
        .collect()
}

/// Concatenates `inputs` into `output`, or into standard output when `output`
/// is `None`.
///
/// An output path's extension must name the inputs' format. Header attribute
/// differences are reconciled with [`check_and_merge`] and returned as
/// warnings; every other incompatibility fails the call, or skips the input
/// when [`CatOptions::skip_incompatible`] is set.
///
/// # Examples
///
/// ```rust
/// use s5tools::{cat_files, CatOptions, Header, PressMethod, ReadGroup, Reader, Record, Writer};
///
/// # fn main() -> s5tools::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let mut header = Header::new();
/// header.add_read_group(ReadGroup::with_run_id("r1"));
///
/// let mut inputs = Vec::new();
/// for name in ["a.blow5", "b.blow5"] {
///     let path = dir.path().join(name);
///     let mut writer = Writer::from_path(&path, &header, PressMethod::Zlib)?;
///     writer.write_record(&Record::new(name, 0, vec![4, 5, 6]))?;
///     writer.finish()?;
///     inputs.push(path);
/// }
///
/// let output = dir.path().join("all.blow5");
/// cat_files(&inputs, Some(&output), &CatOptions::new())?;
/// assert_eq!(Reader::from_path(&output)?.count(), 2);
/// # Ok(())
/// # }
/// ```
pub fn cat_files(
    inputs: &[PathBuf],
    output: Option<&Path>,
    options: &CatOptions,
) -> Result<CatSummary> {
    let out_format = output.map(Format::from_path).transpose()?;
    let mut admitted: Vec<MmapReader> = Vec::with_capacity(inputs.len());
    let mut canonical: Option<(Header, Layout)> = None;
    let mut summary = CatSummary::default();

    for path in inputs {
        let outcome = MmapReader::new(path).and_then(|reader| {
            reader.body()?;
            match &mut canonical {
                None => {
                    if let (Some(path), Some(format)) = (output, out_format) {
                        if reader.format() != format {
                            return Err(S5Error::Incompatible {
                                path: path.display().to_string(),
                                reason: "the output extension does not match the input format"
                                    .to_string(),
                            });
                        }
                    }
                    let layout = Layout::from_first(&reader)?;
                    canonical = Some((reader.header().clone(), layout));
                }
                Some((header, layout)) => {
                    layout.check(&reader)?;
                    let source = path.display().to_string();
                    for warning in check_and_merge(header, reader.header(), &source)? {
                        warn!("{warning}");
                        summary.warnings.push(warning);
                    }
                }
            }
            Ok(reader)
        });

        match outcome {
            Ok(reader) => admitted.push(reader),
            Err(e @ S5Error::Incompatible { .. }) if canonical.is_none() => return Err(e),
            Err(e) if options.skip_incompatible => {
                warn!("Skipping {}: {e}", path.display());
                summary.files_skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    let Some((header, _)) = canonical else {
        return Err(S5Error::NoInputFiles);
    };

    let guard = output.map(|path| OutputGuard::new(path, options.delete_on_failure));
    let (format, press) = (admitted[0].format(), admitted[0].press());
    let mut writer = match output {
        Some(path) => Writer::from_path(path, &header, press)?,
        None => Writer::from_stdout(&header, format, press)?,
    };
    for reader in &admitted {
        writer.write_body(reader.body()?)?;
    }
    writer.finish()?;
    drop(writer);
    if let Some(guard) = guard {
        guard.commit();
    }

    summary.files_concatenated = admitted.len();
    let target = output.map_or_else(|| "standard output".to_string(), |p| p.display().to_string());
    info!(
        "Concatenated {} files into {target} ({} skipped)",
        summary.files_concatenated, summary.files_skipped
    );
    Ok(summary)
}
