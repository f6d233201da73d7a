//! Format and compression conversion of a single file.

use std::io::BufReader;
use std::path::Path;

use log::info;

use crate::merge::OutputGuard;
use crate::{
    BatchProcessor, BatchScheduler, BoxedReader, Format, PressMethod, Reader, Record, Result,
    S5Error, Writer, BATCH_SIZE,
};

/// Input path that selects standard input
pub const STDIN_PATH: &str = "-";

/// Options for [`view_file`].
#[derive(Clone, Debug)]
pub struct ViewOptions {
    threads: usize,
    batch_size: usize,
    /// Output format when writing to standard output
    format: Format,
    /// Record press method, defaulting to the output format's usual choice
    press: Option<PressMethod>,
    lossless: bool,
}
impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            batch_size: BATCH_SIZE,
            format: Format::Text,
            press: None,
            lossless: true,
        }
    }
}
impl ViewOptions {
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

    fn press_for(&self, format: Format) -> PressMethod {
        self.press.unwrap_or_else(|| PressMethod::default_for(format))
    }
}

/// Opens `input`, reading standard input for [`STDIN_PATH`].
pub(crate) fn open_input(input: &Path) -> Result<Reader<BufReader<BoxedReader>>> {
    if input == Path::new(STDIN_PATH) {
        Reader::from_stdin()
    } else {
        Reader::from_path(input)
    }
}

/// Re-encodes raw records from one layout into another
struct Converter {
    in_format: Format,
    in_press: PressMethod,
    num_aux: usize,
    num_groups: usize,
    out_format: Format,
    out_press: PressMethod,
    lossless: bool,
}
impl BatchProcessor for Converter {
    type Item = Vec<u8>;
    type Output = Vec<u8>;

    fn process(&self, raw: &Vec<u8>) -> Result<Vec<u8>> {
        let mut record = Record::decode(raw, self.in_format, self.in_press, self.num_aux)?;
        if record.read_group as usize >= self.num_groups {
            return Err(S5Error::InvalidReadGroup {
                idx: record.read_group,
                max: self.num_groups,
            });
        }
        if !self.lossless {
            record.aux.clear();
        }
        record.encode(self.out_format, self.out_press)
    }
}

/// Converts `input` into `output`, or into standard output when `output` is
/// `None`. Returns the number of records written.
///
/// An `input` of `-` reads the file from standard input. Only uncompressed
/// streams are accepted there.
///
/// A file output takes its format from its extension and is removed if the
/// conversion fails.
///
/// # Examples
///
/// ```rust
/// use s5tools::{view_file, Header, PressMethod, ReadGroup, Reader, Record, ViewOptions, Writer};
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
/// let output = dir.path().join("reads.slow5");
/// let written = view_file(&input, Some(&output), &ViewOptions::new().threads(2))?;
/// assert_eq!(written, 1);
/// assert_eq!(Reader::from_path(&output)?.read_all()?[0].raw_signal, vec![1, 2, 3]);
/// # Ok(())
/// # }
/// ```
pub fn view_file(input: &Path, output: Option<&Path>, options: &ViewOptions) -> Result<u64> {
    let mut reader = open_input(input)?;
    let out_format = match output {
        Some(path) => Format::from_path(path)?,
        None => options.format,
    };
    let out_press = options.press_for(out_format);
    out_press.validate_for(out_format)?;

    let mut header = reader.header().clone();
    if !options.lossless {
        header.aux_fields.clear();
    }
    let converter = Converter {
        in_format: reader.format(),
        in_press: reader.press(),
        num_aux: reader.header().aux_fields.len(),
        num_groups: reader.header().num_read_groups(),
        out_format,
        out_press,
        lossless: options.lossless,
    };

    let guard = output.map(|path| OutputGuard::new(path, true));
    let mut writer = match output {
        Some(path) => Writer::from_path(path, &header, out_press)?,
        None => Writer::from_stdout(&header, out_format, out_press)?,
    };

    let scheduler = BatchScheduler::new(options.threads);
    loop {
        let batch = reader.next_raw_batch(options.batch_size)?;
        if batch.is_empty() {
            break;
        }
        for bytes in scheduler.run(&batch, &converter)? {
            writer.write_encoded(&bytes)?;
        }
    }
    writer.finish()?;
    let written = writer.records_written();
    drop(writer);
    if let Some(guard) = guard {
        guard.commit();
    }

    info!("Converted {written} records from {}", input.display());
    Ok(written)
}
