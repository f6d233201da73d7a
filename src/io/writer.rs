//! Buffered writer for signal files and merge shards.

use std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::Path,
};

use crate::{
    Format, Header, PressMethod, Record, S5Error, ShardPreamble, EOF_MARKER, SHARD_PREAMBLE_SIZE,
};

const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;
pub type BoxedWriter = Box<dyn Write + Send>;

/// Buffered writer for text and binary signal files.
///
/// A writer is either a full file writer ([`Writer::new`]), which writes the
/// header up front and the EOF trailer on [`Writer::finish`], or a shard
/// writer ([`Writer::new_shard`]), which writes a [`ShardPreamble`] and never
/// a trailer. Shards are composed into a full file with
/// [`Writer::append_shard`].
///
/// Dropping a writer only flushes what it has buffered. The trailer is
/// written by [`Writer::finish`] alone, so an abandoned binary file never
/// reads as complete.
///
/// # Examples
///
/// ```rust
/// use s5tools::{Format, Header, PressMethod, ReadGroup, Record, Writer};
///
/// # fn main() -> s5tools::Result<()> {
/// let mut header = Header::new();
/// header.add_read_group(ReadGroup::with_run_id("r1"));
///
/// let mut writer = Writer::new(Vec::new(), &header, Format::Binary, PressMethod::None)?;
/// writer.write_record(&Record::new("read_0", 0, vec![10, 20]))?;
/// writer.finish()?;
/// assert_eq!(writer.records_written(), 1);
///
/// let bytes = writer.into_inner();
/// assert!(bytes.ends_with(b"5WOLB"));
/// # Ok(())
/// # }
/// ```
pub struct Writer<W: Write> {
    /// Inner writer
    inner: W,

    /// Encoded bytes not yet handed to the inner writer
    buffer: Vec<u8>,

    /// Record layout
    format: Format,

    /// Press method applied to every record
    press: PressMethod,

    /// Shard writers never emit a trailer
    shard: bool,

    /// Number of records written
    records_written: u64,

    /// Set once the trailer has been written
    finished: bool,
}
impl<W: Write> Writer<W> {
    /// Creates a file writer and writes the header immediately.
    pub fn new(
        mut inner: W,
        header: &Header,
        format: Format,
        press: PressMethod,
    ) -> crate::Result<Self> {
        inner.write_all(&header.encode(format, press)?)?;
        Ok(Self::init(inner, format, press, false))
    }

    /// Creates a shard writer.
    ///
    /// The shard starts with a [`ShardPreamble`] naming its encoding and has
    /// neither header nor trailer.
    pub fn new_shard(mut inner: W, format: Format, press: PressMethod) -> crate::Result<Self> {
        press.validate_for(format)?;
        inner.write_all(ShardPreamble::new(format, press).as_bytes())?;
        Ok(Self::init(inner, format, press, true))
    }

    fn init(inner: W, format: Format, press: PressMethod, shard: bool) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(DEFAULT_BUFFER_SIZE),
            format,
            press,
            shard,
            records_written: 0,
            finished: false,
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }
    pub fn press(&self) -> PressMethod {
        self.press
    }
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    fn flush_buffer(&mut self) -> crate::Result<()> {
        if !self.buffer.is_empty() {
            self.inner.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    fn write_slice(&mut self, bytes: &[u8]) -> crate::Result<()> {
        if bytes.len() > DEFAULT_BUFFER_SIZE {
            self.flush_buffer()?;
            self.inner.write_all(bytes)?;
            return Ok(());
        }
        if self.buffer.len() + bytes.len() > DEFAULT_BUFFER_SIZE {
            self.flush_buffer()?;
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Encodes and writes a single record.
    pub fn write_record(&mut self, record: &Record) -> crate::Result<()> {
        let bytes = record.encode(self.format, self.press)?;
        self.write_encoded(&bytes)
    }

    /// Writes a batch of records in order.
    pub fn write_batch(&mut self, records: &[Record]) -> crate::Result<()> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Writes one record already encoded with [`Record::encode`] using this
    /// writer's format and press method.
    pub fn write_encoded(&mut self, bytes: &[u8]) -> crate::Result<()> {
        self.write_slice(bytes)?;
        self.records_written += 1;
        Ok(())
    }

    /// Copies a block of encoded records verbatim.
    ///
    /// The block must have been produced with this writer's format and press
    /// method and must not contain a trailer. Copied records are not counted.
    pub fn write_body(&mut self, body: &[u8]) -> crate::Result<()> {
        self.write_slice(body)
    }

    /// Splices a shard file into this writer.
    ///
    /// The shard's preamble must declare this writer's format and press
    /// method; the shard body is then copied byte for byte. Returns the number
    /// of body bytes copied.
    pub fn append_shard<P: AsRef<Path>>(&mut self, path: P) -> crate::Result<u64> {
        let path = path.as_ref();
        let mut shard = BufReader::new(File::open(path)?);

        let mut preamble_bytes = [0u8; SHARD_PREAMBLE_SIZE];
        shard.read_exact(&mut preamble_bytes).map_err(|_| S5Error::ShardMismatch {
            path: path.to_path_buf(),
            reason: "shard is shorter than its preamble".to_string(),
        })?;
        let preamble = ShardPreamble::from_bytes(&preamble_bytes);
        if let Some(reason) = preamble.mismatch(self.format, self.press) {
            return Err(S5Error::ShardMismatch {
                path: path.to_path_buf(),
                reason,
            });
        }

        self.flush_buffer()?;
        let copied = std::io::copy(&mut shard, &mut self.inner)?;
        Ok(copied)
    }

    /// Flushes buffered records and, for binary file writers, writes the EOF
    /// trailer once.
    pub fn finish(&mut self) -> crate::Result<()> {
        self.flush_buffer()?;
        if self.format == Format::Binary && !self.shard && !self.finished {
            self.inner.write_all(&EOF_MARKER)?;
        }
        self.finished = true;
        self.inner.flush()?;
        Ok(())
    }

    /// Consumes the writer and returns the inner writer.
    ///
    /// Call [`Writer::finish`] first; buffered data is not flushed here.
    pub fn into_inner(self) -> W {
        use std::mem::ManuallyDrop;
        let mut manual = ManuallyDrop::new(self);

        // drop the remaining owned field before moving `inner` out
        let buffer = std::mem::take(&mut manual.buffer);
        drop(buffer);

        // SAFETY: `manual` is never dropped, so `inner` is read exactly once.
        unsafe { std::ptr::read(&manual.inner) }
    }
}

impl<W: Write> Drop for Writer<W> {
    fn drop(&mut self) {
        self.flush_buffer().ok();
        self.inner.flush().ok();
    }
}

impl Writer<BoxedWriter> {
    /// Creates a file writer whose format is taken from the path's extension.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        header: &Header,
        press: PressMethod,
    ) -> crate::Result<Self> {
        let format = Format::from_path(path.as_ref())?;
        let file = File::create(path)?;
        Self::new(Box::new(file), header, format, press)
    }

    /// Creates a shard writer at the given path.
    pub fn shard_from_path<P: AsRef<Path>>(
        path: P,
        format: Format,
        press: PressMethod,
    ) -> crate::Result<Self> {
        let file = File::create(path)?;
        Self::new_shard(Box::new(file), format, press)
    }

    /// Creates a file writer on standard output.
    pub fn from_stdout(header: &Header, format: Format, press: PressMethod) -> crate::Result<Self> {
        Self::new(Box::new(std::io::stdout()), header, format, press)
    }
}
