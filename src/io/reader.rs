//! Streaming reader for signal files.
//!
//! The reader parses the header once on construction and then yields records
//! on demand, either decoded through the `Iterator` interface or as raw
//! encoded bytes through [`Reader::next_raw`].

use std::{
    fs::File,
    io::{BufRead, BufReader, ErrorKind, Read},
    path::{Path, PathBuf},
};

use crate::{Format, Header, PressMethod, Record, S5Error, EOF_MARKER};

const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;
pub type BoxedReader = Box<dyn Read + Send>;

/// Streaming reader for text and binary signal files.
///
/// The format is detected from the first bytes of the stream: a binary
/// preamble magic selects the binary layout, anything else is parsed as a
/// text header.
///
/// # Examples
///
/// ```rust
/// use s5tools::{Format, Header, PressMethod, ReadGroup, Reader, Record, Writer};
/// use std::io::Cursor;
///
/// # fn main() -> s5tools::Result<()> {
/// let mut header = Header::new();
/// header.add_read_group(ReadGroup::with_run_id("r1"));
///
/// let mut writer = Writer::new(Vec::new(), &header, Format::Binary, PressMethod::Zlib)?;
/// writer.write_record(&Record::new("read_0", 0, vec![1, 2, 3]))?;
/// writer.finish()?;
///
/// let reader = Reader::new(Cursor::new(writer.into_inner()))?;
/// assert_eq!(reader.format(), Format::Binary);
/// assert_eq!(reader.header().read_groups[0].run_id(), Some("r1"));
///
/// for record in reader {
///     let record = record?;
///     assert_eq!(record.raw_signal, vec![1, 2, 3]);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Reader<R: BufRead> {
    /// Inner buffered data stream
    inner: R,

    /// Parsed file header
    header: Header,

    /// Detected on-disk layout
    format: Format,

    /// Press method declared by the preamble
    press: PressMethod,

    /// Label used in diagnostics
    source: PathBuf,

    /// Bytes consumed so far, header included
    bytes_read: usize,

    /// Number of records yielded
    records_read: u64,

    /// Set once the trailer (or end of a text stream) has been reached
    eof: bool,
}
impl<R: BufRead> Reader<R> {
    /// Creates a reader and parses the header immediately.
    pub fn new(mut inner: R) -> crate::Result<Self> {
        let (header, format, press, consumed) = Header::decode(&mut inner)?;
        Ok(Self {
            inner,
            header,
            format,
            press,
            source: PathBuf::from("-"),
            bytes_read: consumed,
            records_read: 0,
            eof: false,
        })
    }

    /// Sets the name reported in trailer errors.
    pub fn with_source<P: AsRef<Path>>(mut self, source: P) -> Self {
        self.source = source.as_ref().to_path_buf();
        self
    }

    pub fn header(&self) -> &Header {
        &self.header
    }
    pub fn format(&self) -> Format {
        self.format
    }
    pub fn press(&self) -> PressMethod {
        self.press
    }
    pub fn source(&self) -> &Path {
        &self.source
    }
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Returns the next record in its encoded form.
    ///
    /// Binary records are returned as the pressed payload without the length
    /// prefix, text records as the line without its newline. Returns `None`
    /// once the EOF trailer (binary) or the end of the stream (text) is
    /// reached. A binary stream that ends without a trailer is an error.
    pub fn next_raw(&mut self) -> crate::Result<Option<Vec<u8>>> {
        if self.eof {
            return Ok(None);
        }
        let raw = match self.format {
            Format::Binary => self.next_binary()?,
            Format::Text => self.next_line()?,
        };
        match raw {
            Some(raw) => {
                self.records_read += 1;
                Ok(Some(raw))
            }
            None => {
                self.eof = true;
                Ok(None)
            }
        }
    }

    fn next_binary(&mut self) -> crate::Result<Option<Vec<u8>>> {
        let mut prefix = [0u8; 8];
        let n = read_up_to(&mut self.inner, &mut prefix)?;
        if n == 0 {
            return Err(S5Error::MissingEof(self.source.clone()));
        }
        if n >= EOF_MARKER.len() && prefix[..EOF_MARKER.len()] == EOF_MARKER {
            if n > EOF_MARKER.len() || !self.inner.fill_buf()?.is_empty() {
                return Err(S5Error::MalformedRecord(format!(
                    "data after the end-of-file marker in {}",
                    self.source.display()
                )));
            }
            self.bytes_read += n;
            return Ok(None);
        }
        if n < prefix.len() {
            return Err(S5Error::TruncatedRecord {
                pos: self.bytes_read,
            });
        }

        // the prefix is untrusted, so the payload grows with the bytes present
        let len = u64::from_le_bytes(prefix);
        let mut payload = Vec::new();
        (&mut self.inner).take(len).read_to_end(&mut payload)?;
        if payload.len() as u64 != len {
            return Err(S5Error::TruncatedRecord {
                pos: self.bytes_read,
            });
        }
        self.bytes_read += prefix.len() + payload.len();
        Ok(Some(payload))
    }

    fn next_line(&mut self) -> crate::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let n = self.inner.read_until(b'\n', &mut line)?;
        if n == 0 {
            return Ok(None);
        }
        self.bytes_read += n;
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Decodes a raw record produced by this reader.
    pub fn decode(&self, raw: &[u8]) -> crate::Result<Record> {
        let record = Record::decode(raw, self.format, self.press, self.header.aux_fields.len())?;
        if record.read_group as usize >= self.header.num_read_groups() {
            return Err(S5Error::InvalidReadGroup {
                idx: record.read_group,
                max: self.header.num_read_groups(),
            });
        }
        Ok(record)
    }

    /// Reads every remaining record into a vector.
    pub fn read_all(&mut self) -> crate::Result<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(raw) = self.next_raw()? {
            records.push(self.decode(&raw)?);
        }
        Ok(records)
    }

    /// Reads up to `n` raw records.
    ///
    /// Returns an empty batch once the stream is exhausted.
    pub fn next_raw_batch(&mut self, n: usize) -> crate::Result<Vec<Vec<u8>>> {
        let mut batch = Vec::with_capacity(n.min(crate::BATCH_SIZE));
        while batch.len() < n {
            match self.next_raw()? {
                Some(raw) => batch.push(raw),
                None => break,
            }
        }
        Ok(batch)
    }
}

/// Fills `buf` as far as the stream allows and returns the number of bytes read.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> crate::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

impl<R: BufRead> Iterator for Reader<R> {
    type Item = crate::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_raw() {
            Ok(Some(raw)) => Some(self.decode(&raw)),
            Ok(None) => None,
            Err(e) => {
                self.eof = true;
                Some(Err(e))
            }
        }
    }
}

impl Reader<BufReader<BoxedReader>> {
    /// Opens a file by path.
    ///
    /// Gzip or zstd compressed streams are decompressed transparently when the
    /// `niffler` feature is enabled.
    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = File::open(path.as_ref())?;

        #[cfg(feature = "niffler")]
        let inner: BoxedReader = {
            let (pt, _format) = niffler::send::get_reader(Box::new(file))?;
            pt
        };
        #[cfg(not(feature = "niffler"))]
        let inner: BoxedReader = Box::new(file);

        let reader = BufReader::with_capacity(DEFAULT_BUFFER_SIZE, inner);
        Ok(Self::new(reader)?.with_source(path))
    }

    /// Creates a reader from standard input.
    pub fn from_stdin() -> crate::Result<Self> {
        let inner: BoxedReader = Box::new(std::io::stdin());
        Self::new(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, inner))
    }
}
