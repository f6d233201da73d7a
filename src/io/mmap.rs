use std::{fs::File, path::Path, path::PathBuf, sync::Arc};

use memmap2::Mmap;

use crate::{Format, Header, PressMethod, S5Error, EOF_MARKER};

/// Memory-mapped view of an uncompressed-stream signal file.
///
/// Gives zero-copy access to the encoded record body, which is what the
/// concatenation path copies verbatim. Cloning shares the mapping.
///
/// # Examples
///
/// ```rust
/// use s5tools::{Format, Header, MmapReader, PressMethod, ReadGroup, Record, Writer};
///
/// # fn main() -> s5tools::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let path = dir.path().join("reads.blow5");
///
/// let mut header = Header::new();
/// header.add_read_group(ReadGroup::with_run_id("r1"));
/// let mut writer = Writer::from_path(&path, &header, PressMethod::None)?;
/// writer.write_record(&Record::new("read_0", 0, vec![1, 2]))?;
/// writer.finish()?;
/// drop(writer);
///
/// let reader = MmapReader::new(&path)?;
/// assert_eq!(reader.format(), Format::Binary);
/// assert!(!reader.body()?.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MmapReader {
    map: Arc<Mmap>,
    path: PathBuf,
    header: Header,
    format: Format,
    press: PressMethod,
    body_start: usize,
}
impl MmapReader {
    pub fn new<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the file is opened read-only and the mapping is never handed
        // out mutably.
        let map = unsafe { Arc::new(Mmap::map(&file)?) };

        let mut cursor: &[u8] = &map[..];
        let (header, format, press, body_start) = Header::decode(&mut cursor)?;

        Ok(Self {
            map,
            path: path.as_ref().to_path_buf(),
            header,
            format,
            press,
            body_start,
        })
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
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encoded records between the header and the trailer.
    ///
    /// Binary files must end with the EOF trailer, which is excluded from the
    /// returned slice.
    pub fn body(&self) -> crate::Result<&[u8]> {
        let data = &self.map[self.body_start..];
        match self.format {
            Format::Text => Ok(data),
            Format::Binary => match data.strip_suffix(&EOF_MARKER) {
                Some(body) => Ok(body),
                None => Err(S5Error::MissingEof(self.path.clone())),
            },
        }
    }
}
