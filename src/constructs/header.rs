use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::io::{BufRead, Read};

use bytemuck::{Pod, Zeroable};

use crate::{Format, PressMethod, S5Error};

pub const MAGIC: u32 = 0x35574F42; // "BOW5"
pub const VERSION: u32 = 1;
pub const PREAMBLE_SIZE: usize = std::mem::size_of::<Preamble>();
pub const SHARD_MAGIC: u32 = 0x44524853; // "SHRD"
pub const SHARD_PREAMBLE_SIZE: usize = std::mem::size_of::<ShardPreamble>();
pub const EOF_MARKER: [u8; 5] = *b"5WOLB";
pub const TEXT_VERSION: &str = "0.2.0";

/// Attribute that identifies an acquisition run
pub const RUN_ID: &str = "run_id";

/// Largest read-group count a header may declare
pub const MAX_READ_GROUPS: usize = 1 << 20;

const MISSING: &str = ".";
const VERSION_ID: &str = "#slow5_version";
const NUM_GROUPS_ID: &str = "#num_read_groups";
const CORE_TYPES: [&str; 8] = [
    "char*", "uint32_t", "double", "double", "double", "double", "uint64_t", "int16_t*",
];
const CORE_COLUMNS: [&str; 8] = [
    "read_id",
    "read_group",
    "digitisation",
    "offset",
    "range",
    "sampling_rate",
    "len_raw_signal",
    "raw_signal",
];

/// 32-byte preamble that opens every binary file
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Preamble {
    pub magic: u32,           // "BOW5" - file type validation
    pub version: u32,         // Binary layout version (1)
    pub record_press: u32,    // PressMethod code applied to every record
    pub num_read_groups: u32, // Must agree with the header text
    pub header_len: u64,      // Bytes of header text following the preamble
    pub reserved: [u8; 8],    // Future use
}
impl Preamble {
    pub fn new(press: PressMethod, num_read_groups: u32, header_len: u64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            record_press: press.code(),
            num_read_groups,
            header_len,
            reserved: [0; 8],
        }
    }
    pub fn validate(&self) -> crate::Result<()> {
        if self.magic != MAGIC {
            return Err(S5Error::InvalidMagicNumber {
                expected: MAGIC,
                actual: self.magic,
            });
        }
        if self.version != VERSION {
            return Err(S5Error::InvalidVersion {
                expected: VERSION,
                actual: self.version,
            });
        }
        PressMethod::from_code(self.record_press)?;
        Ok(())
    }
    pub fn press(&self) -> crate::Result<PressMethod> {
        PressMethod::from_code(self.record_press)
    }
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
    pub fn from_bytes(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(&bytes[..PREAMBLE_SIZE])
    }
}

/// 16-byte tag written at the start of every merge shard.
///
/// It records the encoding the shard's records were written with so that
/// finalization can refuse to splice a shard into an output declaring a
/// different one.
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct ShardPreamble {
    pub magic: u32,
    pub version: u32,
    pub format: u32,
    pub record_press: u32,
}
impl ShardPreamble {
    pub fn new(format: Format, press: PressMethod) -> Self {
        Self {
            magic: SHARD_MAGIC,
            version: VERSION,
            format: format.code(),
            record_press: press.code(),
        }
    }
    /// Returns the reason the shard cannot be spliced into the given encoding.
    pub fn mismatch(&self, format: Format, press: PressMethod) -> Option<String> {
        if self.magic != SHARD_MAGIC {
            return Some(format!("bad shard magic {:#x}", self.magic));
        }
        if self.version != VERSION {
            return Some(format!("shard version {} != {}", self.version, VERSION));
        }
        if self.format != format.code() {
            return Some(format!("shard format code {} != {}", self.format, format.code()));
        }
        if self.record_press != press.code() {
            return Some(format!(
                "shard press code {} != {} ({})",
                self.record_press,
                press.code(),
                press.name()
            ));
        }
        None
    }
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
    pub fn from_bytes(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(&bytes[..SHARD_PREAMBLE_SIZE])
    }
}

/// Declared type of an auxiliary record field
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AuxType {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Double,
    Char,
    Str,
    Enum,
}
impl AuxType {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Int8 => "int8_t",
            Self::Int16 => "int16_t",
            Self::Int32 => "int32_t",
            Self::Int64 => "int64_t",
            Self::Uint8 => "uint8_t",
            Self::Uint16 => "uint16_t",
            Self::Uint32 => "uint32_t",
            Self::Uint64 => "uint64_t",
            Self::Float => "float",
            Self::Double => "double",
            Self::Char => "char",
            Self::Str => "char*",
            Self::Enum => "enum",
        }
    }
    pub fn from_tag(tag: &str) -> Option<Self> {
        let ty = match tag {
            "int8_t" => Self::Int8,
            "int16_t" => Self::Int16,
            "int32_t" => Self::Int32,
            "int64_t" => Self::Int64,
            "uint8_t" => Self::Uint8,
            "uint16_t" => Self::Uint16,
            "uint32_t" => Self::Uint32,
            "uint64_t" => Self::Uint64,
            "float" => Self::Float,
            "double" => Self::Double,
            "char" => Self::Char,
            "char*" => Self::Str,
            _ => return None,
        };
        Some(ty)
    }
}

/// Descriptor of one auxiliary record field
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AuxField {
    pub name: String,
    pub ty: AuxType,
    /// Label set, only present for [`AuxType::Enum`]
    pub enum_labels: Option<Vec<String>>,
}
impl AuxField {
    pub fn new(name: &str, ty: AuxType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            enum_labels: None,
        }
    }
    pub fn new_enum(name: &str, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            ty: AuxType::Enum,
            enum_labels: Some(labels.iter().map(|l| l.to_string()).collect()),
        }
    }
    /// Type tag as written in the header type line.
    pub fn type_string(&self) -> String {
        match &self.enum_labels {
            Some(labels) => format!("enum{{{}}}", labels.join(",")),
            None => self.ty.tag().to_string(),
        }
    }
    fn parse(name: &str, ty: &str, line: usize) -> crate::Result<Self> {
        if let Some(labels) = ty.strip_prefix("enum{").and_then(|t| t.strip_suffix('}')) {
            let labels: Vec<&str> = labels.split(',').filter(|l| !l.is_empty()).collect();
            return Ok(Self::new_enum(name, &labels));
        }
        match AuxType::from_tag(ty) {
            Some(ty) => Ok(Self::new(name, ty)),
            None => Err(S5Error::MalformedHeader {
                line,
                reason: format!("unknown auxiliary type '{ty}' for field '{name}'"),
            }),
        }
    }
}

/// Metadata of one acquisition run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadGroup {
    pub attrs: BTreeMap<String, String>,
}
impl ReadGroup {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_run_id(run_id: &str) -> Self {
        let mut rg = Self::new();
        rg.set(RUN_ID, run_id);
        rg
    }
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
    pub fn set(&mut self, key: &str, value: &str) {
        self.attrs.insert(key.to_string(), value.to_string());
    }
    /// Run identifier of this group; an empty value counts as missing.
    pub fn run_id(&self) -> Option<&str> {
        self.get(RUN_ID).filter(|v| !v.is_empty())
    }
}
impl From<BTreeMap<String, String>> for ReadGroup {
    fn from(attrs: BTreeMap<String, String>) -> Self {
        Self { attrs }
    }
}

/// File header: read groups plus the auxiliary field schema.
///
/// Both formats share the same text rendering of the header. Binary files
/// prefix it with a [`Preamble`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    pub version: String,
    pub read_groups: Vec<ReadGroup>,
    pub aux_fields: Vec<AuxField>,
}
impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}
impl Header {
    pub fn new() -> Self {
        Self {
            version: TEXT_VERSION.to_string(),
            read_groups: Vec::new(),
            aux_fields: Vec::new(),
        }
    }
    pub fn num_read_groups(&self) -> usize {
        self.read_groups.len()
    }
    /// Appends a read group and returns its index.
    pub fn add_read_group(&mut self, rg: ReadGroup) -> u32 {
        self.read_groups.push(rg);
        (self.read_groups.len() - 1) as u32
    }
    pub fn get(&self, key: &str, group: usize) -> Option<&str> {
        self.read_groups.get(group).and_then(|rg| rg.get(key))
    }
    /// Union of attribute keys across all read groups.
    pub fn attribute_keys(&self) -> BTreeSet<String> {
        self.read_groups
            .iter()
            .flat_map(|rg| rg.attrs.keys().cloned())
            .collect()
    }
    /// True when records carry auxiliary fields.
    pub fn is_lossless(&self) -> bool {
        !self.aux_fields.is_empty()
    }

    /// Renders the header text shared by both formats.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "{VERSION_ID}\t{}", self.version);
        let _ = writeln!(text, "{NUM_GROUPS_ID}\t{}", self.read_groups.len());
        for key in self.attribute_keys() {
            text.push('@');
            text.push_str(&key);
            for rg in &self.read_groups {
                text.push('\t');
                match rg.get(&key) {
                    Some(v) if !v.is_empty() => text.push_str(v),
                    _ => text.push_str(MISSING),
                }
            }
            text.push('\n');
        }
        text.push('#');
        text.push_str(&CORE_TYPES.join("\t"));
        for field in &self.aux_fields {
            text.push('\t');
            text.push_str(&field.type_string());
        }
        text.push('\n');
        text.push('#');
        text.push_str(&CORE_COLUMNS.join("\t"));
        for field in &self.aux_fields {
            text.push('\t');
            text.push_str(&field.name);
        }
        text.push('\n');
        text
    }

    /// Serialises the header as it opens a file of the given format.
    pub fn encode(&self, format: Format, press: PressMethod) -> crate::Result<Vec<u8>> {
        press.validate_for(format)?;
        let text = self.to_text();
        match format {
            Format::Text => Ok(text.into_bytes()),
            Format::Binary => {
                let preamble = Preamble::new(
                    press,
                    self.read_groups.len() as u32,
                    text.len() as u64,
                );
                let mut bytes = Vec::with_capacity(PREAMBLE_SIZE + text.len());
                bytes.extend_from_slice(preamble.as_bytes());
                bytes.extend_from_slice(text.as_bytes());
                Ok(bytes)
            }
        }
    }

    /// Reads a header of either format, sniffing the binary magic number.
    ///
    /// Returns the header, the detected format, the declared press method and
    /// the number of bytes consumed.
    pub fn decode<R: BufRead>(reader: &mut R) -> crate::Result<(Self, Format, PressMethod, usize)> {
        let is_binary = {
            let buf = reader.fill_buf()?;
            buf.len() >= 4 && u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) == MAGIC
        };
        if !is_binary {
            let (header, consumed) = Self::read_text(reader)?;
            return Ok((header, Format::Text, PressMethod::None, consumed));
        }

        let mut preamble_bytes = [0u8; PREAMBLE_SIZE];
        reader.read_exact(&mut preamble_bytes)?;
        let preamble = Preamble::from_bytes(&preamble_bytes);
        preamble.validate()?;

        let mut text = Vec::new();
        reader.by_ref().take(preamble.header_len).read_to_end(&mut text)?;
        if text.len() as u64 != preamble.header_len {
            return Err(S5Error::MalformedHeader {
                line: 0,
                reason: format!(
                    "the preamble declares {} header bytes but only {} follow",
                    preamble.header_len,
                    text.len()
                ),
            });
        }
        let (header, consumed) = Self::read_text(&mut text.as_slice())?;
        if consumed != text.len() {
            return Err(S5Error::MalformedHeader {
                line: 0,
                reason: format!(
                    "header text is {} bytes but the preamble declares {}",
                    consumed,
                    text.len()
                ),
            });
        }
        if header.read_groups.len() != preamble.num_read_groups as usize {
            return Err(S5Error::MalformedHeader {
                line: 2,
                reason: format!(
                    "{} read groups but the preamble declares {}",
                    header.read_groups.len(),
                    preamble.num_read_groups
                ),
            });
        }
        Ok((header, Format::Binary, preamble.press()?, PREAMBLE_SIZE + text.len()))
    }

    /// Parses header text up to and including the column line.
    ///
    /// Returns the header and the number of bytes consumed.
    pub fn read_text<R: BufRead>(reader: &mut R) -> crate::Result<(Self, usize)> {
        let mut consumed = 0;
        let mut line_no = 0;
        let mut buf = Vec::new();
        let mut next_line = |reader: &mut R| -> crate::Result<String> {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            line_no += 1;
            if n == 0 || buf.last() != Some(&b'\n') {
                return Err(S5Error::MalformedHeader {
                    line: line_no,
                    reason: "unexpected end of header".to_string(),
                });
            }
            consumed += n;
            buf.pop();
            String::from_utf8(buf.clone()).map_err(|_| S5Error::MalformedHeader {
                line: line_no,
                reason: "header is not valid UTF-8".to_string(),
            })
        };

        let version_line = next_line(reader)?;
        let version = match version_line.split_once('\t') {
            Some((VERSION_ID, v)) => v.to_string(),
            _ => {
                return Err(S5Error::MalformedHeader {
                    line: 1,
                    reason: format!("expected {VERSION_ID}"),
                })
            }
        };

        let groups_line = next_line(reader)?;
        let num_groups: usize = match groups_line.split_once('\t') {
            Some((NUM_GROUPS_ID, n)) => n.parse().map_err(|_| S5Error::MalformedHeader {
                line: 2,
                reason: format!("invalid read group count '{n}'"),
            })?,
            _ => {
                return Err(S5Error::MalformedHeader {
                    line: 2,
                    reason: format!("expected {NUM_GROUPS_ID}"),
                })
            }
        };

        if num_groups > MAX_READ_GROUPS {
            return Err(S5Error::MalformedHeader {
                line: 2,
                reason: format!("{num_groups} read groups exceeds {MAX_READ_GROUPS}"),
            });
        }
        let mut read_groups = vec![ReadGroup::new(); num_groups];
        let mut line = next_line(reader)?;
        let mut line_idx = 3;
        while let Some(data) = line.strip_prefix('@') {
            let mut fields = data.split('\t');
            let key = fields.next().unwrap_or_default();
            let values: Vec<&str> = fields.collect();
            if values.len() != num_groups {
                return Err(S5Error::MalformedHeader {
                    line: line_idx,
                    reason: format!(
                        "attribute '{key}' has {} values for {num_groups} read groups",
                        values.len()
                    ),
                });
            }
            for (rg, value) in read_groups.iter_mut().zip(values) {
                let value = if value == MISSING { "" } else { value };
                rg.set(key, value);
            }
            line = next_line(reader)?;
            line_idx += 1;
        }

        let types: Vec<&str> = line.trim_start_matches('#').split('\t').collect();
        if types.len() < CORE_TYPES.len() || types[..CORE_TYPES.len()] != CORE_TYPES {
            return Err(S5Error::MalformedHeader {
                line: line_idx,
                reason: "invalid type line".to_string(),
            });
        }
        let column_line = next_line(reader)?;
        let columns: Vec<&str> = column_line.trim_start_matches('#').split('\t').collect();
        if columns.len() != types.len() || columns[..CORE_COLUMNS.len()] != CORE_COLUMNS {
            return Err(S5Error::MalformedHeader {
                line: line_idx + 1,
                reason: "column line does not match the type line".to_string(),
            });
        }
        let aux_fields = columns[CORE_COLUMNS.len()..]
            .iter()
            .zip(&types[CORE_TYPES.len()..])
            .map(|(name, ty)| AuxField::parse(name, ty, line_idx))
            .collect::<crate::Result<Vec<_>>>()?;

        Ok((
            Self {
                version,
                read_groups,
                aux_fields,
            },
            consumed,
        ))
    }
}
