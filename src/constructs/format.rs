use std::io::{Read, Write};
use std::path::Path;

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};

use crate::S5Error;

pub const TEXT_EXTENSION: &str = "slow5";
pub const BINARY_EXTENSION: &str = "blow5";

/// On-disk flavour of a signal file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Format {
    /// Tab separated, human readable (`.slow5`)
    Text,
    /// Length-prefixed binary records with an EOF trailer (`.blow5`)
    Binary,
}
impl Format {
    /// Infers the format from a path's extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some(TEXT_EXTENSION) => Ok(Self::Text),
            Some(BINARY_EXTENSION) => Ok(Self::Binary),
            _ => Err(S5Error::UnknownExtension(path.to_path_buf())),
        }
    }
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => TEXT_EXTENSION,
            Self::Binary => BINARY_EXTENSION,
        }
    }
    pub fn code(&self) -> u32 {
        match self {
            Self::Text => 0,
            Self::Binary => 1,
        }
    }
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Text),
            1 => Some(Self::Binary),
            _ => None,
        }
    }
}

/// Per-record compression ("press") method.
///
/// Binary files declare one method in their preamble and every record payload
/// is pressed with it. Text files are always [`PressMethod::None`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PressMethod {
    #[default]
    None,
    Zlib,
}
impl PressMethod {
    /// Parses a method name as given on the command line.
    ///
    /// ```rust
    /// use s5tools::PressMethod;
    ///
    /// assert_eq!(PressMethod::from_name("zlib").unwrap(), PressMethod::Zlib);
    /// assert_eq!(PressMethod::from_name("none").unwrap(), PressMethod::None);
    /// assert!(PressMethod::from_name("svb-zd").is_err());
    /// ```
    pub fn from_name(name: &str) -> crate::Result<Self> {
        match name {
            "none" => Ok(Self::None),
            "zlib" => Ok(Self::Zlib),
            _ => Err(S5Error::UnknownPressMethod(name.to_string())),
        }
    }
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zlib => "zlib",
        }
    }
    pub fn code(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Zlib => 1,
        }
    }
    pub fn from_code(code: u32) -> crate::Result<Self> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Zlib),
            _ => Err(S5Error::UnknownPressMethod(format!("code {code}"))),
        }
    }

    /// Method used when none is requested: `zlib` for binary, `none` for text.
    pub fn default_for(format: Format) -> Self {
        match format {
            Format::Binary => Self::Zlib,
            Format::Text => Self::None,
        }
    }

    /// Checks that this method can be stored in the given format.
    pub fn validate_for(&self, format: Format) -> crate::Result<()> {
        if format == Format::Text && *self != Self::None {
            return Err(S5Error::PressNotSupported(self.name().to_string()));
        }
        Ok(())
    }

    /// Compresses a record payload.
    pub fn press(&self, payload: Vec<u8>) -> crate::Result<Vec<u8>> {
        match self {
            Self::None => Ok(payload),
            Self::Zlib => {
                let buffer = Vec::with_capacity(payload.len() / 2);
                let mut enc = ZlibEncoder::new(buffer, Compression::default());
                enc.write_all(&payload)?;
                Ok(enc.finish()?)
            }
        }
    }

    /// Decompresses a record payload.
    pub fn depress(&self, pressed: &[u8]) -> crate::Result<Vec<u8>> {
        match self {
            Self::None => Ok(pressed.to_vec()),
            Self::Zlib => {
                let mut out = Vec::with_capacity(pressed.len() * 2);
                ZlibDecoder::new(pressed).read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}
