use std::fmt::Write as _;

use bytemuck::{Pod, Zeroable};

use crate::{Format, PressMethod, S5Error};

pub const RECORD_META_SIZE: usize = std::mem::size_of::<RecordMeta>();
const MISSING: &str = ".";

/// Fixed-width leading block of a binary record payload
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq)]
#[repr(C)]
struct RecordMeta {
    read_group: u32,
    read_id_len: u32,
    len_raw_signal: u64,
    digitisation: f64,
    offset: f64,
    range: f64,
    sampling_rate: f64,
}

/// One raw-signal read.
///
/// Auxiliary values are kept as their text rendering and are ordered by the
/// owning header's auxiliary field list.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub read_id: String,
    pub read_group: u32,
    pub digitisation: f64,
    pub offset: f64,
    pub range: f64,
    pub sampling_rate: f64,
    pub raw_signal: Vec<i16>,
    pub aux: Vec<String>,
}
impl Record {
    pub fn new(read_id: &str, read_group: u32, raw_signal: Vec<i16>) -> Self {
        Self {
            read_id: read_id.to_string(),
            read_group,
            digitisation: 8192.0,
            offset: 0.0,
            range: 1400.0,
            sampling_rate: 4000.0,
            raw_signal,
            aux: Vec::new(),
        }
    }
    pub fn with_aux(mut self, aux: Vec<String>) -> Self {
        self.aux = aux;
        self
    }

    /// Encodes the record as it is stored in a file of the given format.
    ///
    /// Binary records are a `u64` little-endian length followed by the pressed
    /// payload; text records are one newline-terminated line.
    pub fn encode(&self, format: Format, press: PressMethod) -> crate::Result<Vec<u8>> {
        match format {
            Format::Binary => {
                let payload = press.press(self.to_payload())?;
                let mut bytes = Vec::with_capacity(8 + payload.len());
                bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
                bytes.extend_from_slice(&payload);
                Ok(bytes)
            }
            Format::Text => {
                press.validate_for(format)?;
                let mut line = self.to_line();
                line.push('\n');
                Ok(line.into_bytes())
            }
        }
    }

    /// Decodes one raw record as returned by [`Reader::next_raw`](crate::Reader::next_raw).
    pub fn decode(
        raw: &[u8],
        format: Format,
        press: PressMethod,
        num_aux: usize,
    ) -> crate::Result<Self> {
        match format {
            Format::Binary => Self::from_payload(&press.depress(raw)?, num_aux),
            Format::Text => {
                let line = std::str::from_utf8(raw)
                    .map_err(|_| S5Error::MalformedRecord("record is not valid UTF-8".into()))?;
                Self::from_line(line.trim_end_matches(['\n', '\r']), num_aux)
            }
        }
    }

    fn to_payload(&self) -> Vec<u8> {
        let meta = RecordMeta {
            read_group: self.read_group,
            read_id_len: self.read_id.len() as u32,
            len_raw_signal: self.raw_signal.len() as u64,
            digitisation: self.digitisation,
            offset: self.offset,
            range: self.range,
            sampling_rate: self.sampling_rate,
        };
        let aux_len: usize = self.aux.iter().map(|v| 4 + v.len()).sum();
        let mut buf = Vec::with_capacity(
            RECORD_META_SIZE + self.read_id.len() + 2 * self.raw_signal.len() + aux_len,
        );
        buf.extend_from_slice(bytemuck::bytes_of(&meta));
        buf.extend_from_slice(self.read_id.as_bytes());
        buf.extend_from_slice(bytemuck::cast_slice(&self.raw_signal));
        for value in &self.aux {
            buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
            buf.extend_from_slice(value.as_bytes());
        }
        buf
    }

    fn from_payload(bytes: &[u8], num_aux: usize) -> crate::Result<Self> {
        if bytes.len() < RECORD_META_SIZE {
            return Err(S5Error::MalformedRecord(format!(
                "payload of {} bytes is shorter than the record block",
                bytes.len()
            )));
        }
        let meta: RecordMeta = bytemuck::pod_read_unaligned(&bytes[..RECORD_META_SIZE]);
        let mut pos = RECORD_META_SIZE;

        let id_bytes = take(bytes, &mut pos, meta.read_id_len as usize)?;
        let read_id = String::from_utf8(id_bytes.to_vec())
            .map_err(|_| S5Error::MalformedRecord("read id is not valid UTF-8".into()))?;
        let signal_bytes = usize::try_from(meta.len_raw_signal)
            .ok()
            .and_then(|n| n.checked_mul(2))
            .ok_or_else(|| {
                S5Error::MalformedRecord(format!(
                    "signal length {} of record {read_id} is out of range",
                    meta.len_raw_signal
                ))
            })?;
        let raw_signal: Vec<i16> =
            bytemuck::pod_collect_to_vec(take(bytes, &mut pos, signal_bytes)?);
        let mut aux = Vec::with_capacity(num_aux);
        for _ in 0..num_aux {
            let len_bytes = take(bytes, &mut pos, 4)?;
            let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
            let value = String::from_utf8(take(bytes, &mut pos, len as usize)?.to_vec())
                .map_err(|_| {
                    S5Error::MalformedRecord("auxiliary value is not valid UTF-8".into())
                })?;
            aux.push(value);
        }
        if pos != bytes.len() {
            return Err(S5Error::MalformedRecord(format!(
                "{} trailing bytes after record {}",
                bytes.len() - pos,
                read_id
            )));
        }

        Ok(Self {
            read_id,
            read_group: meta.read_group,
            digitisation: meta.digitisation,
            offset: meta.offset,
            range: meta.range,
            sampling_rate: meta.sampling_rate,
            raw_signal,
            aux,
        })
    }

    fn to_line(&self) -> String {
        self.render(true)
    }

    /// Text line with the signal column replaced by `.`.
    pub(crate) fn to_summary_line(&self) -> String {
        self.render(false)
    }

    fn render(&self, with_signal: bool) -> String {
        let capacity = if with_signal { 64 + 6 * self.raw_signal.len() } else { 64 };
        let mut line = String::with_capacity(capacity);
        let _ = write!(
            line,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t",
            self.read_id,
            self.read_group,
            self.digitisation,
            self.offset,
            self.range,
            self.sampling_rate,
            self.raw_signal.len()
        );
        if !with_signal || self.raw_signal.is_empty() {
            line.push_str(MISSING);
        } else {
            for (i, value) in self.raw_signal.iter().enumerate() {
                if i > 0 {
                    line.push(',');
                }
                let _ = write!(line, "{value}");
            }
        }
        for value in &self.aux {
            line.push('\t');
            line.push_str(if value.is_empty() { MISSING } else { value });
        }
        line
    }

    fn from_line(line: &str, num_aux: usize) -> crate::Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 8 + num_aux {
            return Err(S5Error::MalformedRecord(format!(
                "expected {} columns, found {}",
                8 + num_aux,
                fields.len()
            )));
        }
        let malformed =
            |column: &str| S5Error::MalformedRecord(format!("invalid {column} in '{}'", fields[0]));
        let float = |idx: usize, column: &str| -> crate::Result<f64> {
            fields[idx].parse().map_err(|_| malformed(column))
        };

        let read_group: u32 = fields[1].parse().map_err(|_| malformed("read_group"))?;
        let len_raw_signal: usize = fields[6].parse().map_err(|_| malformed("len_raw_signal"))?;
        let raw_signal = if fields[7] == MISSING {
            Vec::new()
        } else {
            fields[7]
                .split(',')
                .map(|v| v.parse::<i16>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| malformed("raw_signal"))?
        };
        if raw_signal.len() != len_raw_signal {
            return Err(malformed("len_raw_signal"));
        }
        let aux = fields[8..]
            .iter()
            .map(|v| if *v == MISSING { String::new() } else { v.to_string() })
            .collect();

        Ok(Self {
            read_id: fields[0].to_string(),
            read_group,
            digitisation: float(2, "digitisation")?,
            offset: float(3, "offset")?,
            range: float(4, "range")?,
            sampling_rate: float(5, "sampling_rate")?,
            raw_signal,
            aux,
        })
    }
}

/// Advances `pos` over the next `n` bytes of a payload.
fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> crate::Result<&'a [u8]> {
    let end = match pos.checked_add(n) {
        Some(end) if end <= bytes.len() => end,
        _ => {
            return Err(S5Error::MalformedRecord(format!(
                "field at byte {} overruns the {}-byte payload",
                pos,
                bytes.len()
            )))
        }
    };
    let slice = &bytes[*pos..end];
    *pos = end;
    Ok(slice)
}
