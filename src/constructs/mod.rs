mod format;
mod header;
mod record;

pub use format::{Format, PressMethod, BINARY_EXTENSION, TEXT_EXTENSION};
pub use header::{
    AuxField, AuxType, Header, Preamble, ReadGroup, ShardPreamble, EOF_MARKER, MAGIC,
    MAX_READ_GROUPS, PREAMBLE_SIZE, RUN_ID, SHARD_MAGIC, SHARD_PREAMBLE_SIZE, TEXT_VERSION, VERSION,
};
pub use record::{Record, RECORD_META_SIZE};
