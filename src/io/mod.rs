mod mmap;
mod reader;
mod writer;

pub use mmap::MmapReader;
pub use reader::{BoxedReader, Reader};
pub use writer::{BoxedWriter, Writer};
