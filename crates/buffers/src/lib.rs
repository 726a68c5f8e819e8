//! Byte buffers used by the datatree binary codec and network bundles.
//!
//! [`Writer`] appends big-endian primitives to an auto-growing buffer and
//! [`Reader`] reads them back with bounds checking.

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("unexpected end of buffer")]
    EndOfBuffer,
    #[error("invalid utf-8 sequence")]
    InvalidUtf8,
}
