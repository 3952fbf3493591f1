//! Error types for the binary tile format.

use thiserror::Error;

/// Errors produced while encoding or decoding a tile payload.
///
/// Encode-side variants report format capacity violations before any bytes
/// are produced; decode-side variants carry the field name and byte offset
/// at which parsing stopped.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload declares a format version this codec does not understand.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    /// A declared length runs past the end of the buffer.
    #[error("truncated payload: {field} at offset {offset} needs {needed} more bytes")]
    Truncated {
        /// Name of the field being read when the buffer ran out.
        field: &'static str,
        /// Byte offset at which the read started.
        offset: usize,
        /// Number of missing bytes.
        needed: usize,
    },

    /// The payload needs more distinct strings than the format can index.
    #[error("string table overflow: {0} distinct strings exceeds the format limit of 65535")]
    StringTableOverflow(usize),

    /// A single string is longer than the format's length prefix allows.
    #[error("string too long: {len} bytes exceeds the format limit of 65535")]
    StringTooLong { len: usize },

    /// A feature carries more tags than the format's tag count can hold.
    #[error("too many tags on {kind} {id}: {count} exceeds the format limit of 65535")]
    TooManyTags {
        /// Feature kind, `"node"` or `"way"`.
        kind: &'static str,
        id: u64,
        count: usize,
    },

    /// A way references more nodes than the format's ref count can hold.
    #[error("too many node references on way {id}: {count} exceeds the format limit of 65535")]
    TooManyNodeRefs { id: u64, count: usize },

    /// A string table entry is not valid UTF-8.
    #[error("string table entry {index} is not valid UTF-8")]
    InvalidString {
        index: usize,
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// A tag references a string index beyond the decoded table.
    #[error("string index {index} out of range: table has {len} entries")]
    StringIndexOutOfRange { index: u16, len: usize },
}
