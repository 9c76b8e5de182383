//! Serialization framework error types.

use super::format::Tag;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerialError {
    /// A required field was absent from the stream.
    #[error("missing property {field_id} ({name})")]
    MissingProperty { field_id: u32, name: String },

    /// Write past the capacity of a fixed-capacity stream.
    #[error("stream capacity exceeded: write of {requested} bytes at position {position} exceeds capacity {capacity}")]
    CapacityExceeded {
        requested: usize,
        position: usize,
        capacity: usize,
    },

    /// Read past the written extent of the stream.
    #[error("unexpected end of stream: read of {requested} bytes with {available} available")]
    UnexpectedEnd { requested: usize, available: usize },

    /// The stream carried a tag byte that is not a known tag.
    #[error("invalid tag byte {0:#04x}")]
    InvalidTag(u8),

    /// A field was re-read with a different type than it was written with.
    /// Changing a field's type is forbidden; introduce a new field id.
    #[error("tag mismatch on field {field_id}: expected {expected:?}, found {found:?}")]
    TagMismatch {
        field_id: u32,
        expected: Tag,
        found: Tag,
    },

    /// A variable-length integer ran past its maximum width.
    #[error("varint overflow")]
    VarintOverflow,

    #[error("invalid utf-8 in string payload")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A structurally invalid payload (bad presence byte, unknown type id).
    #[error("malformed payload: {0}")]
    Malformed(&'static str),
}

pub type SerialResult<T> = Result<T, SerialError>;
