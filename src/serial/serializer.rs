//! Property-tagged binary encoder.

use super::error::SerialResult;
use super::format::{FIELD_TERMINATOR, Tag, write_varint};
use super::stream::{MemoryStream, WriteStream};

/// Objects that encode themselves as a sequence of properties.
///
/// Implementations must emit field ids in strictly ascending order, starting
/// from 1. Once assigned, a field id is permanent.
pub trait Serialize {
    fn serialize(&self, serializer: &mut BinarySerializer<'_>) -> SerialResult<()>;
}

pub struct BinarySerializer<'a> {
    stream: &'a mut dyn WriteStream,
    last_field_id: u32,
}

impl<'a> BinarySerializer<'a> {
    /// Encodes `value` as one object record onto `stream`.
    pub fn serialize<T: Serialize>(value: &T, stream: &'a mut dyn WriteStream) -> SerialResult<()> {
        let mut serializer = BinarySerializer {
            stream,
            last_field_id: 0,
        };
        value.serialize(&mut serializer)?;
        write_varint(serializer.stream, u64::from(FIELD_TERMINATOR))
    }

    /// Emits a property unconditionally.
    pub fn write_property<T: SerialWrite>(
        &mut self,
        field_id: u32,
        _name: &str,
        value: &T,
    ) -> SerialResult<()> {
        debug_assert!(
            field_id > self.last_field_id,
            "field ids must be ascending and non-zero"
        );
        self.last_field_id = field_id;
        write_varint(self.stream, u64::from(field_id))?;
        self.stream.write_data(&[T::TAG as u8])?;
        value.write_payload(self.stream)
    }

    /// Suppresses emission entirely when `value == default`. A reader that
    /// does not find the field assigns the same default, so suppressed and
    /// emitted encodings deserialize identically.
    pub fn write_property_with_default<T: SerialWrite + PartialEq>(
        &mut self,
        field_id: u32,
        name: &str,
        value: &T,
        default: &T,
    ) -> SerialResult<()> {
        if value == default {
            return Ok(());
        }
        self.write_property(field_id, name, value)
    }
}

/// Encodes a whole object to bytes; used for nested object payloads.
pub fn to_bytes<T: Serialize>(value: &T) -> SerialResult<Vec<u8>> {
    let mut stream = MemoryStream::new();
    BinarySerializer::serialize(value, &mut stream)?;
    Ok(stream.release())
}

/// Writes a varlen payload: varint byte count, then the bytes.
pub fn write_varlen_payload(stream: &mut dyn WriteStream, bytes: &[u8]) -> SerialResult<()> {
    write_varint(stream, bytes.len() as u64)?;
    stream.write_data(bytes)
}

/// Value-level encoding for property payloads.
pub trait SerialWrite {
    const TAG: Tag;
    fn write_payload(&self, stream: &mut dyn WriteStream) -> SerialResult<()>;
}

impl SerialWrite for bool {
    const TAG: Tag = Tag::Fixed8;
    fn write_payload(&self, stream: &mut dyn WriteStream) -> SerialResult<()> {
        stream.write_data(&[u8::from(*self)])
    }
}

impl SerialWrite for u8 {
    const TAG: Tag = Tag::Fixed8;
    fn write_payload(&self, stream: &mut dyn WriteStream) -> SerialResult<()> {
        stream.write_data(&[*self])
    }
}

impl SerialWrite for u32 {
    const TAG: Tag = Tag::Fixed32;
    fn write_payload(&self, stream: &mut dyn WriteStream) -> SerialResult<()> {
        stream.write_data(&self.to_le_bytes())
    }
}

impl SerialWrite for i32 {
    const TAG: Tag = Tag::Fixed32;
    fn write_payload(&self, stream: &mut dyn WriteStream) -> SerialResult<()> {
        stream.write_data(&self.to_le_bytes())
    }
}

impl SerialWrite for u64 {
    const TAG: Tag = Tag::Fixed64;
    fn write_payload(&self, stream: &mut dyn WriteStream) -> SerialResult<()> {
        stream.write_data(&self.to_le_bytes())
    }
}

impl SerialWrite for i64 {
    const TAG: Tag = Tag::Fixed64;
    fn write_payload(&self, stream: &mut dyn WriteStream) -> SerialResult<()> {
        stream.write_data(&self.to_le_bytes())
    }
}

impl SerialWrite for String {
    const TAG: Tag = Tag::Varlen;
    fn write_payload(&self, stream: &mut dyn WriteStream) -> SerialResult<()> {
        write_varlen_payload(stream, self.as_bytes())
    }
}

impl<T: SerialWrite> SerialWrite for Vec<T> {
    const TAG: Tag = Tag::Varlen;
    fn write_payload(&self, stream: &mut dyn WriteStream) -> SerialResult<()> {
        // Length-prefixed then elementwise
        let mut inner = MemoryStream::new();
        write_varint(&mut inner, self.len() as u64)?;
        for element in self {
            element.write_payload(&mut inner)?;
        }
        write_varlen_payload(stream, inner.data())
    }
}

impl<T: SerialWrite> SerialWrite for Option<T> {
    const TAG: Tag = Tag::Varlen;
    fn write_payload(&self, stream: &mut dyn WriteStream) -> SerialResult<()> {
        // One-byte presence tag, then the referent if present
        let mut inner = MemoryStream::new();
        match self {
            None => inner.write_data(&[0])?,
            Some(value) => {
                inner.write_data(&[1])?;
                value.write_payload(&mut inner)?;
            }
        }
        write_varlen_payload(stream, inner.data())
    }
}
