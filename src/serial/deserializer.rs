//! Property-tagged binary decoder.
//!
//! Reading is positional over ascending field ids: a requested id that is
//! behind the cursor was absent, one ahead of the cursor is reached by
//! skipping whatever unknown fields sit in between.

use super::error::{SerialError, SerialResult};
use super::format::{FIELD_TERMINATOR, Tag, read_varint};
use super::stream::{MemoryStream, ReadStream};

/// Objects that decode themselves from a sequence of properties.
///
/// Field ids must be requested in the same ascending order they were
/// declared in `Serialize`.
pub trait Deserialize: Sized {
    fn deserialize(deserializer: &mut BinaryDeserializer<'_>) -> SerialResult<Self>;
}

pub struct BinaryDeserializer<'a> {
    stream: &'a mut dyn ReadStream,
    /// Property header read ahead of consumption.
    peeked: Option<(u32, Tag)>,
    /// Set once the object terminator has been read.
    finished: bool,
}

impl<'a> BinaryDeserializer<'a> {
    /// Decodes one object record from `stream`, consuming it entirely
    /// (including trailing unknown fields and the terminator).
    pub fn deserialize<T: Deserialize>(stream: &'a mut dyn ReadStream) -> SerialResult<T> {
        let mut deserializer = BinaryDeserializer {
            stream,
            peeked: None,
            finished: false,
        };
        let value = T::deserialize(&mut deserializer)?;
        deserializer.finish()?;
        Ok(value)
    }

    /// Reads a required property; absence is a `MissingProperty` error.
    pub fn read_property<T: SerialRead>(&mut self, field_id: u32, name: &str) -> SerialResult<T> {
        match self.try_read_property(field_id)? {
            Some(value) => Ok(value),
            None => Err(SerialError::MissingProperty {
                field_id,
                name: name.to_string(),
            }),
        }
    }

    /// Reads an optional property; absence yields `default`.
    pub fn read_property_with_default<T: SerialRead>(
        &mut self,
        field_id: u32,
        _name: &str,
        default: T,
    ) -> SerialResult<T> {
        Ok(self.try_read_property(field_id)?.unwrap_or(default))
    }

    fn try_read_property<T: SerialRead>(&mut self, field_id: u32) -> SerialResult<Option<T>> {
        loop {
            let (next_id, tag) = match self.peek_header()? {
                Some(header) => header,
                None => return Ok(None),
            };
            if next_id < field_id {
                // A field this reader does not know; skip it
                self.peeked = None;
                self.skip_payload(tag)?;
                continue;
            }
            if next_id > field_id {
                // The requested field was not emitted
                return Ok(None);
            }
            if tag != T::TAG {
                return Err(SerialError::TagMismatch {
                    field_id,
                    expected: T::TAG,
                    found: tag,
                });
            }
            self.peeked = None;
            return Ok(Some(T::read_payload(self.stream)?));
        }
    }

    fn peek_header(&mut self) -> SerialResult<Option<(u32, Tag)>> {
        if self.finished {
            return Ok(None);
        }
        if let Some(header) = self.peeked {
            return Ok(Some(header));
        }
        let field_id = read_varint(self.stream)? as u32;
        if field_id == FIELD_TERMINATOR {
            self.finished = true;
            return Ok(None);
        }
        let mut tag_byte = [0u8; 1];
        self.stream.read_data(&mut tag_byte)?;
        let tag = Tag::from_u8(tag_byte[0])?;
        self.peeked = Some((field_id, tag));
        Ok(Some((field_id, tag)))
    }

    fn skip_payload(&mut self, tag: Tag) -> SerialResult<()> {
        let skip = match tag {
            Tag::Fixed8 => 1,
            Tag::Fixed32 => 4,
            Tag::Fixed64 => 8,
            Tag::Varlen => read_varint(self.stream)? as usize,
        };
        let mut remaining = skip;
        let mut scratch = [0u8; 64];
        while remaining > 0 {
            let n = remaining.min(scratch.len());
            self.stream.read_data(&mut scratch[..n])?;
            remaining -= n;
        }
        Ok(())
    }

    /// Skips any fields the reader did not request and consumes the
    /// terminator, leaving the stream positioned after the record.
    fn finish(&mut self) -> SerialResult<()> {
        loop {
            let tag = match self.peek_header()? {
                Some((_, tag)) => tag,
                None => return Ok(()),
            };
            self.peeked = None;
            self.skip_payload(tag)?;
        }
    }
}

/// Decodes a whole object from bytes; used for nested object payloads.
pub fn from_bytes<T: Deserialize>(bytes: &[u8]) -> SerialResult<T> {
    let mut stream = MemoryStream::from_vec(bytes.to_vec());
    BinaryDeserializer::deserialize(&mut stream)
}

/// Reads a varlen payload: varint byte count, then the bytes.
pub fn read_varlen_payload(stream: &mut dyn ReadStream) -> SerialResult<Vec<u8>> {
    let len = read_varint(stream)? as usize;
    let mut bytes = vec![0u8; len];
    stream.read_data(&mut bytes)?;
    Ok(bytes)
}

/// Value-level decoding for property payloads. Mirror of `SerialWrite`.
pub trait SerialRead: Sized {
    const TAG: Tag;
    fn read_payload(stream: &mut dyn ReadStream) -> SerialResult<Self>;
}

impl SerialRead for bool {
    const TAG: Tag = Tag::Fixed8;
    fn read_payload(stream: &mut dyn ReadStream) -> SerialResult<Self> {
        let mut byte = [0u8; 1];
        stream.read_data(&mut byte)?;
        Ok(byte[0] != 0)
    }
}

impl SerialRead for u8 {
    const TAG: Tag = Tag::Fixed8;
    fn read_payload(stream: &mut dyn ReadStream) -> SerialResult<Self> {
        let mut byte = [0u8; 1];
        stream.read_data(&mut byte)?;
        Ok(byte[0])
    }
}

impl SerialRead for u32 {
    const TAG: Tag = Tag::Fixed32;
    fn read_payload(stream: &mut dyn ReadStream) -> SerialResult<Self> {
        let mut bytes = [0u8; 4];
        stream.read_data(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }
}

impl SerialRead for i32 {
    const TAG: Tag = Tag::Fixed32;
    fn read_payload(stream: &mut dyn ReadStream) -> SerialResult<Self> {
        let mut bytes = [0u8; 4];
        stream.read_data(&mut bytes)?;
        Ok(i32::from_le_bytes(bytes))
    }
}

impl SerialRead for u64 {
    const TAG: Tag = Tag::Fixed64;
    fn read_payload(stream: &mut dyn ReadStream) -> SerialResult<Self> {
        let mut bytes = [0u8; 8];
        stream.read_data(&mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }
}

impl SerialRead for i64 {
    const TAG: Tag = Tag::Fixed64;
    fn read_payload(stream: &mut dyn ReadStream) -> SerialResult<Self> {
        let mut bytes = [0u8; 8];
        stream.read_data(&mut bytes)?;
        Ok(i64::from_le_bytes(bytes))
    }
}

impl SerialRead for String {
    const TAG: Tag = Tag::Varlen;
    fn read_payload(stream: &mut dyn ReadStream) -> SerialResult<Self> {
        let bytes = read_varlen_payload(stream)?;
        Ok(String::from_utf8(bytes)?)
    }
}

impl<T: SerialRead> SerialRead for Vec<T> {
    const TAG: Tag = Tag::Varlen;
    fn read_payload(stream: &mut dyn ReadStream) -> SerialResult<Self> {
        let bytes = read_varlen_payload(stream)?;
        let mut inner = MemoryStream::from_vec(bytes);
        let count = read_varint(&mut inner)? as usize;
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(T::read_payload(&mut inner)?);
        }
        Ok(elements)
    }
}

impl<T: SerialRead> SerialRead for Option<T> {
    const TAG: Tag = Tag::Varlen;
    fn read_payload(stream: &mut dyn ReadStream) -> SerialResult<Self> {
        let bytes = read_varlen_payload(stream)?;
        let mut inner = MemoryStream::from_vec(bytes);
        let mut presence = [0u8; 1];
        inner.read_data(&mut presence)?;
        match presence[0] {
            0 => Ok(None),
            1 => Ok(Some(T::read_payload(&mut inner)?)),
            _ => Err(SerialError::Malformed("presence byte must be 0 or 1")),
        }
    }
}
