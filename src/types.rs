//! Typed values and their canonical byte encodings.
//!
//! Each `TypeId` has a canonical width: BOOLEAN one byte, INTEGER four bytes
//! little-endian signed, TIMESTAMP eight bytes little-endian unsigned,
//! VARCHAR a four-byte length prefix followed by raw bytes. The same
//! encoding is used on pages and inside index keys.

pub mod error;

pub use error::{TypeError, TypeResult};

use crate::serial::deserializer::read_varlen_payload;
use crate::serial::serializer::write_varlen_payload;
use crate::serial::{
    BinaryDeserializer, BinarySerializer, Deserialize, ReadStream, SerialError, SerialRead,
    SerialResult, SerialWrite, Serialize, Tag, WriteStream, from_bytes, to_bytes,
};

/// Data types supported by the storage layer.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeId {
    Boolean = 1,
    Integer = 2,
    Timestamp = 3,
    Varchar = 4,
}

impl TypeId {
    pub fn from_u8(value: u8) -> TypeResult<Self> {
        match value {
            1 => Ok(TypeId::Boolean),
            2 => Ok(TypeId::Integer),
            3 => Ok(TypeId::Timestamp),
            4 => Ok(TypeId::Varchar),
            other => Err(TypeError::UnknownTypeId(other)),
        }
    }
}

/// Width of fixed-size index keys.
pub const KEY_SIZE: usize = 16;

pub type IndexKey = [u8; KEY_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
}

/// A typed value: a tagged union over the supported type set.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i32),
    Timestamp(u64),
    Varchar(String),
}

impl Value {
    pub fn type_id(&self) -> TypeId {
        match self {
            Value::Boolean(_) => TypeId::Boolean,
            Value::Integer(_) => TypeId::Integer,
            Value::Timestamp(_) => TypeId::Timestamp,
            Value::Varchar(_) => TypeId::Varchar,
        }
    }

    /// Canonical encoded width of this value.
    pub fn storage_size(&self) -> usize {
        match self {
            Value::Boolean(_) => 1,
            Value::Integer(_) => 4,
            Value::Timestamp(_) => 8,
            Value::Varchar(s) => 4 + s.len(),
        }
    }

    /// Fails unless this value has the expected type.
    pub fn expect_type(&self, expected: TypeId) -> TypeResult<()> {
        let actual = self.type_id();
        if actual != expected {
            return Err(TypeError::TypeMismatch { expected, actual });
        }
        Ok(())
    }

    /// Canonical encoding, without type information.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.storage_size());
        match self {
            Value::Boolean(b) => bytes.push(u8::from(*b)),
            Value::Integer(i) => bytes.extend_from_slice(&i.to_le_bytes()),
            Value::Timestamp(t) => bytes.extend_from_slice(&t.to_le_bytes()),
            Value::Varchar(s) => {
                bytes.extend_from_slice(&(s.len() as u32).to_le_bytes());
                bytes.extend_from_slice(s.as_bytes());
            }
        }
        bytes
    }

    /// Decodes a value of the given type from the front of `data`.
    pub fn from_bytes(type_id: TypeId, data: &[u8]) -> TypeResult<Self> {
        let need = |needed: usize| -> TypeResult<()> {
            if data.len() < needed {
                return Err(TypeError::Truncated {
                    type_id,
                    needed,
                    available: data.len(),
                });
            }
            Ok(())
        };

        match type_id {
            TypeId::Boolean => {
                need(1)?;
                Ok(Value::Boolean(data[0] != 0))
            }
            TypeId::Integer => {
                need(4)?;
                Ok(Value::Integer(i32::from_le_bytes([
                    data[0], data[1], data[2], data[3],
                ])))
            }
            TypeId::Timestamp => {
                need(8)?;
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&data[..8]);
                Ok(Value::Timestamp(u64::from_le_bytes(bytes)))
            }
            TypeId::Varchar => {
                need(4)?;
                let len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
                need(4 + len)?;
                let s = String::from_utf8(data[4..4 + len].to_vec())?;
                Ok(Value::Varchar(s))
            }
        }
    }

    /// Encoding prefixed by one type-id byte, for self-describing slots.
    pub fn to_bytes_with_type_info(&self) -> Vec<u8> {
        let mut bytes = vec![self.type_id() as u8];
        bytes.extend_from_slice(&self.to_bytes());
        bytes
    }

    pub fn from_bytes_with_type_info(data: &[u8]) -> TypeResult<Self> {
        let Some((&type_byte, rest)) = data.split_first() else {
            return Err(TypeError::Truncated {
                type_id: TypeId::Boolean,
                needed: 1,
                available: 0,
            });
        };
        Self::from_bytes(TypeId::from_u8(type_byte)?, rest)
    }

    /// Converts to a fixed-width index key. Fixed arms are copied
    /// little-endian into a zeroed key; VARCHAR is truncated to
    /// `KEY_SIZE - 1` bytes and NUL-terminated.
    pub fn to_index_key(&self) -> IndexKey {
        let mut key = [0u8; KEY_SIZE];
        match self {
            Value::Boolean(b) => key[0] = u8::from(*b),
            Value::Integer(i) => key[..4].copy_from_slice(&i.to_le_bytes()),
            Value::Timestamp(t) => key[..8].copy_from_slice(&t.to_le_bytes()),
            Value::Varchar(s) => {
                let bytes = s.as_bytes();
                let len = bytes.len().min(KEY_SIZE - 1);
                key[..len].copy_from_slice(&bytes[..len]);
                key[len] = 0;
            }
        }
        key
    }

    /// Arithmetic over numeric arms. Both operands must share the arm:
    /// INTEGER supports add, sub and mul; TIMESTAMP supports add and sub.
    /// Everything else is a type error.
    pub fn arithmetic(&self, other: &Value, op: ArithmeticOp) -> TypeResult<Value> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => {
                let result = match op {
                    ArithmeticOp::Add => a.wrapping_add(*b),
                    ArithmeticOp::Sub => a.wrapping_sub(*b),
                    ArithmeticOp::Mul => a.wrapping_mul(*b),
                };
                Ok(Value::Integer(result))
            }
            (Value::Timestamp(a), Value::Timestamp(b)) => {
                let result = match op {
                    ArithmeticOp::Add => a.wrapping_add(*b),
                    ArithmeticOp::Sub => a.wrapping_sub(*b),
                    ArithmeticOp::Mul => {
                        return Err(TypeError::UnsupportedArithmetic {
                            op,
                            type_id: TypeId::Timestamp,
                        });
                    }
                };
                Ok(Value::Timestamp(result))
            }
            (Value::Boolean(_), Value::Boolean(_)) => Err(TypeError::UnsupportedArithmetic {
                op,
                type_id: TypeId::Boolean,
            }),
            (Value::Varchar(_), Value::Varchar(_)) => Err(TypeError::UnsupportedArithmetic {
                op,
                type_id: TypeId::Varchar,
            }),
            _ => Err(TypeError::TypeMismatch {
                expected: self.type_id(),
                actual: other.type_id(),
            }),
        }
    }
}

// Values participate in the property framework as nested records: field 1
// carries the type id, field 2 the canonical payload.
impl Serialize for Value {
    fn serialize(&self, serializer: &mut BinarySerializer<'_>) -> SerialResult<()> {
        serializer.write_property(1, "type_id", &(self.type_id() as u8))?;
        serializer.write_property(2, "data", &self.to_bytes())
    }
}

impl Deserialize for Value {
    fn deserialize(deserializer: &mut BinaryDeserializer<'_>) -> SerialResult<Self> {
        let type_byte: u8 = deserializer.read_property(1, "type_id")?;
        let data: Vec<u8> = deserializer.read_property(2, "data")?;
        let type_id =
            TypeId::from_u8(type_byte).map_err(|_| SerialError::Malformed("unknown type id"))?;
        Value::from_bytes(type_id, &data)
            .map_err(|_| SerialError::Malformed("truncated value payload"))
    }
}

impl SerialWrite for Value {
    const TAG: Tag = Tag::Varlen;
    fn write_payload(&self, stream: &mut dyn WriteStream) -> SerialResult<()> {
        write_varlen_payload(stream, &to_bytes(self)?)
    }
}

impl SerialRead for Value {
    const TAG: Tag = Tag::Varlen;
    fn read_payload(stream: &mut dyn ReadStream) -> SerialResult<Self> {
        let bytes = read_varlen_payload(stream)?;
        from_bytes(&bytes)
    }
}
