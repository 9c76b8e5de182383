//! Property-tagged binary serialization.
//!
//! Objects are encoded as sequences of property records. Each property
//! carries a stable numeric field id and a tag byte that makes unrecognized
//! payloads skippable, so readers and writers can evolve independently:
//! unknown fields are skipped, absent fields fall back to declared defaults.

pub mod deserializer;
pub mod error;
pub mod format;
pub mod serializer;
pub mod stream;

pub use deserializer::{BinaryDeserializer, Deserialize, SerialRead, from_bytes};
pub use error::{SerialError, SerialResult};
pub use format::Tag;
pub use serializer::{BinarySerializer, SerialWrite, Serialize, to_bytes};
pub use stream::{MemoryStream, ReadStream, WriteStream};
