//! Byte stream abstractions and the in-memory stream.

use super::error::{SerialError, SerialResult};

/// A writable byte sink. `write_data` is the only primitive.
pub trait WriteStream {
    fn write_data(&mut self, data: &[u8]) -> SerialResult<()>;
}

/// A readable byte source. `read_data` is the only primitive.
pub trait ReadStream {
    fn read_data(&mut self, buf: &mut [u8]) -> SerialResult<()>;
}

/// An in-memory stream over a `Vec<u8>` backing buffer.
///
/// Owning streams (`new`, `with_capacity`) grow on demand. Fixed streams
/// (`fixed`, `from_vec`) never grow; writes past their capacity fail with
/// `CapacityExceeded`. Reads past the written extent fail either way.
pub struct MemoryStream {
    data: Vec<u8>,
    position: usize,
    /// Some(cap) for fixed streams; None means the buffer grows on demand.
    capacity_limit: Option<usize>,
}

impl MemoryStream {
    /// An owning, growable stream with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(512)
    }

    /// An owning, growable stream with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            position: 0,
            capacity_limit: None,
        }
    }

    /// An empty fixed-capacity stream. Writes past `capacity` fail.
    pub fn fixed(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            position: 0,
            capacity_limit: Some(capacity),
        }
    }

    /// A fixed stream over an existing buffer, positioned at the start.
    /// The whole buffer is readable; writes overwrite in place.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let capacity = data.len();
        Self {
            data,
            position: 0,
            capacity_limit: Some(capacity),
        }
    }

    /// Resets the position to zero, keeping the buffer intact.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Gives up the backing buffer, consuming the stream.
    pub fn release(self) -> Vec<u8> {
        self.data
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Written extent of the stream.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteStream for MemoryStream {
    fn write_data(&mut self, data: &[u8]) -> SerialResult<()> {
        let end = self.position + data.len();
        if let Some(capacity) = self.capacity_limit {
            if end > capacity {
                return Err(SerialError::CapacityExceeded {
                    requested: data.len(),
                    position: self.position,
                    capacity,
                });
            }
        }
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.position..end].copy_from_slice(data);
        self.position = end;
        Ok(())
    }
}

impl ReadStream for MemoryStream {
    fn read_data(&mut self, buf: &mut [u8]) -> SerialResult<()> {
        let end = self.position + buf.len();
        if end > self.data.len() {
            return Err(SerialError::UnexpectedEnd {
                requested: buf.len(),
                available: self.data.len() - self.position,
            });
        }
        buf.copy_from_slice(&self.data[self.position..end]);
        self.position = end;
        Ok(())
    }
}
