use std::io::{BufReader, Read, Write};

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};

/// Buffered wrapper over an established session stream.
pub struct Stream<S: Read + Write> {
    inner: BufReader<S>,
}

impl<S: Read + Write> Stream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: BufReader::new(stream),
        }
    }

    pub fn get_ref(&self) -> &S {
        self.inner.get_ref()
    }

    pub fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.inner.get_mut().write_all(buf)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.inner.get_mut().flush()
    }

    /// Read one backend message into the buffer set.
    pub fn read_message(&mut self, buffer_set: &mut BufferSet) -> Result<()> {
        let mut header = [0u8; 5];
        self.inner.read_exact(&mut header)?;
        buffer_set.type_byte = header[0];

        let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        if length < 4 {
            return Err(Error::Protocol(format!(
                "Invalid message length: {}",
                length
            )));
        }

        buffer_set.read_buffer.clear();
        buffer_set.read_buffer.resize((length - 4) as usize, 0);
        self.inner.read_exact(&mut buffer_set.read_buffer)?;
        Ok(())
    }
}
