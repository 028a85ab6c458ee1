//! Binary encode/decode primitives shared by every on-disk format.
//!
//! The index, tree and pack formats are all built from the same handful
//! of primitives: big-endian fixed-width integers, raw 20-byte ids,
//! NUL-terminated strings, and little-endian base-128 varints. Both the
//! reader and the writer operate on a byte buffer with an explicit
//! offset.
//!
//! Padding is a constructor-selected mode, not a per-call flag: the
//! index format aligns each string to an 8-byte boundary, the tree
//! format does not. Getting this wrong breaks byte-for-byte
//! compatibility, so the mode is fixed when the cursor is created.

use crate::error::{Error, Result};
use crate::types::{ObjectId, OBJECT_ID_LEN};

const ALIGNMENT: usize = 8;

fn pad(value: usize, to: usize) -> usize {
    let remainder = value % to;
    if remainder > 0 {
        value + (to - remainder)
    } else {
        value
    }
}

/// A decoding cursor over a borrowed byte buffer.
pub struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
    padding: bool,
}

impl<'a> ByteReader<'a> {
    /// cursor without string padding (tree objects, delta streams)
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            padding: false,
        }
    }

    /// cursor that pads strings to 8-byte boundaries (index entries)
    pub fn padded(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            padding: true,
        }
    }

    /// whether the cursor has reached the end of the buffer
    pub fn is_eof(&self) -> bool {
        self.offset >= self.data.len()
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    /// the unread remainder of the buffer
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset.min(self.data.len())..]
    }

    /// advance the cursor without reading
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.offset + n > self.data.len() {
            return Err(Error::UnexpectedEof);
        }
        self.offset += n;
        Ok(())
    }

    /// read exactly `n` bytes
    pub fn read(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.offset + n > self.data.len() {
            return Err(Error::UnexpectedEof);
        }
        let value = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(value)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(raw))
    }

    /// read a raw 20-byte object id
    pub fn read_sha1(&mut self) -> Result<ObjectId> {
        let bytes = self.read(OBJECT_ID_LEN)?;
        let mut raw = [0u8; OBJECT_ID_LEN];
        raw.copy_from_slice(bytes);
        Ok(ObjectId::from_bytes(raw))
    }

    /// read a NUL-terminated UTF-8 string, then pad the cursor forward
    /// to the next 8-byte boundary if this is a padding cursor
    pub fn read_cstring(&mut self) -> Result<String> {
        let nul = self.remaining()
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::UnexpectedEof)?;

        let bytes = self.read(nul)?.to_vec();
        self.skip(1)?;

        if self.padding {
            self.offset = pad(self.offset, ALIGNMENT);
        }

        Ok(String::from_utf8(bytes)?)
    }

    /// read a little-endian base-128 unsigned integer: 7 data bits per
    /// byte, most significant bit is the continuation flag
    pub fn read_leb128(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift: u32 = 0;

        loop {
            let byte = self.read_u8()?;
            let bits = u64::from(byte & 0x7f);

            if shift >= 64 || (shift == 63 && bits > 1) {
                return Err(Error::InvalidVarint);
            }
            value |= bits << shift;

            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        Ok(value)
    }
}

/// An encoding cursor appending to a growable buffer.
pub struct ByteWriter {
    buf: Vec<u8>,
    padding: bool,
}

impl ByteWriter {
    /// writer without string padding (tree objects)
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            padding: false,
        }
    }

    /// writer that pads strings to 8-byte boundaries (index entries)
    pub fn padded() -> Self {
        Self {
            buf: Vec::new(),
            padding: true,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write(&value.to_be_bytes());
    }

    /// write a raw 20-byte object id
    pub fn write_sha1(&mut self, id: &ObjectId) {
        self.write(id.as_bytes());
    }

    /// write a NUL-terminated UTF-8 string with matching padding
    pub fn write_cstring(&mut self, value: &str) {
        self.write(value.as_bytes());
        self.write_u8(0);

        if self.padding {
            let target = pad(self.buf.len(), ALIGNMENT);
            self.buf.resize(target, 0);
        }
    }

    /// write a little-endian base-128 unsigned integer
    pub fn write_leb128(&mut self, mut value: u64) {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.write_u8(byte);
            if value == 0 {
                break;
            }
        }
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}
