//! Little-endian byte streams with offset addressing.
//!
//! Every stream starts with a four byte magic, so offset `0` never addresses a
//! record and can mean "none" in bucket heads and chain links. Writers only
//! append, except for [`StreamWriter::patch_u32`] which rewrites a link field
//! of a record that was already written. Once sealed, a stream is a plain byte
//! buffer and every logical reader gets its own [`StreamReader`] cursor.

use std::convert::TryInto;

use crate::errors::{Error, Result};

pub const MAGIC_LEN: u32 = 4;

/// Longest string a one-byte length prefix can describe.
pub const MAX_SHORT_STR: usize = u8::MAX as usize;

#[derive(Debug)]
pub struct StreamWriter {
    buf: Vec<u8>,
}

impl StreamWriter {
    pub fn new(magic: &[u8; 4]) -> Self {
        StreamWriter { buf: magic.to_vec() }
    }

    pub fn position(&self) -> Result<u32> {
        u32::try_from(self.buf.len())
            .map_err(|_| Error::format("stream grew past the 4 GiB offset range"))
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a string behind a one-byte length. Callers truncate with
    /// [`fit_short_str`] first; anything longer is a format error.
    pub fn write_short_str(&mut self, value: &str) -> Result<()> {
        let len = u8::try_from(value.len())
            .map_err(|_| Error::format(format!("string of {} bytes exceeds {MAX_SHORT_STR}", value.len())))?;
        self.buf.push(len);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Overwrites four bytes at an offset that has already been written.
    pub fn patch_u32(&mut self, offset: u32, value: u32) -> Result<()> {
        let start = offset as usize;
        let len = self.buf.len();
        let slot = self.buf
            .get_mut(start..start + 4)
            .ok_or_else(|| Error::offset(offset as u64, len))?;
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn reader_at(&self, offset: u32) -> Result<StreamReader<'_>> {
        StreamReader::at(&self.buf, offset)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Independent cursor over sealed (or in-progress) stream bytes.
#[derive(Debug, Clone)]
pub struct StreamReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StreamReader<'a> {
    /// Positions a reader on a record offset. Offsets inside the magic or at or
    /// past the end are rejected before any byte is read.
    pub fn at(data: &'a [u8], offset: u32) -> Result<Self> {
        let pos = offset as usize;
        if offset < MAGIC_LEN || pos >= data.len() {
            return Err(Error::offset(offset as u64, data.len()));
        }
        Ok(StreamReader { data, pos })
    }

    /// Reader over a buffer without a magic prefix.
    pub fn raw(data: &'a [u8]) -> Self {
        StreamReader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len()).ok_or_else(|| {
            Error::format(format!(
                "truncated record: wanted {len} bytes at {} of {}",
                self.pos,
                self.data.len()
            ))
        })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        bytes.try_into().map_err(|_| Error::format("short read"))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_short_str(&mut self) -> Result<&'a str> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(std::str::from_utf8(bytes)?)
    }
}

/// Checks the magic of a stream loaded from disk.
pub fn check_magic(data: &[u8], magic: &[u8; 4], name: &str) -> Result<()> {
    match data.get(..MAGIC_LEN as usize) {
        Some(head) if head == magic => Ok(()),
        _ => Err(Error::format(format!("{name}: bad stream magic"))),
    }
}

/// Cuts a string to fit a one-byte length prefix without splitting a character.
pub fn fit_short_str(value: &str) -> &str {
    if value.len() <= MAX_SHORT_STR {
        return value;
    }
    let mut end = MAX_SHORT_STR;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn patch_rewrites_link_in_place() {
        let mut writer = StreamWriter::new(b"TEST");
        let offset = writer.position().unwrap();
        writer.write_u32(0);
        writer.write_u32(0xAAAA_AAAA);
        writer.patch_u32(offset, 42).unwrap();

        let mut reader = writer.reader_at(offset).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 42);
        assert_eq!(reader.read_u32().unwrap(), 0xAAAA_AAAA);
    }

    #[test]
    fn patch_past_end_is_offset_error() {
        let mut writer = StreamWriter::new(b"TEST");
        let err = writer.patch_u32(2, 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Offset);
    }

    #[test]
    fn offsets_are_bound_checked() {
        let data = b"TEST\x01\x02";
        assert_eq!(StreamReader::at(data, 0).unwrap_err().kind, ErrorKind::Offset);
        assert_eq!(StreamReader::at(data, 6).unwrap_err().kind, ErrorKind::Offset);
        let mut reader = StreamReader::at(data, 4).unwrap();
        assert_eq!(reader.read_u32().unwrap_err().kind, ErrorKind::Format);
    }

    #[test]
    fn short_strings_truncate_on_char_boundary() {
        let long = "é".repeat(200);
        let fitted = fit_short_str(&long);
        assert_eq!(fitted.len(), 254);
        assert!(long.starts_with(fitted));
        assert_eq!(fit_short_str("bar"), "bar");
    }
}
