//! Interned key/value entries.
//!
//! Entry layout: `u8 keyLen, key, u8 valueLen, value, u32 usageHead, u32 next`.
//! `next` chains entries that share a bucket of the [`super::KeyValueIndex`],
//! `usageHead` is the first node of the entry's chain in the usage stream.

use crate::data::element::TagPair;
use crate::errors::Result;

use super::stream::{check_magic, fit_short_str, StreamReader, StreamWriter};

pub const KEY_VALUE_MAGIC: &[u8; 4] = b"OSKV";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueEntry<'a> {
    pub offset: u32,
    pub key: &'a str,
    pub value: &'a str,
    pub usage_head: u32,
    pub next: u32,
    usage_field: u32,
}

impl KeyValueEntry<'_> {
    pub fn matches(&self, key: &str, value: &str) -> bool {
        self.key == fit_short_str(key) && self.value == fit_short_str(value)
    }
}

fn read_entry(data: &[u8], offset: u32) -> Result<KeyValueEntry<'_>> {
    let mut reader = StreamReader::at(data, offset)?;
    let key = reader.read_short_str()?;
    let value = reader.read_short_str()?;
    let usage_field = reader.position() as u32;
    let usage_head = reader.read_u32()?;
    let next = reader.read_u32()?;
    Ok(KeyValueEntry {
        offset,
        key,
        value,
        usage_head,
        next,
        usage_field,
    })
}

/// Anything entries can be read from, while building or after sealing.
pub trait KeyValueEntries {
    fn entry(&self, offset: u32) -> Result<KeyValueEntry<'_>>;
}

/// Write side of the entry stream, used during the build pass.
#[derive(Debug)]
pub struct KeyValueStoreWriter {
    stream: StreamWriter,
}

impl Default for KeyValueStoreWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStoreWriter {
    pub fn new() -> Self {
        KeyValueStoreWriter {
            stream: StreamWriter::new(KEY_VALUE_MAGIC),
        }
    }

    /// Appends a fresh entry with empty usage and chain links.
    pub fn append(&mut self, pair: &TagPair) -> Result<u32> {
        let offset = self.stream.position()?;
        self.stream.write_short_str(fit_short_str(&pair.key))?;
        self.stream.write_short_str(fit_short_str(&pair.value))?;
        self.stream.write_u32(0);
        self.stream.write_u32(0);
        Ok(offset)
    }

    pub fn set_next(&mut self, offset: u32, next: u32) -> Result<()> {
        let field = read_entry(self.stream.as_bytes(), offset)?.usage_field + 4;
        self.stream.patch_u32(field, next)
    }

    pub fn set_usage_head(&mut self, offset: u32, head: u32) -> Result<()> {
        let field = read_entry(self.stream.as_bytes(), offset)?.usage_field;
        self.stream.patch_u32(field, head)
    }

    pub fn seal(self) -> KeyValueStore {
        KeyValueStore {
            data: self.stream.into_bytes(),
        }
    }
}

impl KeyValueEntries for KeyValueStoreWriter {
    fn entry(&self, offset: u32) -> Result<KeyValueEntry<'_>> {
        read_entry(self.stream.as_bytes(), offset)
    }
}

/// Sealed, read-only entry stream.
#[derive(Debug, Clone)]
pub struct KeyValueStore {
    data: Vec<u8>,
}

impl KeyValueStore {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        check_magic(&data, KEY_VALUE_MAGIC, "key/value store")?;
        Ok(KeyValueStore { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl KeyValueEntries for KeyValueStore {
    fn entry(&self, offset: u32) -> Result<KeyValueEntry<'_>> {
        read_entry(&self.data, offset)
    }
}
