//! Inverted index from key/value entries to the elements carrying them.
//!
//! Usage node layout: `u32 elementOffset, u32 next`. Each key/value entry owns
//! one singly linked chain, in insertion order, ending at `next == 0`.

use std::collections::HashMap;

use crate::errors::{Error, Result};

use super::key_value::{KeyValueEntries, KeyValueStoreWriter};
use super::stream::{check_magic, StreamReader, StreamWriter};

pub const USAGE_MAGIC: &[u8; 4] = b"OSUI";

#[derive(Debug)]
pub struct KeyValueUsageWriter {
    stream: StreamWriter,
    // Last node of each chain, keyed by entry offset. Saves walking the chain
    // from its head on every append; the bytes written are the same.
    tails: HashMap<u32, u32>,
}

impl Default for KeyValueUsageWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueUsageWriter {
    pub fn new() -> Self {
        KeyValueUsageWriter {
            stream: StreamWriter::new(USAGE_MAGIC),
            tails: HashMap::new(),
        }
    }

    /// Records that the element at `element_offset` carries the pair stored at
    /// `entry_offset`. Returns the offset of the new usage node.
    pub fn append(&mut self, key_values: &mut KeyValueStoreWriter, entry_offset: u32, element_offset: u32) -> Result<u32> {
        let node = self.stream.position()?;
        self.stream.write_u32(element_offset);
        self.stream.write_u32(0);

        let head = key_values.entry(entry_offset)?.usage_head;
        if head == 0 {
            key_values.set_usage_head(entry_offset, node)?;
        } else {
            let tail = match self.tails.get(&entry_offset) {
                Some(tail) => *tail,
                None => self.walk_to_tail(head)?,
            };
            self.stream.patch_u32(tail + 4, node)?;
        }
        self.tails.insert(entry_offset, node);
        Ok(node)
    }

    fn walk_to_tail(&self, head: u32) -> Result<u32> {
        let mut current = head;
        loop {
            let mut reader = self.stream.reader_at(current)?;
            reader.read_u32()?;
            match reader.read_u32()? {
                0 => return Ok(current),
                next => current = forward_link(current, next)?,
            }
        }
    }

    pub fn seal(self) -> KeyValueUsage {
        KeyValueUsage {
            data: self.stream.into_bytes(),
        }
    }
}

/// Sealed usage stream.
#[derive(Debug, Clone)]
pub struct KeyValueUsage {
    data: Vec<u8>,
}

impl KeyValueUsage {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        check_magic(&data, USAGE_MAGIC, "usage index")?;
        Ok(KeyValueUsage { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Lazily walks a chain from its head. A head of `0` is an empty chain.
    pub fn enumerate(&self, head: u32) -> UsageIter<'_> {
        UsageIter {
            data: &self.data,
            next: head,
            error: None,
        }
    }
}

/// Element offsets of one usage chain. Yields at most one error, then stops.
#[derive(Debug)]
pub struct UsageIter<'a> {
    data: &'a [u8],
    next: u32,
    error: Option<Error>,
}

impl<'a> UsageIter<'a> {
    pub fn empty() -> Self {
        UsageIter { data: &[], next: 0, error: None }
    }

    pub fn failed(error: Error) -> Self {
        UsageIter { data: &[], next: 0, error: Some(error) }
    }

    fn step(&mut self) -> Result<u32> {
        let current = self.next;
        let mut reader = StreamReader::at(self.data, current)?;
        let element = reader.read_u32()?;
        self.next = match reader.read_u32()? {
            0 => 0,
            next => forward_link(current, next)?,
        };
        Ok(element)
    }
}

impl Iterator for UsageIter<'_> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(error) = self.error.take() {
            return Some(Err(error));
        }
        if self.next == 0 {
            return None;
        }
        match self.step() {
            Ok(element) => Some(Ok(element)),
            Err(err) => {
                self.next = 0;
                Some(Err(err))
            }
        }
    }
}

fn forward_link(current: u32, next: u32) -> Result<u32> {
    if next <= current {
        return Err(Error::format(format!("usage chain loops back from {current} to {next}")));
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::element::TagPair;
    use crate::errors::ErrorKind;
    use crate::store::key_value::KeyValueEntries;

    #[test]
    fn chain_keeps_insertion_order() {
        let mut key_values = KeyValueStoreWriter::new();
        let bar = key_values.append(&TagPair::new("amenity", "bar")).unwrap();
        let pub_ = key_values.append(&TagPair::new("amenity", "pub")).unwrap();

        let mut usage = KeyValueUsageWriter::new();
        usage.append(&mut key_values, bar, 10).unwrap();
        usage.append(&mut key_values, pub_, 15).unwrap();
        usage.append(&mut key_values, bar, 220).unwrap();
        usage.append(&mut key_values, bar, 550).unwrap();

        let key_values = key_values.seal();
        let usage = usage.seal();
        let head = key_values.entry(bar).unwrap().usage_head;
        let offsets: Vec<u32> = usage.enumerate(head).map(|o| o.unwrap()).collect();
        assert_eq!(offsets, vec![10, 220, 550]);

        // Restartable from the stored head.
        assert_eq!(usage.enumerate(head).count(), 3);
        let head = key_values.entry(pub_).unwrap().usage_head;
        assert_eq!(usage.enumerate(head).map(|o| o.unwrap()).collect::<Vec<_>>(), vec![15]);
    }

    #[test]
    fn tail_walk_matches_cached_tail() {
        let mut key_values = KeyValueStoreWriter::new();
        let entry = key_values.append(&TagPair::new("building", "yes")).unwrap();
        let mut usage = KeyValueUsageWriter::new();
        usage.append(&mut key_values, entry, 1).unwrap();
        usage.append(&mut key_values, entry, 2).unwrap();
        let head = key_values.entry(entry).unwrap().usage_head;
        let tail = *usage.tails.get(&entry).unwrap();
        assert_eq!(usage.walk_to_tail(head).unwrap(), tail);
    }

    #[test]
    fn empty_head_yields_nothing() {
        let usage = KeyValueUsageWriter::new().seal();
        assert_eq!(usage.enumerate(0).count(), 0);
    }

    #[test]
    fn corrupt_link_stops_with_error() {
        let mut data = USAGE_MAGIC.to_vec();
        data.extend_from_slice(&7u32.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        let usage = KeyValueUsage::from_bytes(data).unwrap();
        let items: Vec<_> = usage.enumerate(4).collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap_err().kind, ErrorKind::Format);
    }
}
