//! Fixed-size hash bucket array over the key/value entry stream.
//!
//! File layout: `i32 capacity, i32 valuePrefixLength, capacity x u32 head`.
//! A head of `0` marks an empty bucket. Collisions are chained through the
//! `next` field of the entries themselves.

use xxhash_rust::xxh64::xxh64;

use crate::data::element::TagPair;
use crate::errors::{Error, Result};

use super::key_value::{KeyValueEntries, KeyValueStoreWriter};
use super::stream::{fit_short_str, StreamReader, MAX_SHORT_STR};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueIndex {
    value_prefix_length: u32,
    buckets: Vec<u32>,
}

/// Bucket hash of a pair. Only the first `prefix_len` bytes of the value are
/// hashed, so equal hashes never prove equal pairs.
pub fn pair_hash(key: &str, value: &str, prefix_len: usize) -> u64 {
    let key = fit_short_str(key).as_bytes();
    let value = fit_short_str(value).as_bytes();
    let prefix = &value[..value.len().min(prefix_len)];

    let mut hash = xxh64(key, 0) ^ xxh64(prefix, 0).rotate_left(31).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
    hash ^ (hash >> 33)
}

impl KeyValueIndex {
    /// `value_prefix_length` is clamped to the longest storable value, past
    /// which the hash cannot change.
    pub fn new(capacity: u32, value_prefix_length: u32) -> Result<Self> {
        if capacity == 0 || capacity > i32::MAX as u32 {
            return Err(Error::format(format!("invalid key/value index capacity {capacity}")));
        }
        Ok(KeyValueIndex {
            value_prefix_length: value_prefix_length.min(MAX_SHORT_STR as u32),
            buckets: vec![0; capacity as usize],
        })
    }

    pub fn capacity(&self) -> u32 {
        self.buckets.len() as u32
    }

    pub fn value_prefix_length(&self) -> u32 {
        self.value_prefix_length
    }

    fn bucket(&self, key: &str, value: &str) -> usize {
        (pair_hash(key, value, self.value_prefix_length as usize) % self.buckets.len() as u64) as usize
    }

    /// Interns a pair, returning the offset of its entry. A pair already in the
    /// chain of its bucket is returned as is; otherwise a new entry is appended
    /// and linked from the chain tail.
    pub fn insert(&mut self, store: &mut KeyValueStoreWriter, pair: &TagPair) -> Result<u32> {
        let bucket = self.bucket(&pair.key, &pair.value);
        let head = self.buckets[bucket];
        if head == 0 {
            let offset = store.append(pair)?;
            self.buckets[bucket] = offset;
            return Ok(offset);
        }

        let mut tail = head;
        loop {
            let entry = store.entry(tail)?;
            if entry.matches(&pair.key, &pair.value) {
                return Ok(tail);
            }
            if entry.next == 0 {
                break;
            }
            tail = next_link(tail, entry.next)?;
        }

        let offset = store.append(pair)?;
        store.set_next(tail, offset)?;
        Ok(offset)
    }

    /// Entry offset of a pair, `None` when the pair was never interned.
    pub fn lookup<S: KeyValueEntries>(&self, store: &S, key: &str, value: &str) -> Result<Option<u32>> {
        let mut current = self.buckets[self.bucket(key, value)];
        while current != 0 {
            let entry = store.entry(current)?;
            if entry.matches(key, value) {
                return Ok(Some(current));
            }
            current = if entry.next == 0 { 0 } else { next_link(current, entry.next)? };
        }
        Ok(None)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 4 * self.buckets.len());
        out.extend_from_slice(&(self.buckets.len() as i32).to_le_bytes());
        out.extend_from_slice(&(self.value_prefix_length as i32).to_le_bytes());
        for head in &self.buckets {
            out.extend_from_slice(&head.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = StreamReader::raw(data);
        let capacity = reader.read_i32()?;
        let value_prefix_length = reader.read_i32()?;
        if capacity <= 0 || value_prefix_length < 0 {
            return Err(Error::format(format!(
                "key/value index header: capacity {capacity}, prefix {value_prefix_length}"
            )));
        }
        let expected = 8 + 4 * capacity as usize;
        if data.len() != expected {
            return Err(Error::format(format!(
                "key/value index is {} bytes, header promises {expected}",
                data.len()
            )));
        }
        let mut buckets = Vec::with_capacity(capacity as usize);
        for _ in 0..capacity {
            buckets.push(reader.read_u32()?);
        }
        Ok(KeyValueIndex {
            value_prefix_length: value_prefix_length as u32,
            buckets,
        })
    }
}

/// Entries are append-only, so a chain only ever points forward.
fn next_link(current: u32, next: u32) -> Result<u32> {
    if next <= current {
        return Err(Error::format(format!("collision chain loops back from {current} to {next}")));
    }
    Ok(next)
}
