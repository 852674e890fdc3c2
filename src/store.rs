//! The four append-only streams behind an element source: key/value entries,
//! their bucket index, the usage (inverted) index and the element log.

pub mod element_log;
pub mod key_value;
pub mod key_value_index;
pub mod stream;
pub mod usage;

pub use element_log::{ElementLog, ElementLogWriter};
pub use key_value::{KeyValueEntries, KeyValueEntry, KeyValueStore, KeyValueStoreWriter};
pub use key_value_index::KeyValueIndex;
pub use usage::{KeyValueUsage, KeyValueUsageWriter, UsageIter};
