use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::data::element::Element;
use crate::data::geo::{BoundingBox, Envelope};
use crate::errors::Result;
use crate::spatial::{Search, SpatialIndex};
use crate::store::{ElementLog, KeyValueEntries, KeyValueIndex, KeyValueStore, KeyValueUsage, UsageIter};

use super::region::{
    read_stream, write_stream, RegionHeader, ELEMENTS_FILE_NAME, KEY_VALUE_FILE_NAME,
    KEY_VALUE_INDEX_FILE_NAME, SPATIAL_FILE_NAME, USAGE_FILE_NAME,
};

/// One sealed, queryable region: spatial index, key/value store and index,
/// usage index and element log. Read-only; safe to share between threads.
#[derive(Debug, Clone)]
pub struct ElementSource {
    header: RegionHeader,
    spatial: SpatialIndex,
    key_values: KeyValueStore,
    key_value_index: KeyValueIndex,
    usage: KeyValueUsage,
    elements: ElementLog,
}

impl ElementSource {
    pub(crate) fn from_parts(
        header: RegionHeader,
        spatial: SpatialIndex,
        key_values: KeyValueStore,
        key_value_index: KeyValueIndex,
        usage: KeyValueUsage,
        elements: ElementLog,
    ) -> Self {
        ElementSource {
            header,
            spatial,
            key_values,
            key_value_index,
            usage,
            elements,
        }
    }

    pub fn header(&self) -> &RegionHeader {
        &self.header
    }

    pub fn bounds(&self) -> BoundingBox {
        self.header.bbox
    }

    pub fn spatial_index(&self) -> &SpatialIndex {
        &self.spatial
    }

    pub fn element(&self, offset: u32) -> Result<Element> {
        self.elements.get(offset, &self.key_values)
    }

    /// Offsets of every element whose envelope intersects `query`.
    pub fn search(&self, query: &Envelope) -> Search<'_> {
        self.spatial.search(query)
    }

    /// Elements whose envelope intersects `query`, resolved lazily.
    pub fn get(&self, query: &Envelope) -> impl Iterator<Item = Result<Element>> + '_ {
        self.search(query).map(move |offset| self.element(offset))
    }

    pub fn get_bbox(&self, bbox: &BoundingBox) -> Result<impl Iterator<Item = Result<Element>> + '_> {
        let query = bbox.to_envelope()?;
        Ok(self.get(&query))
    }

    /// Offsets of the elements tagged `key=value`, in insertion order. An
    /// unknown pair is an empty chain, not an error.
    pub fn tag_offsets(&self, key: &str, value: &str) -> UsageIter<'_> {
        let head = self.key_value_index.lookup(&self.key_values, key, value)
            .and_then(|entry| {
                entry.map(|entry| self.key_values.entry(entry).map(|entry| entry.usage_head))
                    .transpose()
            });
        match head {
            Ok(Some(head)) => self.usage.enumerate(head),
            Ok(None) => UsageIter::empty(),
            Err(err) => UsageIter::failed(err),
        }
    }

    /// Elements tagged `key=value`, resolved lazily.
    pub fn search_by_tag(&self, key: &str, value: &str) -> impl Iterator<Item = Result<Element>> + '_ {
        self.tag_offsets(key, value)
            .map(move |offset| offset.and_then(|offset| self.element(offset)))
    }

    /// Members of a relation with their roles, each read on demand.
    pub fn members<'a>(&'a self, relation: &'a Element) -> impl Iterator<Item = Result<(&'a str, Element)>> + 'a {
        self.elements.members(relation, &self.key_values)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        write_stream(dir, SPATIAL_FILE_NAME, &self.spatial.to_bytes())?;
        write_stream(dir, KEY_VALUE_FILE_NAME, self.key_values.as_bytes())?;
        write_stream(dir, KEY_VALUE_INDEX_FILE_NAME, &self.key_value_index.to_bytes())?;
        write_stream(dir, USAGE_FILE_NAME, self.usage.as_bytes())?;
        write_stream(dir, ELEMENTS_FILE_NAME, self.elements.as_bytes())?;
        // Written last: a directory only counts as a region once this exists.
        self.header.save(dir)?;
        let dir_name = dir.display().to_string();
        info!(region = dir_name.as_str(), elements = self.header.element_count; "Saved region");
        Ok(())
    }

    pub fn open(dir: &Path) -> Result<ElementSource> {
        let header = RegionHeader::load(dir)?;
        let source = ElementSource {
            spatial: SpatialIndex::from_bytes(&read_stream(dir, SPATIAL_FILE_NAME)?)?,
            key_values: KeyValueStore::from_bytes(read_stream(dir, KEY_VALUE_FILE_NAME)?)?,
            key_value_index: KeyValueIndex::from_bytes(&read_stream(dir, KEY_VALUE_INDEX_FILE_NAME)?)?,
            usage: KeyValueUsage::from_bytes(read_stream(dir, USAGE_FILE_NAME)?)?,
            elements: ElementLog::from_bytes(read_stream(dir, ELEMENTS_FILE_NAME)?)?,
            header,
        };
        let dir_name = dir.display().to_string();
        debug!(region = dir_name.as_str(), elements = source.header.element_count; "Opened region");
        Ok(source)
    }
}
