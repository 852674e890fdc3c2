use std::collections::HashMap;

use log::debug;

use crate::config::StoreConfig;
use crate::data::element::{Element, Geometry};
use crate::data::geo::{BoundingBox, Envelope};
use crate::errors::{Error, Result};
use crate::spatial::SpatialIndex;
use crate::store::{ElementLogWriter, KeyValueIndex, KeyValueStoreWriter, KeyValueUsageWriter};

use super::element_source::ElementSource;
use super::region::RegionHeader;

/// Single-writer build pass over all four streams. Elements are appended in
/// call order; relations may only reference elements inserted before them.
#[derive(Debug)]
pub struct ElementSourceBuilder {
    key_values: KeyValueStoreWriter,
    key_value_index: KeyValueIndex,
    usage: KeyValueUsageWriter,
    elements: ElementLogWriter,
    // Every inserted offset, with its envelope if it has one.
    envelopes: HashMap<u32, Option<Envelope>>,
    spatial_items: Vec<(Envelope, u32)>,
    fanout: usize,
    bounds: Option<BoundingBox>,
}

impl ElementSourceBuilder {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(ElementSourceBuilder {
            key_values: KeyValueStoreWriter::new(),
            key_value_index: KeyValueIndex::new(config.key_value_capacity, config.value_prefix_length)?,
            usage: KeyValueUsageWriter::new(),
            elements: ElementLogWriter::new(),
            envelopes: HashMap::new(),
            spatial_items: Vec::new(),
            fanout: config.spatial_fanout,
            bounds: None,
        })
    }

    /// Region bounds to record in the header. Defaults to the envelope of
    /// everything inserted.
    pub fn set_bounds(&mut self, bounds: BoundingBox) {
        self.bounds = Some(bounds);
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn envelope(&self, offset: u32) -> Option<Envelope> {
        self.envelopes.get(&offset).copied().flatten()
    }

    /// Interns the element's tags, appends its record and links it into the
    /// usage chain of every tag. Returns the record offset.
    pub fn insert(&mut self, element: &Element) -> Result<u32> {
        let mut tag_offsets: Vec<u32> = Vec::with_capacity(element.tags.len());
        for tag in &element.tags {
            let tag_offset = self.key_value_index.insert(&mut self.key_values, tag)?;
            if !tag_offsets.contains(&tag_offset) {
                tag_offsets.push(tag_offset);
            }
        }

        let envelope = match &element.geometry {
            Geometry::Relation(members) => {
                let mut envelope: Option<Envelope> = None;
                for member in members {
                    let member_envelope = self.envelopes.get(&member.offset).ok_or_else(|| {
                        Error::offset(member.offset as u64, self.elements.position().unwrap_or(0) as usize)
                    })?;
                    if let Some(member_envelope) = member_envelope {
                        envelope = Some(match envelope {
                            Some(current) => current.union(member_envelope),
                            None => *member_envelope,
                        });
                    }
                }
                envelope
            }
            _ => element.envelope(),
        };

        let offset = self.elements.insert(element, &tag_offsets)?;
        for tag_offset in &tag_offsets {
            self.usage.append(&mut self.key_values, *tag_offset, offset)?;
        }
        self.envelopes.insert(offset, envelope);
        if let Some(envelope) = envelope {
            self.spatial_items.push((envelope, offset));
        }
        Ok(offset)
    }

    /// Seals every stream and packs the spatial index.
    pub fn build(self) -> Result<ElementSource> {
        let element_count = self.envelopes.len() as u64;
        let spatial = SpatialIndex::build(self.spatial_items, self.fanout)?;
        let bounds = match (self.bounds, spatial.envelope()) {
            (Some(bounds), _) => bounds,
            (None, Some(envelope)) => BoundingBox::from_envelope(&envelope),
            (None, None) => BoundingBox::new(0.0, 0.0, 0.0, 0.0),
        };
        debug!(elements = element_count; "Sealed element source");

        Ok(ElementSource::from_parts(
            RegionHeader::new(bounds, element_count),
            spatial,
            self.key_values.seal(),
            self.key_value_index,
            self.usage.seal(),
            self.elements.seal(),
        ))
    }
}
