//! Append-only log of serialized elements.
//!
//! Record layout, little-endian:
//!
//! ```text
//! header   7 byte signed id, u8 type (0 node, 1 way, 2 relation)
//! node     i32 lat, i32 lon
//! way      u16 count, count x (i32 lat, i32 lon)
//! relation u16 count, count x (u8 roleLen, role, u32 memberOffset)
//! tags     u16 count, count x u32 key/value entry offset
//! ```
//!
//! Records carry no length prefix: an offset is only meaningful if it came
//! from [`ElementLogWriter::insert`] or from one of the indexes.

use crate::data::element::{Element, ElementType, Geometry, Member, TagPair};
use crate::data::geo::Coordinate;
use crate::errors::{Error, Result};

use super::key_value::KeyValueEntries;
use super::stream::{check_magic, fit_short_str, StreamReader, StreamWriter};

pub const ELEMENT_MAGIC: &[u8; 4] = b"OSEL";

pub const HEADER_LEN: usize = 8;
const ID_BITS: u32 = 56;
pub const MAX_ID: i64 = (1 << (ID_BITS - 1)) - 1;
pub const MIN_ID: i64 = -(1 << (ID_BITS - 1));

#[derive(Debug)]
pub struct ElementLogWriter {
    stream: StreamWriter,
}

impl Default for ElementLogWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn count_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::format(format!("{len} {what} exceed a record's u16 count")))
}

impl ElementLogWriter {
    pub fn new() -> Self {
        ElementLogWriter {
            stream: StreamWriter::new(ELEMENT_MAGIC),
        }
    }

    pub fn position(&self) -> Result<u32> {
        self.stream.position()
    }

    /// Appends a record and returns the offset it starts at. `tag_offsets` are
    /// the key/value entries of the element's tags, already interned.
    pub fn insert(&mut self, element: &Element, tag_offsets: &[u32]) -> Result<u32> {
        if !(MIN_ID..=MAX_ID).contains(&element.id) {
            return Err(Error::format(format!("element id {} does not fit in {ID_BITS} bits", element.id)));
        }
        let tag_count = count_u16(tag_offsets.len(), "tags")?;
        let offset = self.stream.position()?;

        // Everything that can fail is checked before the first byte goes out,
        // so a rejected element leaves no partial record behind.
        let geometry_count = match &element.geometry {
            Geometry::Node(_) => None,
            Geometry::Way(coords) => Some(count_u16(coords.len(), "coordinates")?),
            Geometry::Relation(members) => {
                if let Some(member) = members.iter().find(|member| member.offset >= offset) {
                    return Err(Error::offset(member.offset as u64, offset as usize));
                }
                Some(count_u16(members.len(), "members")?)
            }
        };

        let id_bytes = element.id.to_le_bytes();
        self.stream.write_bytes(&id_bytes[..HEADER_LEN - 1]);
        self.stream.write_u8(element.element_type() as u8);
        if let Some(count) = geometry_count {
            self.stream.write_u16(count);
        }

        match &element.geometry {
            Geometry::Node(coord) => {
                self.stream.write_i32(coord.lat);
                self.stream.write_i32(coord.lon);
            }
            Geometry::Way(coords) => {
                for coord in coords {
                    self.stream.write_i32(coord.lat);
                    self.stream.write_i32(coord.lon);
                }
            }
            Geometry::Relation(members) => {
                for member in members {
                    self.stream.write_short_str(fit_short_str(&member.role))?;
                    self.stream.write_u32(member.offset);
                }
            }
        }

        self.stream.write_u16(tag_count);
        for tag_offset in tag_offsets {
            self.stream.write_u32(*tag_offset);
        }
        Ok(offset)
    }

    pub fn seal(self) -> ElementLog {
        ElementLog {
            data: self.stream.into_bytes(),
        }
    }
}

/// Sealed element log. Every read uses its own cursor, so concurrent readers
/// and nested member reads never disturb one another.
#[derive(Debug, Clone)]
pub struct ElementLog {
    data: Vec<u8>,
}

impl ElementLog {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        check_magic(&data, ELEMENT_MAGIC, "element log")?;
        Ok(ElementLog { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reads the record at `offset`, resolving its tags through `key_values`.
    /// Relation members come back as offsets; see [`ElementLog::members`].
    pub fn get<K: KeyValueEntries>(&self, offset: u32, key_values: &K) -> Result<Element> {
        let mut reader = StreamReader::at(&self.data, offset)?;

        let header = reader.read_bytes(HEADER_LEN)?;
        let mut id_bytes = [0u8; 8];
        id_bytes[..HEADER_LEN - 1].copy_from_slice(&header[..HEADER_LEN - 1]);
        let id = (i64::from_le_bytes(id_bytes) << 8) >> 8;
        let element_type = ElementType::from_tag(header[HEADER_LEN - 1])
            .ok_or_else(|| Error::format(format!("unknown element type {} at offset {offset}", header[HEADER_LEN - 1])))?;

        let geometry = match element_type {
            ElementType::Node => Geometry::Node(read_coord(&mut reader)?),
            ElementType::Way => {
                let count = reader.read_u16()?;
                let mut coords = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    coords.push(read_coord(&mut reader)?);
                }
                Geometry::Way(coords)
            }
            ElementType::Relation => {
                let count = reader.read_u16()?;
                let mut members = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let role = reader.read_short_str()?.to_string();
                    let member = reader.read_u32()?;
                    if member >= offset {
                        return Err(Error::format(format!("relation at {offset} references later offset {member}")));
                    }
                    members.push(Member { role, offset: member });
                }
                Geometry::Relation(members)
            }
        };

        let tag_count = reader.read_u16()?;
        let mut tags = Vec::with_capacity(tag_count as usize);
        for _ in 0..tag_count {
            let entry = key_values.entry(reader.read_u32()?)?;
            tags.push(TagPair::new(entry.key, entry.value));
        }

        Ok(Element { id, tags, geometry })
    }

    /// Resolves the members of a relation one by one, each with a fresh read.
    /// Yields nothing for nodes and ways.
    pub fn members<'a, K: KeyValueEntries>(
        &'a self,
        element: &'a Element,
        key_values: &'a K,
    ) -> impl Iterator<Item = Result<(&'a str, Element)>> + 'a {
        let members: &'a [Member] = match &element.geometry {
            Geometry::Relation(members) => members,
            _ => &[],
        };
        members.iter().map(move |member| {
            self.get(member.offset, key_values)
                .map(|resolved| (member.role.as_str(), resolved))
        })
    }
}

fn read_coord(reader: &mut StreamReader<'_>) -> Result<Coordinate> {
    let lat = reader.read_i32()?;
    let lon = reader.read_i32()?;
    Ok(Coordinate::new(lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::store::key_value::KeyValueStoreWriter;
    use crate::store::key_value_index::KeyValueIndex;

    struct Fixture {
        key_values: KeyValueStoreWriter,
        index: KeyValueIndex,
        log: ElementLogWriter,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                key_values: KeyValueStoreWriter::new(),
                index: KeyValueIndex::new(31, 8).unwrap(),
                log: ElementLogWriter::new(),
            }
        }

        fn insert(&mut self, element: &Element) -> u32 {
            let tag_offsets: Vec<u32> = element.tags.iter()
                .map(|tag| self.index.insert(&mut self.key_values, tag).unwrap())
                .collect();
            self.log.insert(element, &tag_offsets).unwrap()
        }
    }

    fn coords(n: i32) -> Vec<Coordinate> {
        (0..n).map(|i| Coordinate::new(515_000_000 + i, -1_000_000 - i)).collect()
    }

    #[test]
    fn way_record_has_exact_size() {
        let mut fixture = Fixture::new();
        let tags = vec![TagPair::new("highway", "residential"), TagPair::new("name", "Baker Street")];
        let way = Element::way(4_000_000_001, coords(3), tags);
        let offset = fixture.insert(&way);
        let end = fixture.log.position().unwrap();
        assert_eq!((end - offset) as usize, 8 + 2 + 3 * 8 + 2 + 2 * 4);

        let log = fixture.log.seal();
        let key_values = fixture.key_values.seal();
        let read = log.get(offset, &key_values).unwrap();
        assert_eq!(read, way);
        match read.geometry {
            Geometry::Way(read_coords) => assert_eq!(read_coords, coords(3)),
            other => panic!("expected a way, got {other:?}"),
        }
    }

    #[test]
    fn negative_ids_survive_the_header() {
        let mut fixture = Fixture::new();
        let node = Element::node(-42, Coordinate::new(-1, 1), Vec::new());
        let offset = fixture.insert(&node);
        let key_values = fixture.key_values.seal();
        assert_eq!(fixture.log.seal().get(offset, &key_values).unwrap(), node);
    }

    #[test]
    fn oversized_id_is_rejected() {
        let mut log = ElementLogWriter::new();
        let node = Element::node(MAX_ID + 1, Coordinate::default(), Vec::new());
        assert_eq!(log.insert(&node, &[]).unwrap_err().kind, ErrorKind::Format);
    }

    #[test]
    fn relation_members_resolve_independently() {
        let mut fixture = Fixture::new();
        let outer = Element::way(1, coords(4), vec![TagPair::new("natural", "water")]);
        let outer_offset = fixture.insert(&outer);
        let node = Element::node(2, Coordinate::new(5, 5), Vec::new());
        let node_offset = fixture.insert(&node);
        let relation = Element::relation(
            3,
            vec![
                Member { role: "outer".into(), offset: outer_offset },
                Member { role: "label".into(), offset: node_offset },
            ],
            vec![TagPair::new("type", "multipolygon")],
        );
        let relation_offset = fixture.insert(&relation);

        let log = fixture.log.seal();
        let key_values = fixture.key_values.seal();
        let read = log.get(relation_offset, &key_values).unwrap();
        assert_eq!(read, relation);

        let members: Vec<(&str, Element)> = log.members(&read, &key_values).map(|m| m.unwrap()).collect();
        assert_eq!(members, vec![("outer", outer), ("label", node)]);
    }

    #[test]
    fn forward_member_reference_is_rejected() {
        let mut log = ElementLogWriter::new();
        let relation = Element::relation(1, vec![Member { role: String::new(), offset: 400 }], Vec::new());
        assert_eq!(log.insert(&relation, &[]).unwrap_err().kind, ErrorKind::Offset);
    }

    #[test]
    fn rejected_insert_leaves_log_untouched() {
        let mut fixture = Fixture::new();
        let node = Element::node(1, Coordinate::new(3, 4), Vec::new());
        let node_offset = fixture.insert(&node);
        let end = fixture.log.position().unwrap();

        let forward = Element::relation(2, vec![
            Member { role: "a".into(), offset: node_offset },
            Member { role: "b".into(), offset: end + 100 },
        ], Vec::new());
        assert_eq!(fixture.log.insert(&forward, &[]).unwrap_err().kind, ErrorKind::Offset);
        let too_long = Element::way(3, coords(70_000), Vec::new());
        assert_eq!(fixture.log.insert(&too_long, &[]).unwrap_err().kind, ErrorKind::Format);
        let too_many_tags = vec![0u32; 70_000];
        assert_eq!(fixture.log.insert(&node, &too_many_tags).unwrap_err().kind, ErrorKind::Format);
        assert_eq!(fixture.log.position().unwrap(), end);

        // The next record starts where the rejected ones would have.
        let next = fixture.insert(&Element::node(4, Coordinate::new(0, 0), Vec::new()));
        assert_eq!(next, end);
        let key_values = fixture.key_values.seal();
        assert_eq!(fixture.log.seal().get(node_offset, &key_values).unwrap(), node);
    }

    #[test]
    fn offset_outside_log_is_offset_error() {
        let log = ElementLogWriter::new().seal();
        let key_values = KeyValueStoreWriter::new().seal();
        assert_eq!(log.get(1_000, &key_values).unwrap_err().kind, ErrorKind::Offset);
    }
}
