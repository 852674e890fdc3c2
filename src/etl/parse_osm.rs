use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::mem;
use std::path::{Path, PathBuf};

use log::{info, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::data::geo::BoundingBox;
use crate::data::osm::{MemberType, Node, OsmId, Relation, RelationMember, Way};
use crate::data::OsmMapData;
use crate::errors::{Error, Result};
use crate::etl::Etl;

const ETL_NAME: &str = "parse_osm";
pub const OUTPUT_FILE_NAME: &str = "osm_elements.rkyv";

/// Element currently open in the document.
enum Current {
    Top,
    // None while inside a node that is missing its id or position.
    Node(Option<Node>),
    Way(Way),
    Relation(Relation),
}

struct OsmParser {
    data: OsmMapData,
    current: Current,
}

fn attribute(el: &BytesStart, name: &str) -> Result<Option<String>> {
    match el.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn required_id(el: &BytesStart) -> Result<OsmId> {
    let element = String::from_utf8_lossy(el.name().as_ref()).into_owned();
    match attribute(el, "id")? {
        Some(id) => Ok(id.parse()?),
        None => Err(format!("<{element}> without id").into()),
    }
}

fn parse_node(el: &BytesStart) -> Result<Option<Node>> {
    let id = attribute(el, "id")?;
    let lat = attribute(el, "lat")?;
    let lon = attribute(el, "lon")?;
    match (id, lat, lon) {
        (Some(id), Some(lat), Some(lon)) => Ok(Some(Node {
            id: id.parse()?,
            lat: lat.parse()?,
            lon: lon.parse()?,
            tags: Vec::new(),
        })),
        (id, _, _) => {
            warn!(id = id.as_deref().unwrap_or("?"); "Skipping node without id or position");
            Ok(None)
        },
    }
}

fn parse_bounds(el: &BytesStart) -> Result<Option<BoundingBox>> {
    let mut values = [0.0; 4];
    for (value, name) in values.iter_mut().zip(["minlat", "minlon", "maxlat", "maxlon"]) {
        match attribute(el, name)? {
            Some(raw) => *value = raw.parse()?,
            None => {
                warn!(attribute = name; "Ignoring incomplete bounds");
                return Ok(None);
            },
        }
    }
    Ok(Some(BoundingBox::new(values[0], values[1], values[2], values[3])))
}

fn parse_member(el: &BytesStart) -> Result<Option<RelationMember>> {
    let member_type = match attribute(el, "type")?.as_deref() {
        Some("node") => MemberType::Node,
        Some("way") => MemberType::Way,
        Some("relation") => MemberType::Relation,
        other => {
            warn!(member_type = other.unwrap_or("?"); "Skipping member of unknown type");
            return Ok(None);
        },
    };
    let reference = match attribute(el, "ref")? {
        Some(reference) => reference.parse()?,
        None => {
            warn!("Skipping member without ref");
            return Ok(None);
        },
    };
    Ok(Some(RelationMember {
        member_type,
        reference,
        role: attribute(el, "role")?.unwrap_or_default(),
    }))
}

impl OsmParser {
    fn new() -> Self {
        OsmParser {
            data: OsmMapData::default(),
            current: Current::Top,
        }
    }

    fn start(&mut self, el: &BytesStart) -> Result<()> {
        match el.name().as_ref() {
            b"node" => self.current = Current::Node(parse_node(el)?),
            b"way" => self.current = Current::Way(Way {
                id: required_id(el)?,
                node_refs: Vec::new(),
                tags: Vec::new(),
            }),
            b"relation" => self.current = Current::Relation(Relation {
                id: required_id(el)?,
                members: Vec::new(),
                tags: Vec::new(),
            }),
            b"tag" => self.tag(el)?,
            b"nd" => {
                if let Current::Way(way) = &mut self.current {
                    match attribute(el, "ref")? {
                        Some(reference) => way.node_refs.push(reference.parse()?),
                        None => warn!(way = way.id; "Skipping node reference without ref"),
                    }
                }
            },
            b"member" => {
                if let Current::Relation(relation) = &mut self.current {
                    if let Some(member) = parse_member(el)? {
                        relation.members.push(member);
                    }
                }
            },
            b"bounds" => {
                if let Some(bounds) = parse_bounds(el)? {
                    self.data.bounds = Some(bounds);
                }
            },
            _ => (),
        }
        Ok(())
    }

    fn tag(&mut self, el: &BytesStart) -> Result<()> {
        let (key, value) = match (attribute(el, "k")?, attribute(el, "v")?) {
            (Some(key), Some(value)) => (key, value),
            _ => {
                warn!("Skipping tag without key or value");
                return Ok(());
            },
        };
        match &mut self.current {
            Current::Node(Some(node)) => node.tags.push((key, value)),
            Current::Way(way) => way.tags.push((key, value)),
            Current::Relation(relation) => relation.tags.push((key, value)),
            Current::Node(None) | Current::Top => (),
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8]) {
        if !matches!(name, b"node" | b"way" | b"relation") {
            return;
        }
        match mem::replace(&mut self.current, Current::Top) {
            Current::Node(Some(node)) => self.data.nodes.push(node),
            Current::Way(way) => self.data.ways.push(way),
            Current::Relation(relation) => self.data.relations.push(relation),
            Current::Node(None) | Current::Top => (),
        }
    }
}

/// Reads every node, way and relation of an OSM XML document, in document order.
pub fn parse_osm<R: BufRead>(reader: &mut Reader<R>) -> Result<OsmMapData> {
    let mut parser = OsmParser::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(el) => parser.start(&el)?,
            Event::Empty(el) => {
                parser.start(&el)?;
                parser.end(el.name().as_ref());
            },
            Event::End(el) => parser.end(el.name().as_ref()),
            // Declarations, comments and the notes some servers add.
            _ => (),
        }
        buf.clear();
    }
    Ok(parser.data)
}

/// Parses an in-memory OSM XML document, such as a remote fetch response.
pub fn parse_osm_bytes(raw: &[u8]) -> Result<OsmMapData> {
    let mut reader = Reader::from_reader(raw);
    reader.trim_text(true);
    parse_osm(&mut reader)
}

/// Reads back the parse cache written by [`ParseOsmEtl`].
pub fn read_cached(dir: &Path) -> Result<OsmMapData> {
    let raw = fs::read(dir.join(OUTPUT_FILE_NAME))?;
    let mut bytes = rkyv::AlignedVec::with_capacity(raw.len());
    bytes.extend_from_slice(&raw);
    // SAFETY: the cache is only ever written by `ParseOsmEtl::load` from an
    // `OsmMapData` of this same build.
    unsafe { rkyv::from_bytes_unchecked::<OsmMapData>(&bytes) }
        .map_err(|err| Error::format(format!("Could not deserialize OSM cache: {err:?}")))
}

/// Parses the configured .osm (or .osm.xz) file into an rkyv cache.
pub struct ParseOsmEtl {
    data_path: PathBuf,
}

impl ParseOsmEtl {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        ParseOsmEtl {
            data_path: data_path.into(),
        }
    }

    fn create_osm_reader(&self) -> Result<Reader<Box<dyn BufRead>>> {
        let file = fs::File::open(&self.data_path)?;
        let file_reader = BufReader::new(file);
        let compressed = self.data_path.extension().is_some_and(|ext| ext == "xz");
        let input: Box<dyn BufRead> = if compressed {
            Box::new(BufReader::new(XzDecoder::new(file_reader)))
        } else {
            Box::new(file_reader)
        };
        let mut reader = Reader::from_reader(input);
        reader.trim_text(true);

        Ok(reader)
    }
}

impl Etl for ParseOsmEtl {
    type Input = Reader<Box<dyn BufRead>>;
    type Output = OsmMapData;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(dir.join(OUTPUT_FILE_NAME).try_exists()?)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        let path = dir.join(OUTPUT_FILE_NAME);
        if path.try_exists()? {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        self.create_osm_reader()
    }

    fn transform(&mut self, mut input: Self::Input) -> Result<Self::Output> {
        let data = parse_osm(&mut input)?;
        info!(nodes = data.nodes.len(), ways = data.ways.len(), relations = data.relations.len(); "Parsed OSM data");
        Ok(data)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        let bytes = rkyv::to_bytes::<_, 256>(&output)
            .map_err(|err| Error::format(format!("Could not serialize OSM cache: {err:?}")))?;
        fs::create_dir_all(dir)?;
        let mut output_file = fs::File::create(dir.join(OUTPUT_FILE_NAME))?;
        output_file.write_all(&bytes)?;
        output_file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="Overpass API">
  <note>The data included in this document is from www.openstreetmap.org.</note>
  <bounds minlat="51.50" minlon="-0.13" maxlat="51.52" maxlon="-0.11"/>
  <node id="1" lat="51.501" lon="-0.125"/>
  <node id="2" lat="51.502" lon="-0.124" version="3">
    <tag k="amenity" v="cafe"/>
    <tag k="name" v="Tom &amp; Jerry's"/>
  </node>
  <node id="3" lat="51.503">
    <tag k="amenity" v="bench"/>
  </node>
  <way id="10">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="highway" v="footway"/>
  </way>
  <relation id="20">
    <member type="way" ref="10" role="outer"/>
    <member type="node" ref="2" role=""/>
    <member type="area" ref="99" role="x"/>
    <tag k="type" v="multipolygon"/>
  </relation>
</osm>"#;

    #[test]
    fn parses_elements_in_document_order() {
        let data = parse_osm_bytes(SAMPLE.as_bytes()).unwrap();

        assert_eq!(data.bounds, Some(BoundingBox::new(51.50, -0.13, 51.52, -0.11)));
        assert_eq!(data.nodes.len(), 2);
        assert_eq!(data.nodes[0], Node { id: 1, lat: 51.501, lon: -0.125, tags: vec![] });
        assert_eq!(data.nodes[1].tags, vec![
            ("amenity".to_string(), "cafe".to_string()),
            ("name".to_string(), "Tom & Jerry's".to_string()),
        ]);

        assert_eq!(data.ways, vec![Way {
            id: 10,
            node_refs: vec![1, 2],
            tags: vec![("highway".to_string(), "footway".to_string())],
        }]);

        let relation = &data.relations[0];
        assert_eq!(relation.id, 20);
        assert_eq!(relation.members.len(), 2);
        assert_eq!(relation.members[0], RelationMember {
            member_type: MemberType::Way,
            reference: 10,
            role: "outer".to_string(),
        });
        assert_eq!(relation.members[1].role, "");
    }

    #[test]
    fn malformed_numbers_are_parse_errors() {
        let err = parse_osm_bytes(br#"<osm><node id="x" lat="1" lon="2"/></osm>"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);

        let err = parse_osm_bytes(br#"<osm><way><nd ref="1"/></way></osm>"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }

    #[test]
    fn process_writes_a_readable_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let osm_path = tmp.path().join("sample.osm");
        fs::write(&osm_path, SAMPLE).unwrap();
        let out = tmp.path().join("out");

        let mut etl = ParseOsmEtl::new(&osm_path);
        assert!(!etl.is_cached(&out).unwrap());
        etl.process(&out).unwrap();
        assert!(etl.is_cached(&out).unwrap());

        let cached = read_cached(&out).unwrap();
        assert_eq!(cached, parse_osm_bytes(SAMPLE.as_bytes()).unwrap());
    }

    #[test]
    fn reads_xz_compressed_input() {
        let tmp = tempfile::tempdir().unwrap();
        let osm_path = tmp.path().join("sample.osm.xz");
        let mut encoder = xz::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        fs::write(&osm_path, encoder.finish().unwrap()).unwrap();

        let mut etl = ParseOsmEtl::new(&osm_path);
        let reader = etl.extract(tmp.path()).unwrap();
        let data = etl.transform(reader).unwrap();
        assert_eq!(data.element_count(), 4);
    }
}
