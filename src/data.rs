use self::geo::BoundingBox;
use self::osm::{Node, Relation, Way};

pub mod element;
pub mod geo;
pub mod osm;

/// Map data as defined in the .osm file, in document order. Elements the parser
/// does not understand are discarded, everything else is kept without processing.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, PartialEq)]
pub struct OsmMapData {
    pub bounds: Option<BoundingBox>,
    pub nodes: Vec<Node>,
    pub ways: Vec<Way>,
    pub relations: Vec<Relation>,
}

impl OsmMapData {
    pub fn element_count(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }
}
