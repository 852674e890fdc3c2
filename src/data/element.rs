use super::geo::{Coordinate, Envelope};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagPair {
    pub key: String,
    pub value: String,
}

impl TagPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        TagPair {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Tags of one element. Order is not significant.
pub type Tags = Vec<TagPair>;

/// A relation member: a role and the element log offset of the member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub role: String,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Geometry {
    Node(Coordinate),
    Way(Vec<Coordinate>),
    Relation(Vec<Member>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElementType {
    Node = 0,
    Way = 1,
    Relation = 2,
}

impl ElementType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ElementType::Node),
            1 => Some(ElementType::Way),
            2 => Some(ElementType::Relation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub id: i64,
    pub tags: Tags,
    pub geometry: Geometry,
}

impl Element {
    pub fn node(id: i64, coord: Coordinate, tags: Tags) -> Self {
        Element { id, tags, geometry: Geometry::Node(coord) }
    }

    pub fn way(id: i64, coords: Vec<Coordinate>, tags: Tags) -> Self {
        Element { id, tags, geometry: Geometry::Way(coords) }
    }

    pub fn relation(id: i64, members: Vec<Member>, tags: Tags) -> Self {
        Element { id, tags, geometry: Geometry::Relation(members) }
    }

    pub fn element_type(&self) -> ElementType {
        match self.geometry {
            Geometry::Node(_) => ElementType::Node,
            Geometry::Way(_) => ElementType::Way,
            Geometry::Relation(_) => ElementType::Relation,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }

    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tags.iter().any(|tag| tag.key == key && tag.value == value)
    }

    /// Envelope of a node or way. Relations have none of their own; the store
    /// derives theirs from their members.
    pub fn envelope(&self) -> Option<Envelope> {
        match &self.geometry {
            Geometry::Node(coord) => Some(Envelope::point(*coord)),
            Geometry::Way(coords) => Envelope::from_coords(coords),
            Geometry::Relation(_) => None,
        }
    }

    /// A way whose first and last coordinates coincide describes a polygon.
    pub fn is_closed(&self) -> bool {
        match &self.geometry {
            Geometry::Way(coords) => coords.len() > 2 && coords.first() == coords.last(),
            _ => false,
        }
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        if self.id != other.id || self.geometry != other.geometry || self.tags.len() != other.tags.len() {
            return false;
        }
        let mut ours: Vec<&TagPair> = self.tags.iter().collect();
        let mut theirs: Vec<&TagPair> = other.tags.iter().collect();
        ours.sort();
        theirs.sort();
        ours == theirs
    }
}

impl Eq for Element {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_order_does_not_affect_equality() {
        let coord = Coordinate::new(1, 2);
        let a = Element::node(7, coord, vec![TagPair::new("amenity", "bar"), TagPair::new("name", "Fox")]);
        let b = Element::node(7, coord, vec![TagPair::new("name", "Fox"), TagPair::new("amenity", "bar")]);
        assert_eq!(a, b);
        assert_eq!(a.tag("name"), Some("Fox"));
    }

    #[test]
    fn closed_way_is_polygon() {
        let square = vec![
            Coordinate::new(0, 0),
            Coordinate::new(0, 1),
            Coordinate::new(1, 1),
            Coordinate::new(0, 0),
        ];
        assert!(Element::way(1, square, Vec::new()).is_closed());
        assert!(!Element::way(2, vec![Coordinate::new(0, 0), Coordinate::new(0, 0)], Vec::new()).is_closed());
    }
}
