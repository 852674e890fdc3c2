use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::StoreConfig;
use crate::data::element::{Element, Member, TagPair, Tags};
use crate::data::geo::Coordinate;
use crate::data::osm::{MemberType, OsmId, Relation};
use crate::data::OsmMapData;
use crate::errors::Result;
use crate::etl::parse_osm::read_cached;
use crate::etl::Etl;
use crate::source::region::RegionHeader;
use crate::source::{ElementSource, ElementSourceBuilder};

const ETL_NAME: &str = "build_store";

fn tags(raw: &[(String, String)]) -> Tags {
    raw.iter()
        .map(|(key, value)| TagPair::new(key.as_str(), value.as_str()))
        .collect()
}

/// Insertion state while turning parsed OSM data into store records. Maps
/// OSM ids to the log offsets they were written at.
struct StoreBuild<'a> {
    builder: ElementSourceBuilder,
    coords: HashMap<OsmId, Coordinate>,
    node_tags: HashMap<OsmId, &'a [(String, String)]>,
    nodes: HashMap<OsmId, u32>,
    ways: HashMap<OsmId, u32>,
    relations: HashMap<OsmId, u32>,
}

impl StoreBuild<'_> {
    fn node_offset(&mut self, id: OsmId) -> Result<Option<u32>> {
        if let Some(offset) = self.nodes.get(&id) {
            return Ok(Some(*offset));
        }
        let Some(coord) = self.coords.get(&id).copied() else {
            return Ok(None);
        };
        let node_tags = self.node_tags.get(&id).map(|raw| tags(raw)).unwrap_or_default();
        let offset = self.builder.insert(&Element::node(id, coord, node_tags))?;
        self.nodes.insert(id, offset);
        Ok(Some(offset))
    }

    fn member_offset(&mut self, member_type: MemberType, reference: OsmId) -> Result<Option<u32>> {
        match member_type {
            MemberType::Node => self.node_offset(reference),
            MemberType::Way => Ok(self.ways.get(&reference).copied()),
            MemberType::Relation => Ok(self.relations.get(&reference).copied()),
        }
    }

    fn insert_relation(&mut self, relation: &Relation) -> Result<()> {
        let mut members = Vec::with_capacity(relation.members.len());
        let mut dropped = 0usize;
        for member in &relation.members {
            match self.member_offset(member.member_type, member.reference)? {
                Some(offset) => members.push(Member {
                    role: member.role.clone(),
                    offset,
                }),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            warn!(relation = relation.id, dropped = dropped; "Dropped unresolved relation members");
        }
        let offset = self.builder.insert(&Element::relation(relation.id, members, tags(&relation.tags)))?;
        self.relations.insert(relation.id, offset);
        Ok(())
    }
}

/// Writes parsed OSM data into a sealed element source.
///
/// Tagged nodes go first, then ways, then relations ordered so that every
/// relation follows the relations it contains. Untagged nodes are only
/// written when a relation names them directly; way geometry is inlined.
/// References to elements outside the data are dropped with a warning.
pub fn build_source(data: &OsmMapData, config: &StoreConfig) -> Result<ElementSource> {
    let mut builder = ElementSourceBuilder::new(config)?;
    if let Some(bounds) = data.bounds {
        builder.set_bounds(bounds);
    }

    let mut coords = HashMap::with_capacity(data.nodes.len());
    let mut node_tags = HashMap::new();
    for node in &data.nodes {
        match Coordinate::from_degrees(node.lat, node.lon) {
            Ok(coord) => {
                coords.insert(node.id, coord);
            },
            Err(err) => warn!(node = node.id, err = err.message.as_str(); "Skipping node"),
        }
        if !node.tags.is_empty() {
            node_tags.insert(node.id, node.tags.as_slice());
        }
    }

    let mut build = StoreBuild {
        builder,
        coords,
        node_tags,
        nodes: HashMap::new(),
        ways: HashMap::new(),
        relations: HashMap::new(),
    };

    for node in data.nodes.iter().filter(|node| !node.tags.is_empty()) {
        build.node_offset(node.id)?;
    }

    for way in &data.ways {
        let points: Vec<Coordinate> = way.node_refs.iter()
            .filter_map(|id| build.coords.get(id).copied())
            .collect();
        let missing = way.node_refs.len() - points.len();
        if missing > 0 {
            warn!(way = way.id, missing = missing; "Dropped unresolved node references");
        }
        if points.is_empty() {
            warn!(way = way.id; "Skipping way without resolvable nodes");
            continue;
        }
        let offset = build.builder.insert(&Element::way(way.id, points, tags(&way.tags)))?;
        build.ways.insert(way.id, offset);
    }

    let relation_ids: HashSet<OsmId> = data.relations.iter().map(|relation| relation.id).collect();
    let mut pending: Vec<&Relation> = data.relations.iter().collect();
    while !pending.is_empty() {
        let before = pending.len();
        let mut deferred = Vec::new();
        for relation in pending {
            let waiting = relation.members.iter().any(|member| {
                member.member_type == MemberType::Relation
                    && member.reference != relation.id
                    && relation_ids.contains(&member.reference)
                    && !build.relations.contains_key(&member.reference)
            });
            if waiting {
                deferred.push(relation);
            } else {
                build.insert_relation(relation)?;
            }
        }

        if deferred.len() == before {
            // Cyclic containment: write what is left, members not yet written are dropped.
            warn!(relations = deferred.len(); "Relations reference each other in a cycle");
            for relation in &deferred {
                build.insert_relation(relation)?;
            }
            break;
        }
        pending = deferred;
    }

    info!(
        nodes = build.nodes.len(),
        ways = build.ways.len(),
        relations = build.relations.len();
        "Built element source"
    );
    build.builder.build()
}

/// Builds a region directory from the parse cache in the working directory.
pub struct BuildStoreEtl {
    config: StoreConfig,
    region_dir: PathBuf,
}

impl BuildStoreEtl {
    pub fn new(config: StoreConfig, region_dir: impl Into<PathBuf>) -> Self {
        BuildStoreEtl {
            config,
            region_dir: region_dir.into(),
        }
    }

    pub fn region_dir(&self) -> &Path {
        &self.region_dir
    }
}

impl Etl for BuildStoreEtl {
    type Input = OsmMapData;
    type Output = ElementSource;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, _dir: &Path) -> Result<bool> {
        RegionHeader::exists(&self.region_dir)
    }

    fn clean(&self, _dir: &Path) -> Result<()> {
        if self.region_dir.try_exists()? {
            fs::remove_dir_all(&self.region_dir)?;
        }
        Ok(())
    }

    fn extract(&mut self, dir: &Path) -> Result<Self::Input> {
        read_cached(dir)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        build_source(&input, &self.config)
    }

    fn load(&mut self, _dir: &Path, output: Self::Output) -> Result<()> {
        output.save(&self.region_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::element::{ElementType, Geometry};
    use crate::data::geo::BoundingBox;
    use crate::data::osm::{Node, RelationMember, Way};
    use crate::errors::ErrorKind;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn node(id: OsmId, lat: f64, lon: f64, raw_tags: &[(&str, &str)]) -> Node {
        Node { id, lat, lon, tags: pairs(raw_tags) }
    }

    fn member(member_type: MemberType, reference: OsmId, role: &str) -> RelationMember {
        RelationMember { member_type, reference, role: role.to_string() }
    }

    fn sample() -> OsmMapData {
        OsmMapData {
            bounds: Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
            nodes: vec![
                node(1, 0.1, 0.1, &[]),
                node(2, 0.2, 0.2, &[]),
                node(3, 0.3, 0.3, &[("amenity", "bench")]),
                node(4, 0.9, 0.9, &[]),
            ],
            ways: vec![
                Way { id: 10, node_refs: vec![1, 2, 77], tags: pairs(&[("highway", "path")]) },
                Way { id: 11, node_refs: vec![88], tags: pairs(&[("highway", "path")]) },
            ],
            relations: vec![
                // Listed before the relation it contains.
                Relation {
                    id: 21,
                    members: vec![member(MemberType::Relation, 20, "sub")],
                    tags: pairs(&[("type", "super")]),
                },
                Relation {
                    id: 20,
                    members: vec![
                        member(MemberType::Way, 10, "outer"),
                        member(MemberType::Node, 4, "label"),
                        member(MemberType::Way, 11, "gone"),
                    ],
                    tags: pairs(&[("type", "route")]),
                },
            ],
        }
    }

    fn by_tag(source: &ElementSource, key: &str, value: &str) -> Vec<Element> {
        source.search_by_tag(key, value).collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn writes_only_referenced_untagged_nodes() {
        let source = build_source(&sample(), &StoreConfig::default()).unwrap();
        // Bench, way 10, member node 4 and both relations.
        assert_eq!(source.header().element_count, 5);
        assert_eq!(source.bounds(), BoundingBox::new(0.0, 0.0, 1.0, 1.0));

        let ways = by_tag(&source, "highway", "path");
        assert_eq!(ways.len(), 1);
        match &ways[0].geometry {
            Geometry::Way(coords) => assert_eq!(coords.len(), 2),
            other => panic!("expected way geometry, got {other:?}"),
        }
    }

    #[test]
    fn nested_relations_resolve_after_their_members() {
        let source = build_source(&sample(), &StoreConfig::default()).unwrap();
        let route = by_tag(&source, "type", "route").remove(0);
        let members: Vec<(String, Element)> = source.members(&route)
            .map(|member| member.map(|(role, element)| (role.to_string(), element)))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].0, "outer");
        assert_eq!(members[0].1.id, 10);
        assert_eq!(members[1].0, "label");
        assert_eq!(members[1].1.element_type(), ElementType::Node);

        let outer = by_tag(&source, "type", "super").remove(0);
        let inner: Vec<Element> = source.members(&outer)
            .map(|member| member.map(|(_, element)| element))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(inner[0].id, 20);
    }

    #[test]
    fn relation_cycles_drop_the_back_reference() {
        let mut data = sample();
        data.relations = vec![
            Relation { id: 30, members: vec![member(MemberType::Relation, 31, "")], tags: pairs(&[("cycle", "a")]) },
            Relation { id: 31, members: vec![member(MemberType::Relation, 30, "")], tags: pairs(&[("cycle", "b")]) },
        ];
        let source = build_source(&data, &StoreConfig::default()).unwrap();

        let first = by_tag(&source, "cycle", "a").remove(0);
        let second = by_tag(&source, "cycle", "b").remove(0);
        assert_eq!(source.members(&first).count(), 0);
        assert_eq!(source.members(&second).count(), 1);
    }

    #[test]
    fn etl_builds_region_from_parse_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work");
        let region_dir = tmp.path().join("regions").join("sample");

        let mut parse = crate::etl::parse_osm::ParseOsmEtl::new(tmp.path().join("unused.osm"));
        parse.load(&work, sample()).unwrap();

        let mut etl = BuildStoreEtl::new(StoreConfig::default(), &region_dir);
        assert!(!etl.is_cached(&work).unwrap());
        etl.process(&work).unwrap();
        assert!(etl.is_cached(&work).unwrap());

        let source = ElementSource::open(etl.region_dir()).unwrap();
        assert_eq!(by_tag(&source, "amenity", "bench").len(), 1);
    }

    #[test]
    fn missing_cache_fails_extraction() {
        let tmp = tempfile::tempdir().unwrap();
        let mut etl = BuildStoreEtl::new(StoreConfig::default(), tmp.path().join("region"));
        let err = etl.process(tmp.path()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
