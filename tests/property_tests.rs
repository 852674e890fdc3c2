use proptest::prelude::*;
use osm_store::errors::Result;
use osm_store::source::{ElementSource, ElementSourceBuilder};
use osm_store::spatial::SpatialIndex;
use osm_store::{Coordinate, Element, Envelope, StoreConfig, TagPair};

fn arb_coord() -> impl Strategy<Value = Coordinate> {
    (-900_000_000i32..=900_000_000, -1_800_000_000i32..=1_800_000_000)
        .prop_map(|(lat, lon)| Coordinate::new(lat, lon))
}

fn arb_tags() -> impl Strategy<Value = Vec<TagPair>> {
    prop::collection::btree_map("[a-c]{1,2}", "[x-z]{1,3}", 0..=3)
        .prop_map(|tags| tags.into_iter().map(|(key, value)| TagPair::new(key, value)).collect())
}

fn arb_element() -> impl Strategy<Value = (Vec<Coordinate>, Vec<TagPair>)> {
    (prop::collection::vec(arb_coord(), 1..=4), arb_tags())
}

fn arb_envelope() -> impl Strategy<Value = Envelope> {
    (arb_coord(), arb_coord()).prop_map(|(a, b)| Envelope::new(a, b))
}

fn small_store() -> StoreConfig {
    // Few buckets and a narrow tree, so chains and deep nodes get exercised.
    StoreConfig {
        key_value_capacity: 3,
        spatial_fanout: 4,
        ..StoreConfig::default()
    }
}

fn build(elements: &[(Vec<Coordinate>, Vec<TagPair>)]) -> (ElementSource, Vec<(u32, Element)>) {
    let mut builder = ElementSourceBuilder::new(&small_store()).unwrap();
    let mut written = Vec::new();
    for (id, (coords, tags)) in elements.iter().enumerate() {
        let element = match coords.as_slice() {
            [single] => Element::node(id as i64 - 20, *single, tags.clone()),
            _ => Element::way(id as i64 - 20, coords.clone(), tags.clone()),
        };
        let offset = builder.insert(&element).unwrap();
        written.push((offset, element));
    }
    (builder.build().unwrap(), written)
}

proptest! {
    #[test]
    fn prop_saved_elements_read_back(elements in prop::collection::vec(arb_element(), 1..40)) {
        let (source, written) = build(&elements);
        let tmp = tempfile::tempdir().unwrap();
        source.save(tmp.path()).unwrap();
        let opened = ElementSource::open(tmp.path()).unwrap();

        for (offset, element) in &written {
            prop_assert_eq!(&opened.element(*offset).unwrap(), element);
        }
    }

    #[test]
    fn prop_tag_search_matches_scan(elements in prop::collection::vec(arb_element(), 1..40)) {
        let (source, written) = build(&elements);
        for (key, value) in [("a", "x"), ("b", "yy"), ("c", "z"), ("ab", "zzz")] {
            let expected: Vec<u32> = written.iter()
                .filter(|(_, element)| element.has_tag(key, value))
                .map(|(offset, _)| *offset)
                .collect();
            let found: Vec<u32> = source.tag_offsets(key, value).collect::<Result<_>>().unwrap();
            prop_assert_eq!(found, expected);
        }
    }

    #[test]
    fn prop_spatial_search_is_exact(
        boxes in prop::collection::vec(arb_envelope(), 0..200),
        queries in prop::collection::vec(arb_envelope(), 1..10),
    ) {
        let items: Vec<(Envelope, u32)> = boxes.iter().enumerate()
            .map(|(i, envelope)| (*envelope, i as u32 + 1))
            .collect();
        let index = SpatialIndex::build(items.clone(), 5).unwrap();
        let decoded = SpatialIndex::from_bytes(&index.to_bytes()).unwrap();

        for query in &queries {
            let mut expected: Vec<u32> = items.iter()
                .filter(|(envelope, _)| envelope.intersects(query))
                .map(|(_, data)| *data)
                .collect();
            expected.sort();
            let mut found: Vec<u32> = decoded.search(query).collect();
            found.sort();
            prop_assert_eq!(found, expected);
        }
    }
}
