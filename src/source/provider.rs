use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;

use crate::config::StoreConfig;
use crate::data::element::Element;
use crate::data::geo::{BoundingBox, Envelope};
use crate::errors::{Error, ErrorKind, Result};
use crate::etl::build_store::build_source;
use crate::etl::parse_osm::parse_osm_bytes;
use crate::spatial::SpatialIndex;

use super::element_source::ElementSource;
use super::fetch::RemoteFetch;
use super::region::{region_dirs, RegionHeader};

/// Identity of the region currently held by a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionKey {
    /// A region directory on disk.
    Local(PathBuf),
    /// A region built in memory from a remote fetch of this box.
    Remote(BoundingBox),
}

#[derive(Debug)]
struct Region {
    dir: PathBuf,
    header: RegionHeader,
    envelope: Envelope,
}

struct Resident {
    key: RegionKey,
    envelope: Envelope,
    source: Arc<ElementSource>,
}

/// Routes bounding-box queries to the region that covers them, keeping at most
/// one region loaded.
///
/// Regions are handed out as `Arc`s: switching regions drops the provider's
/// reference, while queries still running against the old region keep theirs
/// until they finish.
pub struct ElementSourceProvider {
    config: StoreConfig,
    regions: Vec<Region>,
    // Leaf data is an index into `regions`.
    meta_index: SpatialIndex,
    fetcher: Box<dyn RemoteFetch>,
    resident: Mutex<Option<Resident>>,
}

impl ElementSourceProvider {
    /// Reads the header of every region directory under `root` and indexes
    /// their bounds. No stream is loaded until the first query.
    pub fn open(root: &Path, config: StoreConfig, fetcher: Box<dyn RemoteFetch>) -> Result<Self> {
        config.validate()?;
        let mut regions = Vec::new();
        for dir in region_dirs(root)? {
            let header = RegionHeader::load(&dir)?;
            let envelope = header.bbox.to_envelope()?;
            regions.push(Region { dir, header, envelope });
        }

        let items = regions.iter()
            .enumerate()
            .map(|(idx, region)| (region.envelope, idx as u32))
            .collect();
        let meta_index = SpatialIndex::build(items, config.spatial_fanout)?;

        let root_name = root.display().to_string();
        info!(root = root_name.as_str(), regions = regions.len(); "Indexed local regions");
        Ok(ElementSourceProvider {
            config,
            regions,
            meta_index,
            fetcher,
            resident: Mutex::new(None),
        })
    }

    pub fn regions(&self) -> impl Iterator<Item = (&Path, &RegionHeader)> {
        self.regions.iter().map(|region| (region.dir.as_path(), &region.header))
    }

    /// Local region whose bounds contain `query`, if any.
    pub fn covering_region(&self, query: &Envelope) -> Option<&Path> {
        self.find_region(query).map(|region| region.dir.as_path())
    }

    fn find_region(&self, query: &Envelope) -> Option<&Region> {
        self.meta_index.search(query)
            .map(|idx| &self.regions[idx as usize])
            .find(|region| region.envelope.contains(query))
    }

    pub fn resident(&self) -> Option<RegionKey> {
        self.resident.lock().as_ref().map(|resident| resident.key.clone())
    }

    /// Element source able to answer queries inside `bbox`.
    ///
    /// Reuses the resident region when it covers the box. Otherwise loads the
    /// covering local region, or builds one from a remote fetch when no local
    /// region covers it, and makes that the resident region. A failed load
    /// leaves the previous resident in place.
    ///
    /// Loading happens without holding the resident lock, so queries the
    /// resident region can answer are never stuck behind a slow open or fetch.
    pub fn get(&self, bbox: &BoundingBox) -> Result<Arc<ElementSource>> {
        let query = bbox.to_envelope()?;
        let covering = self.find_region(&query);
        if let Some(source) = self.reusable(covering, &query) {
            return Ok(source);
        }

        let (key, envelope, source) = match covering {
            Some(region) => (
                RegionKey::Local(region.dir.clone()),
                region.envelope,
                ElementSource::open(&region.dir)?,
            ),
            None => (RegionKey::Remote(*bbox), query, self.build_remote(bbox)?),
        };

        let mut resident = self.resident.lock();
        // Another caller may have installed a covering region meanwhile.
        if let Some(current) = resident.as_ref() {
            if Self::covers(current, covering, &query) {
                return Ok(Arc::clone(&current.source));
            }
        }

        info!(elements = source.header().element_count; "Switching resident region to {:?}", key);
        let source = Arc::new(source);
        let previous = resident.replace(Resident {
            key,
            envelope,
            source: Arc::clone(&source),
        });
        if let Some(previous) = previous {
            info!(in_flight = Arc::strong_count(&previous.source) - 1; "Evicted region {:?}", previous.key);
        }
        Ok(source)
    }

    fn reusable(&self, covering: Option<&Region>, query: &Envelope) -> Option<Arc<ElementSource>> {
        let resident = self.resident.lock();
        resident.as_ref()
            .filter(|current| Self::covers(current, covering, query))
            .map(|current| Arc::clone(&current.source))
    }

    fn covers(current: &Resident, covering: Option<&Region>, query: &Envelope) -> bool {
        match (&current.key, covering) {
            (RegionKey::Local(dir), Some(region)) => *dir == region.dir,
            (RegionKey::Remote(_), None) => current.envelope.contains(query),
            _ => false,
        }
    }

    fn build_remote(&self, bbox: &BoundingBox) -> Result<ElementSource> {
        let raw = self.fetcher.fetch(bbox).map_err(|err| {
            warn!(err = err.message.as_str(); "Remote fetch failed");
            match err.kind {
                ErrorKind::RemoteFetch => err,
                _ => Error::remote_fetch(err.message),
            }
        })?;
        let mut data = parse_osm_bytes(&raw)?;
        if data.bounds.is_none() {
            data.bounds = Some(*bbox);
        }
        build_source(&data, &self.config)
    }

    /// Elements intersecting `bbox`, collected from the covering region.
    pub fn search(&self, bbox: &BoundingBox) -> Result<Vec<Element>> {
        let source = self.get(bbox)?;
        let query = bbox.to_envelope()?;
        let elements: Result<Vec<Element>> = source.get(&query).collect();
        elements
    }

    /// Elements tagged `key=value` in the region covering `bbox`.
    pub fn search_by_tag(&self, bbox: &BoundingBox, key: &str, value: &str) -> Result<Vec<Element>> {
        let source = self.get(bbox)?;
        let elements: Result<Vec<Element>> = source.search_by_tag(key, value).collect();
        elements
    }
}
