use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::geo::BoundingBox;
use crate::errors::{Error, Result};

pub const FORMAT_VERSION: u32 = 1;

pub const HEADER_FILE_NAME: &str = "region.json";
pub const SPATIAL_FILE_NAME: &str = "spatial.idx";
pub const KEY_VALUE_FILE_NAME: &str = "kv.dat";
pub const KEY_VALUE_INDEX_FILE_NAME: &str = "kv.idx";
pub const USAGE_FILE_NAME: &str = "kv.usg";
pub const ELEMENTS_FILE_NAME: &str = "elements.dat";

/// Describes a region directory; read without loading any of the streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionHeader {
    pub version: u32,
    pub bbox: BoundingBox,
    pub element_count: u64,
}

impl RegionHeader {
    pub fn new(bbox: BoundingBox, element_count: u64) -> Self {
        RegionHeader {
            version: FORMAT_VERSION,
            bbox,
            element_count,
        }
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(HEADER_FILE_NAME)
    }

    pub fn exists(dir: &Path) -> Result<bool> {
        Ok(Self::path(dir).try_exists()?)
    }

    pub fn load(dir: &Path) -> Result<RegionHeader> {
        let file = File::open(Self::path(dir))?;
        let header: RegionHeader = serde_json::from_reader(BufReader::new(file))?;
        if header.version != FORMAT_VERSION {
            return Err(Error::format(format!(
                "{}: format version {} (expected {FORMAT_VERSION})",
                dir.display(),
                header.version
            )));
        }
        Ok(header)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let file = File::create(Self::path(dir))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Reads one stream of a region whose header exists. A missing stream means
/// the region is damaged, not absent.
pub(crate) fn read_stream(dir: &Path, name: &str) -> Result<Vec<u8>> {
    let mut file = File::open(dir.join(name)).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => Error::format(format!("{}: region is missing {name}", dir.display())),
        _ => Error::from(err),
    })?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

pub(crate) fn write_stream(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(dir.join(name))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Sub-directories of `root` that hold a region header, sorted by path.
pub fn region_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    if !root.try_exists()? {
        return Ok(dirs);
    }
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() && RegionHeader::exists(&path)? {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}
