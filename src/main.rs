use std::env;
use std::io;
use std::path::{Path, PathBuf};

use log::{error, info};
use structured_logger::json::new_writer;
use structured_logger::Builder;

use osm_store::data::geo::BoundingBox;
use osm_store::errors::{Error, Result};
use osm_store::etl::build_store::BuildStoreEtl;
use osm_store::etl::parse_osm::ParseOsmEtl;
use osm_store::etl::Etl;
use osm_store::source::{ElementSourceProvider, OverpassFetcher, RegionHeader};
use osm_store::StoreConfig;

const USAGE: &str = "usage: osm-store <config.json> [min_lat min_lon max_lat max_lon]";

fn setup_logging() {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn parse_bbox(args: &[String]) -> Result<Option<BoundingBox>> {
    match args {
        [] => Ok(None),
        [min_lat, min_lon, max_lat, max_lon] => Ok(Some(BoundingBox::new(
            min_lat.parse()?,
            min_lon.parse()?,
            max_lat.parse()?,
            max_lon.parse()?,
        ))),
        _ => Err(USAGE.into()),
    }
}

/// Working directory for the parse cache, named after the input file.
fn work_dir(config: &StoreConfig) -> Result<PathBuf> {
    let input_fname = Path::new(&config.data_path)
        .file_name()
        .ok_or("Could not get input file name")?;
    Ok(Path::new("output").join(input_fname))
}

/// Region directory under `dest_path`, named after the input file stem.
fn region_dir(config: &StoreConfig) -> Result<PathBuf> {
    let stem = Path::new(&config.data_path)
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .filter(|stem| !stem.is_empty())
        .ok_or("Could not get input file stem")?;
    Ok(Path::new(&config.dest_path).join(stem))
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let (config_path, bbox_args) = args.split_first().ok_or(Error::from(USAGE))?;
    let bbox = parse_bbox(bbox_args)?;
    let config = StoreConfig::load(Path::new(config_path))?;

    let region = if config.data_path.is_empty() {
        None
    } else {
        let work_dir = work_dir(&config)?;
        let region_dir = region_dir(&config)?;
        ParseOsmEtl::new(&config.data_path).process(&work_dir)?;
        BuildStoreEtl::new(config.clone(), &region_dir).process(&work_dir)?;
        Some(RegionHeader::load(&region_dir)?)
    };

    let bbox = match (bbox, region) {
        (Some(bbox), _) => bbox,
        (None, Some(header)) => header.bbox,
        (None, None) => return Err(USAGE.into()),
    };
    let fetcher = OverpassFetcher::new(config.overpass_url.as_str(), config.fetch_timeout_secs)?;
    let provider = ElementSourceProvider::open(Path::new(&config.dest_path), config.clone(), Box::new(fetcher))?;
    let elements = provider.search(&bbox)?;
    info!(elements = elements.len(); "Query finished");
    Ok(())
}

fn main() {
    setup_logging();
    if let Err(err) = run() {
        error!(err = err.message.as_str(); "osm-store failed");
        std::process::exit(1);
    }
}
