//! Remote source of raw OSM XML for areas with no local region.

use std::time::Duration;

use log::info;

use crate::data::geo::BoundingBox;
use crate::errors::{Error, Result};

/// Fetches raw OSM XML covering a bounding box.
///
/// Implementations own any retry policy; the provider surfaces the first
/// error it sees.
pub trait RemoteFetch: Send + Sync {
    fn fetch(&self, bbox: &BoundingBox) -> Result<Vec<u8>>;
}

/// Fetches through the OSM `map` API call (as served by Overpass).
pub struct OverpassFetcher {
    client: reqwest::blocking::Client,
    url: String,
}

impl OverpassFetcher {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::remote_fetch(format!("Failed to create HTTP client: {e}")))?;
        Ok(OverpassFetcher {
            client,
            url: url.into(),
        })
    }

    pub fn request_url(&self, bbox: &BoundingBox) -> String {
        format!(
            "{}?bbox={},{},{},{}",
            self.url, bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat
        )
    }
}

impl RemoteFetch for OverpassFetcher {
    fn fetch(&self, bbox: &BoundingBox) -> Result<Vec<u8>> {
        let url = self.request_url(bbox);
        info!(url = url.as_str(); "Fetching remote map data");
        let response = self.client
            .get(&url)
            .send()
            .map_err(|e| Error::remote_fetch(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::remote_fetch(format!("HTTP {} from {url}", response.status())));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| Error::remote_fetch(format!("Failed to read response: {e}")))
    }
}

/// Fetcher for setups that only serve local regions.
pub struct NoRemote;

impl RemoteFetch for NoRemote {
    fn fetch(&self, bbox: &BoundingBox) -> Result<Vec<u8>> {
        Err(Error::remote_fetch(format!("no local region covers {bbox:?} and remote fetch is disabled")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn request_url_uses_lon_lat_order() {
        let fetcher = OverpassFetcher::new("https://example.com/api/map", 5).unwrap();
        let url = fetcher.request_url(&BoundingBox::new(51.5, -0.2, 51.6, -0.1));
        assert_eq!(url, "https://example.com/api/map?bbox=-0.2,51.5,-0.1,51.6");
    }

    #[test]
    fn disabled_remote_reports_fetch_error() {
        let err = NoRemote.fetch(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RemoteFetch);
    }
}
