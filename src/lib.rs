//! Append-only on-disk store for OpenStreetMap elements: a spatial index and
//! tag dictionary over a flat element log, with region switching and a remote
//! fallback for areas not held locally.

pub mod config;
pub mod data;
pub mod errors;
pub mod etl;
pub mod source;
pub mod spatial;
pub mod store;

pub use config::StoreConfig;
pub use data::element::{Element, Geometry, Member, TagPair};
pub use data::geo::{BoundingBox, Coordinate, Envelope};
pub use errors::{Error, ErrorKind, Result};
pub use source::{ElementSource, ElementSourceBuilder, ElementSourceProvider, RemoteFetch};
