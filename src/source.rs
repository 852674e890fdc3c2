//! Queryable regions: building them, persisting them, and routing queries to
//! the right one.

pub mod builder;
pub mod element_source;
pub mod fetch;
pub mod provider;
pub mod region;

pub use builder::ElementSourceBuilder;
pub use element_source::ElementSource;
pub use fetch::{NoRemote, OverpassFetcher, RemoteFetch};
pub use provider::{ElementSourceProvider, RegionKey};
pub use region::RegionHeader;
