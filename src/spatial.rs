//! Bounding-box tree over element envelopes.
//!
//! Built once with sort-tile-recursive packing, queried through an explicit
//! stack, and flattened to a pre-order byte format for storage.

mod build;
mod codec;
mod search;

pub use codec::SENTINEL;
pub use search::Search;

use crate::data::geo::Envelope;
use crate::errors::Result;

/// One node of the tree. Leaves carry an element log offset in `data`; for
/// internal nodes `data` is unused and the envelope is the union of the
/// children's envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialNode {
    pub envelope: Envelope,
    pub is_leaf: bool,
    pub data: u32,
    pub children: Vec<SpatialNode>,
}

impl SpatialNode {
    pub fn leaf(envelope: Envelope, data: u32) -> Self {
        SpatialNode {
            envelope,
            is_leaf: true,
            data,
            children: Vec::new(),
        }
    }

    /// Internal node over a non-empty set of children.
    fn internal(children: Vec<SpatialNode>) -> Self {
        let mut envelope = children[0].envelope;
        for child in &children[1..] {
            envelope.extend(&child.envelope);
        }
        SpatialNode {
            envelope,
            is_leaf: false,
            data: 0,
            children,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpatialIndex {
    root: Option<SpatialNode>,
}

impl SpatialIndex {
    /// Bulk loads `(envelope, data)` items with at most `fanout` children per node.
    pub fn build(items: Vec<(Envelope, u32)>, fanout: usize) -> Result<Self> {
        build::pack(items, fanout).map(|root| SpatialIndex { root })
    }

    pub fn root(&self) -> Option<&SpatialNode> {
        self.root.as_ref()
    }

    pub fn envelope(&self) -> Option<Envelope> {
        self.root.as_ref().map(|root| root.envelope)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Data of every leaf whose envelope intersects `query`.
    pub fn search(&self, query: &Envelope) -> Search<'_> {
        Search::new(self.root.as_ref(), *query)
    }

    /// Data of every leaf, in traversal order.
    pub fn leaves(&self) -> Search<'_> {
        Search::all(self.root.as_ref())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        codec::encode(self.root.as_ref())
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        codec::decode(data).map(|root| SpatialIndex { root })
    }
}
