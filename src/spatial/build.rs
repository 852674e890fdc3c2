//! Sort-tile-recursive bulk loading.

use crate::data::geo::Envelope;
use crate::errors::{Error, Result};

use super::{SpatialNode, SENTINEL};

pub(super) fn pack(items: Vec<(Envelope, u32)>, fanout: usize) -> Result<Option<SpatialNode>> {
    if fanout < 2 {
        return Err(Error::format(format!("spatial fanout {fanout} is below 2")));
    }
    if items.iter().any(|(_, data)| *data == SENTINEL) {
        return Err(Error::format("leaf data collides with the spatial sentinel"));
    }
    if items.is_empty() {
        return Ok(None);
    }

    let mut level: Vec<SpatialNode> = items.into_iter()
        .map(|(envelope, data)| SpatialNode::leaf(envelope, data))
        .collect();
    loop {
        level = pack_level(level, fanout);
        if level.len() == 1 {
            break;
        }
    }
    Ok(level.pop())
}

/// Groups one level into parents: vertical slices by center longitude, then
/// runs of `fanout` by center latitude inside each slice.
fn pack_level(mut nodes: Vec<SpatialNode>, fanout: usize) -> Vec<SpatialNode> {
    let groups = nodes.len().div_ceil(fanout);
    let slices = (groups as f64).sqrt().ceil().max(1.0) as usize;

    nodes.sort_by_key(|node| node.envelope.center2().1);
    let mut parents = Vec::with_capacity(groups + slices);
    for mut slice in chunks(nodes, slices * fanout) {
        slice.sort_by_key(|node| node.envelope.center2().0);
        for group in chunks(slice, fanout) {
            parents.push(SpatialNode::internal(group));
        }
    }
    parents
}

fn chunks<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let mut out = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter();
    loop {
        let chunk: Vec<T> = iter.by_ref().take(size).collect();
        if chunk.is_empty() {
            break;
        }
        out.push(chunk);
    }
    out
}
