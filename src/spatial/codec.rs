//! Pre-order byte format of a spatial tree.
//!
//! Per node: `u32 data` (element offset for leaves, `0` for internal nodes),
//! `u8 flags` (bit 0 point envelope, bit 1 leaf), `i32 minLat, i32 minLon`,
//! then `i32 maxLat, i32 maxLon` unless the envelope is a point, then every
//! child, then [`SENTINEL`]. A sentinel where a node should start means there
//! is no node; an empty tree is a lone sentinel.

use crate::data::geo::{Coordinate, Envelope};
use crate::errors::{Error, Result};
use crate::store::stream::StreamReader;

use super::SpatialNode;

pub const SENTINEL: u32 = 0xFFFF_FFFF;

const FLAG_POINT: u8 = 0b01;
const FLAG_LEAF: u8 = 0b10;
const MAX_DEPTH: usize = 64;

pub(super) fn encode(root: Option<&SpatialNode>) -> Vec<u8> {
    let mut out = Vec::new();
    match root {
        Some(root) => write_node(&mut out, root),
        None => out.extend_from_slice(&SENTINEL.to_le_bytes()),
    }
    out
}

fn write_coord(out: &mut Vec<u8>, coord: &Coordinate) {
    out.extend_from_slice(&coord.lat.to_le_bytes());
    out.extend_from_slice(&coord.lon.to_le_bytes());
}

fn write_node(out: &mut Vec<u8>, node: &SpatialNode) {
    let data = if node.is_leaf { node.data } else { 0 };
    out.extend_from_slice(&data.to_le_bytes());

    let is_point = node.envelope.is_point();
    let mut flags = 0;
    if is_point {
        flags |= FLAG_POINT;
    }
    if node.is_leaf {
        flags |= FLAG_LEAF;
    }
    out.push(flags);

    write_coord(out, &node.envelope.min);
    if !is_point {
        write_coord(out, &node.envelope.max);
    }
    for child in &node.children {
        write_node(out, child);
    }
    out.extend_from_slice(&SENTINEL.to_le_bytes());
}

pub(super) fn decode(data: &[u8]) -> Result<Option<SpatialNode>> {
    let mut reader = StreamReader::raw(data);
    let root = read_node(&mut reader, 0)?;
    if !reader.is_at_end() {
        return Err(Error::format(format!(
            "spatial index has {} trailing bytes",
            data.len() - reader.position()
        )));
    }
    Ok(root)
}

fn read_coord(reader: &mut StreamReader<'_>) -> Result<Coordinate> {
    let lat = reader.read_i32()?;
    let lon = reader.read_i32()?;
    Ok(Coordinate::new(lat, lon))
}

fn read_node(reader: &mut StreamReader<'_>, depth: usize) -> Result<Option<SpatialNode>> {
    if depth > MAX_DEPTH {
        return Err(Error::format("spatial index nests deeper than any packed tree"));
    }
    let data = reader.read_u32()?;
    if data == SENTINEL {
        return Ok(None);
    }

    let flags = reader.read_u8()?;
    if flags & !(FLAG_POINT | FLAG_LEAF) != 0 {
        return Err(Error::format(format!("unknown spatial node flags {flags:#04x}")));
    }
    let is_leaf = flags & FLAG_LEAF != 0;
    let min = read_coord(reader)?;
    let max = if flags & FLAG_POINT != 0 { min } else { read_coord(reader)? };
    if min.lat > max.lat || min.lon > max.lon {
        return Err(Error::format("spatial node envelope has min above max"));
    }

    let mut children = Vec::new();
    while let Some(child) = read_node(reader, depth + 1)? {
        children.push(child);
    }
    if is_leaf && !children.is_empty() {
        return Err(Error::format("spatial leaf node has children"));
    }

    Ok(Some(SpatialNode {
        envelope: Envelope { min, max },
        is_leaf,
        data,
        children,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn tree() -> SpatialNode {
        let a = SpatialNode::leaf(Envelope::new(Coordinate::new(0, 0), Coordinate::new(1, 1)), 10);
        let b = SpatialNode::leaf(Envelope::point(Coordinate::new(5, 5)), 220);
        SpatialNode::internal(vec![a, b])
    }

    #[test]
    fn layout_matches_format() {
        let bytes = encode(Some(&tree()));
        // root: 4 + 1 + 16, leaf a: 4 + 1 + 16 + 4, point leaf b: 4 + 1 + 8 + 4, root sentinel: 4
        assert_eq!(bytes.len(), 21 + 25 + 17 + 4);
        assert_eq!(&bytes[..4], &0u32.to_le_bytes());
        assert_eq!(bytes[4], 0);
        assert_eq!(bytes[21 + 4], FLAG_LEAF);
        assert_eq!(bytes[21 + 25 + 4], FLAG_LEAF | FLAG_POINT);
        assert_eq!(&bytes[bytes.len() - 4..], &SENTINEL.to_le_bytes());
    }

    #[test]
    fn decode_reverses_encode() {
        let root = tree();
        assert_eq!(decode(&encode(Some(&root))).unwrap(), Some(root));
        assert_eq!(decode(&encode(None)).unwrap(), None);
    }

    #[test]
    fn truncated_tree_is_format_error() {
        let bytes = encode(Some(&tree()));
        let err = decode(&bytes[..bytes.len() - 4]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Format);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(None);
        bytes.push(0);
        assert_eq!(decode(&bytes).unwrap_err().kind, ErrorKind::Format);
    }
}
