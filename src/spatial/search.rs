use crate::data::geo::Envelope;

use super::SpatialNode;

/// Lazy envelope query over a spatial tree.
///
/// Children that merely overlap the query are tested one level further down;
/// children the query fully contains are drained without any more geometry
/// tests. Dropping the iterator abandons the traversal.
#[derive(Debug, Clone)]
pub struct Search<'a> {
    query: Envelope,
    // (node, query contains node)
    stack: Vec<(&'a SpatialNode, bool)>,
}

impl<'a> Search<'a> {
    pub(super) fn new(root: Option<&'a SpatialNode>, query: Envelope) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = root {
            if query.intersects(&root.envelope) {
                stack.push((root, query.contains(&root.envelope)));
            }
        }
        Search { query, stack }
    }

    pub(super) fn all(root: Option<&'a SpatialNode>) -> Self {
        let mut stack = Vec::new();
        let mut query = Envelope::point(Default::default());
        if let Some(root) = root {
            stack.push((root, true));
            query = root.envelope;
        }
        Search { query, stack }
    }
}

impl Iterator for Search<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        while let Some((node, contained)) = self.stack.pop() {
            if node.is_leaf {
                return Some(node.data);
            }
            for child in node.children.iter().rev() {
                if contained {
                    self.stack.push((child, true));
                } else if self.query.intersects(&child.envelope) {
                    self.stack.push((child, self.query.contains(&child.envelope)));
                }
            }
        }
        None
    }
}
