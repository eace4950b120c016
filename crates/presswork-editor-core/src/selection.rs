//! Selection state.

use crate::document::{Document, NodeRef};
use crate::mapping::StepMap;

/// What the user has selected. At most one node is selected at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A caret between top-level blocks.
    Cursor(usize),
    /// A whole node, typically an image.
    Node(NodeRef),
}

impl Selection {
    pub fn node(&self) -> Option<&NodeRef> {
        match self {
            Selection::Node(node) => Some(node),
            Selection::Cursor(_) => None,
        }
    }

    /// Carry the selection across a transaction that produced `map`.
    ///
    /// A node selection whose node was deleted is cleared.
    pub fn remap(&self, doc: &Document, map: &StepMap) -> Option<Selection> {
        match self {
            Selection::Cursor(gap) => Some(Selection::Cursor(map.map_gap(*gap).min(doc.len()))),
            Selection::Node(node) => doc.refresh(node).ok().map(Selection::Node),
        }
    }

    /// The gap where inserted content goes: the caret, or just after the
    /// top-level block holding a selected node.
    pub fn insertion_gap(&self, doc: &Document) -> Option<usize> {
        match self {
            Selection::Cursor(gap) => Some((*gap).min(doc.len())),
            Selection::Node(node) => doc.resolve(node).ok().map(|path| path[0] + 1),
        }
    }
}
