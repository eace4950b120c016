//! The document model and its transactions.
//!
//! A [`Document`] is a list of top-level blocks plus a revision counter.
//! All edits go through [`Document::apply`], which applies a [`Transaction`]
//! atomically and records a [`StepMap`] so that [`NodeRef`]s taken at earlier
//! revisions can be carried forward (or found stale).

use std::ops::Range;

use crate::error::DocumentError;
use crate::mapping::{MapLog, Step, StepMap, Unmapped};
use crate::markup;
use crate::node::{Block, ImageNode};
use crate::selection::Selection;

/// Identity of a node: its child-index path, valid at `revision`.
///
/// The first path element is the top-level block index; further elements
/// index into list and list-item children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    path: Vec<usize>,
    revision: u64,
}

impl NodeRef {
    pub fn new(path: impl Into<Vec<usize>>, revision: u64) -> Self {
        Self {
            path: path.into(),
            revision,
        }
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn stale(&self) -> DocumentError {
        DocumentError::StaleReference {
            path: self.path.clone(),
            revision: self.revision,
        }
    }
}

/// One edit within a [`Transaction`].
///
/// Gaps and ranges address the top-level block list as it stands when the
/// operation runs, after the operations before it in the same transaction.
/// Node references are carried forward to the revision the transaction
/// starts from.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    InsertNode {
        at: usize,
        block: Block,
    },
    DeleteRange {
        range: Range<usize>,
    },
    /// Replace every attribute of an image node.
    SetNodeAttributes {
        node: NodeRef,
        attrs: ImageNode,
    },
    /// Insert at a cursor, or replace the top-level block holding a selected
    /// node.
    ReplaceSelection {
        selection: Selection,
        blocks: Vec<Block>,
    },
    ReplaceRange {
        range: Range<usize>,
        blocks: Vec<Block>,
    },
}

/// An ordered list of operations applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    ops: Vec<Operation>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Operation) {
        self.ops.push(op);
    }

    pub fn with(mut self, op: Operation) -> Self {
        self.ops.push(op);
        self
    }

    pub fn insert_node(self, at: usize, block: Block) -> Self {
        self.with(Operation::InsertNode { at, block })
    }

    pub fn delete_range(self, range: Range<usize>) -> Self {
        self.with(Operation::DeleteRange { range })
    }

    pub fn set_node_attributes(self, node: NodeRef, attrs: ImageNode) -> Self {
        self.with(Operation::SetNodeAttributes { node, attrs })
    }

    pub fn replace_selection(self, selection: Selection, blocks: Vec<Block>) -> Self {
        self.with(Operation::ReplaceSelection { selection, blocks })
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Result of a successful [`Document::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Revision produced by the transaction.
    pub revision: u64,
    pub map: StepMap,
    /// Undoes the transaction when applied at `revision`.
    pub inverse: Transaction,
}

#[derive(Debug, Clone)]
pub struct Document {
    blocks: Vec<Block>,
    revision: u64,
    log: MapLog,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.blocks == other.blocks
    }
}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            revision: 0,
            log: MapLog::default(),
        }
    }

    pub fn from_markup(input: &str) -> Self {
        Self::new(markup::from_markup(input))
    }

    pub fn to_markup(&self) -> String {
        markup::to_markup(&self.blocks)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn node(&self, path: &[usize]) -> Option<&Block> {
        node_at(&self.blocks, path)
    }

    /// A reference to the node at `path` in the current revision.
    pub fn node_ref(&self, path: &[usize]) -> Option<NodeRef> {
        self.node(path)
            .map(|_| NodeRef::new(path.to_vec(), self.revision))
    }

    /// Carry `node` forward to the current revision and return its path.
    pub fn resolve(&self, node: &NodeRef) -> Result<Vec<usize>, DocumentError> {
        let path = self.carry(node)?;
        if self.node(&path).is_none() {
            return Err(DocumentError::NoSuchNode { path });
        }
        Ok(path)
    }

    /// Map the top-level index of `node` through the step-map log.
    fn carry(&self, node: &NodeRef) -> Result<Vec<usize>, DocumentError> {
        let (&top, rest) = node.path.split_first().ok_or_else(|| node.stale())?;
        let top = self
            .log
            .map_index(node.revision, self.revision, top)
            .map_err(|_: Unmapped| node.stale())?;
        let mut path = Vec::with_capacity(node.path.len());
        path.push(top);
        path.extend_from_slice(rest);
        Ok(path)
    }

    /// `node` re-stamped at the current revision.
    pub fn refresh(&self, node: &NodeRef) -> Result<NodeRef, DocumentError> {
        Ok(NodeRef::new(self.resolve(node)?, self.revision))
    }

    pub fn image(&self, node: &NodeRef) -> Result<&ImageNode, DocumentError> {
        let path = self.resolve(node)?;
        match self.node(&path) {
            Some(Block::Image(image)) => Ok(image),
            Some(other) => Err(DocumentError::NotAnImage {
                found: other.kind(),
                path,
            }),
            None => Err(DocumentError::NoSuchNode { path }),
        }
    }

    /// Carry an insertion gap taken at `revision` forward. `None` once the
    /// revision has left the retained log.
    pub fn map_gap(&self, gap: usize, revision: u64) -> Option<usize> {
        self.log
            .map_gap(revision, self.revision, gap)
            .ok()
            .map(|gap| gap.min(self.blocks.len()))
    }

    /// Every image with its path, in document order.
    pub fn images(&self) -> Vec<(Vec<usize>, &ImageNode)> {
        let mut out = Vec::new();
        collect_images(&self.blocks, &mut Vec::new(), &mut out);
        out
    }

    /// Replace an image's attributes in a transaction of its own.
    pub fn set_node_attributes(
        &mut self,
        node: &NodeRef,
        attrs: ImageNode,
    ) -> Result<Applied, DocumentError> {
        self.apply(Transaction::new().set_node_attributes(node.clone(), attrs))
    }

    /// Apply `transaction` atomically.
    ///
    /// The operations run against a working copy that replaces the document
    /// only if all of them succeed. An empty transaction changes nothing and
    /// does not advance the revision.
    pub fn apply(&mut self, transaction: Transaction) -> Result<Applied, DocumentError> {
        if transaction.is_empty() {
            return Ok(Applied {
                revision: self.revision,
                map: StepMap::new(),
                inverse: Transaction::new(),
            });
        }

        let next_revision = self.revision + 1;
        let mut working = self.blocks.clone();
        let mut map = StepMap::new();
        let mut inverse = Vec::with_capacity(transaction.ops.len());

        for op in transaction.ops {
            let undo = match op {
                Operation::InsertNode { at, block } => {
                    replace_range(&mut working, &mut map, at..at, vec![block])?
                }
                Operation::DeleteRange { range } => {
                    replace_range(&mut working, &mut map, range, Vec::new())?
                }
                Operation::ReplaceRange { range, blocks } => {
                    replace_range(&mut working, &mut map, range, blocks)?
                }
                Operation::ReplaceSelection { selection, blocks } => {
                    let range = match &selection {
                        Selection::Cursor(gap) => *gap..*gap,
                        Selection::Node(node) => {
                            let top = self.carry(node)?[0];
                            top..top + 1
                        }
                    };
                    replace_range(&mut working, &mut map, range, blocks)?
                }
                Operation::SetNodeAttributes { node, attrs } => {
                    let path = self.carry(&node)?;
                    let image = match node_at_mut(&mut working, &path) {
                        Some(Block::Image(image)) => image,
                        Some(other) => {
                            return Err(DocumentError::NotAnImage {
                                found: other.kind(),
                                path,
                            });
                        }
                        None => return Err(DocumentError::NoSuchNode { path }),
                    };
                    let previous = std::mem::replace(image, attrs);
                    Operation::SetNodeAttributes {
                        node: NodeRef::new(path, next_revision),
                        attrs: previous,
                    }
                }
            };
            inverse.push(undo);
        }
        inverse.reverse();

        self.blocks = working;
        self.revision = next_revision;
        self.log.record(next_revision, map.clone());
        tracing::trace!(revision = self.revision, steps = map.steps().len(), "applied transaction");

        Ok(Applied {
            revision: next_revision,
            map,
            inverse: Transaction { ops: inverse },
        })
    }
}

/// Splice `blocks` into `range`, record the steps and return the inverse.
fn replace_range(
    working: &mut Vec<Block>,
    map: &mut StepMap,
    range: Range<usize>,
    blocks: Vec<Block>,
) -> Result<Operation, DocumentError> {
    let len = working.len();
    if range.start > range.end || range.end > len {
        return Err(DocumentError::OutOfBounds {
            position: range.end.max(range.start),
            len,
        });
    }
    let inserted = blocks.len();
    let removed: Vec<Block> = working.splice(range.clone(), blocks).collect();
    map.push(Step::Delete {
        start: range.start,
        end: range.end,
    });
    map.push(Step::Insert {
        at: range.start,
        count: inserted,
    });
    Ok(Operation::ReplaceRange {
        range: range.start..range.start + inserted,
        blocks: removed,
    })
}

fn node_at<'a>(blocks: &'a [Block], path: &[usize]) -> Option<&'a Block> {
    let (&first, rest) = path.split_first()?;
    rest.iter()
        .try_fold(blocks.get(first)?, |node, &i| node.children().get(i))
}

fn node_at_mut<'a>(blocks: &'a mut [Block], path: &[usize]) -> Option<&'a mut Block> {
    let (&first, rest) = path.split_first()?;
    let mut node = blocks.get_mut(first)?;
    for &i in rest {
        node = node.children_mut()?.get_mut(i)?;
    }
    Some(node)
}

fn collect_images<'a>(
    blocks: &'a [Block],
    prefix: &mut Vec<usize>,
    out: &mut Vec<(Vec<usize>, &'a ImageNode)>,
) {
    for (i, block) in blocks.iter().enumerate() {
        prefix.push(i);
        match block {
            Block::Image(image) => out.push((prefix.clone(), image)),
            other => collect_images(other.children(), prefix, out),
        }
        prefix.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::AssetRef;

    fn image(src: &str, w: u32, h: u32) -> Block {
        Block::Image(ImageNode::new(AssetRef::from_src(src)).with_size(w, h))
    }

    fn doc() -> Document {
        Document::new(vec![
            Block::paragraph("a"),
            image("/one.jpg", 400, 300),
            Block::paragraph("b"),
        ])
    }

    #[test]
    fn test_insert_then_ref_maps_forward() {
        let mut doc = doc();
        let img = doc.node_ref(&[1]).unwrap();

        doc.apply(Transaction::new().insert_node(0, Block::paragraph("lead")))
            .unwrap();

        assert_eq!(doc.resolve(&img).unwrap(), vec![2]);
        assert_eq!(doc.image(&img).unwrap().width, Some(400));
    }

    #[test]
    fn test_deleted_node_is_stale() {
        let mut doc = doc();
        let img = doc.node_ref(&[1]).unwrap();
        doc.apply(Transaction::new().delete_range(1..2)).unwrap();

        assert!(matches!(
            doc.resolve(&img),
            Err(DocumentError::StaleReference { .. })
        ));
        let err = doc
            .set_node_attributes(&img, ImageNode::new(AssetRef::from_src("/x.jpg")))
            .unwrap_err();
        assert!(matches!(err, DocumentError::StaleReference { .. }));
    }

    #[test]
    fn test_failed_transaction_changes_nothing() {
        let mut doc = doc();
        let before = doc.to_markup();
        let err = doc
            .apply(
                Transaction::new()
                    .insert_node(0, Block::paragraph("first"))
                    .delete_range(2..9),
            )
            .unwrap_err();

        assert!(matches!(err, DocumentError::OutOfBounds { .. }));
        assert_eq!(doc.to_markup(), before);
        assert_eq!(doc.revision(), 0);
    }

    #[test]
    fn test_set_attributes_on_paragraph_is_rejected() {
        let mut doc = doc();
        let para = doc.node_ref(&[0]).unwrap();
        let err = doc
            .set_node_attributes(&para, ImageNode::new(AssetRef::from_src("/x.jpg")))
            .unwrap_err();
        assert!(matches!(err, DocumentError::NotAnImage { .. }));
    }

    #[test]
    fn test_inverse_restores_document() {
        let mut doc = doc();
        let original = doc.clone();
        let img = doc.node_ref(&[1]).unwrap();
        let mut resized = doc.image(&img).unwrap().clone();
        resized.width = Some(500);
        resized.height = Some(375);

        let applied = doc
            .apply(
                Transaction::new()
                    .set_node_attributes(img, resized)
                    .delete_range(0..1)
                    .insert_node(2, Block::paragraph("tail")),
            )
            .unwrap();
        assert_eq!(
            doc.to_markup(),
            r#"<img src="/one.jpg" width="500" height="375" alt="" /><p>b</p><p>tail</p>"#
        );

        doc.apply(applied.inverse).unwrap();
        assert_eq!(doc, original);
    }

    #[test]
    fn test_replace_selection_on_node_replaces_top_level_block() {
        let mut doc = doc();
        let img = doc.node_ref(&[1]).unwrap();
        doc.apply(
            Transaction::new()
                .replace_selection(Selection::Node(img), vec![Block::paragraph("caption")]),
        )
        .unwrap();
        assert_eq!(doc.to_markup(), "<p>a</p><p>caption</p><p>b</p>");
    }

    #[test]
    fn test_gap_maps_through_inserts() {
        let mut doc = doc();
        let gap_rev = doc.revision();
        doc.apply(Transaction::new().insert_node(0, Block::paragraph("x")))
            .unwrap();
        assert_eq!(doc.map_gap(1, gap_rev), Some(2));
        assert_eq!(doc.map_gap(0, gap_rev), Some(1));
    }

    #[test]
    fn test_images_finds_nested() {
        let doc = Document::new(vec![
            image("/a.jpg", 1, 1),
            Block::List {
                ordered: false,
                items: vec![Block::ListItem {
                    content: vec![Block::paragraph("x"), image("/b.jpg", 1, 1)],
                }],
            },
        ]);
        let paths: Vec<_> = doc.images().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec![vec![0], vec![1, 0, 1]]);
    }
}
