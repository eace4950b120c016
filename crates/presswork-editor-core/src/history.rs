//! Undo/redo history.
//!
//! Every transaction applied through the editor pushes its inverse here.
//! Undo and redo apply those inverses as ordinary transactions, so they
//! record step maps like any other edit and pending references stay valid.

use std::collections::VecDeque;

use crate::document::{Applied, Document, Transaction};
use crate::error::DocumentError;

/// An inverse transaction and the revision it applies at.
#[derive(Debug, Clone)]
struct Entry {
    revision: u64,
    transaction: Transaction,
}

#[derive(Debug, Clone)]
pub struct History {
    undo: VecDeque<Entry>,
    redo: Vec<Entry>,
    max_depth: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(100)
    }
}

impl History {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Record a newly applied edit. Clears the redo stack.
    pub fn record(&mut self, applied: &Applied) {
        if applied.inverse.is_empty() {
            return;
        }
        self.redo.clear();
        self.push_undo(Entry {
            revision: applied.revision,
            transaction: applied.inverse.clone(),
        });
    }

    fn push_undo(&mut self, entry: Entry) {
        self.undo.push_back(entry);
        while self.undo.len() > self.max_depth {
            self.undo.pop_front();
        }
    }

    /// Undo the most recent edit. `Ok(None)` when there is nothing to undo.
    pub fn undo(&mut self, doc: &mut Document) -> Result<Option<Applied>, DocumentError> {
        let Some(entry) = self.undo.pop_back() else {
            return Ok(None);
        };
        let Some(applied) = self.replay(doc, entry)? else {
            return Ok(None);
        };
        self.redo.push(Entry {
            revision: applied.revision,
            transaction: applied.inverse.clone(),
        });
        Ok(Some(applied))
    }

    /// Re-apply the most recently undone edit.
    pub fn redo(&mut self, doc: &mut Document) -> Result<Option<Applied>, DocumentError> {
        let Some(entry) = self.redo.pop() else {
            return Ok(None);
        };
        let Some(applied) = self.replay(doc, entry)? else {
            return Ok(None);
        };
        self.push_undo(Entry {
            revision: applied.revision,
            transaction: applied.inverse.clone(),
        });
        Ok(Some(applied))
    }

    fn replay(&mut self, doc: &mut Document, entry: Entry) -> Result<Option<Applied>, DocumentError> {
        // Inverses use raw positions, valid only at the revision they were
        // recorded for.
        if entry.revision != doc.revision() {
            tracing::warn!(
                expected = entry.revision,
                actual = doc.revision(),
                "history out of step with document, clearing"
            );
            self.clear();
            return Ok(None);
        }
        doc.apply(entry.transaction).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Block;

    fn edit(doc: &mut Document, history: &mut History, txn: Transaction) {
        let applied = doc.apply(txn).unwrap();
        history.record(&applied);
    }

    #[test]
    fn test_undo_redo_cycle() {
        let mut doc = Document::new(vec![Block::paragraph("a")]);
        let mut history = History::default();
        edit(
            &mut doc,
            &mut history,
            Transaction::new().insert_node(1, Block::paragraph("b")),
        );
        edit(&mut doc, &mut history, Transaction::new().delete_range(0..1));
        assert_eq!(doc.to_markup(), "<p>b</p>");

        history.undo(&mut doc).unwrap();
        assert_eq!(doc.to_markup(), "<p>a</p><p>b</p>");
        history.undo(&mut doc).unwrap();
        assert_eq!(doc.to_markup(), "<p>a</p>");
        assert!(!history.can_undo());

        history.redo(&mut doc).unwrap();
        history.redo(&mut doc).unwrap();
        assert_eq!(doc.to_markup(), "<p>b</p>");
        assert!(!history.can_redo());
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut doc = Document::default();
        let mut history = History::default();
        edit(
            &mut doc,
            &mut history,
            Transaction::new().insert_node(0, Block::paragraph("a")),
        );
        history.undo(&mut doc).unwrap();
        assert!(history.can_redo());

        edit(
            &mut doc,
            &mut history,
            Transaction::new().insert_node(0, Block::paragraph("c")),
        );
        assert!(!history.can_redo());
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut doc = Document::default();
        let mut history = History::new(3);
        for i in 0..5 {
            edit(
                &mut doc,
                &mut history,
                Transaction::new().insert_node(0, Block::paragraph(i.to_string())),
            );
        }
        let mut undone = 0;
        while history.undo(&mut doc).unwrap().is_some() {
            undone += 1;
        }
        assert_eq!(undone, 3);
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_out_of_step_history_is_dropped() {
        let mut doc = Document::default();
        let mut history = History::default();
        edit(
            &mut doc,
            &mut history,
            Transaction::new().insert_node(0, Block::paragraph("a")),
        );
        // An edit that bypassed the history.
        doc.apply(Transaction::new().insert_node(0, Block::paragraph("b")))
            .unwrap();

        assert_eq!(history.undo(&mut doc).unwrap(), None);
        assert!(!history.can_undo());
        assert_eq!(doc.len(), 2);
    }
}
