//! The editor controller.
//!
//! [`Editor`] owns the document, its history, the selection and the resize
//! gesture. Every mutation runs synchronously on `&mut Editor` and goes
//! through [`Editor::apply`], which records undo history and keeps the
//! selection pointing at the right node.

use std::collections::{BTreeMap, HashMap};

use presswork_common::IngestConfig;
use presswork_media::{Dimensions, Locator};
use smol_str::SmolStr;

use crate::article::{ArticleDraft, ArticleRecord, ArticleStore};
use crate::decoration::{self, Compass, HandleDescriptor, Point};
use crate::document::{Applied, Document, NodeRef, Transaction};
use crate::error::{DocumentError, ResizeError, SaveError};
use crate::history::History;
use crate::ingest::BatchId;
use crate::node::{Block, ImageNode};
use crate::platform::{NaturalSizeSource, Notifier, NotifyKind, TracingNotifier, ViewGeometry};
use crate::resize::{ResizeController, ResizeSession};
use crate::selection::Selection;

/// Bookkeeping for one ingest gesture.
#[derive(Debug, Clone)]
pub(crate) struct BatchState {
    /// Gap reserved when the gesture was dispatched.
    pub(crate) anchor: usize,
    pub(crate) anchor_revision: u64,
    /// Images already in the document, by ordinal.
    pub(crate) placed: BTreeMap<usize, NodeRef>,
    pub(crate) pending: usize,
}

pub struct Editor {
    document: Document,
    history: History,
    selection: Option<Selection>,
    resize: ResizeController,
    editing_permitted: bool,
    closed: bool,
    article_id: Option<SmolStr>,
    pub(crate) batches: HashMap<BatchId, BatchState>,
    pub(crate) next_batch: u64,
    /// Pixel sizes of uploaded assets, recorded at upload time.
    pub(crate) natural_sizes: HashMap<Locator, Dimensions>,
    notifier: Box<dyn Notifier + Send>,
    pub(crate) config: IngestConfig,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("revision", &self.document.revision())
            .field("selection", &self.selection)
            .field("dragging", &self.resize.is_dragging())
            .field("editing_permitted", &self.editing_permitted)
            .field("closed", &self.closed)
            .field("batches", &self.batches.len())
            .finish_non_exhaustive()
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(Document::default())
    }
}

impl Editor {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            history: History::default(),
            selection: None,
            resize: ResizeController::new(),
            editing_permitted: true,
            closed: false,
            article_id: None,
            batches: HashMap::new(),
            next_batch: 0,
            natural_sizes: HashMap::new(),
            notifier: Box::new(TracingNotifier),
            config: IngestConfig::default(),
        }
    }

    pub fn from_markup(input: &str) -> Self {
        Self::new(Document::from_markup(input))
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + Send + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    /// Continue editing a previously saved article.
    pub fn with_article_id(mut self, id: impl Into<SmolStr>) -> Self {
        self.article_id = Some(id.into());
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn to_markup(&self) -> String {
        self.document.to_markup()
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn article_id(&self) -> Option<&str> {
        self.article_id.as_deref()
    }

    pub(crate) fn notify(&self, kind: NotifyKind, message: &str) {
        self.notifier.notify(kind, message);
    }

    /// Apply a transaction, record it for undo and remap the selection.
    pub fn apply(&mut self, transaction: Transaction) -> Result<Applied, DocumentError> {
        let applied = self.document.apply(transaction)?;
        self.history.record(&applied);
        self.remap_selection(&applied);
        Ok(applied)
    }

    fn remap_selection(&mut self, applied: &Applied) {
        self.selection = self
            .selection
            .take()
            .and_then(|selection| selection.remap(&self.document, &applied.map));
    }

    // --- permissions and lifecycle ---

    pub fn editing_permitted(&self) -> bool {
        self.editing_permitted
    }

    /// Revoking permission mid-drag commits the size reached so far before
    /// the editor turns read-only.
    pub fn set_editing_permitted(&mut self, permitted: bool) {
        if !permitted && self.editing_permitted {
            if let Some(size) = self.end_resize(None) {
                tracing::debug!(?size, "editing revoked, resize committed");
            }
        }
        self.editing_permitted = permitted;
    }

    pub(crate) fn is_editable(&self) -> bool {
        self.editing_permitted && !self.closed
    }

    /// Tear the editor down. A drag in progress is dropped uncommitted, and
    /// late ingest completions are dropped afterwards.
    pub fn close(&mut self) {
        self.closed = true;
        self.resize.cancel();
        self.batches.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // --- selection ---

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Select the node at `path`. Returns its reference, or `None` if there
    /// is no such node.
    pub fn select_node(&mut self, path: &[usize]) -> Option<NodeRef> {
        let node = self.document.node_ref(path)?;
        self.selection = Some(Selection::Node(node.clone()));
        Some(node)
    }

    pub fn set_cursor(&mut self, gap: usize) {
        self.selection = Some(Selection::Cursor(gap.min(self.document.len())));
    }

    /// Blur. A drag in progress keeps its own target and still commits on
    /// release.
    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Resize handles for the current selection.
    pub fn decorations(&self, geometry: &impl ViewGeometry) -> Vec<HandleDescriptor> {
        decoration::decorations(&self.document, self.selection.as_ref(), geometry)
    }

    // --- resize gesture ---

    pub fn is_resizing(&self) -> bool {
        self.resize.is_dragging()
    }

    pub fn resize_session(&self) -> Option<&ResizeSession> {
        self.resize.session()
    }

    /// Pointer-down on a handle of the selected image.
    pub fn begin_resize(
        &mut self,
        direction: Compass,
        pointer: Point,
        geometry: &impl ViewGeometry,
    ) -> Result<(), ResizeError> {
        if !self.is_editable() {
            return Err(ResizeError::EditingNotPermitted);
        }
        if self.resize.is_dragging() {
            return Err(ResizeError::SessionActive);
        }
        let node = self
            .selection
            .as_ref()
            .and_then(Selection::node)
            .ok_or(ResizeError::NoImageSelected)?;
        let image = match self.document.image(node) {
            Ok(image) => image,
            Err(DocumentError::NotAnImage { .. }) => return Err(ResizeError::NoImageSelected),
            Err(err) => return Err(err.into()),
        };
        let target = self.document.refresh(node)?;
        let start = geometry
            .node_rect(&target)
            .map(|rect| Dimensions::new(rect.width.round() as u32, rect.height.round() as u32))
            .or_else(|| image.size())
            .or_else(|| self.known_natural_size(image))
            .unwrap_or(Dimensions::new(0, 0));

        self.resize
            .begin(ResizeSession::new(target, direction, pointer, start))
    }

    /// Pointer-move. Returns the preview size; the document is not touched.
    pub fn update_resize(&mut self, pointer: Point) -> Option<Dimensions> {
        self.resize.update(pointer)
    }

    /// Pointer-up. Commits the final size in one transaction.
    ///
    /// Returns the committed size, or `None` when idle or when the target
    /// node no longer exists.
    pub fn end_resize(&mut self, pointer: Option<Point>) -> Option<Dimensions> {
        let (target, size) = self.resize.finish(pointer)?;
        match self.commit_size(&target, size) {
            Ok(_) => Some(size),
            Err(err) => {
                tracing::debug!(%err, "resize target gone, nothing committed");
                None
            }
        }
    }

    fn commit_size(&mut self, node: &NodeRef, size: Dimensions) -> Result<Applied, DocumentError> {
        let mut attrs = self.document.image(node)?.clone();
        attrs.width = Some(size.width);
        attrs.height = Some(size.height);
        self.apply(Transaction::new().set_node_attributes(node.clone(), attrs))
    }

    /// Natural size from the image itself or from an earlier upload.
    fn known_natural_size(&self, image: &ImageNode) -> Option<Dimensions> {
        image.embedded_size().or_else(|| {
            image
                .src
                .locator()
                .and_then(|locator| self.natural_sizes.get(locator).copied())
        })
    }

    /// Restore an image's natural pixel size.
    pub fn reset_to_natural_size(
        &mut self,
        node: &NodeRef,
        source: &impl NaturalSizeSource,
    ) -> Result<Dimensions, ResizeError> {
        if !self.is_editable() {
            return Err(ResizeError::EditingNotPermitted);
        }
        let image = self.document.image(node)?;
        let natural = self
            .known_natural_size(image)
            .or_else(|| source.natural_size(&image.src))
            .ok_or(ResizeError::NaturalSizeUnknown)?;
        self.commit_size(node, natural)?;
        Ok(natural)
    }

    /// Set an exact size. With `keep_aspect`, `height` is ignored and derived
    /// from `width` and the image's current proportions.
    pub fn set_image_size(
        &mut self,
        node: &NodeRef,
        width: u32,
        height: u32,
        keep_aspect: bool,
    ) -> Result<Dimensions, ResizeError> {
        if !self.is_editable() {
            return Err(ResizeError::EditingNotPermitted);
        }
        let image = self.document.image(node)?;
        let height = match image.size().or_else(|| self.known_natural_size(image)) {
            Some(current) if keep_aspect && current.width > 0 => {
                (width as f64 * current.height as f64 / current.width as f64).round() as u32
            }
            _ => height,
        };
        let size = Dimensions::new(width.max(1), height.max(1));
        self.commit_size(node, size)?;
        Ok(size)
    }

    // --- structural edits ---

    /// Insert an image at the selection (or at the end) and move the cursor
    /// after it. `None` when editing is not permitted.
    pub fn insert_image(&mut self, image: ImageNode) -> Option<NodeRef> {
        if !self.is_editable() {
            return None;
        }
        let gap = self.insertion_gap();
        match self.apply(Transaction::new().insert_node(gap, Block::Image(image))) {
            Ok(applied) => {
                self.set_cursor(gap + 1);
                Some(NodeRef::new(vec![gap], applied.revision))
            }
            Err(err) => {
                tracing::warn!(%err, "image insert failed");
                None
            }
        }
    }

    pub(crate) fn insertion_gap(&self) -> usize {
        self.selection
            .as_ref()
            .and_then(|selection| selection.insertion_gap(&self.document))
            .unwrap_or(self.document.len())
    }

    /// Remove the top-level block holding the selected node.
    pub fn delete_selection(&mut self) -> bool {
        if !self.is_editable() {
            return false;
        }
        let Some(Selection::Node(node)) = self.selection.clone() else {
            return false;
        };
        let Ok(path) = self.document.resolve(&node) else {
            self.selection = None;
            return false;
        };
        match self.apply(Transaction::new().delete_range(path[0]..path[0] + 1)) {
            Ok(_) => {
                self.set_cursor(path[0]);
                true
            }
            Err(err) => {
                tracing::warn!(%err, "delete failed");
                false
            }
        }
    }

    // --- history ---

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        let result = self.history.undo(&mut self.document);
        self.finish_history_step(result, "undo")
    }

    pub fn redo(&mut self) -> bool {
        let result = self.history.redo(&mut self.document);
        self.finish_history_step(result, "redo")
    }

    fn finish_history_step(
        &mut self,
        result: Result<Option<Applied>, DocumentError>,
        action: &str,
    ) -> bool {
        match result {
            Ok(Some(applied)) => {
                self.remap_selection(&applied);
                true
            }
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(%err, action, "history step failed, clearing history");
                self.history.clear();
                false
            }
        }
    }

    // --- saving ---

    /// Save the document under `title`.
    ///
    /// A blank title is rejected before the store is called. The outcome is
    /// reported through the notifier either way.
    pub async fn save_article(
        &mut self,
        title: &str,
        store: &impl ArticleStore,
    ) -> Result<ArticleRecord, SaveError> {
        let title = title.trim();
        if title.is_empty() {
            let err = SaveError::EmptyTitle;
            self.notify(NotifyKind::Error, &err.to_string());
            return Err(err);
        }
        let draft = ArticleDraft {
            id: self.article_id.clone(),
            title: title.to_string(),
            content: self.document.to_markup(),
        };
        match store.save(draft).await {
            Ok(record) => {
                tracing::info!(id = %record.id, "article saved");
                self.article_id = Some(record.id.clone());
                self.notify(NotifyKind::Success, "Article saved");
                Ok(record)
            }
            Err(err) => {
                tracing::warn!(%err, "article save failed");
                self.notify(NotifyKind::Error, &err.to_string());
                Err(err)
            }
        }
    }
}
