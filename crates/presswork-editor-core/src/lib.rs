//! presswork-editor-core: article editing without a UI framework.
//!
//! This crate provides:
//! - `Document` - block tree with atomic transactions and revision mapping
//! - `to_markup` / `from_markup` - the stored HTML-like article format
//! - `decorations` - resize handles for the selected image
//! - `ResizeController` - the drag-to-resize gesture
//! - `Editor` - selection, undo, image ingest and saving, driven by the host
//!   through the traits in `platform`

pub mod article;
pub mod decoration;
pub mod document;
pub mod editor;
pub mod error;
pub mod history;
pub mod ingest;
pub mod mapping;
pub mod markup;
pub mod node;
pub mod platform;
pub mod resize;
pub mod selection;

pub use article::{ArticleDraft, ArticleRecord, ArticleStore};
pub use decoration::{Compass, HANDLE_SIZE, HandleDescriptor, Point, Rect, decorations, hit_test};
pub use document::{Applied, Document, NodeRef, Operation, Transaction};
pub use editor::Editor;
pub use error::{DocumentError, IngestError, ResizeError, SaveError, ValidationError};
pub use history::History;
pub use ingest::{
    BatchId, Disposition, IncomingFile, IngestJob, IngestOutcome, IngestSource, IngestedImage,
    MemoryFile,
};
pub use mapping::{MapLog, Step, StepMap};
pub use markup::{Markup, from_markup, to_markup};
pub use node::{AssetRef, Block, ImageNode, Inline, Mark, NodeKind, TextAlign, TextRun};
pub use platform::{NaturalSizeSource, Notifier, NotifyKind, TracingNotifier, ViewGeometry};
pub use presswork_media::{Dimensions, Locator};
pub use resize::{MIN_DIMENSION, ResizeController, ResizeSession, compute_size};
pub use selection::Selection;
pub use smol_str::SmolStr;
