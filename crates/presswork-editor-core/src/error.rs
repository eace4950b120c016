//! Editor error types.

use miette::Diagnostic;
use presswork_media::{CompressionError, UploadError};
use thiserror::Error;

use crate::node::NodeKind;

/// Errors from applying a transaction. A failed transaction leaves the
/// document untouched.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum DocumentError {
    /// The node a reference pointed at has been deleted, or the reference is
    /// older than the retained step-map log.
    #[error("node reference {path:?}@{revision} no longer resolves")]
    #[diagnostic(code(document::stale_reference))]
    StaleReference { path: Vec<usize>, revision: u64 },

    #[error("no node at {path:?}")]
    #[diagnostic(code(document::no_such_node))]
    NoSuchNode { path: Vec<usize> },

    #[error("expected an image at {path:?}, found {found:?}")]
    #[diagnostic(code(document::not_an_image))]
    NotAnImage { path: Vec<usize>, found: NodeKind },

    #[error("position {position} is outside the document (length {len})")]
    #[diagnostic(code(document::out_of_bounds))]
    OutOfBounds { position: usize, len: usize },
}

/// Reasons a resize gesture was not started or applied.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum ResizeError {
    #[error("editing is not permitted")]
    #[diagnostic(code(resize::not_permitted))]
    EditingNotPermitted,

    #[error("a resize is already in progress")]
    #[diagnostic(code(resize::session_active))]
    SessionActive,

    #[error("no image is selected")]
    #[diagnostic(code(resize::no_image_selected))]
    NoImageSelected,

    #[error("natural size of the image is unknown")]
    #[diagnostic(code(resize::natural_size_unknown))]
    NaturalSizeUnknown,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Document(#[from] DocumentError),
}

/// A candidate file rejected before any bytes were read.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{name} is not an image ({declared_type})")]
    #[diagnostic(code(ingest::not_an_image), help("only image files can be inserted"))]
    NotAnImage { name: String, declared_type: String },

    #[error("{name} is {len} bytes, over the {limit} byte limit")]
    #[diagnostic(code(ingest::too_large))]
    TooLarge { name: String, len: u64, limit: u64 },
}

/// Failure of one image in an ingest batch.
#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Upload(#[from] UploadError),

    #[error("image could not be inserted: {message}")]
    #[diagnostic(code(ingest::unexpected))]
    Unexpected { message: String },
}

impl IngestError {
    pub fn unexpected(message: impl std::fmt::Display) -> Self {
        IngestError::Unexpected {
            message: message.to_string(),
        }
    }
}

impl From<presswork_media::MediaError> for IngestError {
    fn from(err: presswork_media::MediaError) -> Self {
        match err {
            presswork_media::MediaError::Compression(e) => IngestError::Compression(e),
            presswork_media::MediaError::Upload(e) => IngestError::Upload(e),
        }
    }
}

/// Errors from saving an article.
#[derive(Debug, Error, Diagnostic)]
pub enum SaveError {
    #[error("an article needs a title")]
    #[diagnostic(code(save::empty_title))]
    EmptyTitle,

    #[error("article store failed: {message}")]
    #[diagnostic(code(save::store))]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
}

impl SaveError {
    pub fn store(message: impl Into<String>) -> Self {
        SaveError::Store {
            message: message.into(),
            source: None,
        }
    }
}
