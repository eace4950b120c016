//! Error types for compression, storage and upload.

use miette::Diagnostic;
use thiserror::Error;

/// Errors from an [`ImageCodec`](crate::ImageCodec).
#[derive(Debug, Error, Diagnostic)]
pub enum CodecError {
    #[error("input is not a decodable image")]
    #[diagnostic(code(media::decode))]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image")]
    #[diagnostic(code(media::encode))]
    Encode(#[source] image::ImageError),
}

/// Errors from the compression engine.
#[derive(Debug, Error, Diagnostic)]
pub enum CompressionError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Codec(#[from] CodecError),

    /// The floor quality (or the attempt cap) was reached and the result is
    /// still over the ceiling.
    #[error(
        "could not compress image below {ceiling} bytes (last attempt: {produced} bytes at quality {quality:.2} after {attempts} attempts)"
    )]
    #[diagnostic(
        code(media::compression_failed),
        help("use a smaller or simpler image")
    )]
    CompressionFailed {
        ceiling: u64,
        produced: u64,
        quality: f32,
        attempts: u32,
    },
}

/// Errors from an [`ObjectStore`](crate::ObjectStore).
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum StoreError {
    /// The store refused to replace an existing object.
    #[error("object {name} already exists")]
    #[diagnostic(code(store::exists))]
    AlreadyExists { name: String },

    #[error("invalid object name {name}: {reason}")]
    #[diagnostic(code(store::name))]
    InvalidName { name: String, reason: &'static str },

    /// Transport or service failure.
    #[error("storage unavailable: {message}")]
    #[diagnostic(code(store::unavailable))]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn unavailable_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Errors from the upload & reference resolver.
#[derive(Debug, Error, Diagnostic)]
pub enum UploadError {
    #[error("generated name {name} collided with an existing object")]
    #[diagnostic(code(upload::collision))]
    NameCollision { name: String },

    #[error("storage unavailable")]
    #[diagnostic(code(upload::storage_unavailable))]
    StorageUnavailable(#[source] StoreError),

    #[error("cannot derive a public locator for {name}: {message}")]
    #[diagnostic(code(upload::locator))]
    Locator { name: String, message: String },
}

impl From<StoreError> for UploadError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists { name } => UploadError::NameCollision { name },
            other => UploadError::StorageUnavailable(other),
        }
    }
}

/// Error from the compress-then-upload pipeline.
#[derive(Debug, Error, Diagnostic)]
pub enum MediaError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Upload(#[from] UploadError),
}
