//! Compress-then-upload.

use crate::codec::{Dimensions, ImageCodec, JpegCodec};
use crate::compress::CompressionEngine;
use crate::error::MediaError;
use crate::resolver::{AssetResolver, UploadRecord};
use crate::store::ObjectStore;

/// A compressed image that has been persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedImage {
    pub record: UploadRecord,
    /// Pixel size of the stored asset.
    pub dimensions: Dimensions,
    /// Pixel size of the original input.
    pub natural: Dimensions,
    pub quality: f32,
    pub stored_len: usize,
}

/// Runs the compression engine and hands the result to the resolver.
#[derive(Debug, Clone)]
pub struct MediaPipeline<S, C = JpegCodec> {
    engine: CompressionEngine<C>,
    resolver: AssetResolver<S>,
}

impl<S: ObjectStore, C: ImageCodec> MediaPipeline<S, C> {
    pub fn new(engine: CompressionEngine<C>, resolver: AssetResolver<S>) -> Self {
        Self { engine, resolver }
    }

    pub fn engine(&self) -> &CompressionEngine<C> {
        &self.engine
    }

    pub fn resolver(&self) -> &AssetResolver<S> {
        &self.resolver
    }

    /// Compress `bytes` and upload the result.
    ///
    /// Nothing is written to the store if compression fails.
    pub async fn publish(&self, bytes: &[u8], declared_len: u64) -> Result<PublishedImage, MediaError> {
        let compressed = self.engine.compress(bytes, declared_len)?;
        let stored_len = compressed.bytes.len();
        let record = self
            .resolver
            .upload(compressed.bytes, compressed.content_type)
            .await?;
        Ok(PublishedImage {
            record,
            dimensions: compressed.dimensions,
            natural: compressed.natural,
            quality: compressed.quality,
            stored_len,
        })
    }
}
