//! Adaptive compression engine.
//!
//! Picks a starting quality from the input's byte size and a long-edge cap
//! from its pixel size, encodes, and while the result is over the byte
//! ceiling re-encodes at a quality scaled by `ceiling / produced`. The
//! quality strictly decreases every round and the round count is capped, so
//! the loop always terminates.

use bytes::Bytes;
use presswork_common::{CompressionConfig, MIB};

use crate::codec::{Dimensions, ImageCodec, JpegCodec};
use crate::error::CompressionError;

/// Extra shrink applied on top of the proportional quality estimate so the
/// next attempt lands under the ceiling rather than just at it.
const RETRY_MARGIN: f32 = 0.95;

/// Starting quality keyed by input byte size: larger inputs start lower.
pub fn initial_quality(input_len: u64) -> f32 {
    const HALF_MIB: u64 = MIB / 2;
    match input_len {
        n if n > 5 * MIB => 0.60,
        n if n > 2 * MIB => 0.70,
        n if n > MIB => 0.75,
        n if n > HALF_MIB => 0.80,
        _ => 0.85,
    }
}

/// Long-edge cap keyed by natural dimensions. Images at or below 1000px keep
/// their natural size.
pub fn max_dimension_for(natural: Dimensions) -> u32 {
    match natural.long_edge() {
        n if n > 2000 => 1500,
        n if n > 1500 => 1200,
        n if n > 1000 => 1000,
        n => n,
    }
}

/// The parameters and result of one compression job.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Bytes,
    pub content_type: &'static str,
    /// Quality of the accepted encode.
    pub quality: f32,
    /// Output pixel dimensions.
    pub dimensions: Dimensions,
    /// Input pixel dimensions.
    pub natural: Dimensions,
    pub attempts: u32,
}

/// Compression engine over an [`ImageCodec`].
#[derive(Debug, Clone)]
pub struct CompressionEngine<C = JpegCodec> {
    codec: C,
    config: CompressionConfig,
}

impl Default for CompressionEngine<JpegCodec> {
    fn default() -> Self {
        Self::new(JpegCodec::default(), CompressionConfig::default())
    }
}

impl<C: ImageCodec> CompressionEngine<C> {
    pub fn new(codec: C, config: CompressionConfig) -> Self {
        Self { codec, config }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Compress `bytes`, whose declared length is `declared_len`.
    ///
    /// Returns an image no larger than `max_output_bytes`, or
    /// [`CompressionError::CompressionFailed`] once the floor quality (or the
    /// attempt cap) still produces an oversized result.
    #[tracing::instrument(level = "debug", skip(self, bytes), fields(input_len = bytes.len()))]
    pub fn compress(
        &self,
        bytes: &[u8],
        declared_len: u64,
    ) -> Result<CompressedImage, CompressionError> {
        let ceiling = self.config.max_output_bytes;
        let floor = self.config.quality_floor;

        let image = self.codec.decode(bytes)?;
        let natural = self.codec.dimensions(&image);
        let target = natural.fit_within(max_dimension_for(natural));
        let image = if target != natural {
            tracing::debug!(?natural, ?target, "downscaling");
            self.codec.resize(image, target)
        } else {
            image
        };

        let mut quality = initial_quality(declared_len).max(floor);
        let mut attempted = quality;
        let mut produced = 0;
        let mut attempts = 0;

        while attempts < self.config.max_attempts {
            attempts += 1;
            attempted = quality;
            let encoded = self.codec.encode(&image, quality)?;
            produced = encoded.len() as u64;
            tracing::debug!(attempts, quality, produced, ceiling, "encoded");

            if produced <= ceiling {
                return Ok(CompressedImage {
                    bytes: Bytes::from(encoded),
                    content_type: self.codec.content_type(),
                    quality,
                    dimensions: target,
                    natural,
                    attempts,
                });
            }
            if quality <= floor {
                break;
            }
            quality = (quality * (ceiling as f32 / produced as f32) * RETRY_MARGIN).max(floor);
        }

        tracing::warn!(attempts, quality = attempted, produced, ceiling, "compression failed");
        Err(CompressionError::CompressionFailed {
            ceiling,
            produced,
            quality: attempted,
            attempts,
        })
    }
}
