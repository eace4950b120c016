//! presswork-media: image compression, object storage and upload.
//!
//! - [`CompressionEngine`] re-encodes arbitrary images under a byte ceiling
//! - [`ObjectStore`] implementations with create-only writes
//! - [`AssetResolver`] names uploads and derives public locators
//! - [`MediaPipeline`] chains the two

pub mod codec;
pub mod compress;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod store;

pub use codec::{
    Dimensions, ImageCodec, JpegCodec, extension_for, probe_dimensions, sniff_image_type,
};
pub use compress::{CompressedImage, CompressionEngine, initial_quality, max_dimension_for};
pub use error::{CodecError, CompressionError, MediaError, StoreError, UploadError};
pub use pipeline::{MediaPipeline, PublishedImage};
pub use resolver::{AssetResolver, Locator, NameGenerator, UploadRecord};
#[cfg(feature = "http-store")]
pub use store::HttpStore;
pub use store::{FsStore, MemoryStore, ObjectStore, StoredObject};
