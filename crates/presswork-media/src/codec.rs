//! Image codec abstraction and the shipped JPEG codec.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader, Rgb, RgbImage};
use mime_sniffer::MimeTypeSniffer;

use crate::error::CodecError;

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The longer of the two edges.
    pub fn long_edge(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Scale down so the long edge is at most `max_edge`, keeping the aspect
    /// ratio. Never enlarges.
    pub fn fit_within(self, max_edge: u32) -> Self {
        let long = self.long_edge();
        if long <= max_edge || long == 0 {
            return self;
        }
        let scale = max_edge as f64 / long as f64;
        if self.width >= self.height {
            Self::new(
                max_edge,
                ((self.height as f64 * scale).round() as u32).max(1),
            )
        } else {
            Self::new(((self.width as f64 * scale).round() as u32).max(1), max_edge)
        }
    }
}

/// Decode / resize / encode operations the compression engine needs.
///
/// The engine decodes once and re-encodes the same decoded image at
/// decreasing qualities, so decoding and encoding are separate steps.
pub trait ImageCodec {
    /// Decoded image representation.
    type Image;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Image, CodecError>;

    fn dimensions(&self, image: &Self::Image) -> Dimensions;

    fn resize(&self, image: Self::Image, target: Dimensions) -> Self::Image;

    /// Encode at `quality` in `0.0..=1.0`.
    fn encode(&self, image: &Self::Image, quality: f32) -> Result<Vec<u8>, CodecError>;

    /// MIME type of the encoded output.
    fn content_type(&self) -> &'static str;
}

/// Lossy JPEG output via the `image` crate. Decodes PNG, JPEG, GIF and WebP.
#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    filter: FilterType,
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }
}

impl JpegCodec {
    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl ImageCodec for JpegCodec {
    type Image = DynamicImage;

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError> {
        image::load_from_memory(bytes).map_err(CodecError::Decode)
    }

    fn dimensions(&self, image: &DynamicImage) -> Dimensions {
        let (width, height) = image.dimensions();
        Dimensions::new(width, height)
    }

    fn resize(&self, image: DynamicImage, target: Dimensions) -> DynamicImage {
        image.resize_exact(target.width, target.height, self.filter)
    }

    fn encode(&self, image: &DynamicImage, quality: f32) -> Result<Vec<u8>, CodecError> {
        let rgb = flatten_on_white(image);
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality_percent(quality));
        encoder.encode_image(&rgb).map_err(CodecError::Encode)?;
        Ok(out)
    }

    fn content_type(&self) -> &'static str {
        "image/jpeg"
    }
}

/// JPEG has no alpha; transparent pixels are composited onto white.
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Map `0.0..=1.0` onto the encoder's `1..=100` scale.
pub fn quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Read pixel dimensions from an encoded image's header without decoding it.
pub fn probe_dimensions(bytes: &[u8]) -> Option<Dimensions> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()?;
    Some(Dimensions::new(width, height))
}

/// Sniff an image MIME type from magic bytes. Returns `None` for non-images.
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    const IMAGE_TYPES: [&str; 8] = [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/bmp",
        "image/x-icon",
        "image/avif",
        "image/tiff",
    ];
    let sniffed = bytes.sniff_mime_type()?;
    IMAGE_TYPES.into_iter().find(|known| *known == sniffed)
}

/// File extension for an image MIME type.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/avif" => "avif",
        _ => "bin",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use image::ImageFormat;

    use super::*;

    /// PNG-encoded smooth gradient, cheap to compress.
    pub(crate) fn gradient_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_fit_within_landscape() {
        let dims = Dimensions::new(4000, 3000).fit_within(1500);
        assert_eq!(dims, Dimensions::new(1500, 1125));
    }

    #[test]
    fn test_fit_within_portrait() {
        let dims = Dimensions::new(1000, 2500).fit_within(1200);
        assert_eq!(dims, Dimensions::new(480, 1200));
    }

    #[test]
    fn test_fit_within_never_enlarges() {
        let dims = Dimensions::new(640, 480);
        assert_eq!(dims.fit_within(1000), dims);
    }

    #[test]
    fn test_quality_percent_clamps() {
        assert_eq!(quality_percent(0.85), 85);
        assert_eq!(quality_percent(0.0), 1);
        assert_eq!(quality_percent(1.5), 100);
    }

    #[test]
    fn test_probe_dimensions_reads_header() {
        let png = gradient_png(64, 48);
        assert_eq!(probe_dimensions(&png), Some(Dimensions::new(64, 48)));
        assert_eq!(probe_dimensions(b"definitely not an image"), None);
    }

    #[test]
    fn test_sniff_image_type() {
        let png = gradient_png(4, 4);
        assert_eq!(sniff_image_type(&png), Some("image/png"));
        assert_eq!(sniff_image_type(b"%PDF-1.7 hello"), None);
    }

    #[test]
    fn test_jpeg_codec_roundtrip_dimensions() {
        let codec = JpegCodec::default();
        let image = codec.decode(&gradient_png(120, 80)).unwrap();
        let small = codec.resize(image, Dimensions::new(60, 40));
        let jpeg = codec.encode(&small, 0.8).unwrap();

        assert_eq!(sniff_image_type(&jpeg), Some("image/jpeg"));
        assert_eq!(probe_dimensions(&jpeg), Some(Dimensions::new(60, 40)));
    }

    #[test]
    fn test_jpeg_lower_quality_is_smaller() {
        let codec = JpegCodec::default();
        let image = codec.decode(&gradient_png(256, 256)).unwrap();
        let high = codec.encode(&image, 0.95).unwrap();
        let low = codec.encode(&image, 0.1).unwrap();
        assert!(low.len() < high.len());
    }
}
