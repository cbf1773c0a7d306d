use std::collections::HashMap;

use image::{DynamicImage, GenericImageView};

use crate::dwq::DwqMetadata;
use crate::error::DwqError;
use crate::pixel::{PixelFormat, PixelImage};

/// Decode capability for a wrapped standard raster payload.
///
/// Implementations receive the payload bytes of a single delegated window
/// plus the container's declared metadata, and produce decoded pixels. The
/// dispatcher never touches the payload itself.
pub trait PixelCodec: Send + Sync {
    fn decode(&self, data: &[u8], meta: &DwqMetadata) -> Result<PixelImage, DwqError>;
}

/// Codec lookup table handed to [`crate::dwq::DwqDecoder`] at construction.
///
/// Replaces catalog-style global lookup with explicit injection: whoever
/// builds the decoder decides which codec answers each tag.
pub struct CodecTable {
    entries: HashMap<&'static str, Box<dyn PixelCodec>>,
}

impl CodecTable {
    pub fn empty() -> Self {
        CodecTable {
            entries: HashMap::new(),
        }
    }

    /// Table backed by the `image` crate for the three tags the DWQ
    /// dispatcher asks for.
    pub fn with_standard_codecs() -> Self {
        let mut table = Self::empty();
        table.register("BMP", Box::new(ImageCodec::new("BMP", image::ImageFormat::Bmp)));
        table.register("JPEG", Box::new(ImageCodec::new("JPEG", image::ImageFormat::Jpeg)));
        table.register("PNG", Box::new(ImageCodec::new("PNG", image::ImageFormat::Png)));
        table
    }

    pub fn register(&mut self, tag: &'static str, codec: Box<dyn PixelCodec>) {
        self.entries.insert(tag, codec);
    }

    pub(crate) fn get(&self, tag: &'static str) -> Result<&dyn PixelCodec, DwqError> {
        self.entries
            .get(tag)
            .map(|codec| codec.as_ref())
            .ok_or(DwqError::MissingCodec(tag))
    }
}

impl Default for CodecTable {
    fn default() -> Self {
        Self::with_standard_codecs()
    }
}

/// `image`-crate adapter satisfying [`PixelCodec`] for one format.
struct ImageCodec {
    tag: &'static str,
    format: image::ImageFormat,
}

impl ImageCodec {
    fn new(tag: &'static str, format: image::ImageFormat) -> Self {
        ImageCodec { tag, format }
    }
}

impl PixelCodec for ImageCodec {
    fn decode(&self, data: &[u8], _meta: &DwqMetadata) -> Result<PixelImage, DwqError> {
        let decoded =
            image::load_from_memory_with_format(data, self.format).map_err(|err| {
                DwqError::Codec {
                    tag: self.tag,
                    source: Box::new(err),
                }
            })?;
        Ok(from_dynamic(decoded))
    }
}

/// Map a `DynamicImage` into the pipeline's BGR-ordered layouts: straight
/// RGB output stays 3 bytes per pixel, everything else goes through RGBA.
fn from_dynamic(decoded: DynamicImage) -> PixelImage {
    let (width, height) = decoded.dimensions();
    match decoded {
        DynamicImage::ImageRgb8(rgb) => {
            let mut data = rgb.into_raw();
            for pixel in data.chunks_exact_mut(3) {
                pixel.swap(0, 2);
            }
            PixelImage {
                width,
                height,
                format: PixelFormat::Bgr24,
                stride: width as usize * 3,
                palette: None,
                data,
            }
        }
        other => {
            let mut data = other.into_rgba8().into_raw();
            for pixel in data.chunks_exact_mut(4) {
                pixel.swap(0, 2);
            }
            PixelImage {
                width,
                height,
                format: PixelFormat::Bgra32,
                stride: width as usize * 4,
                palette: None,
                data,
            }
        }
    }
}
