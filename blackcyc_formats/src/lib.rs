//! Decoders for the Black Cyc engine's resource formats.
//!
//! The DWQ container wraps either a standard raster payload (BMP/JPEG/PNG)
//! or a custom run-length + row-XOR packed bitmap, optionally followed by a
//! second packed bitmap that supplies the alpha channel.

pub mod bitmap;
pub mod codec;
pub mod dwq;
pub mod error;
pub mod pixel;
pub mod region;

pub use bitmap::PackedBitmap;
pub use codec::{CodecTable, PixelCodec};
pub use dwq::{DwqDecoder, DwqMetadata, HEADER_SIZE, read_metadata};
pub use error::DwqError;
pub use pixel::{PixelFormat, PixelImage};
pub use region::StreamRegion;
