use thiserror::Error;

/// Error conditions raised while decoding a DWQ container.
///
/// A header that simply fails the `PACKTYPE` probe is not an error; see
/// [`crate::dwq::read_metadata`], which reports that case as `Ok(None)` so a
/// caller cycling through candidate formats can move on.
#[derive(Debug, Error)]
pub enum DwqError {
    #[error("packed bitmap is {actual_width}x{actual_height} but the container declares {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: i32,
        actual_height: i32,
    },
    #[error("unsupported packed bitmap depth of {0} bits per pixel")]
    UnsupportedDepth(u16),
    #[error("unsupported pack type {0}")]
    UnsupportedPackType(u16),
    #[error("packed payload size {declared} does not fit a {stream_len}-byte container")]
    InvalidPackedSize { declared: i32, stream_len: u64 },
    #[error("zero run of {run} bytes overflows a {stride}-byte row")]
    RunOverflowsRow { run: usize, stride: usize },
    #[error("pixel index {index} is outside the {len}-colour palette")]
    PaletteIndexOutOfRange { index: u8, len: usize },
    #[error("indexed bitmap carries no palette")]
    PaletteMissing,
    #[error("unexpected end of stream while {0}")]
    Truncated(&'static str),
    #[error("no codec registered for tag {0:?}")]
    MissingCodec(&'static str),
    #[error("{tag} payload failed to decode")]
    Codec {
        tag: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("DWQ images are decode-only; writing is not supported")]
    WriteUnsupported,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
