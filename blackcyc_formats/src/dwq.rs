use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::bitmap::PackedBitmap;
use crate::codec::CodecTable;
use crate::error::DwqError;
use crate::pixel::{PixelFormat, PixelImage};
use crate::region::StreamRegion;

/// Size of the DWQ resource header.
pub const HEADER_SIZE: u64 = 0x40;

/// Container-level metadata extracted from the 64-byte resource header.
#[derive(Debug, Clone)]
pub struct DwqMetadata {
    pub width: u32,
    pub height: u32,
    /// Bit depth the container presents to consumers; always 32.
    pub bpp: u32,
    /// Trimmed ASCII tag naming the payload family, e.g. `PACKBMP` or `JPEG`.
    pub base_type: String,
    /// Payload length in bytes; meaningful for pack types 3 and 7 only.
    pub packed_size: i32,
    pub pack_type: u16,
    /// A second packed bitmap follows the colour payload as an alpha mask.
    pub alpha: bool,
}

/// Probe a stream for a DWQ resource header.
///
/// Consumes the first 0x40 bytes. Returns `Ok(None)` when the stream is too
/// short or the trailing `PACKTYPE=` text does not match; the bytes may
/// belong to some other format entirely, so a caller cycling through
/// candidate decoders can move on to the next one.
pub fn read_metadata<R: Read>(reader: &mut R) -> Result<Option<DwqMetadata>, DwqError> {
    let mut header = [0u8; HEADER_SIZE as usize];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let Some((pack_type, alpha)) = parse_pack_type(&header[0x30..0x40]) else {
        return Ok(None);
    };

    Ok(Some(DwqMetadata {
        width: u32::from_le_bytes(header[0x24..0x28].try_into().unwrap()),
        height: u32::from_le_bytes(header[0x28..0x2C].try_into().unwrap()),
        bpp: 32,
        base_type: trim_tag(&header[..0x10]),
        packed_size: i32::from_le_bytes(header[0x20..0x24].try_into().unwrap()),
        pack_type,
        alpha,
    }))
}

/// Match `PACKTYPE=<digits><optional 'A'><trailing spaces>` against the
/// fixed-width text field. At least one trailing space is required.
fn parse_pack_type(field: &[u8]) -> Option<(u16, bool)> {
    let rest = field.strip_prefix(b"PACKTYPE=")?;
    let digits_len = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits_len == 0 {
        return None;
    }
    let digits = std::str::from_utf8(&rest[..digits_len]).ok()?;
    let pack_type: u16 = digits.parse().ok()?;

    let mut tail = &rest[digits_len..];
    let alpha = tail.first() == Some(&b'A');
    if alpha {
        tail = &tail[1..];
    }
    if tail.is_empty() || tail.iter().any(|&b| b != b' ') {
        return None;
    }
    Some((pack_type, alpha))
}

fn trim_tag(field: &[u8]) -> String {
    let end = field
        .iter()
        .rposition(|&b| b != 0 && b != b' ')
        .map_or(0, |index| index + 1);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Decoder for DWQ container images.
///
/// Standard-format payloads (BMP/JPEG/PNG) are delegated to the codecs in
/// the injected [`CodecTable`]; packed payloads are decoded in-crate. The
/// decoder holds no per-call state, so one instance can serve any number of
/// decode calls, concurrent ones included, as long as each call gets its
/// own stream.
pub struct DwqDecoder {
    codecs: CodecTable,
}

impl DwqDecoder {
    /// Decoder with the `image`-crate-backed standard codecs.
    pub fn new() -> Self {
        DwqDecoder {
            codecs: CodecTable::with_standard_codecs(),
        }
    }

    /// Decoder with a caller-supplied codec table.
    pub fn with_codecs(codecs: CodecTable) -> Self {
        DwqDecoder { codecs }
    }

    /// Decode the container payload described by `meta`.
    ///
    /// `reader` must be the stream `read_metadata` consumed the header
    /// from. Payload windows are addressed by absolute offset, so the
    /// stream's current cursor position does not matter.
    pub fn decode<R: Read + Seek>(
        &self,
        reader: &mut R,
        meta: &DwqMetadata,
    ) -> Result<PixelImage, DwqError> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        if stream_len < HEADER_SIZE {
            return Err(DwqError::Truncated("locating the container payload"));
        }

        match meta.pack_type {
            0 => {
                let mut image =
                    self.delegate(reader, meta, "BMP", stream_len - HEADER_SIZE)?;
                // The container stores bottom-up BMP content non-conformingly.
                image.flip_vertical();
                Ok(image)
            }
            5 => self.delegate(reader, meta, "JPEG", stream_len - HEADER_SIZE),
            8 => self.delegate(reader, meta, "PNG", stream_len - HEADER_SIZE),
            7 => {
                let packed = packed_payload_len(meta, stream_len)?;
                let image = self.delegate(reader, meta, "JPEG", packed)?;
                self.finish_with_mask(reader, meta, image, stream_len)
            }
            3 => {
                let packed = packed_payload_len(meta, stream_len)?;
                let region = StreamRegion::new(&mut *reader, HEADER_SIZE, packed)?;
                let image = PackedBitmap::parse(region, meta.width, meta.height)?.unpack()?;
                self.finish_with_mask(reader, meta, image, stream_len)
            }
            other => Err(DwqError::UnsupportedPackType(other)),
        }
    }

    fn delegate<R: Read + Seek>(
        &self,
        reader: &mut R,
        meta: &DwqMetadata,
        tag: &'static str,
        len: u64,
    ) -> Result<PixelImage, DwqError> {
        let codec = self.codecs.get(tag)?;
        let mut region = StreamRegion::new(&mut *reader, HEADER_SIZE, len)?;
        let mut payload = Vec::with_capacity(len as usize);
        region.read_to_end(&mut payload)?;
        codec.decode(&payload, meta)
    }

    fn finish_with_mask<R: Read + Seek>(
        &self,
        reader: &mut R,
        meta: &DwqMetadata,
        image: PixelImage,
        stream_len: u64,
    ) -> Result<PixelImage, DwqError> {
        if !meta.alpha {
            return Ok(image);
        }
        let mask_offset = HEADER_SIZE + meta.packed_size as u64;
        let region = StreamRegion::new(&mut *reader, mask_offset, stream_len - mask_offset)?;
        apply_alpha_mask(image, region, meta)
    }
}

impl Default for DwqDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn packed_payload_len(meta: &DwqMetadata, stream_len: u64) -> Result<u64, DwqError> {
    let declared = meta.packed_size;
    if declared < 0 || HEADER_SIZE + declared as u64 > stream_len {
        return Err(DwqError::InvalidPackedSize {
            declared,
            stream_len,
        });
    }
    Ok(declared as u64)
}

/// Merge a packed mask bitmap into the colour image's alpha channel.
///
/// Masks are expected as 8 bpp indexed bitmaps; any other depth leaves the
/// colour image untouched. Each mask pixel contributes the mean of its
/// palette colour's channels as the alpha value, in row-major order.
fn apply_alpha_mask<R: Read + Seek>(
    image: PixelImage,
    mask_region: StreamRegion<R>,
    meta: &DwqMetadata,
) -> Result<PixelImage, DwqError> {
    let mask = PackedBitmap::parse(mask_region, meta.width, meta.height)?;
    if mask.format() != PixelFormat::Indexed8 {
        return Ok(image);
    }
    let mask = mask.unpack()?;
    let palette = mask.palette.as_ref().ok_or(DwqError::PaletteMissing)?;

    let mut out = image.into_bgra32()?;
    for (pixel, &index) in out.data.chunks_exact_mut(4).zip(&mask.data) {
        let [r, g, b] =
            *palette
                .get(index as usize)
                .ok_or(DwqError::PaletteIndexOutOfRange {
                    index,
                    len: palette.len(),
                })?;
        pixel[3] = ((u16::from(r) + u16::from(g) + u16::from(b)) / 3) as u8;
    }
    Ok(out)
}

/// Encoding DWQ containers is not supported; the format is decode-only.
pub fn encode<W: Write>(_writer: W, _image: &PixelImage) -> Result<(), DwqError> {
    Err(DwqError::WriteUnsupported)
}
