use std::io::{self, Read, Seek, SeekFrom};

use byteorder::ReadBytesExt;

use crate::error::DwqError;
use crate::pixel::{PixelFormat, PixelImage};

/// Size of the embedded header preceding each packed bitmap payload.
pub const SUB_HEADER_SIZE: usize = 0x36;

/// A packed bitmap positioned at the start of a payload window.
///
/// Parsing and unpacking are split because the mask path needs to look at
/// the pixel format before deciding whether to unpack at all: a mask that is
/// not 8 bpp is ignored without touching its pixel data.
#[derive(Debug)]
pub struct PackedBitmap<R> {
    input: R,
    width: u32,
    height: u32,
    format: PixelFormat,
    stride: usize,
    palette: Option<Vec<[u8; 3]>>,
}

impl<R: Read + Seek> PackedBitmap<R> {
    /// Read the embedded 0x36-byte header, load the palette when present and
    /// position the cursor at the declared pixel data offset.
    ///
    /// The declared dimensions must match the container's exactly; by the
    /// time a payload is being parsed the container format is already
    /// established, so a mismatch is a hard error rather than a probe miss.
    pub fn parse(
        mut input: R,
        expected_width: u32,
        expected_height: u32,
    ) -> Result<Self, DwqError> {
        let mut header = [0u8; SUB_HEADER_SIZE];
        read_exact_or(&mut input, &mut header, "reading a packed bitmap header")?;

        let width = i32::from_le_bytes(header[0x12..0x16].try_into().unwrap());
        let height = i32::from_le_bytes(header[0x16..0x1A].try_into().unwrap());
        if width != expected_width as i32 || height != expected_height as i32 {
            return Err(DwqError::DimensionMismatch {
                expected_width,
                expected_height,
                actual_width: width,
                actual_height: height,
            });
        }

        let bpp = u16::from_le_bytes(header[0x1C..0x1E].try_into().unwrap());
        let (format, stride) = match bpp {
            8 => (PixelFormat::Indexed8, expected_width as usize),
            16 => (PixelFormat::Bgr565, expected_width as usize * 2),
            24 => (PixelFormat::Bgr24, expected_width as usize * 3),
            32 => (PixelFormat::Bgr32, expected_width as usize * 4),
            other => return Err(DwqError::UnsupportedDepth(other)),
        };

        let palette = if format == PixelFormat::Indexed8 {
            let declared = i32::from_le_bytes(header[0x2E..0x32].try_into().unwrap());
            let colors = declared.clamp(0, 0x100) as usize;
            Some(read_palette(&mut input, colors)?)
        } else {
            None
        };

        let data_offset = u32::from_le_bytes(header[0x0A..0x0E].try_into().unwrap());
        input.seek(SeekFrom::Start(u64::from(data_offset)))?;

        Ok(PackedBitmap {
            input,
            width: expected_width,
            height: expected_height,
            format,
            stride,
            palette,
        })
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Decode the pixel payload, top row first.
    ///
    /// Each row is run-length expanded to exactly `stride` bytes (nonzero
    /// byte = literal, zero byte = escape followed by a zero-run length) and
    /// then XORed against the previous decoded row; the first row XORs
    /// against all-zero.
    pub fn unpack(mut self) -> Result<PixelImage, DwqError> {
        let stride = self.stride;
        let height = self.height as usize;
        let mut data = vec![0u8; stride * height];
        let mut prev_row = vec![0u8; stride];
        let mut row = vec![0u8; stride];

        for y in 0..height {
            let mut x = 0;
            while x < stride {
                let byte = read_u8_or(&mut self.input, "expanding a run-length row")?;
                if byte != 0 {
                    row[x] = byte;
                    x += 1;
                } else {
                    let run = read_u8_or(&mut self.input, "reading a zero-run length")? as usize;
                    if run > stride - x {
                        return Err(DwqError::RunOverflowsRow { run, stride });
                    }
                    row[x..x + run].fill(0);
                    x += run;
                }
            }

            let out = &mut data[y * stride..(y + 1) * stride];
            for i in 0..stride {
                out[i] = row[i] ^ prev_row[i];
            }
            prev_row.copy_from_slice(out);
        }

        Ok(PixelImage {
            width: self.width,
            height: self.height,
            format: self.format,
            stride,
            palette: self.palette,
            data,
        })
    }
}

fn read_palette<R: Read>(input: &mut R, colors: usize) -> Result<Vec<[u8; 3]>, DwqError> {
    // Entries are stored as R,G,B plus one pad byte.
    let mut raw = vec![0u8; colors * 4];
    read_exact_or(input, &mut raw, "reading a bitmap palette")?;
    Ok(raw
        .chunks_exact(4)
        .map(|entry| [entry[0], entry[1], entry[2]])
        .collect())
}

fn read_u8_or<R: Read>(reader: &mut R, what: &'static str) -> Result<u8, DwqError> {
    match reader.read_u8() {
        Ok(value) => Ok(value),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(DwqError::Truncated(what)),
        Err(err) => Err(err.into()),
    }
}

fn read_exact_or<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), DwqError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(DwqError::Truncated(what)),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sub_header(width: i32, height: i32, bpp: u16, colors: i32, data_offset: u32) -> Vec<u8> {
        let mut header = vec![0u8; SUB_HEADER_SIZE];
        header[0x0A..0x0E].copy_from_slice(&data_offset.to_le_bytes());
        header[0x12..0x16].copy_from_slice(&width.to_le_bytes());
        header[0x16..0x1A].copy_from_slice(&height.to_le_bytes());
        header[0x1C..0x1E].copy_from_slice(&bpp.to_le_bytes());
        header[0x2E..0x32].copy_from_slice(&colors.to_le_bytes());
        header
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let payload = sub_header(10, 4, 8, 0, SUB_HEADER_SIZE as u32);
        match PackedBitmap::parse(Cursor::new(payload), 8, 4) {
            Err(DwqError::DimensionMismatch {
                expected_width: 8,
                actual_width: 10,
                ..
            }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_unsupported_depth() {
        let payload = sub_header(2, 2, 12, 0, SUB_HEADER_SIZE as u32);
        assert!(matches!(
            PackedBitmap::parse(Cursor::new(payload), 2, 2),
            Err(DwqError::UnsupportedDepth(12))
        ));
    }

    #[test]
    fn truncated_header_is_reported() {
        let payload = vec![0u8; SUB_HEADER_SIZE - 1];
        assert!(matches!(
            PackedBitmap::parse(Cursor::new(payload), 2, 2),
            Err(DwqError::Truncated(_))
        ));
    }

    #[test]
    fn palette_is_clamped_to_256_entries() {
        let mut payload = sub_header(1, 1, 8, 300, SUB_HEADER_SIZE as u32 + 256 * 4);
        payload.extend(std::iter::repeat(0u8).take(300 * 4));
        // Single-pixel row: literal index 1.
        payload[SUB_HEADER_SIZE + 256 * 4] = 1;
        let bitmap = PackedBitmap::parse(Cursor::new(payload), 1, 1).unwrap();
        let image = bitmap.unpack().unwrap();
        assert_eq!(image.palette.as_ref().unwrap().len(), 256);
    }

    #[test]
    fn palette_entries_keep_rgb_order() {
        let data_offset = SUB_HEADER_SIZE as u32 + 2 * 4;
        let mut payload = sub_header(2, 2, 8, 2, data_offset);
        payload.extend_from_slice(&[10, 20, 30, 0, 200, 100, 50, 0]);
        payload.extend_from_slice(&[1, 2, 1, 2]);
        let image = PackedBitmap::parse(Cursor::new(payload), 2, 2)
            .unwrap()
            .unpack()
            .unwrap();
        assert_eq!(
            image.palette,
            Some(vec![[10, 20, 30], [200, 100, 50]])
        );
    }

    #[test]
    fn first_row_passes_through_and_identical_second_row_cancels() {
        // Two identical rows of literal tokens: the first row must come out
        // unchanged, the second XORs against it and cancels to zero.
        let data_offset = SUB_HEADER_SIZE as u32 + 2 * 4;
        let mut payload = sub_header(2, 2, 8, 2, data_offset);
        payload.extend_from_slice(&[10, 20, 30, 0, 200, 100, 50, 0]);
        payload.extend_from_slice(&[1, 2, 1, 2]);
        let image = PackedBitmap::parse(Cursor::new(payload), 2, 2)
            .unwrap()
            .unpack()
            .unwrap();
        assert_eq!(image.format, PixelFormat::Indexed8);
        assert_eq!(image.stride, 2);
        assert_eq!(image.data, vec![1, 2, 0, 0]);
    }

    #[test]
    fn zero_runs_expand_and_feed_the_row_filter() {
        let data_offset = SUB_HEADER_SIZE as u32;
        let mut payload = sub_header(4, 2, 8, 0, data_offset);
        // Row 0: one full-width zero run. Row 1: literals.
        payload.extend_from_slice(&[0x00, 0x04]);
        payload.extend_from_slice(&[5, 6, 7, 8]);
        let image = PackedBitmap::parse(Cursor::new(payload), 4, 2)
            .unwrap()
            .unpack()
            .unwrap();
        assert_eq!(image.data, vec![0, 0, 0, 0, 5, 6, 7, 8]);
    }

    #[test]
    fn mixed_tokens_fill_a_row_exactly() {
        let mut payload = sub_header(4, 1, 8, 0, SUB_HEADER_SIZE as u32);
        payload.extend_from_slice(&[0x01, 0x00, 0x02, 0x03]);
        let image = PackedBitmap::parse(Cursor::new(payload), 4, 1)
            .unwrap()
            .unpack()
            .unwrap();
        assert_eq!(image.data, vec![1, 0, 0, 3]);
    }

    #[test]
    fn overflowing_run_is_rejected() {
        let mut payload = sub_header(2, 1, 8, 0, SUB_HEADER_SIZE as u32);
        payload.extend_from_slice(&[0x00, 0x03]);
        let bitmap = PackedBitmap::parse(Cursor::new(payload), 2, 1).unwrap();
        assert!(matches!(
            bitmap.unpack(),
            Err(DwqError::RunOverflowsRow { run: 3, stride: 2 })
        ));
    }

    #[test]
    fn truncation_mid_row_is_reported() {
        let mut payload = sub_header(4, 1, 8, 0, SUB_HEADER_SIZE as u32);
        payload.extend_from_slice(&[0x01, 0x00]);
        let bitmap = PackedBitmap::parse(Cursor::new(payload), 4, 1).unwrap();
        assert!(matches!(
            bitmap.unpack(),
            Err(DwqError::Truncated(_))
        ));
    }

    #[test]
    fn pixel_data_offset_is_honoured() {
        // Leave a gap between the header and the pixel data.
        let data_offset = SUB_HEADER_SIZE as u32 + 7;
        let mut payload = sub_header(2, 1, 24, 0, data_offset);
        payload.extend_from_slice(&[0xEE; 7]);
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        let image = PackedBitmap::parse(Cursor::new(payload), 2, 1)
            .unwrap()
            .unpack()
            .unwrap();
        assert_eq!(image.format, PixelFormat::Bgr24);
        assert_eq!(image.stride, 6);
        assert_eq!(image.data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn sixteen_bit_rows_use_two_bytes_per_pixel() {
        let mut payload = sub_header(2, 1, 16, 0, SUB_HEADER_SIZE as u32);
        payload.extend_from_slice(&[0x1F, 0xF8, 0x00, 0x02]);
        let image = PackedBitmap::parse(Cursor::new(payload), 2, 1)
            .unwrap()
            .unpack()
            .unwrap();
        assert_eq!(image.format, PixelFormat::Bgr565);
        assert_eq!(image.data, vec![0x1F, 0xF8, 0, 0]);
    }
}
