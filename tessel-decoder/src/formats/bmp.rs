//! Windows bitmap (BITMAPCOREHEADER and BITMAPINFOHEADER families)

use crate::animation::{decode_single, map_image_error};
use crate::probe::ByteReader;
use crate::{sniff, DecodeConfig, Error, FormatDecoder, Probe, Result};
use image::codecs::bmp::BmpDecoder;
use std::io::Cursor;
use tessel_core::{Image, ImageFormat};

const FILE_HEADER_LEN: usize = 14;
const CORE_HEADER_LEN: u32 = 12;
const INFO_HEADER_LEN: u32 = 40;

const BI_RGB: u32 = 0;
const BI_RLE8: u32 = 1;
const BI_RLE4: u32 = 2;
const BI_BITFIELDS: u32 = 3;
const BI_ALPHABITFIELDS: u32 = 6;

pub struct BmpFormat;

impl FormatDecoder for BmpFormat {
    fn format(&self) -> ImageFormat {
        ImageFormat::Bmp
    }

    fn matches(&self, header: &[u8]) -> bool {
        sniff::is_bmp(header)
    }

    fn probe(&self, data: &[u8]) -> Result<Probe> {
        probe_bmp(data)
    }

    fn decode(&self, data: &[u8], _probe: &Probe, config: &DecodeConfig) -> Result<Image> {
        let decoder =
            BmpDecoder::new(Cursor::new(data)).map_err(|e| map_image_error(ImageFormat::Bmp, e))?;
        decode_single(ImageFormat::Bmp, decoder, config)
    }
}

/// Bytes per stored row, padded to four bytes
fn row_stride(width: u32, bits_per_pixel: u16) -> u64 {
    (width as u64 * bits_per_pixel as u64).div_ceil(32) * 4
}

/// Reads the headers and checks that the pixel array fits in the data.
///
/// Uncompressed rows have a fixed size, so the whole array can be checked up
/// front; run-length data only has to start inside the file.
fn probe_bmp(data: &[u8]) -> Result<Probe> {
    let mut reader = ByteReader::new(data, ImageFormat::Bmp);
    reader.skip(10, "file header")?;
    let pixel_offset = reader.u32_le()? as u64;
    let header_len = reader.u32_le()?;

    let (width, height, bits_per_pixel, compression) = match header_len {
        CORE_HEADER_LEN => {
            let width = reader.u16_le()? as i64;
            let height = reader.u16_le()? as i64;
            let _planes = reader.u16_le()?;
            let bits = reader.u16_le()?;
            (width, height, bits, BI_RGB)
        }
        len if len >= INFO_HEADER_LEN => {
            let width = reader.i32_le()? as i64;
            let height = reader.i32_le()? as i64;
            let _planes = reader.u16_le()?;
            let bits = reader.u16_le()?;
            let compression = reader.u32_le()?;
            reader.skip(len as usize - 20, "info header")?;
            (width, height, bits, compression)
        }
        other => return Err(reader.corrupt(format!("unknown header size {other}"))),
    };

    if width <= 0 || height == 0 || height == i32::MIN as i64 {
        return Err(reader.corrupt(format!("declared size {width}x{height}")));
    }
    if !matches!(bits_per_pixel, 1 | 4 | 8 | 16 | 24 | 32) {
        return Err(reader.corrupt(format!("{bits_per_pixel} bits per pixel")));
    }

    let width = width as u32;
    let height = height.unsigned_abs() as u32;
    let header_end = (FILE_HEADER_LEN as u64) + header_len as u64;
    if pixel_offset < header_end {
        return Err(reader.corrupt(format!(
            "pixel data offset {pixel_offset} overlaps the headers"
        )));
    }

    let available = reader.len() as u64;
    match compression {
        BI_RGB | BI_BITFIELDS | BI_ALPHABITFIELDS => {
            let needed = pixel_offset + row_stride(width, bits_per_pixel) * height as u64;
            if needed > available {
                return Err(reader.truncated(format!(
                    "pixel array needs {needed} bytes, {available} present"
                )));
            }
        }
        BI_RLE8 | BI_RLE4 => {
            if pixel_offset >= available {
                return Err(reader.truncated(format!(
                    "pixel data starts at {pixel_offset}, past {available} bytes"
                )));
            }
        }
        other => {
            return Err(Error::UnsupportedFeature {
                format: ImageFormat::Bmp,
                detail: format!("compression method {other}"),
            });
        }
    }

    Ok(Probe::new(ImageFormat::Bmp, width, height))
}
