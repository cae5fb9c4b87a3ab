//! Baseline and progressive JPEG

use crate::animation::{decode_single, map_image_error};
use crate::probe::{Backing, ByteReader};
use crate::{sniff, DecodeConfig, FormatDecoder, Probe, Result};
use image::codecs::jpeg::JpegDecoder;
use std::io::Cursor;
use tessel_core::{Image, ImageFormat};

const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;
const MARKER_SOI: u8 = 0xD8;
const MARKER_TEM: u8 = 0x01;
/// Every 8x8 block costs at least one bit per scan it appears in, and a
/// block of a 4x4-subsampled component covers 32x32 pixels
const MAX_PIXELS_PER_SCAN_BYTE: u64 = 8 * 32 * 32;

pub struct JpegFormat;

impl FormatDecoder for JpegFormat {
    fn format(&self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    fn matches(&self, header: &[u8]) -> bool {
        sniff::is_jpeg(header)
    }

    fn probe(&self, data: &[u8]) -> Result<Probe> {
        probe_jpeg(data)
    }

    fn decode(&self, data: &[u8], _probe: &Probe, config: &DecodeConfig) -> Result<Image> {
        let decoder = JpegDecoder::new(Cursor::new(data))
            .map_err(|e| map_image_error(ImageFormat::Jpeg, e))?;
        decode_single(ImageFormat::Jpeg, decoder, config)
    }
}

/// Start-of-frame markers carry the image dimensions
fn is_start_of_frame(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Walks marker segments from SOI to EOI
fn probe_jpeg(data: &[u8]) -> Result<Probe> {
    let mut reader = ByteReader::new(data, ImageFormat::Jpeg);
    reader.skip(2, "SOI marker")?;

    let mut size: Option<(u32, u32)> = None;
    let mut scan_len = 0u64;

    loop {
        let prefix = reader.u8()?;
        if prefix != 0xFF {
            return Err(reader.corrupt(format!(
                "expected a marker at offset {}, found 0x{prefix:02x}",
                reader.position() - 1
            )));
        }
        let mut marker = reader.u8()?;
        while marker == 0xFF {
            marker = reader.u8()?;
        }

        match marker {
            MARKER_EOI => break,
            MARKER_SOI => return Err(reader.corrupt("nested SOI marker")),
            0xD0..=0xD7 | MARKER_TEM => continue,
            _ => {}
        }

        let length = reader.u16_be()? as usize;
        if length < 2 {
            return Err(reader.corrupt(format!("segment 0x{marker:02x} length is {length}")));
        }

        if is_start_of_frame(marker) {
            if length < 8 {
                return Err(reader.corrupt(format!("frame header length is {length}")));
            }
            let _precision = reader.u8()?;
            let height = reader.u16_be()? as u32;
            let width = reader.u16_be()? as u32;
            reader.skip(length - 7, "frame header")?;
            size.get_or_insert((width, height));
        } else {
            reader.skip(length - 2, "marker segment")?;
        }

        if marker == MARKER_SOS {
            if size.is_none() {
                return Err(reader.corrupt("scan starts before the frame header"));
            }
            scan_len += skip_entropy_coded_data(&mut reader)? as u64;
        }
    }

    let (width, height) = size.ok_or_else(|| reader.corrupt("no frame header"))?;
    let mut probe = Probe::new(ImageFormat::Jpeg, width, height);
    probe.backing = Some(Backing::new(
        width as u64 * height as u64,
        scan_len,
        MAX_PIXELS_PER_SCAN_BYTE,
    ));
    Ok(probe)
}

/// Moves the reader to the next marker after a scan and returns the length
/// of the scan data.
///
/// Inside entropy-coded data `FF 00` is an escaped byte and `FF D0..D7` are
/// restart markers; any other `FF xx` ends the scan.
fn skip_entropy_coded_data(reader: &mut ByteReader<'_>) -> Result<usize> {
    let start = reader.position();
    let rest = reader.rest();
    let mut i = 0;

    while i + 1 < rest.len() {
        if rest[i] == 0xFF {
            match rest[i + 1] {
                0xFF => {}
                0x00 | 0xD0..=0xD7 => i += 1,
                _ => return reader.seek(start + i).map(|()| i),
            }
        }
        i += 1;
    }

    Err(reader.truncated("entropy-coded data runs to the end of the input"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::test_support::{encode, gradient};
    use crate::{decode_memory, DecodeErrorKind};

    #[test]
    fn test_probe_reads_frame_header() {
        let data = encode(image::ImageFormat::Jpeg, &gradient(13, 9));
        let probe = probe_jpeg(&data).unwrap();
        assert_eq!((probe.width, probe.height), (13, 9));
    }

    #[test]
    fn test_probe_detects_truncation() {
        let data = encode(image::ImageFormat::Jpeg, &gradient(16, 16));
        for cut in [3, 6, data.len() / 2, data.len() - 2, data.len() - 1] {
            let err = probe_jpeg(&data[..cut]).unwrap_err();
            assert_eq!(err.kind(), DecodeErrorKind::Truncated, "cut at {cut}");
        }
    }

    #[test]
    fn test_entropy_scan_skips_escapes_and_restarts() {
        // SOS payload: FF00 escape, FFD3 restart, then EOI
        let data = [0xAA, 0xFF, 0x00, 0xBB, 0xFF, 0xD3, 0xCC, 0xFF, 0xFF, 0xD9];
        let mut reader = ByteReader::new(&data, ImageFormat::Jpeg);
        assert_eq!(skip_entropy_coded_data(&mut reader).unwrap(), 8);
        assert_eq!(reader.position(), 8);
    }

    #[test]
    fn test_scan_without_frame_header_is_corrupt() {
        let data = [0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02, 0x00, 0xFF, 0xD9];
        assert_eq!(
            probe_jpeg(&data).unwrap_err().kind(),
            DecodeErrorKind::CorruptData
        );
    }

    #[test]
    fn test_decode_dimensions() {
        let data = encode(image::ImageFormat::Jpeg, &gradient(10, 6));
        let probe = probe_jpeg(&data).unwrap();
        let image = JpegFormat
            .decode(&data, &probe, &DecodeConfig::default())
            .unwrap();
        assert_eq!((image.width(), image.height()), (10, 6));
        assert!(image.is_opaque());
    }

    #[test]
    fn test_declared_size_beyond_scan_data_is_truncation() {
        let mut data = encode(image::ImageFormat::Jpeg, &gradient(16, 16));
        let probe = probe_jpeg(&data).unwrap();
        assert!(probe.check_backing().is_ok());

        // Baseline SOF0: FF C0, length, precision, height, width
        let sof = data
            .windows(2)
            .position(|w| w[0] == 0xFF && w[1] == 0xC0)
            .unwrap();
        data[sof + 5..sof + 7].copy_from_slice(&11_000u16.to_be_bytes());
        data[sof + 7..sof + 9].copy_from_slice(&11_000u16.to_be_bytes());

        let probe = probe_jpeg(&data).unwrap();
        assert_eq!((probe.width, probe.height), (11_000, 11_000));
        let err = decode_memory(&data).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Truncated, "{err}");
    }
}
