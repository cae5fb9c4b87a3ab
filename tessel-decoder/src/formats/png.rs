//! PNG and APNG

use crate::animation::{decode_frames, decode_single, map_image_error};
use crate::probe::{tag_name, Backing, ByteReader};
use crate::{sniff, DecodeConfig, FormatDecoder, Probe, Result};
use image::codecs::png::PngDecoder;
use std::io::Cursor;
use tessel_core::{Image, ImageFormat};

const IHDR_LEN: u32 = 13;
const MAX_CHUNK_LEN: u32 = i32::MAX as u32;
/// Most output bytes a single deflate input byte can produce
const MAX_DEFLATE_EXPANSION: u64 = 1032;

pub struct PngFormat;

impl FormatDecoder for PngFormat {
    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }

    fn matches(&self, header: &[u8]) -> bool {
        sniff::is_png(header)
    }

    fn probe(&self, data: &[u8]) -> Result<Probe> {
        probe_png(data)
    }

    fn decode(&self, data: &[u8], probe: &Probe, config: &DecodeConfig) -> Result<Image> {
        let map = |e| map_image_error(ImageFormat::Png, e);
        let decoder = PngDecoder::with_limits(Cursor::new(data), config.limits()).map_err(map)?;

        if probe.animated && config.decode_animation {
            let apng = decoder.apng().map_err(map)?;
            decode_frames(ImageFormat::Png, apng, config)
        } else {
            decode_single(ImageFormat::Png, decoder, config)
        }
    }
}

fn channels(color_type: u8) -> Option<u64> {
    match color_type {
        0 | 3 => Some(1),
        4 => Some(2),
        2 => Some(3),
        6 => Some(4),
        _ => None,
    }
}

/// Walks the chunk list from IHDR to IEND.
///
/// The IDAT chunks hold the default image, which always covers the whole
/// canvas, so their total length bounds the canvas size.
fn probe_png(data: &[u8]) -> Result<Probe> {
    let mut reader = ByteReader::new(data, ImageFormat::Png);
    reader.skip(sniff::PNG_SIGNATURE.len(), "signature")?;

    let mut probe: Option<Probe> = None;
    let mut bits_per_pixel = 0u64;
    let mut image_data_len = 0u64;
    let mut has_image_data = false;

    loop {
        if reader.is_at_end() {
            return Err(reader.truncated("data ends before the IEND chunk"));
        }

        let length = reader.u32_be()?;
        let tag = reader.tag()?;
        if length > MAX_CHUNK_LEN {
            return Err(reader.corrupt(format!(
                "{} chunk length {length} is out of range",
                tag_name(&tag)
            )));
        }

        match (&tag, probe.as_mut()) {
            (b"IHDR", None) => {
                if length != IHDR_LEN {
                    return Err(reader.corrupt(format!("IHDR length is {length}")));
                }
                let width = reader.u32_be()?;
                let height = reader.u32_be()?;
                let bit_depth = reader.u8()?;
                let color_type = reader.u8()?;
                reader.skip(3, "IHDR")?;
                bits_per_pixel = channels(color_type)
                    .ok_or_else(|| reader.corrupt(format!("color type {color_type}")))?
                    * bit_depth as u64;
                probe = Some(Probe::new(ImageFormat::Png, width, height));
            }
            (_, None) => {
                return Err(reader.corrupt(format!(
                    "first chunk is {}, expected IHDR",
                    tag_name(&tag)
                )));
            }
            (b"IHDR", Some(_)) => return Err(reader.corrupt("duplicate IHDR chunk")),
            (b"acTL", Some(probe)) => {
                if length < 8 {
                    return Err(reader.corrupt(format!("acTL length is {length}")));
                }
                let frames = reader.u32_be()?;
                reader.skip(length as usize - 4, "acTL")?;
                probe.frame_count = Some(frames);
                probe.animated = frames > 1;
            }
            (b"IEND", Some(_)) => {
                reader.skip(length as usize + 4, "IEND")?;
                break;
            }
            (_, Some(_)) => {
                if &tag == b"IDAT" {
                    has_image_data = true;
                    image_data_len += length as u64;
                }
                reader.skip(length as usize, &format!("{} chunk", tag_name(&tag)))?;
            }
        }

        reader.skip(4, "chunk CRC")?;
    }

    let mut probe = probe.ok_or_else(|| reader.corrupt("missing IHDR chunk"))?;
    if !has_image_data {
        return Err(reader.corrupt("no IDAT chunk"));
    }

    // Pixel bits alone, without filter bytes, so interlacing never matters
    let pixel_bits = (probe.width as u64)
        .saturating_mul(probe.height as u64)
        .saturating_mul(bits_per_pixel);
    probe.backing = Some(Backing::new(
        pixel_bits.div_ceil(8),
        image_data_len,
        MAX_DEFLATE_EXPANSION,
    ));
    Ok(probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::test_support::{crc32, encode, gradient, png_chunk};
    use crate::{decode_memory, DecodeErrorKind};
    use image::RgbaImage;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    /// Zlib stream with an invalid deflate block type
    const BROKEN_STREAM: &[u8] = &[0x78, 0x9C, 0xFF, 0xFF, 0xFF, 0xFF];

    fn solid(color: [u8; 4]) -> Vec<u8> {
        encode(
            image::ImageFormat::Png,
            &RgbaImage::from_pixel(4, 4, image::Rgba(color)),
        )
    }

    /// Concatenated IDAT payload of an encoded PNG
    fn image_data(png: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut pos = sniff::PNG_SIGNATURE.len();
        while pos + 8 <= png.len() {
            let len = u32::from_be_bytes(png[pos..pos + 4].try_into().unwrap()) as usize;
            if &png[pos + 4..pos + 8] == b"IDAT" {
                data.extend_from_slice(&png[pos + 8..pos + 8 + len]);
            }
            pos += 12 + len;
        }
        data
    }

    fn frame_control(sequence: u32, delay_ms: u16) -> Vec<u8> {
        let mut fctl = Vec::new();
        for value in [sequence, 4, 4, 0, 0] {
            fctl.extend_from_slice(&value.to_be_bytes());
        }
        fctl.extend_from_slice(&delay_ms.to_be_bytes());
        fctl.extend_from_slice(&1000u16.to_be_bytes());
        // No disposal, source blending
        fctl.extend_from_slice(&[0, 0]);
        fctl
    }

    /// 4x4 APNG whose first frame is the default image
    fn apng(frames: &[(Vec<u8>, u16)]) -> Vec<u8> {
        // Signature and IHDR of any 4x4 RGBA file
        let mut data = solid(RED)[..33].to_vec();

        let mut actl = (frames.len() as u32).to_be_bytes().to_vec();
        actl.extend_from_slice(&0u32.to_be_bytes());
        data.extend(png_chunk(b"acTL", &actl));

        let mut sequence = 0u32;
        for (index, (stream, delay_ms)) in frames.iter().enumerate() {
            data.extend(png_chunk(b"fcTL", &frame_control(sequence, *delay_ms)));
            sequence += 1;
            if index == 0 {
                data.extend(png_chunk(b"IDAT", stream));
            } else {
                let mut fdat = sequence.to_be_bytes().to_vec();
                fdat.extend_from_slice(stream);
                data.extend(png_chunk(b"fdAT", &fdat));
                sequence += 1;
            }
        }
        data.extend(png_chunk(b"IEND", &[]));
        data
    }

    #[test]
    fn test_probe_reads_header() {
        let data = encode(image::ImageFormat::Png, &gradient(7, 3));
        let probe = probe_png(&data).unwrap();
        assert_eq!((probe.width, probe.height), (7, 3));
        assert!(!probe.animated);
    }

    #[test]
    fn test_probe_detects_truncation_anywhere() {
        let data = encode(image::ImageFormat::Png, &gradient(16, 16));
        for cut in [9, 16, 20, 33, data.len() / 2, data.len() - 1] {
            let err = probe_png(&data[..cut]).unwrap_err();
            assert_eq!(err.kind(), DecodeErrorKind::Truncated, "cut at {cut}");
        }
    }

    #[test]
    fn test_probe_rejects_bad_first_chunk() {
        let mut data = encode(image::ImageFormat::Png, &gradient(2, 2));
        data[12..16].copy_from_slice(b"IDAT");
        assert_eq!(
            probe_png(&data).unwrap_err().kind(),
            DecodeErrorKind::CorruptData
        );
    }

    #[test]
    fn test_probe_reads_animation_control() {
        let mut data = encode(image::ImageFormat::Png, &gradient(4, 4));
        // acTL: 3 frames, infinite loop; the probe does not verify CRCs
        let mut actl = 8u32.to_be_bytes().to_vec();
        actl.extend_from_slice(b"acTL");
        actl.extend_from_slice(&3u32.to_be_bytes());
        actl.extend_from_slice(&0u32.to_be_bytes());
        actl.extend_from_slice(&[0; 4]);
        data.splice(33..33, actl);

        let probe = probe_png(&data).unwrap();
        assert!(probe.animated);
        assert_eq!(probe.frame_count, Some(3));
    }

    #[test]
    fn test_decode_static() {
        let source = gradient(5, 4);
        let data = encode(image::ImageFormat::Png, &source);
        let probe = probe_png(&data).unwrap();
        let image = PngFormat
            .decode(&data, &probe, &DecodeConfig::default())
            .unwrap();
        assert_eq!(image.current_frame().pixels.as_bytes(), source.as_raw().as_slice());
    }

    #[test]
    fn test_declared_size_beyond_payload_is_truncation() {
        let mut data = encode(image::ImageFormat::Png, &gradient(2, 2));
        data[16..20].copy_from_slice(&8192u32.to_be_bytes());
        data[20..24].copy_from_slice(&8192u32.to_be_bytes());
        let crc = crc32(&data[12..29]);
        data[29..33].copy_from_slice(&crc.to_be_bytes());

        let probe = probe_png(&data).unwrap();
        assert_eq!(probe.backing.unwrap().required, 8192 * 8192 * 4);

        let err = decode_memory(&data).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Truncated, "{err}");
    }

    #[test]
    fn test_highly_compressed_image_is_backed() {
        let source = RgbaImage::from_pixel(512, 512, image::Rgba(BLUE));
        let data = encode(image::ImageFormat::Png, &source);
        let probe = probe_png(&data).unwrap();
        assert!(probe.check_backing().is_ok());
        assert_eq!(decode_memory(&data).unwrap().width(), 512);
    }

    #[test]
    fn test_decode_animation() {
        let frames = [(RED, 100), (GREEN, 200), (BLUE, 50)]
            .map(|(color, delay_ms)| (image_data(&solid(color)), delay_ms));
        let mut image = decode_memory(&apng(&frames)).unwrap();

        assert_eq!(image.format(), ImageFormat::Png);
        assert!(image.is_animated());
        assert_eq!(image.frame_count(), 3);
        for (color, delay_ms) in [(RED, 100), (GREEN, 200), (BLUE, 50), (RED, 100)] {
            assert_eq!(image.delay_ms(), delay_ms);
            assert_eq!(image.current_frame().pixels.as_bytes(), color.repeat(16).as_slice());
            image.advance();
        }
    }

    #[test]
    fn test_bad_later_frame_ends_the_animation() {
        let frames = [
            (image_data(&solid(RED)), 100),
            (image_data(&solid(GREEN)), 200),
            (BROKEN_STREAM.to_vec(), 50),
        ];
        let image = decode_memory(&apng(&frames)).unwrap();

        assert_eq!(image.frame_count(), 2);
        assert_eq!(image.frames()[0].delay_ms, 100);
        assert_eq!(image.frames()[1].pixels.as_bytes(), GREEN.repeat(16).as_slice());
    }

    #[test]
    fn test_bad_first_frame_is_fatal() {
        let frames = [
            (BROKEN_STREAM.to_vec(), 100),
            (image_data(&solid(GREEN)), 200),
        ];
        let err = decode_memory(&apng(&frames)).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::CorruptData, "{err}");
    }
}
