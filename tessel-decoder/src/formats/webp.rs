//! WebP (lossy, lossless, extended and animated)

use crate::animation::{decode_frames, decode_single, map_image_error};
use crate::probe::{tag_name, Backing, ByteReader};
use crate::{sniff, DecodeConfig, FormatDecoder, Probe, Result};
use image::codecs::webp::WebPDecoder;
use image::ImageDecoder;
use std::io::Cursor;
use tessel_core::{Image, ImageFormat};

const VP8_START_CODE: [u8; 3] = [0x9D, 0x01, 0x2A];
const VP8L_SIGNATURE: u8 = 0x2F;
const VP8X_ANIMATION: u8 = 0x02;
/// Key frame prediction modes cost each 16x16 macroblock at least half a bit
const MAX_VP8_PIXELS_PER_BYTE: u64 = 16 * 16 * 2 * 8;

pub struct WebpFormat;

impl FormatDecoder for WebpFormat {
    fn format(&self) -> ImageFormat {
        ImageFormat::WebP
    }

    fn matches(&self, header: &[u8]) -> bool {
        sniff::is_webp(header)
    }

    fn probe(&self, data: &[u8]) -> Result<Probe> {
        probe_webp(data)
    }

    fn decode(&self, data: &[u8], probe: &Probe, config: &DecodeConfig) -> Result<Image> {
        let map = |e| map_image_error(ImageFormat::WebP, e);
        let mut decoder = WebPDecoder::new(Cursor::new(data)).map_err(map)?;

        if probe.animated && config.decode_animation {
            decoder.set_limits(config.limits()).map_err(map)?;
            decode_frames(ImageFormat::WebP, decoder, config)
        } else {
            decode_single(ImageFormat::WebP, decoder, config)
        }
    }
}

/// Walks the RIFF chunk list; the first image-bearing chunk gives the size.
///
/// Only lossy stills get a payload bound. Lossless streams can code a
/// uniform image in zero bits per pixel and animation canvases may be
/// mostly background, so those rely on the configured limits.
fn probe_webp(data: &[u8]) -> Result<Probe> {
    let mut reader = ByteReader::new(data, ImageFormat::WebP);
    reader.skip(4, "RIFF tag")?;
    let riff_size = reader.u32_le()? as usize;
    reader.skip(4, "WEBP tag")?;

    let end = riff_size
        .checked_add(8)
        .ok_or_else(|| reader.corrupt(format!("RIFF size {riff_size} is out of range")))?;
    if end > reader.len() {
        return Err(reader.truncated(format!(
            "RIFF declares {riff_size} bytes, {} present",
            reader.len() - 8
        )));
    }

    let mut probe: Option<Probe> = None;
    let mut animated = false;
    let mut frames = 0u32;
    let mut lossy_len: Option<u64> = None;

    while reader.position() + 8 <= end {
        let tag = reader.tag()?;
        let size = reader.u32_le()? as usize;
        let body = reader.position();
        if size > end - body {
            return Err(reader.truncated(format!(
                "{} chunk declares {size} bytes, {} remain",
                tag_name(&tag),
                end - body
            )));
        }

        match &tag {
            b"VP8X" => {
                if size < 10 {
                    return Err(reader.corrupt(format!("VP8X chunk is {size} bytes")));
                }
                let flags = reader.u8()?;
                reader.skip(3, "VP8X reserved bits")?;
                let width = reader.u24_le()? + 1;
                let height = reader.u24_le()? + 1;
                animated = flags & VP8X_ANIMATION != 0;
                probe.get_or_insert(Probe::new(ImageFormat::WebP, width, height));
            }
            b"VP8 " => {
                lossy_len.get_or_insert(size as u64);
                if probe.is_none() {
                    if size < 10 {
                        return Err(reader.corrupt(format!("VP8 chunk is {size} bytes")));
                    }
                    reader.skip(3, "VP8 frame tag")?;
                    if reader.take(3, "VP8 start code")? != VP8_START_CODE {
                        return Err(reader.corrupt("bad VP8 start code"));
                    }
                    let width = (reader.u16_le()? & 0x3FFF) as u32;
                    let height = (reader.u16_le()? & 0x3FFF) as u32;
                    probe = Some(Probe::new(ImageFormat::WebP, width, height));
                }
            }
            b"VP8L" if probe.is_none() => {
                if size < 5 {
                    return Err(reader.corrupt(format!("VP8L chunk is {size} bytes")));
                }
                if reader.u8()? != VP8L_SIGNATURE {
                    return Err(reader.corrupt("bad VP8L signature"));
                }
                let bits = reader.u32_le()?;
                let width = (bits & 0x3FFF) + 1;
                let height = ((bits >> 14) & 0x3FFF) + 1;
                probe = Some(Probe::new(ImageFormat::WebP, width, height));
            }
            b"ANMF" => frames += 1,
            _ => {}
        }

        // Chunks are padded to an even size; a missing final pad byte is tolerated
        let next = body + size + (size & 1);
        reader.seek(next.min(end))?;
    }

    let mut probe = probe.ok_or_else(|| reader.corrupt("no image chunk"))?;
    if let (false, Some(len)) = (animated, lossy_len) {
        probe.backing = Some(Backing::new(
            probe.width as u64 * probe.height as u64,
            len,
            MAX_VP8_PIXELS_PER_BYTE,
        ));
    }
    if animated {
        probe.animated = frames > 1;
        probe.frame_count = Some(frames);
        if frames == 0 {
            return Err(reader.corrupt("animated file has no frames"));
        }
    }
    Ok(probe)
}
