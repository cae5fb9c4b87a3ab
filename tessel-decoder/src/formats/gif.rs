//! GIF87a / GIF89a, still and animated

use crate::animation::{decode_frames, decode_single, map_image_error};
use crate::probe::{Backing, ByteReader};
use crate::{sniff, DecodeConfig, FormatDecoder, Probe, Result};
use image::codecs::gif::GifDecoder;
use image::ImageDecoder;
use std::io::Cursor;
use tessel_core::{Image, ImageFormat};

const BLOCK_EXTENSION: u8 = 0x21;
const BLOCK_IMAGE: u8 = 0x2C;
const BLOCK_TRAILER: u8 = 0x3B;
/// Codes are at least two bits wide and expand to at most 4096 indices
const MAX_LZW_EXPANSION: u64 = 4 * 4096;

pub struct GifFormat;

impl FormatDecoder for GifFormat {
    fn format(&self) -> ImageFormat {
        ImageFormat::Gif
    }

    fn matches(&self, header: &[u8]) -> bool {
        sniff::is_gif(header)
    }

    fn probe(&self, data: &[u8]) -> Result<Probe> {
        probe_gif(data)
    }

    fn decode(&self, data: &[u8], probe: &Probe, config: &DecodeConfig) -> Result<Image> {
        let map = |e| map_image_error(ImageFormat::Gif, e);
        let mut decoder = GifDecoder::new(Cursor::new(data)).map_err(map)?;

        if probe.animated && config.decode_animation {
            decoder.set_limits(config.limits()).map_err(map)?;
            decode_frames(ImageFormat::Gif, decoder, config)
        } else {
            decode_single(ImageFormat::Gif, decoder, config)
        }
    }
}

/// Size in bytes of a colour table announced by a packed field
fn color_table_len(packed: u8) -> usize {
    3 * (1usize << ((packed & 0x07) + 1))
}

/// Walks the block list and counts complete images.
///
/// Running out of data (or hitting garbage) before the first image is
/// complete fails the probe; afterwards it only marks the tail as damaged so
/// the frames that are intact can still be shown. The first image's LZW data
/// bounds its own size; the logical screen around it is background.
fn probe_gif(data: &[u8]) -> Result<Probe> {
    let mut reader = ByteReader::new(data, ImageFormat::Gif);
    reader.skip(6, "signature")?;

    let width = reader.u16_le()? as u32;
    let height = reader.u16_le()? as u32;
    let packed = reader.u8()?;
    reader.skip(2, "logical screen descriptor")?;
    if packed & 0x80 != 0 {
        reader.skip(color_table_len(packed), "global colour table")?;
    }

    let mut probe = Probe::new(ImageFormat::Gif, width, height);
    let mut images = 0u32;

    if let Err(err) = walk_blocks(&mut reader, &mut images, &mut probe.backing) {
        if images == 0 {
            return Err(err);
        }
        tracing::debug!(images, error = %err, "GIF tail is damaged");
        probe.truncated_tail = true;
    }

    if images == 0 {
        return Err(reader.corrupt("no image blocks"));
    }

    probe.frame_count = Some(images);
    probe.animated = images > 1;
    Ok(probe)
}

fn walk_blocks(
    reader: &mut ByteReader<'_>,
    images: &mut u32,
    first: &mut Option<Backing>,
) -> Result<()> {
    loop {
        if reader.is_at_end() {
            return Err(reader.truncated("data ends before the trailer"));
        }

        match reader.u8()? {
            BLOCK_TRAILER => return Ok(()),
            BLOCK_EXTENSION => {
                let _label = reader.u8()?;
                skip_sub_blocks(reader)?;
            }
            BLOCK_IMAGE => {
                reader.skip(4, "image position")?;
                let width = reader.u16_le()? as u64;
                let height = reader.u16_le()? as u64;
                let packed = reader.u8()?;
                if packed & 0x80 != 0 {
                    reader.skip(color_table_len(packed), "local colour table")?;
                }
                let _lzw_min_code_size = reader.u8()?;
                let data_len = skip_sub_blocks(reader)?;
                if *images == 0 {
                    *first = Some(Backing::new(width * height, data_len, MAX_LZW_EXPANSION));
                }
                *images += 1;
            }
            other => {
                return Err(reader.corrupt(format!(
                    "unknown block 0x{other:02x} at offset {}",
                    reader.position() - 1
                )));
            }
        }
    }
}

/// Skips a chain of length-prefixed sub-blocks up to its terminator and
/// returns the number of data bytes
fn skip_sub_blocks(reader: &mut ByteReader<'_>) -> Result<u64> {
    let mut total = 0u64;
    loop {
        let size = reader.u8()? as usize;
        if size == 0 {
            return Ok(total);
        }
        reader.skip(size, "data sub-block")?;
        total += size as u64;
    }
}
