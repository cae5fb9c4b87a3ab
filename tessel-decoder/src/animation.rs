//! Shared pixel decoding: single frames, frame sequences, error mapping

use crate::{DecodeConfig, Error, Result};
use image::{AnimationDecoder, DynamicImage, ImageDecoder, ImageError, RgbaImage};
use std::io;
use tessel_core::{Frame, Image, ImageFormat, ImageKind, PixelBuffer};

/// Maps an `image` crate failure onto the decode error taxonomy
pub(crate) fn map_image_error(format: ImageFormat, err: ImageError) -> Error {
    match err {
        ImageError::IoError(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Error::truncated(format, e.to_string())
        }
        ImageError::IoError(e) => Error::corrupt(format, e.to_string()),
        ImageError::Limits(e) => Error::AllocationFailure(format!("{format}: {e}")),
        ImageError::Unsupported(e) => Error::UnsupportedFeature {
            format,
            detail: e.to_string(),
        },
        other => Error::corrupt(format, other.to_string()),
    }
}

/// Decodes the first (or only) frame through an `image` decoder
pub(crate) fn decode_single<D>(format: ImageFormat, mut decoder: D, config: &DecodeConfig) -> Result<Image>
where
    D: ImageDecoder,
{
    decoder
        .set_limits(config.limits())
        .map_err(|e| map_image_error(format, e))?;
    let dynamic = DynamicImage::from_decoder(decoder).map_err(|e| map_image_error(format, e))?;
    let buffer = into_pixel_buffer(dynamic.into_rgba8())?;
    Ok(Image::new_static(format, buffer)?)
}

/// Decodes every frame of an animation, one at a time.
///
/// Frames arrive fully composited (disposal applied). A frame that fails
/// after at least one good frame ends the animation early instead of failing
/// the decode; a failing first frame is fatal.
pub(crate) fn decode_frames<'a, D>(format: ImageFormat, decoder: D, config: &DecodeConfig) -> Result<Image>
where
    D: AnimationDecoder<'a>,
{
    let mut frames: Vec<Frame> = Vec::new();
    let mut allocated: u64 = 0;

    for (index, result) in decoder.into_frames().enumerate() {
        let frame = match result {
            Ok(frame) => frame,
            Err(err) if frames.is_empty() => {
                return Err(match err {
                    ImageError::Limits(e) => Error::AllocationFailure(format!("{format}: {e}")),
                    other => Error::corrupt(format, format!("first frame: {other}")),
                });
            }
            Err(err) => {
                tracing::warn!(%format, index, error = %err, "dropping animation tail after bad frame");
                break;
            }
        };

        let delay_ms = delay_to_ms(frame.delay());
        let buffer = frame.into_buffer();
        allocated += DecodeConfig::frame_bytes(buffer.width(), buffer.height());
        if allocated > config.max_alloc_bytes {
            if frames.is_empty() {
                return Err(Error::AllocationFailure(format!(
                    "{format}: first frame exceeds {} bytes",
                    config.max_alloc_bytes
                )));
            }
            tracing::warn!(%format, index, "frame storage limit reached, ending animation");
            break;
        }

        frames.push(Frame::new(into_pixel_buffer(buffer)?, delay_ms));
    }

    if frames.is_empty() {
        return Err(Error::corrupt(format, "animation contains no frames"));
    }

    let kind = if frames.len() > 1 {
        ImageKind::Animated
    } else {
        ImageKind::Static
    };
    Ok(Image::from_frames(format, kind, frames)?)
}

fn delay_to_ms(delay: image::Delay) -> u32 {
    let (numer, denom) = delay.numer_denom_ms();
    if denom == 0 {
        return 0;
    }
    ((numer as u64 + denom as u64 / 2) / denom as u64) as u32
}

fn into_pixel_buffer(image: RgbaImage) -> Result<PixelBuffer> {
    let (width, height) = image.dimensions();
    Ok(PixelBuffer::from_raw(width, height, image.into_raw())?)
}
