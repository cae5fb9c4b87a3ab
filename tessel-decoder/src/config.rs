//! Decoder configuration

use crate::{Error, Result};
use tessel_core::{ImageFormat, BYTES_PER_PIXEL};

/// Limits and switches applied to every decode
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct DecodeConfig {
    /// Largest accepted image width in pixels
    pub max_width: u32,
    /// Largest accepted image height in pixels
    pub max_height: u32,
    /// Upper bound on pixel storage for one image, all frames included
    pub max_alloc_bytes: u64,
    /// Upper bound on bytes read from a stream before decoding starts
    pub max_input_bytes: u64,
    /// Decode every frame of animated sources (otherwise only the first)
    pub decode_animation: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_width: 16_384,
            max_height: 16_384,
            max_alloc_bytes: 512 * 1024 * 1024,
            max_input_bytes: 256 * 1024 * 1024,
            decode_animation: true,
        }
    }
}

impl DecodeConfig {
    /// Bytes needed to hold one RGBA8 frame of the given size
    pub fn frame_bytes(width: u32, height: u32) -> u64 {
        width as u64 * height as u64 * BYTES_PER_PIXEL as u64
    }

    /// Rejects declared dimensions before any pixel storage is allocated
    pub fn check_dimensions(&self, format: ImageFormat, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::corrupt(
                format,
                format!("declared size {width}x{height} is empty"),
            ));
        }
        if width > self.max_width || height > self.max_height {
            return Err(Error::AllocationFailure(format!(
                "{format} image {width}x{height} exceeds the {}x{} limit",
                self.max_width, self.max_height
            )));
        }
        let bytes = Self::frame_bytes(width, height);
        if bytes > self.max_alloc_bytes {
            return Err(Error::AllocationFailure(format!(
                "{format} image {width}x{height} needs {bytes} bytes, limit is {}",
                self.max_alloc_bytes
            )));
        }
        Ok(())
    }

    /// Limits handed to the pixel decoders
    pub(crate) fn limits(&self) -> image::Limits {
        let mut limits = image::Limits::default();
        limits.max_image_width = Some(self.max_width);
        limits.max_image_height = Some(self.max_height);
        limits.max_alloc = Some(self.max_alloc_bytes);
        limits
    }
}
