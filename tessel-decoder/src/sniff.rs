//! Magic-byte detection for the built-in formats

use tessel_core::ImageFormat;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
pub const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];
pub const GIF87A_SIGNATURE: &[u8; 6] = b"GIF87a";
pub const GIF89A_SIGNATURE: &[u8; 6] = b"GIF89a";
pub const BMP_SIGNATURE: &[u8; 2] = b"BM";

pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&PNG_SIGNATURE)
}

pub fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&JPEG_SIGNATURE)
}

pub fn is_gif(data: &[u8]) -> bool {
    data.starts_with(GIF87A_SIGNATURE) || data.starts_with(GIF89A_SIGNATURE)
}

/// `RIFF <size> WEBP`
pub fn is_webp(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP"
}

pub fn is_bmp(data: &[u8]) -> bool {
    data.starts_with(BMP_SIGNATURE)
}

/// Detects a built-in format from the leading bytes
pub fn detect_format(data: &[u8]) -> Option<ImageFormat> {
    if is_png(data) {
        Some(ImageFormat::Png)
    } else if is_jpeg(data) {
        Some(ImageFormat::Jpeg)
    } else if is_gif(data) {
        Some(ImageFormat::Gif)
    } else if is_webp(data) {
        Some(ImageFormat::WebP)
    } else if is_bmp(data) {
        Some(ImageFormat::Bmp)
    } else {
        None
    }
}
