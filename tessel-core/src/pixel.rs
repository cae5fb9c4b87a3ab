//! RGBA8 pixel storage shared by decoders and render targets

use crate::{Error, Result};

/// Every surface in the engine is 8-bit RGBA, 4 bytes per pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// A single RGBA8 colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Unpacks a host colour int laid out as `0xAARRGGBB`
    pub const fn from_argb(argb: u32) -> Self {
        Self {
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
            a: (argb >> 24) as u8,
        }
    }

    /// Packs the colour as `0xAARRGGBB`
    pub const fn to_argb(self) -> u32 {
        ((self.a as u32) << 24) | ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }

    /// Memory order of the colour inside a surface
    pub const fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub const fn is_opaque(self) -> bool {
        self.a == u8::MAX
    }
}

/// Flat RGBA8 pixel surface.
///
/// Rows are `stride` bytes apart and the first `width * 4` bytes of each row
/// hold pixels; any remaining bytes are row padding. The buffer always holds
/// exactly `stride * height` bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    stride: u32,
    pixels: Vec<u8>,
}

impl PixelBuffer {
    /// Creates a zeroed buffer with a tight stride
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let stride = tight_stride(width, height)?;
        Self::with_stride(width, height, stride)
    }

    /// Creates a zeroed buffer with an explicit row stride in bytes
    pub fn with_stride(width: u32, height: u32, stride: u32) -> Result<Self> {
        let len = checked_len(width, height, stride)?;
        Ok(Self {
            width,
            height,
            stride,
            pixels: vec![0u8; len],
        })
    }

    /// Creates a buffer with every pixel set to `color`
    pub fn filled(width: u32, height: u32, color: Rgba) -> Result<Self> {
        let mut buffer = Self::new(width, height)?;
        buffer.fill(color);
        Ok(buffer)
    }

    /// Wraps tightly packed RGBA8 data without copying
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let stride = tight_stride(width, height)?;
        Self::from_raw_with_stride(width, height, stride, pixels)
    }

    /// Wraps RGBA8 rows that are `stride` bytes apart without copying
    pub fn from_raw_with_stride(
        width: u32,
        height: u32,
        stride: u32,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        let expected = checked_len(width, height, stride)?;
        if pixels.len() != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            pixels,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Distance between the starts of two rows, in bytes
    #[inline]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Number of pixel bytes in one row, excluding padding
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.pixels
    }

    /// Pixel bytes of row `y`, or `None` past the last row
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride as usize;
        Some(&self.pixels[start..start + self.row_bytes()])
    }

    pub fn row_mut(&mut self, y: u32) -> Option<&mut [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride as usize;
        let len = self.row_bytes();
        Some(&mut self.pixels[start..start + len])
    }

    /// Iterates over the pixel bytes of every row, top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.height).filter_map(move |y| self.row(y))
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width {
            return None;
        }
        let row = self.row(y)?;
        let offset = x as usize * BYTES_PER_PIXEL;
        let mut bytes = [0u8; BYTES_PER_PIXEL];
        bytes.copy_from_slice(&row[offset..offset + BYTES_PER_PIXEL]);
        Some(Rgba::from_bytes(bytes))
    }

    /// Sets one pixel; coordinates outside the buffer are ignored
    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgba) {
        if x >= self.width {
            return;
        }
        if let Some(row) = self.row_mut(y) {
            let offset = x as usize * BYTES_PER_PIXEL;
            row[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&color.to_bytes());
        }
    }

    pub fn fill(&mut self, color: Rgba) {
        let bytes = color.to_bytes();
        for y in 0..self.height {
            if let Some(row) = self.row_mut(y) {
                for px in row.chunks_exact_mut(BYTES_PER_PIXEL) {
                    px.copy_from_slice(&bytes);
                }
            }
        }
    }

    /// Fills a rectangle, clipped to the buffer
    pub fn fill_rect(&mut self, x: i64, y: i64, width: i64, height: i64, color: Rgba) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(width).min(self.width as i64);
        let y1 = y.saturating_add(height).min(self.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let bytes = color.to_bytes();
        for row_y in y0..y1 {
            if let Some(row) = self.row_mut(row_y as u32) {
                let span = &mut row[x0 as usize * BYTES_PER_PIXEL..x1 as usize * BYTES_PER_PIXEL];
                for px in span.chunks_exact_mut(BYTES_PER_PIXEL) {
                    px.copy_from_slice(&bytes);
                }
            }
        }
    }

    /// True iff every pixel has full alpha
    pub fn is_opaque(&self) -> bool {
        self.rows().all(|row| {
            row.chunks_exact(BYTES_PER_PIXEL)
                .all(|px| px[3] == u8::MAX)
        })
    }

    /// Copies the pixels into a new buffer with a tight stride
    pub fn to_packed(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(self.row_bytes() * self.height as usize);
        for row in self.rows() {
            packed.extend_from_slice(row);
        }
        packed
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

fn tight_stride(width: u32, height: u32) -> Result<u32> {
    width
        .checked_mul(BYTES_PER_PIXEL as u32)
        .ok_or(Error::DimensionOverflow { width, height })
}

fn checked_len(width: u32, height: u32, stride: u32) -> Result<usize> {
    let min_stride = tight_stride(width, height)?;
    if stride < min_stride {
        return Err(Error::InvalidStride { width, stride });
    }
    (stride as usize)
        .checked_mul(height as usize)
        .ok_or(Error::DimensionOverflow { width, height })
}
