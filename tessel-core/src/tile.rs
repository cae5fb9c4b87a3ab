//! Tile rendering into a reusable scratch buffer for GPU texture upload

use crate::render::{render_frame, SurfaceMut};
use crate::{Image, PixelBuffer, RenderRequest, Result, BYTES_PER_PIXEL};

/// Side of the square scratch buffer, in pixels
pub const MAX_TILE_SIZE: u32 = 512;

/// Largest tile, in pixels, that [`TileRenderer`] will render
pub const MAX_TILE_AREA: usize = (MAX_TILE_SIZE * MAX_TILE_SIZE) as usize;

/// Which part of the image a tile covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileRequest {
    /// Tells the uploader to allocate the whole texture rather than update it
    pub init: bool,
    pub src_x: i32,
    pub src_y: i32,
    pub width: i32,
    pub height: i32,
}

impl TileRequest {
    pub fn new(src_x: i32, src_y: i32, width: i32, height: i32) -> Self {
        Self {
            init: false,
            src_x,
            src_y,
            width,
            height,
        }
    }

    pub fn init(mut self, init: bool) -> Self {
        self.init = init;
        self
    }

    /// Pixel count, or `None` for empty and oversized tiles
    fn area(&self) -> Option<usize> {
        if self.width <= 0 || self.height <= 0 {
            return None;
        }
        let area = self.width as u64 * self.height as u64;
        (area <= MAX_TILE_AREA as u64).then_some(area as usize)
    }
}

/// A rendered tile, borrowed from the renderer's scratch buffer.
///
/// Rows are tightly packed (`width * 4` bytes each). The borrow ends before
/// the next tile can be rendered.
#[derive(Debug, Clone, Copy)]
pub struct Tile<'a> {
    pub init: bool,
    pub width: u32,
    pub height: u32,
    bytes: &'a [u8],
}

impl<'a> Tile<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<crate::Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let mut px = [0u8; BYTES_PER_PIXEL];
        px.copy_from_slice(&self.bytes[offset..offset + BYTES_PER_PIXEL]);
        Some(crate::Rgba::from_bytes(px))
    }
}

/// Receives rendered tiles, typically to upload them into a texture
pub trait TileSink {
    fn upload(&mut self, tile: &Tile<'_>);
}

impl<F> TileSink for F
where
    F: FnMut(&Tile<'_>),
{
    fn upload(&mut self, tile: &Tile<'_>) {
        self(tile)
    }
}

/// Renders image tiles into one scratch buffer allocated up front.
///
/// Rendering takes `&mut self`, so only one tile can be in flight per
/// renderer; share a renderer across threads behind a lock.
pub struct TileRenderer {
    scratch: PixelBuffer,
}

impl TileRenderer {
    pub fn new() -> Result<Self> {
        let scratch = PixelBuffer::new(MAX_TILE_SIZE, MAX_TILE_SIZE)?;
        tracing::debug!(bytes = scratch.as_bytes().len(), "allocated tile scratch buffer");
        Ok(Self { scratch })
    }

    /// Renders a tile of the image's current frame.
    ///
    /// Returns `None`, leaving the scratch buffer untouched, when the tile is
    /// empty or larger than [`MAX_TILE_AREA`]. Tile pixels with no source
    /// pixel keep whatever the scratch buffer held before.
    pub fn render_tile(&mut self, image: &Image, request: &TileRequest) -> Option<Tile<'_>> {
        let Some(area) = request.area() else {
            tracing::trace!(?request, "skipping empty or oversized tile");
            return None;
        };

        let width = request.width as u32;
        let height = request.height as u32;
        let len = area * BYTES_PER_PIXEL;
        let bytes = &mut self.scratch.as_bytes_mut()[..len];

        let surface = SurfaceMut {
            bytes,
            width,
            height,
            stride: width as usize * BYTES_PER_PIXEL,
        };
        let region = RenderRequest::new(request.src_x, request.src_y, request.width, request.height);
        render_frame(&image.current_frame().pixels, surface, &region);

        Some(Tile {
            init: request.init,
            width,
            height,
            bytes: &self.scratch.as_bytes()[..len],
        })
    }

    /// Renders a tile and hands it to `sink`; returns whether a tile was produced
    pub fn upload_tile<S>(&mut self, image: &Image, request: &TileRequest, sink: &mut S) -> bool
    where
        S: TileSink + ?Sized,
    {
        match self.render_tile(image, request) {
            Some(tile) => {
                sink.upload(&tile);
                true
            }
            None => false,
        }
    }

    pub fn scratch(&self) -> &PixelBuffer {
        &self.scratch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rgba;

    fn checker(width: u32, height: u32) -> Image {
        let mut buffer = PixelBuffer::new(width, height).unwrap();
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                buffer.put_pixel(x, y, Rgba::new(v, x as u8, y as u8, 255));
            }
        }
        Image::new_static(crate::ImageFormat::Png, buffer).unwrap()
    }

    #[test]
    fn test_tile_is_tightly_packed() {
        let image = checker(10, 10);
        let mut renderer = TileRenderer::new().unwrap();

        let tile = renderer
            .render_tile(&image, &TileRequest::new(4, 6, 3, 2).init(true))
            .unwrap();

        assert!(tile.init);
        assert_eq!(tile.bytes().len(), 3 * 2 * 4);
        assert_eq!(tile.pixel(0, 0), Some(Rgba::new(255, 4, 6, 255)));
        assert_eq!(tile.pixel(2, 1), Some(Rgba::new(0, 6, 7, 255)));
        assert_eq!(tile.pixel(3, 0), None);
    }

    #[test]
    fn test_oversized_tile_is_rejected() {
        let image = checker(4, 4);
        let mut renderer = TileRenderer::new().unwrap();
        let before = renderer.scratch().clone();

        let side = MAX_TILE_SIZE as i32;
        assert!(renderer
            .render_tile(&image, &TileRequest::new(0, 0, side + 1, side))
            .is_none());
        assert!(renderer
            .render_tile(&image, &TileRequest::new(0, 0, i32::MAX, i32::MAX))
            .is_none());
        assert!(renderer
            .render_tile(&image, &TileRequest::new(0, 0, 0, 16))
            .is_none());

        assert!(renderer.scratch() == &before);
    }

    #[test]
    fn test_wide_tile_within_area_is_accepted() {
        let image = checker(4, 4);
        let mut renderer = TileRenderer::new().unwrap();
        let request = TileRequest::new(0, 0, (MAX_TILE_SIZE * 2) as i32, (MAX_TILE_SIZE / 2) as i32);
        let tile = renderer.render_tile(&image, &request).unwrap();
        assert_eq!(tile.bytes().len(), MAX_TILE_AREA * 4);
        assert_eq!(tile.pixel(0, 0), Some(Rgba::new(255, 0, 0, 255)));
    }

    #[test]
    fn test_ragged_edge_keeps_previous_contents() {
        let image = checker(3, 3);
        let mut renderer = TileRenderer::new().unwrap();

        let tile = renderer.render_tile(&image, &TileRequest::new(2, 2, 2, 2)).unwrap();
        assert_eq!(tile.pixel(0, 0), Some(Rgba::new(255, 2, 2, 255)));
        // No source pixel and no fill: the zeroed scratch shows through
        assert_eq!(tile.pixel(1, 1), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn test_upload_tile_reaches_sink() {
        let image = checker(8, 8);
        let mut renderer = TileRenderer::new().unwrap();
        let mut uploads = Vec::new();
        let mut sink = |tile: &Tile<'_>| uploads.push((tile.init, tile.width, tile.height));

        assert!(renderer.upload_tile(&image, &TileRequest::new(0, 0, 8, 8).init(true), &mut sink));
        assert!(renderer.upload_tile(&image, &TileRequest::new(0, 0, 4, 2), &mut sink));
        assert!(!renderer.upload_tile(&image, &TileRequest::new(0, 0, 1024, 1024), &mut sink));

        assert_eq!(uploads, vec![(true, 8, 8), (false, 4, 2)]);
    }
}
