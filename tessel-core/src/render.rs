//! Region rendering from an image's current frame into a pixel surface

use crate::{Error, Image, PixelBuffer, Result, Rgba, BYTES_PER_PIXEL};

/// Describes which region of the image goes where in the destination.
///
/// Coordinates are signed so callers can ask for regions that hang off any
/// edge; everything is clipped before a single byte is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderRequest {
    pub src_x: i32,
    pub src_y: i32,
    pub dst_x: i32,
    pub dst_y: i32,
    pub width: i32,
    pub height: i32,
    /// Paint `default_color` where the region has no source pixels
    pub fill_blank: bool,
    pub default_color: Rgba,
}

impl RenderRequest {
    /// Region of `width x height` starting at `(src_x, src_y)`, drawn at the
    /// destination origin
    pub fn new(src_x: i32, src_y: i32, width: i32, height: i32) -> Self {
        Self {
            src_x,
            src_y,
            width,
            height,
            ..Self::default()
        }
    }

    pub fn at(mut self, dst_x: i32, dst_y: i32) -> Self {
        self.dst_x = dst_x;
        self.dst_y = dst_y;
        self
    }

    pub fn fill_blank(mut self, default_color: Rgba) -> Self {
        self.fill_blank = true;
        self.default_color = default_color;
        self
    }

    fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Destination pixels borrowed from memory the engine does not own, such as
/// a host bitmap.
///
/// Rows start every `stride` bytes; only the first `width * 4` bytes of each
/// row are ever written.
pub struct SurfaceMut<'a> {
    pub(crate) bytes: &'a mut [u8],
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) stride: usize,
}

impl<'a> SurfaceMut<'a> {
    /// Wraps `bytes` as a `width x height` surface.
    ///
    /// The last row may be short of a full stride, as long as it holds
    /// `width` pixels.
    pub fn new(bytes: &'a mut [u8], width: u32, height: u32, stride: u32) -> Result<Self> {
        let row_bytes = (width as usize)
            .checked_mul(BYTES_PER_PIXEL)
            .ok_or(Error::DimensionOverflow { width, height })?;
        if (stride as usize) < row_bytes {
            return Err(Error::InvalidStride { width, stride });
        }
        let required = match height {
            0 => 0,
            h => (stride as usize)
                .checked_mul(h as usize - 1)
                .and_then(|n| n.checked_add(row_bytes))
                .ok_or(Error::DimensionOverflow { width, height })?,
        };
        if bytes.len() < required {
            return Err(Error::BufferSizeMismatch {
                expected: required,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes,
            width,
            height,
            stride: stride as usize,
        })
    }

    pub fn from_buffer(buffer: &'a mut PixelBuffer) -> Self {
        let width = buffer.width();
        let height = buffer.height();
        let stride = buffer.stride() as usize;
        Self {
            bytes: buffer.as_bytes_mut(),
            width,
            height,
            stride,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Renders a region of the image's current frame into `dst`.
///
/// Never fails: regions outside the destination are clipped away, and
/// regions outside the frame are skipped or painted with the default colour.
/// Pixels are copied as-is, with no blending.
pub fn render(image: &Image, dst: &mut PixelBuffer, request: &RenderRequest) {
    render_frame(&image.current_frame().pixels, SurfaceMut::from_buffer(dst), request);
}

/// Same as [`render`], into borrowed memory
pub fn render_to_surface(image: &Image, dst: SurfaceMut<'_>, request: &RenderRequest) {
    render_frame(&image.current_frame().pixels, dst, request);
}

pub(crate) fn render_frame(src: &PixelBuffer, mut dst: SurfaceMut<'_>, request: &RenderRequest) {
    if request.is_empty() {
        return;
    }

    let dst_x = request.dst_x as i64;
    let dst_y = request.dst_y as i64;
    let src_x = request.src_x as i64;
    let src_y = request.src_y as i64;
    let width = request.width as i64;
    let height = request.height as i64;

    // Destination rectangle clipped to the surface
    let x0 = dst_x.max(0);
    let y0 = dst_y.max(0);
    let x1 = (dst_x + width).min(dst.width as i64);
    let y1 = (dst_y + height).min(dst.height as i64);
    if x0 >= x1 || y0 >= y1 {
        tracing::trace!(?request, "render region lies outside destination");
        return;
    }

    // Destination columns that map onto existing source columns
    let cx0 = x0.max(dst_x - src_x);
    let cx1 = x1.min(dst_x - src_x + src.width() as i64);

    let fill = request.default_color.to_bytes();
    let stride = dst.stride;

    for y in y0..y1 {
        let row_start = y as usize * stride;
        let row = &mut dst.bytes[row_start..row_start + dst.width as usize * BYTES_PER_PIXEL];

        let sy = src_y + (y - dst_y);
        let src_row = if (0..src.height() as i64).contains(&sy) {
            src.row(sy as u32)
        } else {
            None
        };

        match src_row {
            Some(src_row) if cx0 < cx1 => {
                let sx0 = (src_x + (cx0 - dst_x)) as usize;
                let len = (cx1 - cx0) as usize * BYTES_PER_PIXEL;
                let from = sx0 * BYTES_PER_PIXEL;
                let to = cx0 as usize * BYTES_PER_PIXEL;
                row[to..to + len].copy_from_slice(&src_row[from..from + len]);

                if request.fill_blank {
                    fill_span(row, x0, cx0, fill);
                    fill_span(row, cx1, x1, fill);
                }
            }
            _ => {
                if request.fill_blank {
                    fill_span(row, x0, x1, fill);
                }
            }
        }
    }
}

fn fill_span(row: &mut [u8], from: i64, to: i64, color: [u8; 4]) {
    if from >= to {
        return;
    }
    let span = &mut row[from as usize * BYTES_PER_PIXEL..to as usize * BYTES_PER_PIXEL];
    for px in span.chunks_exact_mut(BYTES_PER_PIXEL) {
        px.copy_from_slice(&color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Frame, ImageFormat, ImageKind};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const RED: Rgba = Rgba::new(255, 0, 0, 255);
    const GREEN: Rgba = Rgba::new(0, 255, 0, 255);
    const BLUE: Rgba = Rgba::new(0, 0, 255, 255);
    const YELLOW: Rgba = Rgba::new(255, 255, 0, 255);

    fn two_by_two() -> Image {
        let mut pixels = Vec::new();
        for c in [RED, GREEN, BLUE, YELLOW] {
            pixels.extend_from_slice(&c.to_bytes());
        }
        Image::from_pixels(2, 2, pixels).unwrap()
    }

    fn gradient(width: u32, height: u32) -> Image {
        let mut buffer = PixelBuffer::new(width, height).unwrap();
        for y in 0..height {
            for x in 0..width {
                buffer.put_pixel(x, y, Rgba::new(x as u8, y as u8, (x ^ y) as u8, 255));
            }
        }
        Image::new_static(ImageFormat::Png, buffer).unwrap()
    }

    #[test]
    fn test_render_into_larger_destination() {
        let image = two_by_two();
        let mut dst = PixelBuffer::filled(4, 4, Rgba::WHITE).unwrap();
        let request = RenderRequest::new(0, 0, 2, 2)
            .at(1, 1)
            .fill_blank(Rgba::TRANSPARENT);

        render(&image, &mut dst, &request);

        assert_eq!(dst.pixel(1, 1), Some(RED));
        assert_eq!(dst.pixel(2, 1), Some(GREEN));
        assert_eq!(dst.pixel(1, 2), Some(BLUE));
        assert_eq!(dst.pixel(2, 2), Some(YELLOW));
        // Cells outside the requested rectangle keep their old value
        assert_eq!(dst.pixel(0, 0), Some(Rgba::WHITE));
        assert_eq!(dst.pixel(3, 3), Some(Rgba::WHITE));
    }

    #[test]
    fn test_fill_blank_fills_whole_rectangle() {
        let image = two_by_two();
        let mut dst = PixelBuffer::filled(4, 4, Rgba::WHITE).unwrap();
        let request = RenderRequest::new(-1, -1, 4, 4).fill_blank(Rgba::TRANSPARENT);

        render(&image, &mut dst, &request);

        for y in 0..4 {
            for x in 0..4 {
                let expected = match (x, y) {
                    (1, 1) => RED,
                    (2, 1) => GREEN,
                    (1, 2) => BLUE,
                    (2, 2) => YELLOW,
                    _ => Rgba::TRANSPARENT,
                };
                assert_eq!(dst.pixel(x, y), Some(expected), "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_source_entirely_outside() {
        let image = two_by_two();
        let color = Rgba::new(10, 20, 30, 40);

        let mut filled = PixelBuffer::filled(3, 3, Rgba::WHITE).unwrap();
        render(&image, &mut filled, &RenderRequest::new(10, 10, 3, 3).fill_blank(color));
        assert!(filled.rows().all(|row| row.chunks_exact(4).all(|px| px == color.to_bytes())));

        let mut untouched = PixelBuffer::filled(3, 3, Rgba::WHITE).unwrap();
        render(&image, &mut untouched, &RenderRequest::new(10, 10, 3, 3));
        assert_eq!(untouched, PixelBuffer::filled(3, 3, Rgba::WHITE).unwrap());
    }

    #[test]
    fn test_ragged_edge_without_fill_leaves_destination() {
        let image = two_by_two();
        let mut dst = PixelBuffer::filled(3, 3, Rgba::WHITE).unwrap();
        render(&image, &mut dst, &RenderRequest::new(1, 1, 3, 3));

        assert_eq!(dst.pixel(0, 0), Some(YELLOW));
        assert_eq!(dst.pixel(1, 0), Some(Rgba::WHITE));
        assert_eq!(dst.pixel(0, 1), Some(Rgba::WHITE));
    }

    #[test]
    fn test_empty_request_is_noop() {
        let image = two_by_two();
        let mut dst = PixelBuffer::filled(2, 2, Rgba::WHITE).unwrap();
        let before = dst.clone();
        for (w, h) in [(0, 2), (2, 0), (-3, 2), (2, -1)] {
            render(&image, &mut dst, &RenderRequest::new(0, 0, w, h).fill_blank(Rgba::BLACK));
        }
        assert_eq!(dst, before);
    }

    #[test]
    fn test_renders_current_animation_frame() {
        let frames = vec![
            Frame::new(PixelBuffer::filled(1, 1, RED).unwrap(), 10),
            Frame::new(PixelBuffer::filled(1, 1, GREEN).unwrap(), 10),
        ];
        let mut image = Image::from_frames(ImageFormat::Gif, ImageKind::Animated, frames).unwrap();
        let mut dst = PixelBuffer::new(1, 1).unwrap();

        render(&image, &mut dst, &RenderRequest::new(0, 0, 1, 1));
        assert_eq!(dst.pixel(0, 0), Some(RED));

        image.advance();
        render(&image, &mut dst, &RenderRequest::new(0, 0, 1, 1));
        assert_eq!(dst.pixel(0, 0), Some(GREEN));
    }

    #[test]
    fn test_surface_validation() {
        let mut bytes = vec![0u8; 64];
        assert!(matches!(
            SurfaceMut::new(&mut bytes, 4, 2, 12),
            Err(Error::InvalidStride { width: 4, stride: 12 })
        ));
        assert!(matches!(
            SurfaceMut::new(&mut bytes, 4, 4, 20),
            Err(Error::BufferSizeMismatch { expected: 76, actual: 64 })
        ));
        // Last row needs only its pixels, not a full stride
        assert!(SurfaceMut::new(&mut bytes[..56], 4, 3, 20).is_ok());
    }

    #[test]
    fn test_render_to_borrowed_surface() {
        let image = two_by_two();
        let mut bytes = vec![0xEEu8; 2 * 12 - 4];
        let surface = SurfaceMut::new(&mut bytes, 2, 2, 12).unwrap();
        render_to_surface(&image, surface, &RenderRequest::new(0, 0, 2, 2));

        assert_eq!(&bytes[0..8], &[RED.to_bytes(), GREEN.to_bytes()].concat()[..]);
        assert_eq!(&bytes[8..12], &[0xEE; 4]);
        assert_eq!(&bytes[12..20], &[BLUE.to_bytes(), YELLOW.to_bytes()].concat()[..]);
    }

    #[test]
    fn test_adversarial_offsets_stay_inside_destination() {
        let image = gradient(7, 5);
        let mut rng = StdRng::seed_from_u64(0x7e55e1);
        let sentinel = Rgba::new(0xAB, 0xCD, 0xEF, 0x12);

        for _ in 0..2000 {
            // Padded stride: padding bytes must survive every render
            let width = rng.random_range(1..9u32);
            let height = rng.random_range(1..9u32);
            let stride = width * 4 + rng.random_range(0..3u32) * 4;
            let mut dst = PixelBuffer::with_stride(width, height, stride).unwrap();
            dst.as_bytes_mut().fill(0xEE);
            dst.fill(sentinel);

            let request = RenderRequest {
                src_x: rng.random_range(-12..12),
                src_y: rng.random_range(-12..12),
                dst_x: rng.random_range(-12..12),
                dst_y: rng.random_range(-12..12),
                width: rng.random_range(-2..20),
                height: rng.random_range(-2..20),
                fill_blank: rng.random_bool(0.5),
                default_color: Rgba::new(1, 2, 3, 4),
            };
            render(&image, &mut dst, &request);

            for y in 0..height {
                let row_start = (y * stride) as usize;
                let padding = &dst.as_bytes()[row_start + width as usize * 4..row_start + stride as usize];
                assert!(padding.iter().all(|&b| b == 0xEE), "{request:?}");

                for x in 0..width {
                    let px = dst.pixel(x, y).unwrap();
                    let in_rect = (x as i32) >= request.dst_x
                        && (x as i32) < request.dst_x + request.width
                        && (y as i32) >= request.dst_y
                        && (y as i32) < request.dst_y + request.height;
                    if !in_rect {
                        assert_eq!(px, sentinel, "{request:?} wrote ({x}, {y})");
                        continue;
                    }
                    let sx = request.src_x + (x as i32 - request.dst_x);
                    let sy = request.src_y + (y as i32 - request.dst_y);
                    let expected = if (0..7).contains(&sx) && (0..5).contains(&sy) {
                        Rgba::new(sx as u8, sy as u8, (sx ^ sy) as u8, 255)
                    } else if request.fill_blank {
                        request.default_color
                    } else {
                        sentinel
                    };
                    assert_eq!(px, expected, "{request:?} at ({x}, {y})");
                }
            }
        }
    }
}
