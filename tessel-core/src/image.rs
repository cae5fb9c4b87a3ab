//! Decoded image data structures and the animation cursor

use crate::{Error, PixelBuffer, Result};

/// Encoded format an image was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
    Bmp,
    /// Wrapped from caller-supplied pixels, never encoded
    Raw,
}

impl ImageFormat {
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Gif => "GIF",
            ImageFormat::WebP => "WebP",
            ImageFormat::Bmp => "BMP",
            ImageFormat::Raw => "raw",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether an image has one frame or a timed sequence of frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ImageKind {
    Static,
    Animated,
}

/// A single frame of an image
#[derive(Debug, Clone)]
pub struct Frame {
    /// Fully composited frame pixels, same size as the image
    pub pixels: PixelBuffer,
    /// Display time in milliseconds (always 0 for static images)
    pub delay_ms: u32,
}

impl Frame {
    pub fn new(pixels: PixelBuffer, delay_ms: u32) -> Self {
        Self { pixels, delay_ms }
    }
}

/// Position of an animated image in its frame sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnimationCursor {
    current_index: usize,
}

impl AnimationCursor {
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Moves to the next frame, looping back to the first one
    fn advance(&mut self, frame_count: usize) {
        self.current_index = (self.current_index + 1) % frame_count;
    }
}

/// Summary of an image, for inspection and reporting
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub opaque: bool,
    pub frame_count: usize,
    pub total_duration_ms: u64,
}

impl ImageInfo {
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A decoded image.
///
/// An `Image` owns every frame it holds and is released by value: once
/// [`Image::release`] (or a plain drop) has run, no handle to it remains.
/// Advancing the animation needs `&mut self`, so a shared image cannot be
/// advanced while it is being rendered.
#[derive(Debug)]
pub struct Image {
    format: ImageFormat,
    kind: ImageKind,
    width: u32,
    height: u32,
    opaque: bool,
    frames: Vec<Frame>,
    cursor: Option<AnimationCursor>,
}

impl Image {
    /// Builds a single-frame image
    pub fn new_static(format: ImageFormat, pixels: PixelBuffer) -> Result<Self> {
        Self::from_frames(format, ImageKind::Static, vec![Frame::new(pixels, 0)])
    }

    /// Builds an image from already decoded frames.
    ///
    /// Every frame must match the first frame's dimensions. Static images
    /// keep only their first frame, with no delay.
    pub fn from_frames(format: ImageFormat, kind: ImageKind, mut frames: Vec<Frame>) -> Result<Self> {
        let first = frames.first().ok_or(Error::NoFrames)?;
        let width = first.pixels.width();
        let height = first.pixels.height();
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }

        for (index, frame) in frames.iter().enumerate() {
            if frame.pixels.width() != width || frame.pixels.height() != height {
                return Err(Error::FrameSizeMismatch {
                    index,
                    width: frame.pixels.width(),
                    height: frame.pixels.height(),
                    image_width: width,
                    image_height: height,
                });
            }
        }

        if kind == ImageKind::Static {
            frames.truncate(1);
            frames[0].delay_ms = 0;
        }

        let opaque = frames[0].pixels.is_opaque();

        Ok(Self {
            format,
            kind,
            width,
            height,
            opaque,
            frames,
            cursor: None,
        })
    }

    /// Wraps caller pixels (tightly packed RGBA8) as a static image
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let buffer = PixelBuffer::from_raw(width, height, pixels)?;
        Self::new_static(ImageFormat::Raw, buffer)
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn is_animated(&self) -> bool {
        self.kind == ImageKind::Animated
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// True iff every pixel of the first frame has full alpha
    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn current_index(&self) -> usize {
        self.cursor.map_or(0, |c| c.current_index())
    }

    pub fn current_frame(&self) -> &Frame {
        &self.frames[self.current_index()]
    }

    /// Delay of the current frame; static images never wait
    pub fn delay_ms(&self) -> u32 {
        match self.kind {
            ImageKind::Static => 0,
            ImageKind::Animated => self.current_frame().delay_ms,
        }
    }

    /// Steps to the next frame, wrapping after the last one.
    ///
    /// Does nothing on static images.
    pub fn advance(&mut self) {
        if self.kind == ImageKind::Static {
            return;
        }
        let frame_count = self.frames.len();
        self.cursor
            .get_or_insert_with(AnimationCursor::default)
            .advance(frame_count);
    }

    /// Rewinds the animation to its first frame
    pub fn reset_animation(&mut self) {
        self.cursor = None;
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.frames.iter().map(|f| f.delay_ms as u64).sum()
    }

    pub fn info(&self) -> ImageInfo {
        ImageInfo {
            format: self.format,
            kind: self.kind,
            width: self.width,
            height: self.height,
            opaque: self.opaque,
            frame_count: self.frames.len(),
            total_duration_ms: self.total_duration_ms(),
        }
    }

    /// Frees the image and all of its frames
    pub fn release(self) {
        tracing::trace!(
            format = %self.format,
            frames = self.frames.len(),
            "releasing image"
        );
        drop(self);
    }
}
