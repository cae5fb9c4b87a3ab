//! Tessel Core Library
//!
//! This library provides the in-memory side of the Tessel image engine:
//! RGBA8 pixel buffers, decoded images with their animation cursor, and
//! the region/tile renderers that copy image pixels into caller surfaces.

pub mod image;
pub mod pixel;
pub mod render;
pub mod tile;

pub use image::{AnimationCursor, Frame, Image, ImageFormat, ImageInfo, ImageKind};
pub use pixel::{PixelBuffer, Rgba, BYTES_PER_PIXEL};
pub use render::{render, render_to_surface, RenderRequest, SurfaceMut};
pub use tile::{Tile, TileRenderer, TileRequest, TileSink, MAX_TILE_AREA, MAX_TILE_SIZE};

/// Result type for tessel-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tessel-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Stride {stride} is smaller than a row of {width} pixels")]
    InvalidStride { width: u32, stride: u32 },

    #[error("Pixel data is {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Buffer size overflows for {width}x{height}")]
    DimensionOverflow { width: u32, height: u32 },

    #[error("Frame {index} is {width}x{height}, image is {image_width}x{image_height}")]
    FrameSizeMismatch {
        index: usize,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Image has no frames")]
    NoFrames,

    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
