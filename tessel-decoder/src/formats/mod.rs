//! Built-in formats
//!
//! Each format pairs a structural probe written against the container
//! layout with the matching pixel decoder from the `image` crate.

mod bmp;
mod gif;
mod jpeg;
mod png;
mod webp;

pub use bmp::BmpFormat;
pub use gif::GifFormat;
pub use jpeg::JpegFormat;
pub use png::PngFormat;
pub use webp::WebpFormat;
