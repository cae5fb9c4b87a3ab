//! Format dispatch table

use crate::formats::{BmpFormat, GifFormat, JpegFormat, PngFormat, WebpFormat};
use crate::{DecodeConfig, Probe, Result};
use tessel_core::{Image, ImageFormat};

/// One encoded format the engine knows how to decode
pub trait FormatDecoder: Send + Sync {
    /// Format tag given to decoded images
    fn format(&self) -> ImageFormat;

    /// Whether `header` starts with this format's signature
    fn matches(&self, header: &[u8]) -> bool;

    /// Walks the container structure without allocating pixel storage
    fn probe(&self, data: &[u8]) -> Result<Probe>;

    /// Decodes pixels; only called after a successful probe
    fn decode(&self, data: &[u8], probe: &Probe, config: &DecodeConfig) -> Result<Image>;
}

/// Maps signatures to decoders. Later registrations win over earlier ones,
/// so a custom decoder can take over a built-in format.
pub struct FormatRegistry {
    decoders: Vec<Box<dyn FormatDecoder>>,
}

impl FormatRegistry {
    /// Creates a registry with no formats
    pub fn empty() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Creates a registry with the built-in PNG, JPEG, GIF, WebP and BMP decoders
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(BmpFormat));
        registry.register(Box::new(WebpFormat));
        registry.register(Box::new(GifFormat));
        registry.register(Box::new(JpegFormat));
        registry.register(Box::new(PngFormat));
        registry
    }

    pub fn register(&mut self, decoder: Box<dyn FormatDecoder>) {
        self.decoders.insert(0, decoder);
    }

    /// Finds the decoder whose signature matches the data
    pub fn find(&self, data: &[u8]) -> Option<&dyn FormatDecoder> {
        self.decoders
            .iter()
            .find(|d| d.matches(data))
            .map(|d| d.as_ref())
    }

    pub fn formats(&self) -> Vec<ImageFormat> {
        self.decoders.iter().map(|d| d.format()).collect()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
