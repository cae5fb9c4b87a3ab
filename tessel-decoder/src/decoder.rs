//! Decode entry points

use crate::{DecodeConfig, Error, FormatRegistry, Probe, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tessel_core::Image;

/// Decodes images from memory, readers or files using a format registry
pub struct Decoder {
    config: DecodeConfig,
    registry: FormatRegistry,
}

impl Decoder {
    /// Creates a decoder with the built-in formats and default limits
    pub fn new() -> Self {
        Self::with_config(DecodeConfig::default())
    }

    pub fn with_config(config: DecodeConfig) -> Self {
        Self {
            config,
            registry: FormatRegistry::with_builtin(),
        }
    }

    pub fn with_registry(config: DecodeConfig, registry: FormatRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Gives access to the registry, e.g. to add a custom format
    pub fn registry_mut(&mut self) -> &mut FormatRegistry {
        &mut self.registry
    }

    /// Identifies the format and walks the container without decoding pixels
    pub fn probe(&self, data: &[u8]) -> Result<Probe> {
        let decoder = self.registry.find(data).ok_or(Error::UnsupportedFormat)?;
        decoder.probe(data)
    }

    /// Decodes a complete encoded image held in memory
    pub fn decode_memory(&self, data: &[u8]) -> Result<Image> {
        let decoder = self.registry.find(data).ok_or(Error::UnsupportedFormat)?;
        let format = decoder.format();

        let probe = decoder.probe(data)?;
        self.config
            .check_dimensions(format, probe.width, probe.height)?;
        probe.check_backing()?;
        if probe.truncated_tail {
            tracing::warn!(%format, "input is damaged after the first frame, decoding what is intact");
        }

        let image = decoder.decode(data, &probe, &self.config)?;
        tracing::debug!(
            %format,
            width = image.width(),
            height = image.height(),
            frames = image.frame_count(),
            opaque = image.is_opaque(),
            "decoded image"
        );
        Ok(image)
    }

    /// Reads a stream to its end, then decodes it.
    ///
    /// Streams longer than `max_input_bytes` are refused without reading
    /// past the limit.
    pub fn decode_reader<R: Read>(&self, reader: R) -> Result<Image> {
        let limit = self.config.max_input_bytes;
        let mut data = Vec::new();
        reader.take(limit.saturating_add(1)).read_to_end(&mut data)?;

        if data.len() as u64 > limit {
            return Err(Error::AllocationFailure(format!(
                "input is larger than {limit} bytes"
            )));
        }
        self.decode_memory(&data)
    }

    pub fn decode_file<P: AsRef<Path>>(&self, path: P) -> Result<Image> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "decoding file");
        let file = File::open(path)?;
        self.decode_reader(file)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes in-memory bytes with the default configuration
pub fn decode_memory(data: &[u8]) -> Result<Image> {
    Decoder::new().decode_memory(data)
}

/// Decodes a stream with the default configuration
pub fn decode_reader<R: Read>(reader: R) -> Result<Image> {
    Decoder::new().decode_reader(reader)
}

/// Decodes a file with the default configuration
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<Image> {
    Decoder::new().decode_file(path)
}
