//! Tessel Decoder Library
//!
//! This library turns encoded image bytes into [`tessel_core::Image`] values.
//! Every source goes through the same pipeline: sniff the magic bytes, walk
//! the container structure with a format probe (no pixel storage yet), check
//! the declared size against the configured limits and against what the
//! compressed payload can expand to, then decode the pixels.

pub mod animation;
pub mod config;
pub mod decoder;
pub mod formats;
pub mod probe;
pub mod registry;
pub mod sniff;

pub use config::DecodeConfig;
pub use decoder::{decode_file, decode_memory, decode_reader, Decoder};
pub use probe::{Backing, Probe};
pub use registry::{FormatDecoder, FormatRegistry};
pub use sniff::detect_format;
pub use tessel_core;

/// Result type for tessel-decoder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of decode failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeErrorKind {
    UnsupportedFormat,
    Truncated,
    CorruptData,
    AllocationFailure,
}

/// Error types for tessel-decoder operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported image format")]
    UnsupportedFormat,

    #[error("Unsupported {format} feature: {detail}")]
    UnsupportedFeature {
        format: tessel_core::ImageFormat,
        detail: String,
    },

    #[error("Truncated {format} data: {detail}")]
    Truncated {
        format: tessel_core::ImageFormat,
        detail: String,
    },

    #[error("Corrupt {format} data: {detail}")]
    CorruptData {
        format: tessel_core::ImageFormat,
        detail: String,
    },

    #[error("Allocation refused: {0}")]
    AllocationFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tessel core error: {0}")]
    Core(#[from] tessel_core::Error),
}

impl Error {
    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            Error::UnsupportedFormat | Error::UnsupportedFeature { .. } => {
                DecodeErrorKind::UnsupportedFormat
            }
            Error::Truncated { .. } => DecodeErrorKind::Truncated,
            Error::CorruptData { .. } => DecodeErrorKind::CorruptData,
            Error::AllocationFailure(_) => DecodeErrorKind::AllocationFailure,
            Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                DecodeErrorKind::Truncated
            }
            Error::Io(e) if e.kind() == std::io::ErrorKind::OutOfMemory => {
                DecodeErrorKind::AllocationFailure
            }
            Error::Io(_) => DecodeErrorKind::CorruptData,
            Error::Core(tessel_core::Error::DimensionOverflow { .. }) => {
                DecodeErrorKind::AllocationFailure
            }
            Error::Core(_) => DecodeErrorKind::CorruptData,
        }
    }

    pub(crate) fn truncated(format: tessel_core::ImageFormat, detail: impl Into<String>) -> Self {
        Error::Truncated {
            format,
            detail: detail.into(),
        }
    }

    pub(crate) fn corrupt(format: tessel_core::ImageFormat, detail: impl Into<String>) -> Self {
        Error::CorruptData {
            format,
            detail: detail.into(),
        }
    }
}
