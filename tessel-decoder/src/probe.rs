//! Structural probing of encoded images
//!
//! A probe walks the container layout of an encoded image (chunks, marker
//! segments, blocks) and checks every declared length against the bytes that
//! are actually present. It runs before any pixel storage is allocated, so a
//! lying header can neither make the decoder read past the input nor make it
//! allocate storage the input could never fill.

use crate::{Error, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::{self, Cursor};
use tessel_core::ImageFormat;

/// What a probe learned about an encoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub format: ImageFormat,
    /// Declared canvas width
    pub width: u32,
    /// Declared canvas height
    pub height: u32,
    /// The container announces more than one frame
    pub animated: bool,
    /// Frames the container declares or contains, when known
    pub frame_count: Option<u32>,
    /// Data ends early or is damaged, but only after the first frame
    /// is complete
    pub truncated_tail: bool,
    /// How much the first frame's compressed payload can back, when the
    /// codec has a bounded expansion ratio
    pub backing: Option<Backing>,
}

/// Decoded size a compressed payload must produce, against the most it can
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backing {
    /// Decoded bytes (or samples) the first frame needs
    pub required: u64,
    /// Upper bound on what the payload expands to
    pub capacity: u64,
}

impl Backing {
    pub fn new(required: u64, payload_len: u64, max_expansion: u64) -> Self {
        Self {
            required,
            capacity: payload_len.saturating_mul(max_expansion),
        }
    }
}

impl Probe {
    pub fn new(format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            animated: false,
            frame_count: None,
            truncated_tail: false,
            backing: None,
        }
    }

    /// Fails with [`Error::Truncated`] when the declared size cannot be
    /// produced from the compressed bytes that are present.
    ///
    /// Runs before any pixel storage is allocated.
    pub fn check_backing(&self) -> Result<()> {
        match self.backing {
            Some(backing) if backing.required > backing.capacity => Err(Error::truncated(
                self.format,
                format!(
                    "{}x{} needs {} decoded bytes, the payload yields at most {}",
                    self.width, self.height, backing.required, backing.capacity
                ),
            )),
            _ => Ok(()),
        }
    }
}

/// Bounds-checked reader over encoded bytes.
///
/// Every read that would run past the end of the data fails with
/// [`Error::Truncated`] for the reader's format.
pub(crate) struct ByteReader<'a> {
    cursor: Cursor<&'a [u8]>,
    format: ImageFormat,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], format: ImageFormat) -> Self {
        Self {
            cursor: Cursor::new(data),
            format,
        }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.len() {
            return Err(self.truncated(format!(
                "offset {position} is past the end of {} bytes",
                self.len()
            )));
        }
        self.cursor.set_position(position as u64);
        Ok(())
    }

    /// Skips `count` bytes that the format says must be present
    pub fn skip(&mut self, count: usize, what: &str) -> Result<()> {
        if count > self.remaining() {
            return Err(self.truncated(format!(
                "{what} declares {count} bytes, only {} remain",
                self.remaining()
            )));
        }
        self.cursor.set_position((self.position() + count) as u64);
        Ok(())
    }

    /// Borrows the next `count` bytes
    pub fn take(&mut self, count: usize, what: &str) -> Result<&'a [u8]> {
        let start = self.position();
        self.skip(count, what)?;
        let data: &'a [u8] = *self.cursor.get_ref();
        Ok(&data[start..start + count])
    }

    /// Everything from the current position to the end
    pub fn rest(&self) -> &'a [u8] {
        let data: &'a [u8] = *self.cursor.get_ref();
        &data[self.position().min(data.len())..]
    }

    pub fn u8(&mut self) -> Result<u8> {
        let value = self.cursor.read_u8();
        self.map(value)
    }

    pub fn u16_be(&mut self) -> Result<u16> {
        let value = self.cursor.read_u16::<BigEndian>();
        self.map(value)
    }

    pub fn u16_le(&mut self) -> Result<u16> {
        let value = self.cursor.read_u16::<LittleEndian>();
        self.map(value)
    }

    pub fn u24_le(&mut self) -> Result<u32> {
        let value = self.cursor.read_u24::<LittleEndian>();
        self.map(value)
    }

    pub fn u32_be(&mut self) -> Result<u32> {
        let value = self.cursor.read_u32::<BigEndian>();
        self.map(value)
    }

    pub fn u32_le(&mut self) -> Result<u32> {
        let value = self.cursor.read_u32::<LittleEndian>();
        self.map(value)
    }

    pub fn i32_le(&mut self) -> Result<i32> {
        let value = self.cursor.read_i32::<LittleEndian>();
        self.map(value)
    }

    pub fn tag(&mut self) -> Result<[u8; 4]> {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(self.take(4, "chunk tag")?);
        Ok(tag)
    }

    pub fn truncated(&self, detail: impl Into<String>) -> Error {
        Error::truncated(self.format, detail)
    }

    pub fn corrupt(&self, detail: impl Into<String>) -> Error {
        Error::corrupt(self.format, detail)
    }

    fn map<T>(&self, value: io::Result<T>) -> Result<T> {
        value.map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                self.truncated(format!("unexpected end of data at offset {}", self.position()))
            }
            _ => Error::Io(e),
        })
    }
}

/// Renders a chunk tag for messages, e.g. `IHDR`
pub(crate) fn tag_name(tag: &[u8; 4]) -> String {
    tag.iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
        .collect()
}
