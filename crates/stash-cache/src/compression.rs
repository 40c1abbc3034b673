//! Streaming compression wrappers for archive bytes.

use stash_core::{CompressionMode, Error, Result};
use std::io::{self, Read, Write};

/// A writer that frames everything written through it according to a
/// [`CompressionMode`].
pub enum CompressWriter<W: Write> {
    Plain(W),
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

impl<W: Write> CompressWriter<W> {
    pub fn new(writer: W, mode: CompressionMode) -> Result<Self> {
        match mode {
            CompressionMode::None => Ok(Self::Plain(writer)),
            CompressionMode::Zstd { level } => {
                let level = level.unwrap_or(zstd::DEFAULT_COMPRESSION_LEVEL);
                let encoder = zstd::stream::write::Encoder::new(writer, level)
                    .map_err(|e| Error::Archive(format!("Zstd init failed: {}", e)))?;
                Ok(Self::Zstd(encoder))
            }
        }
    }

    /// Close the compression frame and hand back the inner writer.
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(mut writer) => {
                writer.flush()?;
                Ok(writer)
            }
            Self::Zstd(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for CompressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(writer) => writer.write(buf),
            Self::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(writer) => writer.flush(),
            Self::Zstd(encoder) => encoder.flush(),
        }
    }
}

/// Wrap `reader` so that reads yield the raw tar framing.
pub fn decompress_reader<'a, R: Read + 'a>(
    reader: R,
    mode: CompressionMode,
) -> Result<Box<dyn Read + 'a>> {
    match mode {
        CompressionMode::None => Ok(Box::new(reader)),
        CompressionMode::Zstd { .. } => {
            let decoder = zstd::stream::read::Decoder::new(reader)
                .map_err(|e| Error::Archive(format!("Failed to create decoder: {}", e)))?;
            Ok(Box::new(decoder))
        }
    }
}

/// Check a user-supplied compression level against what the compressor accepts.
pub fn validate_level(level: i32) -> Result<()> {
    let range = zstd::compression_level_range();
    if level < 1 || !range.contains(&level) {
        return Err(Error::Configuration(format!(
            "compression level {} out of range 1..={}",
            level,
            range.end()
        )));
    }
    Ok(())
}
