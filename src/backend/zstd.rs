//! Zstandard backend built on the zstd crate.
//!
//! Same shape as the other block-read families: decoder plus shared line
//! buffer on the read side, finishable encoder on the write side, extended
//! attribute as the uncompressed-size side-channel.

use crate::backend::{
    create_for_write, load_size_attr, open_for_read, store_size_attr, Backend,
};
use crate::error::{Result, UnifileError};
use crate::handle::Mode;
use crate::line_buffer::BlockReader;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use zstd::stream::read::Decoder;
use zstd::stream::write::Encoder;

/// 0 selects the zstd library's default compression level.
const ZSTD_LEVEL: i32 = 0;

pub(crate) struct ZstdBackend {
    path: PathBuf,
    state: State,
}

enum State {
    Read {
        reader: BlockReader<Decoder<'static, BufReader<File>>>,
        size: u64,
    },
    Write {
        encoder: Option<Encoder<'static, BufWriter<File>>>,
        written: u64,
    },
}

impl ZstdBackend {
    pub(crate) fn open(path: &Path, mode: Mode) -> Result<Self> {
        let state = match mode {
            Mode::Read => {
                let size = load_size_attr(path);
                let file = open_for_read(path)?;
                let decoder = Decoder::new(file).map_err(|e| {
                    UnifileError::compression(format!("zstd stream initialization failed: {e}"))
                })?;
                State::Read {
                    reader: BlockReader::new(decoder),
                    size,
                }
            }
            Mode::Write => {
                let encoder = Encoder::new(BufWriter::new(create_for_write(path)?), ZSTD_LEVEL)
                    .map_err(|e| {
                        UnifileError::compression(format!("zstd stream initialization failed: {e}"))
                    })?;
                State::Write {
                    encoder: Some(encoder),
                    written: 0,
                }
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    fn encoder(&mut self) -> Result<&mut Encoder<'static, BufWriter<File>>> {
        match &mut self.state {
            State::Write { encoder, .. } => encoder
                .as_mut()
                .ok_or_else(|| UnifileError::compression("zstd stream already finalized")),
            State::Read { .. } => Err(UnifileError::wrong_mode("write to", Mode::Read.as_str())),
        }
    }
}

impl Backend for ZstdBackend {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn size(&mut self) -> u64 {
        match &self.state {
            State::Read { size, .. } => *size,
            State::Write { written, .. } => *written,
        }
    }

    fn read_block(&mut self, dest: &mut [u8]) -> Result<usize> {
        match &mut self.state {
            State::Read { reader, .. } => reader.read_block(dest),
            State::Write { .. } => Err(UnifileError::wrong_mode("read from", Mode::Write.as_str())),
        }
    }

    fn read_line_into(&mut self, out: &mut Vec<u8>, limit: Option<usize>) -> Result<bool> {
        match &mut self.state {
            State::Read { reader, .. } => reader.read_line_into(out, limit),
            State::Write { .. } => Err(UnifileError::wrong_mode(
                "read a line from",
                Mode::Write.as_str(),
            )),
        }
    }

    fn write_block(&mut self, src: &[u8]) -> Result<usize> {
        let accepted = self.encoder()?.write(src)?;
        if let State::Write { written, .. } = &mut self.state {
            *written += accepted as u64;
        }
        Ok(accepted)
    }

    fn flush(&mut self) -> Result<()> {
        if matches!(self.state, State::Read { .. }) {
            return Ok(());
        }
        Ok(self.encoder()?.flush()?)
    }

    fn finish(&mut self) -> Result<()> {
        if let State::Write { encoder, written } = &mut self.state {
            let written = *written;
            if let Some(encoder) = encoder.take() {
                let mut inner = encoder.finish().map_err(|e| {
                    UnifileError::compression(format!("zstd finalization failed: {e}"))
                })?;
                inner.flush()?;
                drop(inner);
                store_size_attr(&self.path, written);
            }
        }
        Ok(())
    }

    fn at_eof(&mut self) -> Result<bool> {
        match &mut self.state {
            State::Read { reader, .. } => reader.at_eof(),
            State::Write { .. } => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_round_trip_through_backend() {
        let temp = NamedTempFile::new().unwrap();
        let payload = b"zstd line one\nzstd line two\n";

        let mut writer = ZstdBackend::open(temp.path(), Mode::Write).unwrap();
        let mut written = 0;
        while written < payload.len() {
            written += writer.write_block(&payload[written..]).unwrap();
        }
        writer.finish().unwrap();

        let mut reader = ZstdBackend::open(temp.path(), Mode::Read).unwrap();
        let mut line = Vec::new();
        assert!(reader.read_line_into(&mut line, None).unwrap());
        assert_eq!(line, b"zstd line one\n");
        line.clear();
        assert!(reader.read_line_into(&mut line, None).unwrap());
        assert_eq!(line, b"zstd line two\n");
        line.clear();
        assert!(!reader.read_line_into(&mut line, None).unwrap());
    }

    #[test]
    fn test_empty_stream_is_immediately_at_eof() {
        let temp = NamedTempFile::new().unwrap();
        let mut writer = ZstdBackend::open(temp.path(), Mode::Write).unwrap();
        writer.finish().unwrap();

        let mut reader = ZstdBackend::open(temp.path(), Mode::Read).unwrap();
        assert!(reader.at_eof().unwrap());
        let mut line = Vec::new();
        assert!(!reader.read_line_into(&mut line, None).unwrap());
    }
}
