//! XZ backend built on xz2 (liblzma).
//!
//! liblzma implements none of the low-level string functions, so the read
//! half pairs the decoder with the shared line buffer exactly like bzip2.
//! The xz container does carry an uncompressed size in its index, but
//! recovering it requires walking the stream footer; like the original
//! implementation we use the extended-attribute side-channel instead and
//! degrade to 0 when it is absent.

use crate::backend::{
    create_for_write, load_size_attr, open_for_read, store_size_attr, Backend,
};
use crate::error::{Result, UnifileError};
use crate::handle::Mode;
use crate::line_buffer::BlockReader;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// Preset level handed to liblzma for writers; 6 is the xz tool's default.
const XZ_PRESET: u32 = 6;

pub(crate) struct XzBackend {
    path: PathBuf,
    state: State,
}

enum State {
    Read {
        reader: BlockReader<XzDecoder<BufReader<File>>>,
        size: u64,
    },
    Write {
        encoder: Option<XzEncoder<BufWriter<File>>>,
        written: u64,
    },
}

impl XzBackend {
    pub(crate) fn open(path: &Path, mode: Mode) -> Result<Self> {
        let state = match mode {
            Mode::Read => {
                let size = load_size_attr(path);
                let file = open_for_read(path)?;
                State::Read {
                    reader: BlockReader::new(XzDecoder::new(BufReader::new(file))),
                    size,
                }
            }
            Mode::Write => State::Write {
                encoder: Some(XzEncoder::new(
                    BufWriter::new(create_for_write(path)?),
                    XZ_PRESET,
                )),
                written: 0,
            },
        };
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    fn encoder(&mut self) -> Result<&mut XzEncoder<BufWriter<File>>> {
        match &mut self.state {
            State::Write { encoder, .. } => encoder
                .as_mut()
                .ok_or_else(|| UnifileError::compression("xz stream already finalized")),
            State::Read { .. } => Err(UnifileError::wrong_mode("write to", Mode::Read.as_str())),
        }
    }
}

impl Backend for XzBackend {
    fn name(&self) -> &'static str {
        "xz"
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
                    UnifileError::compression(format!("xz finalization failed: {e}"))
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
        let payload = b"alpha\nbeta\ngamma\n";

        let mut writer = XzBackend::open(temp.path(), Mode::Write).unwrap();
        let mut written = 0;
        while written < payload.len() {
            written += writer.write_block(&payload[written..]).unwrap();
        }
        writer.finish().unwrap();

        let mut reader = XzBackend::open(temp.path(), Mode::Read).unwrap();
        let mut decoded = Vec::new();
        let mut block = [0u8; 8];
        loop {
            let n = reader.read_block(&mut block).unwrap();
            if n == 0 {
                break;
            }
            decoded.extend_from_slice(&block[..n]);
        }
        assert_eq!(decoded, payload);
        assert!(reader.at_eof().unwrap());
    }

    #[test]
    fn test_line_reads_across_refills() {
        let temp = NamedTempFile::new().unwrap();
        // One line far longer than the internal block size
        let long_line: Vec<u8> = std::iter::repeat(b'x')
            .take(10_000)
            .chain(std::iter::once(b'\n'))
            .collect();

        let mut writer = XzBackend::open(temp.path(), Mode::Write).unwrap();
        let mut written = 0;
        while written < long_line.len() {
            written += writer.write_block(&long_line[written..]).unwrap();
        }
        writer.finish().unwrap();

        let mut reader = XzBackend::open(temp.path(), Mode::Read).unwrap();
        let mut line = Vec::new();
        assert!(reader.read_line_into(&mut line, None).unwrap());
        assert_eq!(line, long_line);
        line.clear();
        assert!(!reader.read_line_into(&mut line, None).unwrap());
    }

    #[test]
    fn test_writer_rejects_reads() {
        let temp = NamedTempFile::new().unwrap();
        let mut writer = XzBackend::open(temp.path(), Mode::Write).unwrap();
        assert!(matches!(
            writer.read_block(&mut [0u8; 4]),
            Err(UnifileError::WrongMode { .. })
        ));
        writer.finish().unwrap();
    }
}
