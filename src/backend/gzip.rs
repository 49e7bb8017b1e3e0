//! Gzip backend built on flate2.
//!
//! flate2 exposes block reads only, so the read half pairs the decoder with
//! the shared line buffer. The uncompressed size comes from the trailer ISIZE
//! field, which the format records for us; no side-channel annotation is
//! needed at close.

use crate::backend::{create_for_write, open_for_read, Backend};
use crate::error::{Result, UnifileError};
use crate::handle::Mode;
use crate::line_buffer::BlockReader;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub(crate) struct GzipBackend {
    state: State,
}

enum State {
    Read {
        reader: BlockReader<MultiGzDecoder<BufReader<File>>>,
        size: u64,
    },
    Write {
        encoder: Option<GzEncoder<BufWriter<File>>>,
        written: u64,
    },
}

impl GzipBackend {
    pub(crate) fn open(path: &Path, mode: Mode) -> Result<Self> {
        let state = match mode {
            Mode::Read => {
                let size = trailer_size(path).unwrap_or(0);
                let file = open_for_read(path)?;
                State::Read {
                    reader: BlockReader::new(MultiGzDecoder::new(BufReader::new(file))),
                    size,
                }
            }
            Mode::Write => State::Write {
                encoder: Some(GzEncoder::new(
                    BufWriter::new(create_for_write(path)?),
                    Compression::default(),
                )),
                written: 0,
            },
        };
        Ok(Self { state })
    }

    fn encoder(&mut self) -> Result<&mut GzEncoder<BufWriter<File>>> {
        match &mut self.state {
            State::Write { encoder, .. } => encoder
                .as_mut()
                .ok_or_else(|| UnifileError::compression("gzip stream already finalized")),
            State::Read { .. } => Err(UnifileError::wrong_mode("write to", Mode::Read.as_str())),
        }
    }
}

/// Uncompressed size from the gzip trailer (ISIZE: last four bytes, little
/// endian). The format stores it modulo 2^32, so payloads of 4GiB and over
/// underreport; for multi-member files only the last member is counted.
fn trailer_size(path: &Path) -> Option<u64> {
    let mut file = File::open(path).ok()?;
    let len = file.metadata().ok()?.len();
    // Smallest well-formed member: 10 byte header + 8 byte trailer
    if len < 18 {
        return None;
    }
    file.seek(SeekFrom::End(-4)).ok()?;
    let mut isize_bytes = [0u8; 4];
    file.read_exact(&mut isize_bytes).ok()?;
    Some(u32::from_le_bytes(isize_bytes) as u64)
}

impl Backend for GzipBackend {
    fn name(&self) -> &'static str {
        "gzip"
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
        if let State::Write { encoder, .. } = &mut self.state {
            if let Some(encoder) = encoder.take() {
                let mut inner = encoder
                    .finish()
                    .map_err(|e| UnifileError::compression(format!("gzip finalization failed: {e}")))?;
                inner.flush()?;
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
