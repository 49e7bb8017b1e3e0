//! Bzip2 backend built on the bzip2 crate.
//!
//! Two quirks distinguish this family. First, the native stream-end status is
//! not a reliable end-of-file signal, so EOF is judged from zero-length block
//! reads alone (which is what the shared [`BlockReader`] does anyway). Second,
//! the container has no in-band uncompressed-size field; a write-mode close
//! records the byte count in an extended attribute and a read-mode open
//! consults the same attribute, degrading to 0 when it is absent.

use crate::backend::{
    create_for_write, load_size_attr, open_for_read, store_size_attr, Backend,
};
use crate::error::{Result, UnifileError};
use crate::handle::Mode;
use crate::line_buffer::BlockReader;
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub(crate) struct Bzip2Backend {
    path: PathBuf,
    state: State,
}

enum State {
    Read {
        reader: BlockReader<BzDecoder<BufReader<File>>>,
        size: u64,
    },
    Write {
        encoder: Option<BzEncoder<BufWriter<File>>>,
        written: u64,
    },
}

impl Bzip2Backend {
    pub(crate) fn open(path: &Path, mode: Mode) -> Result<Self> {
        let state = match mode {
            Mode::Read => {
                let size = load_size_attr(path);
                let file = open_for_read(path)?;
                State::Read {
                    reader: BlockReader::new(BzDecoder::new(BufReader::new(file))),
                    size,
                }
            }
            Mode::Write => State::Write {
                encoder: Some(BzEncoder::new(
                    BufWriter::new(create_for_write(path)?),
                    Compression::default(),
                )),
                written: 0,
            },
        };
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    fn encoder(&mut self) -> Result<&mut BzEncoder<BufWriter<File>>> {
        match &mut self.state {
            State::Write { encoder, .. } => encoder
                .as_mut()
                .ok_or_else(|| UnifileError::compression("bzip2 stream already finalized")),
            State::Read { .. } => Err(UnifileError::wrong_mode("write to", Mode::Read.as_str())),
        }
    }
}

impl Backend for Bzip2Backend {
    fn name(&self) -> &'static str {
        "bzip2"
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
                    UnifileError::compression(format!("bzip2 finalization failed: {e}"))
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
