//! Uncompressed backend.
//!
//! Plain files go through std's buffered reader/writer. Unlike the compressed
//! families this backend has a native byte-at-a-time primitive (`BufRead`), so
//! no separate line buffer is allocated; line reads run directly over the
//! reader's own buffer.

use crate::backend::{create_for_write, open_for_read, Backend};
use crate::error::{Result, UnifileError};
use crate::handle::Mode;
use memchr::memchr;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

pub(crate) struct RawBackend {
    io: RawIo,
}

enum RawIo {
    Read(BufReader<File>),
    Write(BufWriter<File>),
}

impl RawBackend {
    pub(crate) fn open(path: &Path, mode: Mode) -> Result<Self> {
        let io = match mode {
            Mode::Read => RawIo::Read(BufReader::new(open_for_read(path)?)),
            Mode::Write => RawIo::Write(BufWriter::new(create_for_write(path)?)),
        };
        Ok(Self { io })
    }

    /// Wrap an already-open descriptor. Wrapped descriptors are always
    /// treated as uncompressed.
    pub(crate) fn from_file(file: File, mode: Mode) -> Self {
        let io = match mode {
            Mode::Read => RawIo::Read(BufReader::new(file)),
            Mode::Write => RawIo::Write(BufWriter::new(file)),
        };
        Self { io }
    }
}

impl Backend for RawBackend {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn size(&mut self) -> u64 {
        let file = match &mut self.io {
            RawIo::Read(reader) => reader.get_ref(),
            RawIo::Write(writer) => {
                // Count everything handed to us so far, not just what reached disk
                if writer.flush().is_err() {
                    return 0;
                }
                writer.get_ref()
            }
        };
        file.metadata().map(|m| m.len()).unwrap_or(0)
    }

    fn read_block(&mut self, dest: &mut [u8]) -> Result<usize> {
        match &mut self.io {
            RawIo::Read(reader) => Ok(reader.read(dest)?),
            RawIo::Write(_) => Err(UnifileError::wrong_mode("read from", Mode::Write.as_str())),
        }
    }

    fn read_line_into(&mut self, out: &mut Vec<u8>, limit: Option<usize>) -> Result<bool> {
        let RawIo::Read(reader) = &mut self.io else {
            return Err(UnifileError::wrong_mode(
                "read a line from",
                Mode::Write.as_str(),
            ));
        };
        let mut read_any = false;
        let mut remaining = limit;
        loop {
            if remaining == Some(0) {
                return Ok(read_any);
            }
            let (consumed, hit_newline) = {
                let avail = reader.fill_buf()?;
                if avail.is_empty() {
                    return Ok(read_any);
                }
                let take = remaining.map_or(avail.len(), |r| r.min(avail.len()));
                match memchr(b'\n', &avail[..take]) {
                    Some(pos) => {
                        out.extend_from_slice(&avail[..=pos]);
                        (pos + 1, true)
                    }
                    None => {
                        out.extend_from_slice(&avail[..take]);
                        (take, false)
                    }
                }
            };
            reader.consume(consumed);
            if hit_newline {
                return Ok(true);
            }
            read_any = read_any || consumed > 0;
            remaining = remaining.map(|r| r - consumed);
        }
    }

    fn write_block(&mut self, src: &[u8]) -> Result<usize> {
        match &mut self.io {
            RawIo::Write(writer) => Ok(writer.write(src)?),
            RawIo::Read(_) => Err(UnifileError::wrong_mode("write to", Mode::Read.as_str())),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match &mut self.io {
            RawIo::Write(writer) => Ok(writer.flush()?),
            RawIo::Read(_) => Ok(()),
        }
    }

    fn finish(&mut self) -> Result<()> {
        // No codec stream to complete; just make sure everything hit the file
        self.flush()
    }

    fn at_eof(&mut self) -> Result<bool> {
        match &mut self.io {
            RawIo::Read(reader) => Ok(reader.fill_buf()?.is_empty()),
            RawIo::Write(_) => Ok(false),
        }
    }
}
