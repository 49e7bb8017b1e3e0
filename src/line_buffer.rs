//! Generic read-ahead buffer emulating byte- and line-at-a-time reads.
//!
//! The bzip2, xz and zstd decoders expose block reads only; there is no
//! `fgets`/`fgetc` equivalent in their native APIs. To read one line at a time
//! from those streams we keep a small internal buffer that decompressed blocks
//! are pulled into on demand, and serve bytes out of it until it runs dry.
//! Keeping the buffer generic over the fill source means the line-read logic
//! exists once, independent of the compression family.
//!
//! The buffer has a total allocation, but a fill near end of stream may not
//! use all of it. We therefore track the total capacity, how much of it holds
//! valid data, and the read cursor within that valid region. A fill that
//! produces zero bytes is the end-of-stream marker, and is also the signal the
//! EOF probes in the backends rely on (some codec status codes misreport
//! stream end, a zero-length block read does not).

use crate::error::Result;
use memchr::memchr;

/// Default block size for buffered reads from a decompression stream.
///
/// This is not a cache, just a way of saving single-byte calls into the codec.
pub(crate) const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Read-ahead buffer state.
///
/// Invariant: `cursor <= valid <= storage.len()`. Bytes in `[cursor, valid)`
/// are unconsumed; bytes at and beyond `valid` are stale.
pub(crate) struct LineBuffer {
    storage: Box<[u8]>,
    valid: usize,
    cursor: usize,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    pub(crate) fn with_block_size(block_size: usize) -> Self {
        assert!(block_size > 0, "line buffer block size must be non-zero");
        Self {
            storage: vec![0u8; block_size].into_boxed_slice(),
            valid: 0,
            cursor: 0,
        }
    }

    /// Unconsumed bytes currently held.
    pub(crate) fn buffered(&self) -> usize {
        self.valid - self.cursor
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    #[cfg(test)]
    pub(crate) fn valid(&self) -> usize {
        self.valid
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn assert_invariant(&self) {
        debug_assert!(
            self.cursor <= self.valid && self.valid <= self.storage.len(),
            "line buffer invariant broken: cursor={} valid={} capacity={}",
            self.cursor,
            self.valid,
            self.storage.len()
        );
    }

    /// Pull the next block from `fill`, resetting the cursor to the start of
    /// the storage region. Only legal when the buffer is drained; returns the
    /// number of bytes the fill produced (zero at end of stream).
    fn refill<F>(&mut self, fill: &mut F) -> Result<usize>
    where
        F: FnMut(&mut [u8]) -> Result<usize>,
    {
        debug_assert!(self.cursor == self.valid, "refill with unconsumed data");
        let filled = fill(&mut self.storage)?;
        debug_assert!(filled <= self.storage.len());
        self.cursor = 0;
        self.valid = filled;
        self.assert_invariant();
        Ok(filled)
    }

    /// Return the next byte, refilling from `fill` when the buffer is drained.
    /// `None` means the fill produced zero bytes: end of stream.
    pub(crate) fn next_byte<F>(&mut self, fill: &mut F) -> Result<Option<u8>>
    where
        F: FnMut(&mut [u8]) -> Result<usize>,
    {
        if self.cursor == self.valid && self.refill(fill)? == 0 {
            return Ok(None);
        }
        let byte = self.storage[self.cursor];
        self.cursor += 1;
        self.assert_invariant();
        Ok(Some(byte))
    }

    /// Look at the next byte without consuming it. Used by EOF probes: a
    /// drained buffer whose fill produces nothing means the stream is done.
    pub(crate) fn peek<F>(&mut self, fill: &mut F) -> Result<Option<u8>>
    where
        F: FnMut(&mut [u8]) -> Result<usize>,
    {
        if self.cursor == self.valid && self.refill(fill)? == 0 {
            return Ok(None);
        }
        Ok(Some(self.storage[self.cursor]))
    }

    /// Block read that respects already-buffered bytes.
    ///
    /// Buffered bytes (left over from a previous line read) are drained into
    /// `dest` first; once the buffer is empty, further data is read from `fill`
    /// straight into `dest` with no intermediate copy. A zero return with a
    /// non-empty `dest` means end of stream.
    pub(crate) fn read_block<F>(&mut self, dest: &mut [u8], fill: &mut F) -> Result<usize>
    where
        F: FnMut(&mut [u8]) -> Result<usize>,
    {
        if dest.is_empty() {
            return Ok(0);
        }
        let buffered = self.buffered();
        if buffered > 0 {
            let take = buffered.min(dest.len());
            dest[..take].copy_from_slice(&self.storage[self.cursor..self.cursor + take]);
            self.cursor += take;
            self.assert_invariant();
            return Ok(take);
        }
        fill(dest)
    }

    /// Copy bytes into `out` until a newline has been copied (inclusive), the
    /// optional byte `limit` is exhausted, or the stream ends.
    ///
    /// Returns `true` if at least one byte was copied. `false` means the
    /// stream ended before any byte was available; a partial final line
    /// without a trailing newline still reports `true`.
    pub(crate) fn read_line_into<F>(
        &mut self,
        out: &mut Vec<u8>,
        limit: Option<usize>,
        fill: &mut F,
    ) -> Result<bool>
    where
        F: FnMut(&mut [u8]) -> Result<usize>,
    {
        let mut read_any = false;
        let mut remaining = limit;
        loop {
            if remaining == Some(0) {
                return Ok(read_any);
            }
            if self.cursor == self.valid && self.refill(fill)? == 0 {
                return Ok(read_any);
            }
            let avail = &self.storage[self.cursor..self.valid];
            let take = remaining.map_or(avail.len(), |r| r.min(avail.len()));
            match memchr(b'\n', &avail[..take]) {
                Some(pos) => {
                    out.extend_from_slice(&avail[..=pos]);
                    self.cursor += pos + 1;
                    self.assert_invariant();
                    return Ok(true);
                }
                None => {
                    out.extend_from_slice(&avail[..take]);
                    self.cursor += take;
                    read_any = read_any || take > 0;
                    remaining = remaining.map(|r| r - take);
                    self.assert_invariant();
                }
            }
        }
    }
}

/// A decompression stream paired with a [`LineBuffer`].
///
/// Every compressed backend's read half is exactly this: a codec `Read`
/// implementation that only supports block reads, plus the buffer that
/// emulates byte- and line-granular access on top of it.
pub(crate) struct BlockReader<D> {
    decoder: D,
    buffer: LineBuffer,
}

impl<D: std::io::Read> BlockReader<D> {
    pub(crate) fn new(decoder: D) -> Self {
        Self {
            decoder,
            buffer: LineBuffer::new(),
        }
    }

    pub(crate) fn read_block(&mut self, dest: &mut [u8]) -> Result<usize> {
        let Self { decoder, buffer } = self;
        buffer.read_block(dest, &mut |chunk| Ok(decoder.read(chunk)?))
    }

    pub(crate) fn read_line_into(&mut self, out: &mut Vec<u8>, limit: Option<usize>) -> Result<bool> {
        let Self { decoder, buffer } = self;
        buffer.read_line_into(out, limit, &mut |chunk| Ok(decoder.read(chunk)?))
    }

    /// True when the buffer is drained and the decoder produces no more bytes.
    /// Judged from a zero-length block read, never from a codec status code.
    pub(crate) fn at_eof(&mut self) -> Result<bool> {
        let Self { decoder, buffer } = self;
        let next = buffer.peek(&mut |chunk| Ok(decoder.read(chunk)?))?;
        Ok(next.is_none())
    }
}
