//! The polymorphic file handle and its operation dispatch.
//!
//! A [`Handle`] is the caller-visible file object. At open time it selects one
//! backend adapter (by filename extension or explicit override) and every
//! subsequent operation is a single dynamic call into that adapter. The handle
//! core sits behind a mutex inside an `Arc` so the owning context can keep a
//! weak reference for cascade close, and so `close` stays idempotent no matter
//! which path reaches it first.

use crate::backend::{self, Backend, Format, RawBackend};
use crate::context::{default_context, ContextInner, OwnerContext};
use crate::error::{Result, UnifileError};
use bstr::BString;
use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

/// Direction a handle was opened in. Fixed for the handle's lifetime; a handle
/// is never valid for both reading and writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Read => "reading",
            Mode::Write => "writing",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Mode::Read)
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Mode::Write)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared handle state: open with a live backend, or closed.
pub(crate) enum HandleCore {
    Open(OpenState),
    Closed,
}

pub(crate) struct OpenState {
    backend: Box<dyn Backend>,
    mode: Mode,
    path: PathBuf,
    /// Monotonic: once a read observes no further data this never resets.
    saw_eof: bool,
    /// Owning context, weak so a live handle never keeps its context alive.
    context: Weak<ContextInner>,
}

impl Drop for OpenState {
    fn drop(&mut self) {
        // Safety net for handles dropped without an explicit close. Backend
        // finalization is idempotent, so a normal close followed by this drop
        // does not double-finalize.
        if let Err(err) = self.backend.finish() {
            log::warn!("error finalizing {}: {}", self.path.display(), err);
        }
    }
}

/// Close the shared core, finalizing the backend exactly once. Returns whether
/// this call performed the transition; a core found already `Closed` reports
/// `Ok(false)`.
///
/// Used by [`Handle::close`] and by owner-context teardown; whichever runs
/// second finds the core already `Closed` and does nothing.
pub(crate) fn close_core(core: &Arc<Mutex<HandleCore>>) -> Result<bool> {
    let previous = {
        let mut guard = core.lock();
        match &*guard {
            HandleCore::Closed => return Ok(false),
            HandleCore::Open(_) => std::mem::replace(&mut *guard, HandleCore::Closed),
        }
    };
    let HandleCore::Open(mut state) = previous else {
        unreachable!("replaced state was checked to be open");
    };
    let result = state.backend.finish();
    // Upgrade fails during context teardown; the registry is draining anyway
    if let Some(context) = state.context.upgrade() {
        context.deregister(core);
    }
    log::debug!("closed {}", state.path.display());
    // `state` drops here; its finalization already ran, the drop hook is a no-op
    result.map(|()| true)
}

/// Caller-visible file object for uniform access to plain and compressed files.
///
/// Cloning a `Handle` produces another reference to the same underlying file
/// state, not an independent reopen.
#[derive(Clone)]
pub struct Handle {
    core: Arc<Mutex<HandleCore>>,
}

impl Handle {
    /// Open `path` in `mode`, selecting the backend from the filename
    /// extension. Unrecognized or absent extensions resolve to the raw
    /// backend. The handle registers under the process-wide default
    /// [`OwnerContext`].
    pub fn open(path: impl AsRef<Path>, mode: Mode) -> Result<Self> {
        let path = path.as_ref();
        Self::open_in(&default_context(), path, mode, Format::from_path(path))
    }

    /// Open with an explicit backend override instead of extension detection.
    pub fn open_with(path: impl AsRef<Path>, mode: Mode, format: Format) -> Result<Self> {
        Self::open_in(&default_context(), path.as_ref(), mode, format)
    }

    /// Open registering under a specific owning context; freeing that context
    /// cascade-closes the handle if the caller never did.
    pub fn open_in(
        context: &OwnerContext,
        path: impl AsRef<Path>,
        mode: Mode,
        format: Format,
    ) -> Result<Self> {
        let path = path.as_ref();
        let backend = backend::open_backend(path, mode, format)?;
        log::debug!(
            "opened {} for {} via {} backend",
            path.display(),
            mode,
            backend.name()
        );
        Ok(Self::register(
            context,
            OpenState {
                backend,
                mode,
                path: path.to_path_buf(),
                saw_eof: false,
                context: context.downgrade(),
            },
        ))
    }

    /// Wrap an already-open file. The descriptor is always treated as
    /// uncompressed; no compression backend is ever applied here.
    pub fn from_file(file: File, mode: Mode) -> Self {
        let context = default_context();
        Self::register(
            &context,
            OpenState {
                backend: Box::new(RawBackend::from_file(file, mode)),
                mode,
                path: PathBuf::from("<descriptor>"),
                saw_eof: false,
                context: context.downgrade(),
            },
        )
    }

    fn register(context: &OwnerContext, state: OpenState) -> Self {
        let core = Arc::new(Mutex::new(HandleCore::Open(state)));
        context.register(&core);
        Handle { core }
    }

    fn with_open<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut OpenState) -> Result<T>,
    ) -> Result<T> {
        match &mut *self.core.lock() {
            HandleCore::Open(state) => f(state),
            HandleCore::Closed => Err(UnifileError::closed(operation)),
        }
    }

    /// The mode this handle was opened in, or `None` once closed.
    pub fn mode(&self) -> Option<Mode> {
        match &*self.core.lock() {
            HandleCore::Open(state) => Some(state.mode),
            HandleCore::Closed => None,
        }
    }

    /// Name of the active backend ("raw", "gzip", ...), or `None` once closed.
    pub fn backend_name(&self) -> Option<&'static str> {
        match &*self.core.lock() {
            HandleCore::Open(state) => Some(state.backend.name()),
            HandleCore::Closed => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(&*self.core.lock(), HandleCore::Closed)
    }

    /// Uncompressed logical size in bytes, or 0 when the backend cannot
    /// determine it (and for closed handles).
    pub fn size(&self) -> u64 {
        match &mut *self.core.lock() {
            HandleCore::Open(state) => state.backend.size(),
            HandleCore::Closed => 0,
        }
    }

    /// True once a read has observed the end of the data.
    ///
    /// A fresh read handle probes its backend, so a 0-byte file reports EOF
    /// before any explicit read. Write handles report `false`; closed handles
    /// report `true`. Monotonic for the life of the handle.
    pub fn eof(&self) -> bool {
        match &mut *self.core.lock() {
            HandleCore::Closed => true,
            HandleCore::Open(state) => {
                if state.saw_eof {
                    return true;
                }
                if state.mode.is_write() {
                    return false;
                }
                match state.backend.at_eof() {
                    Ok(true) => {
                        state.saw_eof = true;
                        true
                    }
                    Ok(false) => false,
                    Err(err) => {
                        // A failing probe is not EOF; the next read reports it
                        log::debug!("EOF probe failed for {}: {}", state.path.display(), err);
                        false
                    }
                }
            }
        }
    }

    /// Read one line of at most `max_len - 1` bytes, the trailing newline
    /// included when it fits. `None` means EOF was reached before any byte
    /// could be read. A final line with no trailing newline is still a line.
    pub fn read_line(&self, max_len: usize) -> Result<Option<Vec<u8>>> {
        self.with_open("read a line from", |state| {
            require_mode(state, "read a line from", Mode::Read)?;
            if max_len == 0 {
                return Ok(None);
            }
            if state.saw_eof {
                return Ok(None);
            }
            if max_len == 1 {
                // Room for nothing but the terminator: an empty line, not EOF
                return Ok(Some(Vec::new()));
            }
            let mut line = Vec::new();
            if state.backend.read_line_into(&mut line, Some(max_len - 1))? {
                Ok(Some(line))
            } else {
                state.saw_eof = true;
                Ok(None)
            }
        })
    }

    /// Read one line of arbitrary length into `line`, growing it as needed so
    /// long lines are never truncated. The buffer is cleared first and can be
    /// reused across calls. Returns `false` at EOF.
    pub fn read_line_dynamic(&self, line: &mut Vec<u8>) -> Result<bool> {
        self.with_open("read a line from", |state| {
            require_mode(state, "read a line from", Mode::Read)?;
            line.clear();
            if state.saw_eof {
                return Ok(false);
            }
            let got = state.backend.read_line_into(line, None)?;
            if !got {
                state.saw_eof = true;
            }
            Ok(got)
        })
    }

    /// Iterator over the remaining lines of a read handle.
    pub fn lines(&self) -> Lines {
        Lines {
            handle: self.clone(),
        }
    }

    /// Render `args` and write the result, returning the byte count.
    ///
    /// Call as `handle.write_formatted(format_args!("x = {}\n", x))`. Fails
    /// with `WrongMode` on a read handle rather than silently doing nothing.
    pub fn write_formatted(&self, args: fmt::Arguments<'_>) -> Result<usize> {
        self.with_open("write to", |state| {
            require_mode(state, "write to", Mode::Write)?;
            let rendered = fmt::format(args);
            write_all(state, rendered.as_bytes())?;
            Ok(rendered.len())
        })
    }

    /// Read up to `count` records of `record_size` bytes into `dest`,
    /// returning the number of complete records transferred. A short count
    /// signals EOF, not an error; bytes of a trailing partial record are
    /// delivered into `dest` but not counted.
    pub fn read_records(&self, dest: &mut [u8], record_size: usize, count: usize) -> Result<usize> {
        self.with_open("read records from", |state| {
            require_mode(state, "read records from", Mode::Read)?;
            if record_size == 0 || count == 0 {
                return Ok(0);
            }
            let total = record_size.checked_mul(count).ok_or_else(|| {
                UnifileError::invalid_argument("record_size * count overflows usize")
            })?;
            if dest.len() < total {
                return Err(UnifileError::invalid_argument(format!(
                    "destination holds {} bytes, {} required",
                    dest.len(),
                    total
                )));
            }
            if state.saw_eof {
                return Ok(0);
            }
            let mut filled = 0;
            while filled < total {
                let n = state.backend.read_block(&mut dest[filled..total])?;
                if n == 0 {
                    state.saw_eof = true;
                    break;
                }
                filled += n;
            }
            Ok(filled / record_size)
        })
    }

    /// Write `count` records of `record_size` bytes from `src`, returning the
    /// number of records transferred.
    pub fn write_records(&self, src: &[u8], record_size: usize, count: usize) -> Result<usize> {
        self.with_open("write records to", |state| {
            require_mode(state, "write records to", Mode::Write)?;
            if record_size == 0 || count == 0 {
                return Ok(0);
            }
            let total = record_size.checked_mul(count).ok_or_else(|| {
                UnifileError::invalid_argument("record_size * count overflows usize")
            })?;
            if src.len() < total {
                return Err(UnifileError::invalid_argument(format!(
                    "source holds {} bytes, {} required",
                    src.len(),
                    total
                )));
            }
            write_all(state, &src[..total])?;
            Ok(count)
        })
    }

    /// Flush buffered output. On a read handle this is a successful no-op.
    pub fn flush(&self) -> Result<()> {
        self.with_open("flush", |state| match state.mode {
            Mode::Read => Ok(()),
            Mode::Write => state.backend.flush(),
        })
    }

    /// Close the handle: finalize the backend stream (writers complete the
    /// codec stream and record the size side-channel where supported) and
    /// release its resources. Resources are released even when finalization
    /// reports an error; the returned status is advisory. Closing an
    /// already-closed handle succeeds.
    pub fn close(&self) -> Result<()> {
        close_core(&self.core).map(|_| ())
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.core.lock() {
            HandleCore::Open(state) => f
                .debug_struct("Handle")
                .field("path", &state.path)
                .field("backend", &state.backend.name())
                .field("mode", &state.mode)
                .finish(),
            HandleCore::Closed => f.write_str("Handle(closed)"),
        }
    }
}

fn require_mode(state: &OpenState, operation: &'static str, needed: Mode) -> Result<()> {
    if state.mode == needed {
        Ok(())
    } else {
        Err(UnifileError::wrong_mode(operation, state.mode.as_str()))
    }
}

fn write_all(state: &mut OpenState, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        let n = state.backend.write_block(bytes)?;
        if n == 0 {
            return Err(UnifileError::other("backend accepted no bytes"));
        }
        bytes = &bytes[n..];
    }
    Ok(())
}

/// Iterator over the lines of a read handle, yielding byte strings since file
/// contents are not required to be UTF-8.
pub struct Lines {
    handle: Handle,
}

impl Iterator for Lines {
    type Item = Result<BString>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = Vec::new();
        match self.handle.read_line_dynamic(&mut line) {
            Ok(true) => Some(Ok(BString::from(line))),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn test_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content).expect("Failed to write test content");
        file.flush().expect("Failed to flush test file");
        file
    }

    #[test]
    fn test_mode_exclusivity() {
        let file = test_file(b"data\n");
        let reader = Handle::open(file.path(), Mode::Read).unwrap();
        assert!(matches!(
            reader.write_formatted(format_args!("nope")),
            Err(UnifileError::WrongMode { .. })
        ));
        assert!(matches!(
            reader.write_records(b"abcd", 4, 1),
            Err(UnifileError::WrongMode { .. })
        ));

        let out = NamedTempFile::new().unwrap();
        let writer = Handle::open(out.path(), Mode::Write).unwrap();
        let mut dest = [0u8; 4];
        assert!(matches!(
            writer.read_records(&mut dest, 4, 1),
            Err(UnifileError::WrongMode { .. })
        ));
        assert!(matches!(
            writer.read_line(16),
            Err(UnifileError::WrongMode { .. })
        ));
        writer.close().unwrap();
    }

    #[test]
    fn test_closed_handle_operations_fail() {
        let file = test_file(b"data\n");
        let handle = Handle::open(file.path(), Mode::Read).unwrap();
        handle.close().unwrap();

        assert!(handle.is_closed());
        assert!(matches!(
            handle.read_line(16),
            Err(UnifileError::Closed { .. })
        ));
        assert!(handle.eof());
        assert_eq!(handle.size(), 0);
        assert_eq!(handle.mode(), None);
        // Closing again is a harmless no-op
        handle.close().unwrap();
    }

    #[test]
    fn test_empty_file_reports_eof_immediately() {
        let file = test_file(b"");
        let handle = Handle::open(file.path(), Mode::Read).unwrap();
        assert!(handle.eof());
        assert_eq!(handle.size(), 0);
        assert_eq!(handle.read_line(64).unwrap(), None);
    }

    #[test]
    fn test_eof_is_monotonic() {
        let file = test_file(b"only line\n");
        let handle = Handle::open(file.path(), Mode::Read).unwrap();
        assert!(!handle.eof());
        assert!(handle.read_line(64).unwrap().is_some());
        assert_eq!(handle.read_line(64).unwrap(), None);
        assert!(handle.eof());
        // No read after EOF returns data
        let mut dest = [0u8; 4];
        assert_eq!(handle.read_records(&mut dest, 1, 4).unwrap(), 0);
        assert!(handle.eof());
    }

    #[test]
    fn test_read_line_bounded_semantics() {
        let file = test_file(b"abcdef\n");
        let handle = Handle::open(file.path(), Mode::Read).unwrap();
        // max_len counts the terminator slot: at most max_len - 1 bytes
        assert_eq!(handle.read_line(4).unwrap().unwrap(), b"abc");
        assert_eq!(handle.read_line(1).unwrap().unwrap(), b"");
        assert_eq!(handle.read_line(64).unwrap().unwrap(), b"def\n");
    }

    #[test]
    fn test_from_file_is_raw() {
        let file = test_file(b"fd contents");
        let reopened = std::fs::File::open(file.path()).unwrap();
        let handle = Handle::from_file(reopened, Mode::Read);
        assert_eq!(handle.backend_name(), Some("raw"));
        let mut dest = [0u8; 11];
        assert_eq!(handle.read_records(&mut dest, 1, 11).unwrap(), 11);
        assert_eq!(&dest, b"fd contents");
        handle.close().unwrap();
    }

    #[test]
    fn test_write_formatted_and_flush() {
        let out = NamedTempFile::new().unwrap();
        let writer = Handle::open(out.path(), Mode::Write).unwrap();
        let n = writer
            .write_formatted(format_args!("x = {}, y = {}\n", 1, "two"))
            .unwrap();
        assert_eq!(n, "x = 1, y = two\n".len());
        writer.flush().unwrap();
        writer.close().unwrap();

        assert_eq!(std::fs::read(out.path()).unwrap(), b"x = 1, y = two\n");
    }

    #[test]
    fn test_flush_on_read_handle_is_noop_success() {
        let file = test_file(b"data");
        let handle = Handle::open(file.path(), Mode::Read).unwrap();
        handle.flush().unwrap();
    }

    #[test]
    fn test_lines_iterator() {
        let file = test_file(b"a\nb\nc");
        let handle = Handle::open(file.path(), Mode::Read).unwrap();
        let lines: Vec<_> = handle.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "a\n");
        assert_eq!(lines[1], "b\n");
        assert_eq!(lines[2], "c");
    }

    #[test]
    fn test_record_geometry_validation() {
        let file = test_file(b"0123456789");
        let handle = Handle::open(file.path(), Mode::Read).unwrap();
        let mut small = [0u8; 4];
        assert!(matches!(
            handle.read_records(&mut small, 4, 2),
            Err(UnifileError::InvalidArgument { .. })
        ));
        assert_eq!(handle.read_records(&mut small, 4, 0).unwrap(), 0);
    }

    #[test]
    fn test_partial_trailing_record_not_counted() {
        let file = test_file(b"0123456789"); // 2.5 records of 4 bytes
        let handle = Handle::open(file.path(), Mode::Read).unwrap();
        let mut dest = [0u8; 12];
        assert_eq!(handle.read_records(&mut dest, 4, 3).unwrap(), 2);
        // The partial record's bytes were still delivered
        assert_eq!(&dest[..10], b"0123456789");
    }
}
