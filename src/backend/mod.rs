//! Backend adapters for transparent file access.
//!
//! Each compression family (plus raw, uncompressed access) implements the
//! [`Backend`] trait against its codec crate. The handle layer selects exactly
//! one backend at open time and routes every subsequent operation through it;
//! the trait object is the operation table, so every backend implements every
//! operation and an unsupported direction reports an error rather than being
//! absent.

mod bzip2;
mod gzip;
mod raw;
mod xz;
mod zstd;

pub(crate) use self::bzip2::Bzip2Backend;
pub(crate) use self::gzip::GzipBackend;
pub(crate) use self::raw::RawBackend;
pub(crate) use self::xz::XzBackend;
pub(crate) use self::zstd::ZstdBackend;

use crate::error::{Result, UnifileError};
use crate::handle::Mode;
use std::fs::File;
use std::path::Path;

/// Compression family of a file, as selected at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// No compression - plain file
    Raw,
    /// Gzip compression (.gz files)
    Gzip,
    /// Bzip2 compression (.bz2 files)
    Bzip2,
    /// XZ compression (.xz files)
    Xz,
    /// Zstandard compression (.zst, .zstd files)
    Zstd,
}

impl Format {
    /// Get human-readable name for the format
    pub fn name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }

    /// Check if this format represents a compressed family
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Self::Raw)
    }

    /// Select a format from the filename extension.
    ///
    /// Selection is deterministic: a recognized extension picks its family,
    /// anything else (including no extension at all) resolves to [`Format::Raw`].
    /// We never guess a compression format from ambiguous names.
    pub fn from_path(path: &Path) -> Format {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Format::Raw;
        };
        match ext.to_lowercase().as_str() {
            "gz" => Format::Gzip,
            "bz2" => Format::Bzip2,
            "xz" | "lzma" => Format::Xz,
            "zst" | "zstd" => Format::Zstd,
            _ => Format::Raw,
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Operation set every backend implements.
///
/// `read_*` methods fail with `WrongMode` on a write-mode instance and vice
/// versa; no entry is ever left unimplemented. Write-mode instances never
/// allocate a line buffer; read-mode instances allocate one only when the
/// codec lacks a native byte/line primitive.
pub(crate) trait Backend: Send {
    /// Human-readable backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Uncompressed logical size in bytes, or 0 when it cannot be determined
    /// without decompressing the whole stream.
    fn size(&mut self) -> u64;

    /// Read one block into `dest`, returning the bytes produced. Zero means
    /// end of stream. Short reads are legal.
    fn read_block(&mut self, dest: &mut [u8]) -> Result<usize>;

    /// Append one line (newline kept) to `out`, up to `limit` bytes when set.
    /// `false` means the stream ended before any byte was available.
    fn read_line_into(&mut self, out: &mut Vec<u8>, limit: Option<usize>) -> Result<bool>;

    /// Write one block from `src`, returning the bytes accepted.
    fn write_block(&mut self, src: &[u8]) -> Result<usize>;

    /// Push buffered output towards the underlying file.
    fn flush(&mut self) -> Result<()>;

    /// Close-time finalization: writers complete the codec stream (and record
    /// the size side-channel where the family supports one) before reporting
    /// success. Must be safe to call more than once.
    fn finish(&mut self) -> Result<()>;

    /// EOF probe. Authoritative signal is a zero-length block read; codec
    /// status codes are never trusted on their own.
    fn at_eof(&mut self) -> Result<bool>;
}

/// Instantiate the backend for `format` over `path`.
pub(crate) fn open_backend(path: &Path, mode: Mode, format: Format) -> Result<Box<dyn Backend>> {
    log::debug!(
        "selecting {} backend for {} ({})",
        format.name(),
        path.display(),
        mode
    );
    Ok(match format {
        Format::Raw => Box::new(RawBackend::open(path, mode)?),
        Format::Gzip => Box::new(GzipBackend::open(path, mode)?),
        Format::Bzip2 => Box::new(Bzip2Backend::open(path, mode)?),
        Format::Xz => Box::new(XzBackend::open(path, mode)?),
        Format::Zstd => Box::new(ZstdBackend::open(path, mode)?),
    })
}

/// Open `path` for reading, mapping the common failure cases to their
/// dedicated error variants.
pub(crate) fn open_for_read(path: &Path) -> Result<File> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => UnifileError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => UnifileError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => UnifileError::file_error(format!("Failed to open file: {}", path.display()), e),
    })?;

    let metadata = file
        .metadata()
        .map_err(|e| UnifileError::file_error("Failed to read file metadata", e))?;
    if !metadata.is_file() {
        return Err(UnifileError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    Ok(file)
}

/// Create `path` for writing (truncating), with the same error mapping as
/// [`open_for_read`].
pub(crate) fn create_for_write(path: &Path) -> Result<File> {
    File::create(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => UnifileError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => UnifileError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => UnifileError::file_error(format!("Failed to create file: {}", path.display()), e),
    })
}

/// Extended attribute recording the uncompressed byte count for families
/// whose container carries no in-band size field (bzip2, xz, zstd).
pub(crate) const SIZE_ATTR: &str = "user.unifile.size";

/// Read the size annotation left by a previous write-mode close. Absence, a
/// filesystem without xattr support, or an unparseable value all degrade to 0.
#[cfg(unix)]
pub(crate) fn load_size_attr(path: &Path) -> u64 {
    let Ok(Some(value)) = xattr::get(path, SIZE_ATTR) else {
        return 0;
    };
    std::str::from_utf8(&value)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(not(unix))]
pub(crate) fn load_size_attr(_path: &Path) -> u64 {
    0
}

/// Best-effort size annotation at write-mode close. Returns whether the
/// attribute was stored; failure only degrades a later `size()` to 0.
#[cfg(unix)]
pub(crate) fn store_size_attr(path: &Path, size: u64) -> bool {
    match xattr::set(path, SIZE_ATTR, size.to_string().as_bytes()) {
        Ok(()) => true,
        Err(err) => {
            log::debug!(
                "could not record uncompressed size for {}: {}",
                path.display(),
                err
            );
            false
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn store_size_attr(_path: &Path, _size: u64) -> bool {
    false
}
