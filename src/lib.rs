//! # unifile - Uniform access to plain and compressed files
//!
//! A file-access layer that lets calling code read and write files without
//! knowing, at the call site, whether the bytes on disk are raw or compressed
//! with gzip, bzip2, xz or zstd. One [`Handle`] type exposes stdio-like
//! operations (open, read a line, read/write fixed-size records, formatted
//! write, flush, size, eof, close) and the correct backend is selected
//! transparently at open time from the filename extension.
//!
//! ## Features
//!
//! - **Transparent compression**: gzip, bzip2, xz and zstd behind one handle
//! - **Line reads over block codecs**: a shared read-ahead buffer emulates
//!   byte- and line-at-a-time reads for codecs that only offer block reads
//! - **Cascade cleanup**: handles register under an [`OwnerContext`] whose
//!   teardown closes anything the caller forgot
//! - **Binary safe**: lines are byte strings, not required to be UTF-8
//!
//! ## Example
//!
//! ```no_run
//! use unifile::{Handle, Mode};
//!
//! # fn main() -> unifile::Result<()> {
//! let out = Handle::open("data.gz", Mode::Write)?;
//! out.write_formatted(format_args!("{} {}\n", "hello", 42))?;
//! out.close()?;
//!
//! let input = Handle::open("data.gz", Mode::Read)?;
//! while let Some(line) = input.read_line(4096)? {
//!     // process the line; the trailing newline is kept when present
//!     let _ = line;
//! }
//! input.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into focused modules:
//!
//! - [`error`] - Centralized error types and handling
//! - [`handle`] - The polymorphic handle and operation dispatch
//! - [`backend`] - One adapter per compression family, plus raw access
//! - [`context`] - Ownership registration and cascade close

// Core modules
pub mod backend;
pub mod context;
pub mod error;
pub mod handle;

// Read-ahead buffer shared by the block-read-only backends
mod line_buffer;

// Re-export commonly used types for convenience
pub use error::{Result, UnifileError};

// Public API surface for external usage
pub use backend::Format;
pub use context::{default_context, set_default_context, OwnerContext};
pub use handle::{Handle, Lines, Mode};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
