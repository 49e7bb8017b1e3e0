//! Hierarchical ownership registration and cascade close.
//!
//! Every handle enrolls in an [`OwnerContext`] at open time. Tearing the
//! context down (explicitly via [`OwnerContext::close_all`] or by dropping its
//! last reference) closes every handle still registered under it, in
//! unspecified order, as a safety net against leaked descriptors. Explicit
//! [`Handle::close`](crate::Handle::close) remains the normal path: the
//! cascade detects already-closed handles and skips them, so the two paths
//! never double-finalize a codec stream. An explicit close also removes its
//! registry entry, so the registry only ever tracks handles the cascade may
//! still need.

use crate::handle::{close_core, HandleCore};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, OnceLock, Weak};

/// An allocation scope for handles. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct OwnerContext {
    inner: Arc<ContextInner>,
}

#[derive(Default)]
pub(crate) struct ContextInner {
    registry: Mutex<Vec<Weak<Mutex<HandleCore>>>>,
}

impl ContextInner {
    /// Remove the entry for a core that was just closed explicitly, so the
    /// registry only tracks handles the cascade may still need to finalize.
    pub(crate) fn deregister(&self, core: &Arc<Mutex<HandleCore>>) {
        self.registry
            .lock()
            .retain(|weak| weak.as_ptr() != Arc::as_ptr(core));
    }
}

impl OwnerContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner::default()),
        }
    }

    /// Enroll a handle core. Dropped handles leave dead weak entries behind;
    /// they are pruned here rather than on every close.
    pub(crate) fn register(&self, core: &Arc<Mutex<HandleCore>>) {
        let mut registry = self.inner.registry.lock();
        registry.retain(|weak| weak.strong_count() > 0);
        registry.push(Arc::downgrade(core));
    }

    /// Weak reference handed to each handle core so explicit close can
    /// deregister without keeping the context alive.
    pub(crate) fn downgrade(&self) -> Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    /// Number of handles registered under this context that are still open.
    pub fn open_handles(&self) -> usize {
        self.inner
            .registry
            .lock()
            .iter()
            .filter_map(|weak| weak.upgrade())
            .filter(|core| matches!(&*core.lock(), HandleCore::Open(_)))
            .count()
    }

    /// Close every handle still open under this context, returning how many
    /// were actually closed. Already-closed handles are skipped; the count
    /// reflects only handles this call transitioned, even when an explicit
    /// close races it.
    pub fn close_all(&self) -> usize {
        let entries = std::mem::take(&mut *self.inner.registry.lock());
        let mut closed = 0;
        for weak in entries {
            let Some(core) = weak.upgrade() else {
                continue;
            };
            match close_core(&core) {
                Ok(false) => {}
                Ok(true) => closed += 1,
                Err(err) => {
                    log::warn!("cascade close reported an error: {err}");
                    closed += 1;
                }
            }
        }
        closed
    }
}

impl Default for OwnerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        for weak in self.registry.get_mut().drain(..) {
            let Some(core) = weak.upgrade() else {
                continue;
            };
            if let Err(err) = close_core(&core) {
                log::warn!("cascade close during context teardown reported an error: {err}");
            }
        }
    }
}

static DEFAULT_CONTEXT: OnceLock<RwLock<OwnerContext>> = OnceLock::new();

fn default_cell() -> &'static RwLock<OwnerContext> {
    DEFAULT_CONTEXT.get_or_init(|| RwLock::new(OwnerContext::new()))
}

/// The process-wide context that plain [`Handle::open`](crate::Handle::open)
/// registers under.
pub fn default_context() -> OwnerContext {
    default_cell().read().clone()
}

/// Replace the process-wide default context. Handles already registered stay
/// with the previous context; if this was its last reference, replacing it
/// cascade-closes them.
pub fn set_default_context(context: OwnerContext) {
    *default_cell().write() = context;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Handle, Mode};
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn test_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content).expect("Failed to write test content");
        file.flush().expect("Failed to flush test file");
        file
    }

    #[test]
    fn test_cascade_close_on_drop() {
        let file_a = test_file(b"a");
        let file_b = test_file(b"b");
        let context = OwnerContext::new();

        let a = Handle::open_in(&context, file_a.path(), Mode::Read, crate::Format::Raw).unwrap();
        let b = Handle::open_in(&context, file_b.path(), Mode::Read, crate::Format::Raw).unwrap();
        assert_eq!(context.open_handles(), 2);

        drop(context);
        assert!(a.is_closed());
        assert!(b.is_closed());
    }

    #[test]
    fn test_cascade_skips_explicitly_closed_handles() {
        let file = test_file(b"data");
        let context = OwnerContext::new();
        let handle =
            Handle::open_in(&context, file.path(), Mode::Read, crate::Format::Raw).unwrap();

        handle.close().unwrap();
        assert_eq!(context.open_handles(), 0);
        // The already-closed handle is skipped, not double-finalized
        assert_eq!(context.close_all(), 0);
        assert!(handle.is_closed());
    }

    #[test]
    fn test_close_all_finalizes_writers() {
        let out = NamedTempFile::new().unwrap();
        let context = OwnerContext::new();
        let writer =
            Handle::open_in(&context, out.path(), Mode::Write, crate::Format::Raw).unwrap();
        writer.write_formatted(format_args!("flushed by cascade")).unwrap();

        assert_eq!(context.close_all(), 1);
        assert!(writer.is_closed());
        assert_eq!(std::fs::read(out.path()).unwrap(), b"flushed by cascade");
    }

    #[test]
    fn test_dropped_handles_are_pruned() {
        let file = test_file(b"data");
        let context = OwnerContext::new();
        {
            let _handle =
                Handle::open_in(&context, file.path(), Mode::Read, crate::Format::Raw).unwrap();
        }
        // The handle is gone; only a dead weak entry remains
        assert_eq!(context.open_handles(), 0);
        assert_eq!(context.close_all(), 0);
    }

    #[test]
    fn test_explicit_close_removes_registry_entry() {
        let file = test_file(b"data");
        let context = OwnerContext::new();
        let handle =
            Handle::open_in(&context, file.path(), Mode::Read, crate::Format::Raw).unwrap();
        assert_eq!(context.inner.registry.lock().len(), 1);

        handle.close().unwrap();
        // The entry is gone, not merely marked closed
        assert_eq!(context.inner.registry.lock().len(), 0);
    }

    #[test]
    fn test_close_all_counts_only_actual_transitions() {
        let file_a = test_file(b"a");
        let file_b = test_file(b"b");
        let context = OwnerContext::new();
        let a = Handle::open_in(&context, file_a.path(), Mode::Read, crate::Format::Raw).unwrap();
        let b = Handle::open_in(&context, file_b.path(), Mode::Read, crate::Format::Raw).unwrap();

        a.close().unwrap();
        // Only the still-open handle is counted
        assert_eq!(context.close_all(), 1);
        assert!(b.is_closed());
    }

    #[test]
    fn test_default_context_is_replaceable() {
        let before = default_context();
        let replacement = OwnerContext::new();
        set_default_context(replacement.clone());
        assert_eq!(replacement.open_handles(), 0);
        // Restore so other tests keep registering under a live context
        set_default_context(before);
    }
}
