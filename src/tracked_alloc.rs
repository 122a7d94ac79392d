//! Byte-tracking allocator wrapper.
//!
//! `TrackedAlloc` wraps any `GlobalAlloc` and maintains a process-wide
//! counter of live allocated bytes, so a host that installs it with
//! `#[global_allocator]` always knows its in-memory footprint. An
//! out-of-memory handler can be installed to observe failing requests
//! before the process gives up.

use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::alloc::{GlobalAlloc, Layout, System};
use std::io::Write;

/// Live accounted bytes across all allocations made through the wrapper.
static USED: AtomicUsize = AtomicUsize::new(0);

/// Installed OOM handler, stored as a raw `fn(usize)` pointer; null means
/// the default diagnose-and-abort policy.
static OOM_HANDLER: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// A `GlobalAlloc` that forwards to `A` and accounts every live byte.
///
/// The accounted size of an allocation is its `Layout::size()`; the
/// layout comes back on `dealloc`, so the counter needs no per-block
/// header. Counter updates are relaxed atomics — an allocator is shared
/// by construction, and no ordering is implied between allocations.
///
/// ```ignore
/// #[global_allocator]
/// static ALLOC: TrackedAlloc = TrackedAlloc::new();
/// ```
pub struct TrackedAlloc<A = System> {
    inner: A,
}

impl TrackedAlloc<System> {
    /// Wrapper around the system allocator.
    pub const fn new() -> Self {
        TrackedAlloc { inner: System }
    }
}

impl Default for TrackedAlloc<System> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> TrackedAlloc<A> {
    /// Wrapper around a caller-supplied allocator.
    pub const fn with_allocator(inner: A) -> Self {
        TrackedAlloc { inner }
    }
}

/// Current total of live accounted bytes.
pub fn used_memory() -> usize {
    USED.load(Ordering::Relaxed)
}

/// Install an out-of-memory handler invoked with the failing request
/// size, or restore the default (write a diagnostic to stderr, abort).
///
/// A custom handler that returns lets the null allocation propagate to
/// the Rust runtime, which aborts through `handle_alloc_error`; failure
/// stays fatal unless the handler itself diverges.
pub fn set_oom_handler(handler: Option<fn(usize)>) {
    let ptr = match handler {
        Some(f) => f as *mut (),
        None => core::ptr::null_mut(),
    };
    OOM_HANDLER.store(ptr, Ordering::Relaxed);
}

fn oom(size: usize) {
    let ptr = OOM_HANDLER.load(Ordering::Relaxed);
    if ptr.is_null() {
        default_oom_handler(size);
    } else {
        // Stored by `set_oom_handler`, which only ever writes `fn(usize)`.
        let handler: fn(usize) = unsafe { core::mem::transmute(ptr) };
        handler(size);
    }
}

/// Default policy: emit a diagnostic and abort. The message is rendered
/// into a stack buffer because allocating inside the allocator is not an
/// option at this point.
fn default_oom_handler(size: usize) {
    let mut digits = [0u8; 20];
    let mut i = digits.len();
    let mut v = size;
    loop {
        i -= 1;
        digits[i] = b'0' + (v % 10) as u8;
        v /= 10;
        if v == 0 {
            break;
        }
    }
    let mut stderr = std::io::stderr();
    let _ = stderr.write_all(b"tracked_alloc: out of memory allocating ");
    let _ = stderr.write_all(&digits[i..]);
    let _ = stderr.write_all(b" bytes\n");
    std::process::abort();
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackedAlloc<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if ptr.is_null() {
            oom(layout.size());
        } else {
            USED.fetch_add(layout.size(), Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if ptr.is_null() {
            oom(layout.size());
        } else {
            USED.fetch_add(layout.size(), Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        USED.fetch_sub(layout.size(), Ordering::Relaxed);
        self.inner.dealloc(ptr, layout);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if new_ptr.is_null() {
            oom(new_size);
        } else {
            // Counter moves by the delta between the old and new accounted
            // sizes; the old block is gone either way on success.
            USED.fetch_sub(layout.size(), Ordering::Relaxed);
            USED.fetch_add(new_size, Ordering::Relaxed);
        }
        new_ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The wrapper is exercised directly without installing it as the
    // global allocator, so only these tests move the counter — but they
    // share it, so they serialize to keep the delta assertions exact.
    static COUNTER_LOCK: Mutex<()> = Mutex::new(());

    /// Invariant: a successful `alloc` adds exactly the layout size to
    /// the counter and `dealloc` removes it again.
    #[test]
    fn alloc_dealloc_moves_counter_by_layout_size() {
        let _serial = COUNTER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let a = TrackedAlloc::new();
        let layout = Layout::from_size_align(257, 8).unwrap();
        let before = used_memory();
        let ptr = unsafe { a.alloc(layout) };
        assert!(!ptr.is_null());
        assert_eq!(used_memory(), before + 257);
        unsafe { a.dealloc(ptr, layout) };
        assert_eq!(used_memory(), before);
    }

    /// Invariant: `alloc_zeroed` accounts like `alloc` and returns
    /// zeroed storage.
    #[test]
    fn alloc_zeroed_accounts_and_zeroes() {
        let _serial = COUNTER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let a = TrackedAlloc::new();
        let layout = Layout::from_size_align(64, 8).unwrap();
        let before = used_memory();
        let ptr = unsafe { a.alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        assert_eq!(used_memory(), before + 64);
        let bytes = unsafe { core::slice::from_raw_parts(ptr, 64) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { a.dealloc(ptr, layout) };
        assert_eq!(used_memory(), before);
    }

    /// Invariant: `realloc` adjusts the counter by the size delta in
    /// both directions.
    #[test]
    fn realloc_adjusts_counter_by_delta() {
        let _serial = COUNTER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let a = TrackedAlloc::new();
        let layout = Layout::from_size_align(100, 8).unwrap();
        let before = used_memory();
        let ptr = unsafe { a.alloc(layout) };
        assert_eq!(used_memory(), before + 100);

        let grown = unsafe { a.realloc(ptr, layout, 300) };
        assert!(!grown.is_null());
        assert_eq!(used_memory(), before + 300);

        let grown_layout = Layout::from_size_align(300, 8).unwrap();
        let shrunk = unsafe { a.realloc(grown, grown_layout, 30) };
        assert!(!shrunk.is_null());
        assert_eq!(used_memory(), before + 30);

        let shrunk_layout = Layout::from_size_align(30, 8).unwrap();
        unsafe { a.dealloc(shrunk, shrunk_layout) };
        assert_eq!(used_memory(), before);
    }

    /// Invariant: installing and clearing the OOM handler round-trips;
    /// the handler itself is only consulted on allocation failure, so a
    /// healthy allocation sequence never fires it.
    #[test]
    fn oom_handler_install_and_reset() {
        fn noop(_size: usize) {}
        set_oom_handler(Some(noop));
        let a = TrackedAlloc::new();
        let layout = Layout::from_size_align(16, 8).unwrap();
        let ptr = unsafe { a.alloc(layout) };
        assert!(!ptr.is_null());
        unsafe { a.dealloc(ptr, layout) };
        set_oom_handler(None);
    }
}
