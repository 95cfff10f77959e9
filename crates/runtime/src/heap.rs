//! The managed heap and the collector contract.
//!
//! A semispace copying collector: allocation bumps a cursor through the
//! active space, and a collection evacuates every live object into the
//! other space, leaving a forwarding pointer behind. Objects are scanned
//! Cheney-style; an object whose payload holds references carries a
//! per-type mark hook that reports each reference field to [`mark`].
//!
//! Any allocation may move any object. Code that holds a bare object
//! pointer across an allocation must root it on the thread's shadow stack
//! and reload it afterwards; violating this is a silent use-after-move.

use libc::{c_void, size_t};
use std::cell::Cell;
use std::io::{self, Write};
use std::mem;
use std::process;
use std::ptr;
use std::sync::atomic::Ordering;

/// Per-type tracing hook invoked while the object is scanned during a
/// collection. The hook must report every reference field through
/// [`mark`].
pub type MarkFn = unsafe fn(*mut Object);

/// The header the collector understands, followed in memory by the
/// payload. `value` is the opaque payload pointer and always points just
/// past the header.
#[repr(C)]
pub struct Object {
    /// Total size of header plus payload, in bytes, 8-byte aligned.
    pub size: usize,
    /// Forwarding pointer; non-null only while a collection is running
    /// and this copy has been evacuated.
    pub new_location: *mut Object,
    /// Tracing hook for payloads that contain references.
    pub mark_fn: Option<MarkFn>,
    /// Opaque payload pointer.
    pub value: *mut c_void,
}

pub const OBJECT_HEADER_SIZE: usize = mem::size_of::<Object>();

fn align(size: usize) -> usize {
    (size + 7) & !7
}

thread_local! {
    /// The heap currently running a collection; set for the duration of
    /// the root walk and scan so mark hooks can reach it.
    static COLLECTING_HEAP: Cell<*mut Heap> = const { Cell::new(ptr::null_mut()) };
}

/// Updates a handle field in place to the forwarded location of the
/// object it points to, evacuating the object first if this is its first
/// visit. Callable only while a collection is running, i.e. from the root
/// walk or from a mark hook.
///
/// # Safety
/// `field` must point to a live `*mut Object` slot owned by the caller.
pub unsafe fn mark(field: *mut *mut Object) {
    let heap = COLLECTING_HEAP.with(|c| c.get());
    if heap.is_null() {
        return;
    }
    unsafe { (*heap).evacuate(field) }
}

/// A semispace heap. Single-mutator: the owning thread is stopped while a
/// collection runs.
pub struct Heap {
    active: *mut u8,
    inactive: *mut u8,
    capacity: usize,
    cursor: usize,
}

impl Heap {
    pub fn new(capacity: usize) -> Self {
        let capacity = align(capacity.max(OBJECT_HEADER_SIZE));
        let active = unsafe { libc::malloc(capacity as size_t) as *mut u8 };
        let inactive = unsafe { libc::malloc(capacity as size_t) as *mut u8 };
        if active.is_null() || inactive.is_null() {
            oom_abort(capacity);
        }
        Heap {
            active,
            inactive,
            capacity,
            cursor: 0,
        }
    }

    /// Bytes currently allocated in the active space.
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Allocates a zero-initialised object with a payload of `payload_size`
    /// bytes, or returns null when the active space is exhausted.
    pub fn try_allocate(&mut self, payload_size: usize) -> *mut Object {
        let total = align(OBJECT_HEADER_SIZE + payload_size);
        if self.cursor + total > self.capacity {
            return ptr::null_mut();
        }
        unsafe {
            let base = self.active.add(self.cursor);
            self.cursor += total;
            ptr::write_bytes(base, 0, total);
            let object = base as *mut Object;
            (*object).size = total;
            (*object).new_location = ptr::null_mut();
            (*object).mark_fn = None;
            (*object).value = base.add(OBJECT_HEADER_SIZE) as *mut c_void;
            object
        }
    }

    /// Runs a collection with the given root walk. The walk must report
    /// every root slot through [`mark`].
    ///
    /// # Safety
    /// Every pointer reachable from the roots must be a live object of
    /// this heap; no bare object pointer outside the roots may be used
    /// after this call returns.
    pub unsafe fn collect(&mut self, walk_roots: impl FnOnce()) {
        mem::swap(&mut self.active, &mut self.inactive);
        self.cursor = 0;

        COLLECTING_HEAP.with(|c| c.set(self as *mut Heap));
        walk_roots();
        unsafe { self.scan() };
        COLLECTING_HEAP.with(|c| c.set(ptr::null_mut()));

        if crate::RUNTIME_LOG.load(Ordering::Relaxed) {
            let _ = io::stderr().write_all(
                format!(
                    "[glyph runtime] collection finished, {} of {} bytes live\n",
                    self.cursor, self.capacity
                )
                .as_bytes(),
            );
        }
    }

    /// Copies the object `*field` points to into the active space (unless
    /// it was copied already) and forwards the field.
    unsafe fn evacuate(&mut self, field: *mut *mut Object) {
        unsafe {
            let object = *field;
            if object.is_null() {
                return;
            }
            if !(*object).new_location.is_null() {
                *field = (*object).new_location;
                return;
            }
            let total = (*object).size;
            debug_assert!(self.cursor + total <= self.capacity);
            let base = self.active.add(self.cursor);
            self.cursor += total;
            ptr::copy_nonoverlapping(object as *const u8, base, total);
            let copy = base as *mut Object;
            (*copy).new_location = ptr::null_mut();
            (*copy).value = base.add(OBJECT_HEADER_SIZE) as *mut c_void;
            (*object).new_location = copy;
            *field = copy;
        }
    }

    /// Cheney scan: walks the active space front to back, running each
    /// object's mark hook. Hooks evacuate further objects, growing the
    /// space being scanned until it is closed.
    unsafe fn scan(&mut self) {
        let mut scan = 0;
        while scan < self.cursor {
            unsafe {
                let object = self.active.add(scan) as *mut Object;
                scan += (*object).size;
                if let Some(mark_fn) = (*object).mark_fn {
                    mark_fn(object);
                }
            }
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        unsafe {
            libc::free(self.active as *mut c_void);
            libc::free(self.inactive as *mut c_void);
        }
    }
}

pub(crate) fn oom_abort(requested: usize) -> ! {
    let _ = io::stderr().write_all(b"glyph runtime: out of managed memory\nRequested: ");
    let s = requested.to_string();
    let _ = io::stderr().write_all(s.as_bytes());
    let _ = io::stderr().write_all(b"\n");
    process::abort();
}
