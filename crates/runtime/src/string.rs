//! The managed string type used as dictionary key.
//!
//! A string payload is a length followed by the UTF-8 bytes inline.
//! Strings hold no references, so they need no mark hook.

use crate::heap::Object;
use crate::thread::Thread;
use std::mem;
use std::ptr;
use std::slice;

#[repr(C)]
pub struct GlyphString {
    /// Number of UTF-8 bytes that follow the header inline.
    pub length: usize,
}

/// Allocates a managed string with the given contents.
pub fn string_new(thread: &mut Thread, contents: &str) -> *mut Object {
    let object = thread.allocate(mem::size_of::<GlyphString>() + contents.len());
    unsafe {
        let payload = (*object).value as *mut GlyphString;
        (*payload).length = contents.len();
        let bytes = payload.add(1) as *mut u8;
        ptr::copy_nonoverlapping(contents.as_ptr(), bytes, contents.len());
    }
    object
}

/// The byte contents of a managed string.
///
/// # Safety
/// `object` must be a live string object of the owning thread's heap, and
/// the returned slice must not outlive the next allocation.
pub unsafe fn string_bytes<'a>(object: *mut Object) -> &'a [u8] {
    unsafe {
        let payload = (*object).value as *const GlyphString;
        let bytes = payload.add(1) as *const u8;
        slice::from_raw_parts(bytes, (*payload).length)
    }
}

/// Character-wise string equality.
///
/// # Safety
/// Both pointers must be live string objects.
pub unsafe fn string_equal(a: *mut Object, b: *mut Object) -> bool {
    unsafe { string_bytes(a) == string_bytes(b) }
}
