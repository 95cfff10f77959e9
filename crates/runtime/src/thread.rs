//! Mutator threads: the shadow stack and the allocation entry point.
//!
//! A thread owns its heap and a stack of frames. Each frame roots a
//! receiver object and a fixed number of handle slots; compiled code and
//! bridge functions pass arguments through these slots. The frames double
//! as the collector's root set, so anything stored in a frame survives a
//! collection with its pointers updated in place.

use crate::heap::{mark, Heap, Object};
use crate::value::{Something, NOTHINGNESS};
use std::io::{self, Write};
use std::ptr;
use std::sync::atomic::Ordering;

const DEFAULT_HEAP_CAPACITY: usize = 1 << 20;

/// One shadow-stack frame: a rooted receiver and rooted argument slots.
pub struct StackFrame {
    pub this: *mut Object,
    pub variables: Vec<Something>,
}

/// A cooperative mutator thread. Each managed object is owned by at most
/// one thread at a time, so no locking happens here; allocation is the
/// only suspension point.
pub struct Thread {
    heap: Heap,
    frames: Vec<StackFrame>,
}

impl Thread {
    pub fn new() -> Self {
        Thread::with_heap_capacity(DEFAULT_HEAP_CAPACITY)
    }

    /// A thread with a fixed semispace size. Small capacities force
    /// frequent collections, which is useful for exercising the rooting
    /// discipline.
    pub fn with_heap_capacity(capacity: usize) -> Self {
        crate::init_runtime_log();
        Thread {
            heap: Heap::new(capacity),
            frames: Vec::new(),
        }
    }

    /// Pushes a frame rooting `this` and `variable_count` handle slots
    /// initialised to nothingness.
    pub fn stack_push(&mut self, this: *mut Object, variable_count: usize) {
        self.frames.push(StackFrame {
            this,
            variables: vec![NOTHINGNESS; variable_count],
        });
    }

    pub fn stack_pop(&mut self) {
        let popped = self.frames.pop();
        debug_assert!(popped.is_some());
    }

    /// The receiver of the current frame, updated across collections.
    pub fn stack_get_this(&self) -> *mut Object {
        self.frames.last().map(|f| f.this).unwrap_or(ptr::null_mut())
    }

    pub fn stack_get_variable(&self, index: usize) -> Something {
        self.frames
            .last()
            .and_then(|f| f.variables.get(index).copied())
            .unwrap_or(NOTHINGNESS)
    }

    pub fn stack_set_variable(&mut self, index: usize, value: Something) {
        if let Some(frame) = self.frames.last_mut() {
            if let Some(slot) = frame.variables.get_mut(index) {
                *slot = value;
            }
        }
    }

    /// Allocates raw, zero-initialised managed memory whose address is
    /// itself an object reference. Any call may stop the mutator and move
    /// every object; only handles rooted in stack frames stay valid.
    pub fn allocate(&mut self, payload_size: usize) -> *mut Object {
        let object = self.heap.try_allocate(payload_size);
        if !object.is_null() {
            return object;
        }
        self.collect();
        let object = self.heap.try_allocate(payload_size);
        if object.is_null() {
            crate::heap::oom_abort(payload_size);
        }
        object
    }

    /// Runs a stop-the-world collection with the shadow stack as the root
    /// set.
    pub fn collect(&mut self) {
        if crate::RUNTIME_LOG.load(Ordering::Relaxed) {
            let _ = io::stderr().write_all(
                format!(
                    "[glyph runtime] collecting, {} frames rooted\n",
                    self.frames.len()
                )
                .as_bytes(),
            );
        }
        let frames = &mut self.frames;
        unsafe {
            self.heap.collect(|| {
                for frame in frames.iter_mut() {
                    if !frame.this.is_null() {
                        mark(&mut frame.this);
                    }
                    for variable in frame.variables.iter_mut() {
                        if let Something::Object(object) = variable {
                            mark(object as *mut *mut Object);
                        }
                    }
                }
            });
        }
    }

    /// Bytes currently allocated on this thread's heap.
    pub fn heap_used(&self) -> usize {
        self.heap.used()
    }
}

impl Default for Thread {
    fn default() -> Self {
        Thread::new()
    }
}
