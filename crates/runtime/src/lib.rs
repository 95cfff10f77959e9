// Managed runtime for compiled Glyph programs.
//
// The runtime provides the handle/value ABI shared with the code
// generator, a precise stop-the-world copying collector with a shadow
// stack for rooting across allocations, and the managed container types
// the compiler bridges to. The mutator model is cooperative: each object
// is owned by at most one thread, and allocation is the only suspension
// point.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod dictionary;
pub mod heap;
pub mod string;
pub mod thread;
pub mod value;

pub use dictionary::{
    dictionary_clear, dictionary_contains_key, dictionary_get, dictionary_init,
    dictionary_mark, dictionary_method_for_name, dictionary_new, dictionary_remove,
    dictionary_set, fnv64, Dictionary, Node,
};
pub use heap::{mark, Heap, Object, OBJECT_HEADER_SIZE};
pub use string::{string_equal, string_new, GlyphString};
pub use thread::{StackFrame, Thread};
pub use value::{Something, NOTHINGNESS};

/// Latch for verbose runtime logging, initialised from the
/// `GLYPH_RUNTIME_LOG` environment variable on first use.
pub static RUNTIME_LOG: AtomicBool = AtomicBool::new(false);
static RUNTIME_LOG_INIT: AtomicBool = AtomicBool::new(false);

/// Reads the logging environment variable once and latches the result.
pub fn init_runtime_log() {
    if RUNTIME_LOG_INIT.swap(true, Ordering::SeqCst) {
        return;
    }
    if std::env::var("GLYPH_RUNTIME_LOG").is_ok_and(|v| v == "1") {
        RUNTIME_LOG.store(true, Ordering::SeqCst);
    }
}
