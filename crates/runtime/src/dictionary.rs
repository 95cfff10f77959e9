//! The managed hash-based associative container.
//!
//! A mapping from hashable handle keys to handle values, persistent
//! across collections, with amortised O(1) insert, lookup, and removal.
//! Bucket arrays are power-of-two sized and indexed with `hash & (n - 1)`;
//! collisions chain through per-node links. Every node and the bucket
//! array are themselves managed objects, so the dictionary's mark hook
//! must reach all of them during a collection.
//!
//! Allocation discipline: the receiver, key, and value stay rooted in the
//! operation's stack frame for the whole operation, and a chain tail is
//! rooted in a scratch slot before the node allocation that may move it.
//! Bare pointers are reloaded from the frame after every allocation.

use crate::heap::{mark, Object};
use crate::string::{string_bytes, string_equal};
use crate::thread::Thread;
use crate::value::{Something, NOTHINGNESS};
use std::mem;
use std::ptr;

pub type DictionaryHash = u64;

const FNV_PRIME_64: u64 = 1099511628211;
const FNV_OFFSET_64: u64 = 14695981039346656037;

pub const DICTIONARY_DEFAULT_LOAD_FACTOR: f32 = 0.75;
pub const DICTIONARY_DEFAULT_INITIAL_CAPACITY: usize = 1 << 4;
pub const DICTIONARY_MAXIMUM_CAPACITY: usize = 1 << 30;
pub const DICTIONARY_MAXIMUM_CAPACITY_THRESHOLD: usize = usize::MAX;

/// FNV-1a 64 over the bytes of a key.
pub fn fnv64(bytes: &[u8]) -> DictionaryHash {
    let mut hash = FNV_OFFSET_64;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME_64);
    }
    hash
}

/// The dictionary payload.
#[repr(C)]
pub struct Dictionary {
    /// Managed array of bucket head references, or null if never grown.
    pub buckets: *mut Object,
    /// Length of the bucket array; zero or a power of two.
    pub buckets_counter: usize,
    /// Live entry count.
    pub size: usize,
    /// A resize is triggered when `size` exceeds this.
    pub next_threshold: usize,
    pub load_factor: f32,
}

/// A chain node; every node is itself a managed object.
#[repr(C)]
pub struct Node {
    pub hash: DictionaryHash,
    pub key: Something,
    pub value: Something,
    pub next: *mut Object,
}

// Frame slot assignments for mutating operations.
const SLOT_KEY: usize = 0;
const SLOT_VALUE: usize = 1;
const SLOT_SCRATCH: usize = 2;

unsafe fn dict_of(dicto: *mut Object) -> *mut Dictionary {
    unsafe { (*dicto).value as *mut Dictionary }
}

unsafe fn node_of(nodeo: *mut Object) -> *mut Node {
    unsafe { (*nodeo).value as *mut Node }
}

unsafe fn buckets_of(dict: *mut Dictionary) -> *mut *mut Object {
    unsafe { (*(*dict).buckets).value as *mut *mut Object }
}

unsafe fn dictionary_hash(key: Something) -> DictionaryHash {
    unsafe { fnv64(string_bytes(key.object())) }
}

unsafe fn dictionary_key_equal(key1: Something, key2: Something) -> bool {
    unsafe { string_equal(key1.object(), key2.object()) }
}

/// Hash-then-equality test; short-circuits on hash inequality.
unsafe fn dictionary_key_hash_equal(
    hash1: DictionaryHash,
    hash2: DictionaryHash,
    key1: Something,
    key2: Something,
) -> bool {
    hash1 == hash2 && unsafe { dictionary_key_equal(key1, key2) }
}

/// Locates the node for `key`, or null.
unsafe fn dictionary_get_node(
    dict: *mut Dictionary,
    hash: DictionaryHash,
    key: Something,
) -> *mut Node {
    unsafe {
        if (*dict).buckets.is_null() {
            return ptr::null_mut();
        }
        let n = (*dict).buckets_counter;
        if n == 0 {
            return ptr::null_mut();
        }
        let bucko = buckets_of(dict);
        let mut eo = *bucko.add((hash & (n as u64 - 1)) as usize);
        while !eo.is_null() {
            let e = node_of(eo);
            if dictionary_key_hash_equal(hash, (*e).hash, key, (*e).key) {
                return e;
            }
            eo = (*e).next;
        }
        ptr::null_mut()
    }
}

/// Allocates a fresh node for the key and value rooted in the current
/// frame. The caller must reload every bare pointer afterwards.
unsafe fn dictionary_new_node(thread: &mut Thread, hash: DictionaryHash) -> *mut Object {
    let nodeo = thread.allocate(mem::size_of::<Node>());
    unsafe {
        let node = node_of(nodeo);
        (*node).hash = hash;
        (*node).key = thread.stack_get_variable(SLOT_KEY);
        (*node).value = thread.stack_get_variable(SLOT_VALUE);
        (*node).next = ptr::null_mut();
    }
    nodeo
}

/// Grows the bucket array. The receiver of the current frame is the
/// dictionary; it is reloaded after the allocation because the bucket
/// array allocation may move it.
unsafe fn dictionary_resize(thread: &mut Thread) {
    unsafe {
        let dict = dict_of(thread.stack_get_this());
        let old_cap = if (*dict).buckets.is_null() {
            0
        } else {
            (*dict).buckets_counter
        };
        let old_thr = (*dict).next_threshold;
        let mut new_cap = old_cap << 1;
        let mut new_thr = 0usize;

        if old_cap > 0 {
            if old_cap >= DICTIONARY_MAXIMUM_CAPACITY {
                (*dict).next_threshold = DICTIONARY_MAXIMUM_CAPACITY_THRESHOLD;
                return;
            } else if new_cap < DICTIONARY_MAXIMUM_CAPACITY
                && old_cap >= DICTIONARY_DEFAULT_INITIAL_CAPACITY
            {
                new_thr = old_thr << 1; // double threshold
            }
        } else if old_thr > 0 {
            // initial capacity was placed in the threshold
            new_cap = old_thr;
        } else {
            // zero initial threshold signifies using defaults
            new_cap = DICTIONARY_DEFAULT_INITIAL_CAPACITY;
            new_thr =
                (DICTIONARY_DEFAULT_LOAD_FACTOR * DICTIONARY_DEFAULT_INITIAL_CAPACITY as f32)
                    as usize;
        }

        if new_thr == 0 {
            let ft = new_cap as f32 * (*dict).load_factor;
            new_thr = if new_cap < DICTIONARY_MAXIMUM_CAPACITY
                && ft < DICTIONARY_MAXIMUM_CAPACITY as f32
            {
                ft as usize
            } else {
                DICTIONARY_MAXIMUM_CAPACITY_THRESHOLD
            };
        }

        let new_buckoo = thread.allocate(new_cap * mem::size_of::<*mut Object>());
        let dict = dict_of(thread.stack_get_this());
        let old_buckoo = (*dict).buckets;
        (*dict).buckets = new_buckoo;
        (*dict).next_threshold = new_thr;
        (*dict).buckets_counter = new_cap;

        if old_buckoo.is_null() {
            return;
        }
        let old_bucko = (*old_buckoo).value as *mut *mut Object;
        let new_bucko = buckets_of(dict);
        for j in 0..old_cap {
            let eo = *old_bucko.add(j);
            if eo.is_null() {
                continue;
            }
            *old_bucko.add(j) = ptr::null_mut();
            let e = node_of(eo);
            if (*e).next.is_null() {
                *new_bucko.add(((*e).hash & (new_cap as u64 - 1)) as usize) = eo;
                continue;
            }
            // Split the chain into a lo and a hi list, preserving
            // encounter order: a node stays at j if its hash bit for the
            // old capacity is clear, otherwise it moves to j + old_cap.
            let mut lo_heado: *mut Object = ptr::null_mut();
            let mut lo_tailo: *mut Object = ptr::null_mut();
            let mut hi_heado: *mut Object = ptr::null_mut();
            let mut hi_tailo: *mut Object = ptr::null_mut();
            let mut eo = eo;
            loop {
                let e = node_of(eo);
                let nexto = (*e).next;
                if ((*e).hash & old_cap as u64) == 0 {
                    if lo_tailo.is_null() {
                        lo_heado = eo;
                    } else {
                        (*node_of(lo_tailo)).next = eo;
                    }
                    lo_tailo = eo;
                } else {
                    if hi_tailo.is_null() {
                        hi_heado = eo;
                    } else {
                        (*node_of(hi_tailo)).next = eo;
                    }
                    hi_tailo = eo;
                }
                if nexto.is_null() {
                    break;
                }
                eo = nexto;
            }
            if !lo_tailo.is_null() {
                (*node_of(lo_tailo)).next = ptr::null_mut();
                *new_bucko.add(j) = lo_heado;
            }
            if !hi_tailo.is_null() {
                (*node_of(hi_tailo)).next = ptr::null_mut();
                *new_bucko.add(j + old_cap) = hi_heado;
            }
        }
    }
}

/// Inserts or overwrites the mapping for the key in the current frame's
/// slot 0 with the value in slot 1; the receiver is the dictionary.
unsafe fn dictionary_put_val(thread: &mut Thread) {
    unsafe {
        let hash = dictionary_hash(thread.stack_get_variable(SLOT_KEY));

        {
            let dict = dict_of(thread.stack_get_this());
            if (*dict).buckets.is_null() || (*dict).buckets_counter == 0 {
                dictionary_resize(thread);
            }
        }

        let dict = dict_of(thread.stack_get_this());
        let n = (*dict).buckets_counter;
        let i = (hash & (n as u64 - 1)) as usize;
        let po = *buckets_of(dict).add(i);

        if po.is_null() {
            let nodeo = dictionary_new_node(thread, hash);
            let dict = dict_of(thread.stack_get_this());
            *buckets_of(dict).add(i) = nodeo;
        } else {
            // Walk the chain without allocating: find an existing mapping
            // or the tail to append to.
            let mut p = po;
            let mut existing: *mut Object = ptr::null_mut();
            loop {
                let e = node_of(p);
                if dictionary_key_hash_equal(
                    hash,
                    (*e).hash,
                    thread.stack_get_variable(SLOT_KEY),
                    (*e).key,
                ) {
                    existing = p;
                    break;
                }
                if (*e).next.is_null() {
                    break;
                }
                p = (*e).next;
            }
            if !existing.is_null() {
                // existing mapping for key
                (*node_of(existing)).value = thread.stack_get_variable(SLOT_VALUE);
                return;
            }
            // The tail is a bare node pointer; root it across the node
            // allocation and reload it afterwards.
            thread.stack_set_variable(SLOT_SCRATCH, Something::Object(p));
            let nodeo = dictionary_new_node(thread, hash);
            let tailo = thread.stack_get_variable(SLOT_SCRATCH).object();
            (*node_of(tailo)).next = nodeo;
        }

        let dict = dict_of(thread.stack_get_this());
        (*dict).size += 1;
        if (*dict).size > (*dict).next_threshold {
            dictionary_resize(thread);
        }
    }
}

/// Locates and unlinks the node for `key`. A bucket-head match replaces
/// the head with its successor; otherwise the node is spliced out of its
/// predecessor.
unsafe fn dictionary_remove_node(
    dict: *mut Dictionary,
    hash: DictionaryHash,
    key: Something,
) -> *mut Node {
    unsafe {
        if (*dict).buckets.is_null() {
            return ptr::null_mut();
        }
        let n = (*dict).buckets_counter;
        if n == 0 {
            return ptr::null_mut();
        }
        let bucko = buckets_of(dict);
        let index = (hash & (n as u64 - 1)) as usize;
        let po = *bucko.add(index);
        if po.is_null() {
            return ptr::null_mut();
        }
        let mut p = node_of(po);
        let mut node: *mut Node = ptr::null_mut();
        if dictionary_key_hash_equal(hash, (*p).hash, key, (*p).key) {
            node = p;
        } else {
            let mut nexto = (*p).next;
            while !nexto.is_null() {
                let e = node_of(nexto);
                if dictionary_key_hash_equal(hash, (*e).hash, key, (*e).key) {
                    node = e;
                    break;
                }
                p = e;
                nexto = (*e).next;
            }
        }
        if node.is_null() {
            return ptr::null_mut();
        }
        if ptr::eq(node, p) {
            *bucko.add(index) = (*node).next;
        } else {
            (*p).next = (*node).next;
        }
        (*dict).size -= 1;
        node
    }
}

// MARK: Dictionary interface

/// Inserts or overwrites a mapping. Allocation may move the dictionary,
/// the key, and the value, so all three are rooted for the duration.
///
/// # Safety
/// `dicto` must be a live dictionary object of `thread`'s heap; `key`
/// must be a string reference handle.
pub unsafe fn dictionary_set(
    thread: &mut Thread,
    dicto: *mut Object,
    key: Something,
    value: Something,
) {
    thread.stack_push(dicto, 3);
    thread.stack_set_variable(SLOT_KEY, key);
    thread.stack_set_variable(SLOT_VALUE, value);
    unsafe { dictionary_put_val(thread) };
    thread.stack_pop();
}

/// Looks up a key; absent keys yield [`NOTHINGNESS`]. Never allocates.
///
/// # Safety
/// `dicto` must be a live dictionary object; `key` a string reference.
pub unsafe fn dictionary_get(dicto: *mut Object, key: Something) -> Something {
    unsafe {
        let dict = dict_of(dicto);
        let node = dictionary_get_node(dict, dictionary_hash(key), key);
        if node.is_null() {
            NOTHINGNESS
        } else {
            (*node).value
        }
    }
}

/// Removes the mapping for a key; removing an absent key is a no-op.
/// Never allocates.
///
/// # Safety
/// `dicto` must be a live dictionary object; `key` a string reference.
pub unsafe fn dictionary_remove(dicto: *mut Object, key: Something) {
    unsafe {
        let dict = dict_of(dicto);
        dictionary_remove_node(dict, dictionary_hash(key), key);
    }
}

/// Whether a mapping for the key exists. Never allocates.
///
/// # Safety
/// `dicto` must be a live dictionary object; `key` a string reference.
pub unsafe fn dictionary_contains_key(dicto: *mut Object, key: Something) -> bool {
    unsafe {
        let dict = dict_of(dicto);
        !dictionary_get_node(dict, dictionary_hash(key), key).is_null()
    }
}

/// Zeroes every bucket head and the entry count. The bucket array is
/// retained for reuse.
///
/// # Safety
/// `dicto` must be a live dictionary object.
pub unsafe fn dictionary_clear(dicto: *mut Object) {
    unsafe {
        let dict = dict_of(dicto);
        if (*dict).buckets.is_null() || (*dict).size == 0 {
            return;
        }
        let bucko = buckets_of(dict);
        (*dict).size = 0;
        for i in 0..(*dict).buckets_counter {
            *bucko.add(i) = ptr::null_mut();
        }
    }
}

/// Installs the default load factor, clears the size, and leaves the
/// buckets null. The receiver of the current frame is the dictionary.
pub fn dictionary_init(thread: &mut Thread) {
    let dicto = thread.stack_get_this();
    if dicto.is_null() {
        return;
    }
    unsafe {
        let dict = dict_of(dicto);
        (*dict).load_factor = DICTIONARY_DEFAULT_LOAD_FACTOR;
        (*dict).size = 0;
        (*dict).buckets = ptr::null_mut();
        (*dict).next_threshold = 0;
    }
}

/// The dictionary's tracing hook: informs the collector of the bucket
/// array, every bucket head slot and chain link by address, and each
/// node's key and value handles when they are references.
pub unsafe fn dictionary_mark(object: *mut Object) {
    unsafe {
        let dict = dict_of(object);
        if (*dict).buckets.is_null() {
            return;
        }
        mark(&mut (*dict).buckets);

        let buckets = buckets_of(dict);
        for i in 0..(*dict).buckets_counter {
            let mut eo: *mut *mut Object = buckets.add(i);
            while !(*eo).is_null() {
                mark(eo);
                let e = node_of(*eo);
                if let Something::Object(key) = &mut (*e).key {
                    mark(key as *mut *mut Object);
                }
                if let Something::Object(value) = &mut (*e).value {
                    mark(value as *mut *mut Object);
                }
                eo = &mut (*e).next;
            }
        }
    }
}

/// Allocates and initialises an empty dictionary.
pub fn dictionary_new(thread: &mut Thread) -> *mut Object {
    let dicto = thread.allocate(mem::size_of::<Dictionary>());
    unsafe {
        (*dicto).mark_fn = Some(dictionary_mark);
    }
    thread.stack_push(dicto, 0);
    dictionary_init(thread);
    thread.stack_pop();
    dicto
}

// MARK: Bridges

/// A bridge entry point: receives its receiver and arguments through the
/// thread's operand stack and returns a handle.
pub type MethodHandler = fn(&mut Thread) -> Something;

fn bridge_dictionary_set(thread: &mut Thread) -> Something {
    let dicto = thread.stack_get_this();
    let key = thread.stack_get_variable(0);
    let value = thread.stack_get_variable(1);
    unsafe { dictionary_set(thread, dicto, key, value) };
    NOTHINGNESS
}

fn bridge_dictionary_get(thread: &mut Thread) -> Something {
    let key = thread.stack_get_variable(0);
    unsafe { dictionary_get(thread.stack_get_this(), key) }
}

fn bridge_dictionary_remove(thread: &mut Thread) -> Something {
    let key = thread.stack_get_variable(0);
    unsafe { dictionary_remove(thread.stack_get_this(), key) };
    NOTHINGNESS
}

/// Installs the defaults on a freshly allocated dictionary receiver.
pub fn bridge_dictionary_init(thread: &mut Thread) {
    dictionary_init(thread);
}

/// Resolves a dictionary method by the code point of its name.
pub fn dictionary_method_for_name(name: u32) -> Option<MethodHandler> {
    match name {
        0x1F43D => Some(bridge_dictionary_get),
        0x1F428 => Some(bridge_dictionary_remove),
        0x1F437 => Some(bridge_dictionary_set),
        _ => None,
    }
}
