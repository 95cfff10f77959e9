//! Collector behaviour: rooting, forwarding, and reclamation.

use glyph_runtime::string::{string_bytes, string_new};
use glyph_runtime::thread::Thread;
use glyph_runtime::value::Something;

#[test]
fn rooted_objects_survive_and_move() {
    let mut thread = Thread::new();
    let s = string_new(&mut thread, "persistent");
    thread.stack_push(s, 0);

    let before = thread.stack_get_this();
    thread.collect();
    let after = thread.stack_get_this();

    assert_ne!(before, after, "a collection moves live objects");
    assert_eq!(unsafe { string_bytes(after) }, b"persistent");
}

#[test]
fn both_roots_of_one_object_forward_to_the_same_copy() {
    let mut thread = Thread::new();
    let s = string_new(&mut thread, "shared");
    thread.stack_push(s, 1);
    thread.stack_set_variable(0, Something::Object(s));

    thread.collect();

    let this = thread.stack_get_this();
    let variable = thread.stack_get_variable(0).object();
    assert_eq!(this, variable, "forwarding is idempotent per object");
    assert_eq!(unsafe { string_bytes(this) }, b"shared");
}

#[test]
fn unreachable_objects_are_reclaimed() {
    let mut thread = Thread::new();
    let keep = string_new(&mut thread, "keep");
    thread.stack_push(keep, 0);
    for i in 0..100 {
        let _ = string_new(&mut thread, &format!("garbage-{}", i));
    }
    let used_before = thread.heap_used();

    thread.collect();

    assert!(
        thread.heap_used() < used_before,
        "garbage does not survive the copy"
    );
    assert_eq!(unsafe { string_bytes(thread.stack_get_this()) }, b"keep");
}

#[test]
fn allocation_pressure_triggers_collection_automatically() {
    let mut thread = Thread::with_heap_capacity(4 * 1024);
    let keep = string_new(&mut thread, "anchor");
    thread.stack_push(keep, 0);

    // Far more garbage than the semispace holds; allocation must collect
    // on its own and the rooted string must stay intact throughout.
    for i in 0..1000 {
        let _ = string_new(&mut thread, &format!("transient-{}", i));
    }

    assert_eq!(unsafe { string_bytes(thread.stack_get_this()) }, b"anchor");
}
