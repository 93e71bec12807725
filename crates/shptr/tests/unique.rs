//! Single-owner pointers.

use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use shptr::test_util::DropLog;
use shptr::{DefaultDelete, Deleter, FnDeleter, Unique};

#[test]
fn test_new_deref_mut() {
    let mut u = Unique::new(vec![1, 2]);
    u.push(3);
    assert_eq!(Unique::get(&u).map(Vec::len), Some(3));
    if let Some(v) = Unique::get_mut(&mut u) {
        v.clear();
    }
    assert!(u.is_empty());
}

#[test]
fn test_drop_destroys_once() {
    let log = DropLog::new();
    let u = Unique::new(log.track("u"));
    drop(u);
    assert_eq!(log.drops_of("u"), 1);
}

#[test]
fn test_move_transfers_ownership() {
    let log = DropLog::new();
    let mut a = Unique::new(log.track("m"));
    let b = std::mem::take(&mut a);
    assert!(Unique::is_null(&a));
    drop(a);
    assert_eq!(log.drops_of("m"), 0);
    drop(b);
    assert_eq!(log.drops_of("m"), 1);
}

#[test]
fn test_reset_and_into_box() {
    let log = DropLog::new();
    let mut u = Unique::new(log.track("first"));
    Unique::reset(&mut u);
    assert_eq!(log.drops_of("first"), 1);
    assert!(Unique::into_box(u).is_none());

    let u = Unique::new(log.track("second"));
    let boxed = Unique::into_box(u).unwrap();
    assert_eq!(log.drops_of("second"), 0);
    assert_eq!(boxed.name(), "second");
}

#[test]
fn test_slice_indexing() {
    let u: Unique<[u8]> = Unique::from_box(vec![4, 5, 6].into_boxed_slice());
    assert_eq!(u[1], 5);
    assert_eq!(u.len(), 3);
}

#[test]
fn test_trait_object() {
    let u: Unique<dyn Fn(i32) -> i32> = Unique::from_box(Box::new(|x: i32| x * 2));
    assert_eq!((*u)(21), 42);
}

struct CountingDelete {
    deleted: Rc<Cell<usize>>,
}

impl Deleter<u64> for CountingDelete {
    unsafe fn delete(&mut self, ptr: NonNull<u64>) {
        self.deleted.set(self.deleted.get() + 1);
        // SAFETY: Only boxed pointers are handed to this deleter.
        unsafe { DefaultDelete.delete(ptr) };
    }
}

#[test]
fn test_custom_deleter_state() {
    let deleted = Rc::new(Cell::new(0));
    let mut u = Unique::with_deleter(
        Box::new(9_u64),
        CountingDelete {
            deleted: Rc::clone(&deleted),
        },
    );
    assert_eq!(Rc::strong_count(&Unique::deleter(&u).deleted), 2);

    // SAFETY: Freshly boxed.
    unsafe { Unique::reset_raw(&mut u, Box::into_raw(Box::new(10))) };
    assert_eq!(deleted.get(), 1);
    assert_eq!(*u, 10);

    Unique::deleter_mut(&mut u).deleted = Rc::new(Cell::new(100));
    drop(u);
    assert_eq!(deleted.get(), 1);
}

#[test]
fn test_release_skips_deleter() {
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    let mut u = Unique::with_deleter(
        Box::new(1_i32),
        FnDeleter(move |p: NonNull<i32>| {
            seen.set(seen.get() + 1);
            // SAFETY: Pointer produced by `Box::into_raw`.
            drop(unsafe { Box::from_raw(p.as_ptr()) });
        }),
    );

    let raw = Unique::release(&mut u).unwrap();
    drop(u);
    assert_eq!(calls.get(), 0);
    // SAFETY: Released from a boxed handle.
    drop(unsafe { Box::from_raw(raw.as_ptr()) });
}

#[test]
fn test_null_from_raw() {
    // SAFETY: Null is accepted.
    let u: Unique<String> = unsafe { Unique::from_raw(std::ptr::null_mut()) };
    assert!(Unique::is_null(&u));
    assert_eq!(format!("{u:?}"), "Unique(<null>)");
}
