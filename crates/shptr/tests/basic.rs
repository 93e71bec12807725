//! Construction, copying and destruction of `Shared` handles.

use shptr::test_util::DropLog;
use shptr::{BlockKind, Shared};

#[test]
fn test_new_and_deref() {
    let x = Shared::new(String::from("hello"));
    assert_eq!(&*x, "hello");
    assert_eq!(x.len(), 5);
    assert_eq!(Shared::use_count(&x), 1);
}

#[test]
fn test_clone_shares_block() {
    let x = Shared::new(42);
    let y = Shared::clone(&x);
    assert!(Shared::ptr_eq(&x, &y));
    assert!(Shared::shares_owner(&x, &y));
    assert_eq!(Shared::use_count(&x), 2);
    assert_eq!(Shared::use_count(&y), 2);

    drop(y);
    assert_eq!(Shared::use_count(&x), 1);
}

#[test]
fn test_new_with_builds_lazily() {
    let x = Shared::new_with(|| vec![1, 2, 3]);
    assert_eq!(x.iter().sum::<i32>(), 6);
    assert_eq!(Shared::block_kind(&x), Some(BlockKind::Embedded));
}

#[test]
fn test_from_box_unsized() {
    let slice: Shared<[u32]> = Shared::from_box(vec![1, 2, 3].into_boxed_slice());
    assert_eq!(slice.len(), 3);
    assert_eq!(slice[2], 3);

    let text: Shared<str> = Shared::from(Box::<str>::from("boxed str"));
    assert_eq!(&*text, "boxed str");
    assert_eq!(Shared::block_kind(&text), Some(BlockKind::Separate));
}

#[test]
fn test_from_raw_takes_ownership() {
    let log = DropLog::new();
    let raw = Box::into_raw(Box::new(log.track("raw")));

    // SAFETY: `raw` comes from `Box::into_raw` and is not used again.
    let s = unsafe { Shared::from_raw(raw) };
    assert_eq!(Shared::use_count(&s), 1);
    drop(s);
    assert_eq!(log.drops_of("raw"), 1);
}

#[test]
fn test_copy_then_destroy_both() {
    // Copy A to B, then destroy A and B in turn.
    let log = DropLog::new();
    let a = Shared::new(log.track("x"));
    let b = Shared::clone(&a);
    assert_eq!(Shared::use_count(&b), 2);

    drop(a);
    assert_eq!(Shared::use_count(&b), 1);
    assert_eq!(log.drops_of("x"), 0);

    let before = shptr::metrics::snapshot().blocks_freed;
    drop(b);
    assert_eq!(log.drops_of("x"), 1);
    assert_eq!(shptr::metrics::snapshot().blocks_freed, before + 1);
}

#[test]
fn test_take_is_a_move() {
    let mut a = Shared::new(1);
    let b = Shared::take(&mut a);
    assert!(Shared::is_null(&a));
    assert_eq!(Shared::use_count(&a), 0);
    assert_eq!(Shared::use_count(&b), 1);
}

#[test]
fn test_reset_releases() {
    let log = DropLog::new();
    let mut a = Shared::new(log.track("r"));
    let b = Shared::clone(&a);

    Shared::reset(&mut a);
    assert!(Shared::is_null(&a));
    assert_eq!(log.drops_of("r"), 0);
    assert_eq!(Shared::use_count(&b), 1);

    drop(b);
    assert_eq!(log.drops_of("r"), 1);
}

#[test]
fn test_equality_and_hash_follow_address() {
    use std::collections::HashSet;

    let a = Shared::new(7);
    let b = Shared::new(7);
    let a2 = Shared::clone(&a);

    assert_eq!(a, a2);
    assert_ne!(a, b);

    let set: HashSet<_> = [Shared::clone(&a), a2, Shared::clone(&b)].into_iter().collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn test_formatting() {
    let a = Shared::new(12);
    assert_eq!(format!("{a}"), "12");
    assert_eq!(format!("{a:?}"), "Shared(12)");
    assert!(format!("{a:p}").starts_with("0x"));
    assert_eq!(format!("{}", Shared::<i32>::null()), "<empty>");
}

#[test]
fn test_many_handles() {
    let values: Vec<Shared<usize>> = (0..100).map(Shared::new).collect();
    for (i, s) in values.iter().enumerate() {
        assert_eq!(**s, i);
    }
    let copies: Vec<_> = values.iter().map(Shared::clone).collect();
    assert!(copies.iter().all(|c| Shared::use_count(c) == 2));
}
