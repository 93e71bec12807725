//! Integration tests for the per-thread pointer metrics.

use shptr::metrics::{self, PtrMetrics};
use shptr::{Shared, Unique};

#[test]
fn test_reset_zeroes_counters() {
    let _s = Shared::new(1);
    metrics::reset();
    assert_eq!(metrics::snapshot(), PtrMetrics::new());
}

#[test]
fn test_blocks_are_counted_by_kind() {
    metrics::reset();
    let a = Shared::new(1_u8);
    let b = Shared::from_box(Box::new(2_u8));
    let c = Shared::clone(&a);

    let m = metrics::snapshot();
    assert_eq!(m.embedded_blocks_allocated, 1);
    assert_eq!(m.separate_blocks_allocated, 1);
    assert_eq!(m.live_blocks(), 2);
    assert_eq!(metrics::live_blocks(), 2);

    drop((a, b, c));
    let m = metrics::snapshot();
    assert_eq!(m.objects_destroyed, 2);
    assert_eq!(m.blocks_freed, 2);
    assert_eq!(m.live_blocks(), 0);
}

#[test]
fn test_expired_blocks_held_by_weak() {
    metrics::reset();
    let s = Shared::new(String::from("expire"));
    let w = Shared::downgrade(&s);
    drop(s);

    let m = metrics::snapshot();
    assert_eq!(m.expired_blocks(), 1);
    assert_eq!(m.live_blocks(), 1);

    drop(w);
    assert_eq!(metrics::snapshot().expired_blocks(), 0);
}

#[test]
fn test_unique_is_not_counted() {
    metrics::reset();
    let u = Unique::new(5);
    drop(u);
    assert_eq!(metrics::snapshot().blocks_allocated(), 0);
}

#[test]
fn test_aliasing_allocates_nothing() {
    let owner = Shared::new((1_u32, 2_u32));
    metrics::reset();
    let first = Shared::alias(&owner, |p| &p.0);
    drop(owner);
    assert_eq!(metrics::snapshot().blocks_allocated(), 0);
    assert_eq!(metrics::snapshot().objects_destroyed, 0);
    drop(first);
    assert_eq!(metrics::snapshot().objects_destroyed, 1);
}
