//! Per-thread pointer statistics.
//!
//! Every control block operation that changes the lifecycle state of a block
//! is counted here. Handles never cross threads, so the counters are plain
//! thread-local cells and a snapshot only reflects the calling thread.

use std::cell::Cell;

use crate::block::BlockKind;

/// Lifecycle counters for control blocks created on the current thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PtrMetrics {
    /// Separate blocks allocated (`Shared::from_box` and friends).
    pub separate_blocks_allocated: usize,
    /// Embedded blocks allocated (`Shared::new`).
    pub embedded_blocks_allocated: usize,
    /// Control blocks deallocated.
    pub blocks_freed: usize,
    /// Owned objects destroyed because their strong count reached zero.
    pub objects_destroyed: usize,
    /// Successful weak to strong promotions.
    pub promotions: usize,
    /// Promotions refused because the object had expired.
    pub failed_promotions: usize,
}

impl PtrMetrics {
    /// Create a new `PtrMetrics` with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            separate_blocks_allocated: 0,
            embedded_blocks_allocated: 0,
            blocks_freed: 0,
            objects_destroyed: 0,
            promotions: 0,
            failed_promotions: 0,
        }
    }

    /// Total control blocks allocated, of either kind.
    #[must_use]
    pub const fn blocks_allocated(&self) -> usize {
        self.separate_blocks_allocated + self.embedded_blocks_allocated
    }

    /// Control blocks allocated but not yet freed.
    #[must_use]
    pub const fn live_blocks(&self) -> usize {
        self.blocks_allocated().saturating_sub(self.blocks_freed)
    }

    /// Blocks whose object is gone but which are still held by weak handles.
    #[must_use]
    pub const fn expired_blocks(&self) -> usize {
        self.objects_destroyed.saturating_sub(self.blocks_freed)
    }
}

thread_local! {
    static METRICS: Cell<PtrMetrics> = const { Cell::new(PtrMetrics::new()) };
}

/// Snapshot of the current thread's counters.
#[must_use]
pub fn snapshot() -> PtrMetrics {
    METRICS.try_with(Cell::get).unwrap_or_default()
}

/// Reset the current thread's counters to zero.
pub fn reset() {
    let _ = METRICS.try_with(|m| m.set(PtrMetrics::new()));
}

/// Number of control blocks allocated and not yet freed on this thread.
#[must_use]
pub fn live_blocks() -> usize {
    snapshot().live_blocks()
}

fn update(f: impl FnOnce(&mut PtrMetrics)) {
    // Blocks released from thread-local destructors may outlive the slot.
    let _ = METRICS.try_with(|cell| {
        let mut metrics = cell.get();
        f(&mut metrics);
        cell.set(metrics);
    });
}

pub(crate) fn record_block_allocated(kind: BlockKind) {
    update(|m| match kind {
        BlockKind::Separate => m.separate_blocks_allocated += 1,
        BlockKind::Embedded => m.embedded_blocks_allocated += 1,
    });
}

pub(crate) fn record_block_freed() {
    update(|m| m.blocks_freed += 1);
}

pub(crate) fn record_object_destroyed() {
    update(|m| m.objects_destroyed += 1);
}

pub(crate) fn record_promotion(succeeded: bool) {
    update(|m| {
        if succeeded {
            m.promotions += 1;
        } else {
            m.failed_promotions += 1;
        }
    });
}
