//! Control block lifecycle tracing.
//!
//! When the `tracing` feature is enabled, this module emits structured
//! events for block allocation, object destruction, block deallocation and
//! failed promotions. Without the feature every hook is an empty inline
//! function.

#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::block::BlockKind;

    /// Stable identifier for a control block.
    ///
    /// Correlates every event emitted for one block over its lifetime. It is
    /// a process-wide counter starting at 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockId(pub u64);

    /// Global counter for generating unique block IDs.
    static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next unique block ID.
    pub fn next_block_id() -> BlockId {
        BlockId(NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Log the allocation of a control block.
    pub fn log_block_allocated(id: BlockId, kind: BlockKind, ty: &'static str) {
        ::tracing::trace!(block_id = id.0, kind = ?kind, ty, "block_allocated");
    }

    /// Log the destruction of the object owned by a block.
    pub fn log_object_destroyed(id: BlockId, weak: usize) {
        ::tracing::trace!(block_id = id.0, weak, "object_destroyed");
    }

    /// Log the deallocation of a control block.
    pub fn log_block_freed(id: BlockId) {
        ::tracing::trace!(block_id = id.0, "block_freed");
    }

    /// Log a promotion attempt on an expired or empty weak handle.
    pub fn log_promotion_failed(id: Option<BlockId>) {
        ::tracing::debug!(block_id = id.map(|id| id.0), "promotion_failed");
    }
}

#[cfg(not(feature = "tracing"))]
pub mod internal {
    use crate::block::BlockKind;

    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockId(pub u64);

    /// Stub function when tracing is disabled.
    #[inline]
    pub const fn next_block_id() -> BlockId {
        BlockId(0)
    }

    #[inline]
    pub const fn log_block_allocated(_id: BlockId, _kind: BlockKind, _ty: &'static str) {}

    #[inline]
    pub const fn log_object_destroyed(_id: BlockId, _weak: usize) {}

    #[inline]
    pub const fn log_block_freed(_id: BlockId) {}

    #[inline]
    pub const fn log_promotion_failed(_id: Option<BlockId>) {}
}

pub use internal::BlockId;
