//! Control blocks: the bookkeeping shared by every `Shared` and `Weak`
//! handle to one object.
//!
//! A block holds the strong and weak counts and knows how to destroy the
//! object it was created for. Two layouts implement [`ControlBlock`]:
//!
//! - [`SeparateBlock`] wraps an object that was boxed elsewhere and frees it
//!   with `Box::from_raw`.
//! - [`EmbeddedBlock`] stores the object inline, so object and counts share
//!   one allocation. Destroying the object drops it in place; the storage
//!   lives on until the block itself is freed.
//!
//! Handles refer to blocks through `NonNull<dyn ControlBlock>` and never own
//! them alone. [`release_strong`] and [`release_weak`] implement the
//! lifecycle `Live -> ObjectDestroyed -> Freed`.

use std::any::type_name;
use std::cell::{Cell, UnsafeCell};
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use crate::adopt::{adopt_into, Adopt};
use crate::metrics;
use crate::tracing::internal as trace;
use crate::tracing::BlockId;

// ============================================================================
// Header - counts shared by both layouts
// ============================================================================

/// Allocation strategy of a control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// The object was allocated on its own and is owned through a pointer.
    Separate,
    /// The object lives inside the control block allocation.
    Embedded,
}

/// Strong and weak counts of one control block.
#[derive(Debug)]
pub(crate) struct Header {
    strong: Cell<usize>,
    weak: Cell<usize>,
    id: BlockId,
    self_referential: bool,
}

impl Header {
    /// A header for a block that starts out with one strong owner.
    fn new(kind: BlockKind, ty: &'static str, self_referential: bool) -> Self {
        let id = trace::next_block_id();
        trace::log_block_allocated(id, kind, ty);
        metrics::record_block_allocated(kind);
        Self {
            strong: Cell::new(1),
            weak: Cell::new(0),
            id,
            self_referential,
        }
    }

    #[inline]
    pub(crate) fn strong(&self) -> usize {
        self.strong.get()
    }

    #[inline]
    pub(crate) fn weak(&self) -> usize {
        self.weak.get()
    }

    #[inline]
    pub(crate) fn inc_strong(&self) {
        self.strong.set(self.strong.get() + 1);
    }

    /// Decrement the strong count and return the new value.
    #[inline]
    pub(crate) fn dec_strong(&self) -> usize {
        let count = self.strong.get();
        debug_assert!(count > 0, "strong count underflow");
        self.strong.set(count - 1);
        count - 1
    }

    #[inline]
    pub(crate) fn inc_weak(&self) {
        self.weak.set(self.weak.get() + 1);
    }

    /// Decrement the weak count and return the new value.
    #[inline]
    pub(crate) fn dec_weak(&self) -> usize {
        let count = self.weak.get();
        debug_assert!(count > 0, "weak count underflow");
        self.weak.set(count - 1);
        count - 1
    }

    #[inline]
    pub(crate) const fn id(&self) -> BlockId {
        self.id
    }

    /// Whether the object needs [`ControlBlock::readopt`] at all. Fixed when
    /// the block is allocated.
    #[inline]
    pub(crate) const fn self_referential(&self) -> bool {
        self.self_referential
    }
}

// ============================================================================
// ControlBlock - the polymorphic interface
// ============================================================================

/// Type-erased view of a control block.
pub(crate) trait ControlBlock {
    /// The counts of this block.
    fn header(&self) -> &Header;

    /// Which layout this block uses.
    fn kind(&self) -> BlockKind;

    /// Destroy the owned object.
    ///
    /// # Safety
    ///
    /// Must be called exactly once, right after the strong count dropped to
    /// zero. The object is never accessed again afterwards.
    unsafe fn destroy_object(&self);

    /// Install this block's ownership into the object's self reference.
    ///
    /// No-op for objects without the self-reference capability.
    ///
    /// # Safety
    ///
    /// `this` must point to this very block and the strong count must be at
    /// least one.
    unsafe fn readopt(&self, this: NonNull<dyn ControlBlock>);
}

// ============================================================================
// SeparateBlock - wraps an externally boxed object
// ============================================================================

/// Control block for an object allocated by `Box` outside the block.
pub(crate) struct SeparateBlock<T: ?Sized> {
    header: Header,
    object: NonNull<T>,
}

impl<T: ?Sized + Adopt + 'static> SeparateBlock<T> {
    /// Allocate a block taking ownership of `object`.
    ///
    /// # Safety
    ///
    /// `object` must come from `Box::into_raw` and must not be owned by
    /// anything else.
    pub(crate) unsafe fn allocate(object: NonNull<T>) -> NonNull<dyn ControlBlock> {
        let block: Box<dyn ControlBlock> = Box::new(Self {
            header: Header::new(BlockKind::Separate, type_name::<T>(), T::SELF_REFERENTIAL),
            object,
        });
        NonNull::from(Box::leak(block))
    }
}

impl<T: ?Sized + Adopt + 'static> ControlBlock for SeparateBlock<T> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Separate
    }

    unsafe fn destroy_object(&self) {
        // SAFETY: The pointer came from `Box::into_raw` and the caller
        // guarantees this runs once.
        drop(unsafe { Box::from_raw(self.object.as_ptr()) });
    }

    unsafe fn readopt(&self, this: NonNull<dyn ControlBlock>) {
        if T::SELF_REFERENTIAL {
            // SAFETY: Forwarded from the caller; the object is alive.
            unsafe { adopt_into(this, self.object) };
        }
    }
}

// ============================================================================
// EmbeddedBlock - object stored inline
// ============================================================================

/// Control block holding its object in inline storage.
pub(crate) struct EmbeddedBlock<T> {
    header: Header,
    storage: UnsafeCell<MaybeUninit<T>>,
}

impl<T: Adopt + 'static> EmbeddedBlock<T> {
    /// Allocate a block and move `value` into its storage.
    ///
    /// Returns the block and the address of the value inside it.
    pub(crate) fn allocate(value: T) -> (NonNull<dyn ControlBlock>, NonNull<T>) {
        let raw = Box::into_raw(Box::new(Self {
            header: Header::new(BlockKind::Embedded, type_name::<T>(), T::SELF_REFERENTIAL),
            storage: UnsafeCell::new(MaybeUninit::new(value)),
        }));
        // SAFETY: `Box::into_raw` never returns null.
        let block = unsafe { NonNull::new_unchecked(raw) };
        let object = Self::object_ptr(block);
        let block: NonNull<dyn ControlBlock> = block;
        (block, object)
    }
}

impl<T> EmbeddedBlock<T> {
    /// Address of the object inside the block's storage.
    pub(crate) fn object_ptr(this: NonNull<Self>) -> NonNull<T> {
        // SAFETY: `this` points to a live block; projecting to the storage
        // field reads nothing.
        unsafe {
            let storage = std::ptr::addr_of_mut!((*this.as_ptr()).storage);
            NonNull::new_unchecked(UnsafeCell::raw_get(storage).cast::<T>())
        }
    }
}

impl<T: Adopt + 'static> ControlBlock for EmbeddedBlock<T> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Embedded
    }

    unsafe fn destroy_object(&self) {
        // SAFETY: The storage was initialised by `allocate` and the caller
        // guarantees this runs once. `MaybeUninit` will not drop it again.
        unsafe { std::ptr::drop_in_place(self.storage.get().cast::<T>()) };
    }

    unsafe fn readopt(&self, this: NonNull<dyn ControlBlock>) {
        if T::SELF_REFERENTIAL {
            // SAFETY: `UnsafeCell::get` is never null; the object is alive.
            unsafe {
                let object = NonNull::new_unchecked(self.storage.get().cast::<T>());
                adopt_into(this, object);
            }
        }
    }
}

// ============================================================================
// Release protocol
// ============================================================================

/// Release one strong reference.
///
/// On the 1 -> 0 transition the object is destroyed; the block is freed as
/// well if no weak reference remains.
///
/// # Safety
///
/// The caller must own the strong reference being released.
pub(crate) unsafe fn release_strong(block: NonNull<dyn ControlBlock>) {
    {
        // SAFETY: A strong reference keeps the block allocated.
        let b = unsafe { block.as_ref() };
        let header = b.header();
        if header.dec_strong() != 0 {
            return;
        }

        // The object may hold a weak reference to this block (its self
        // reference); keep the block pinned until the destructor returns.
        header.inc_weak();
        trace::log_object_destroyed(header.id(), header.weak() - 1);
        // SAFETY: The strong count just reached zero.
        unsafe { b.destroy_object() };
        metrics::record_object_destroyed();
    }

    // SAFETY: Releases the pin taken above.
    unsafe { release_weak(block) };
}

/// Release one weak reference, freeing the block once both counts are zero.
///
/// # Safety
///
/// The caller must own the weak reference being released.
pub(crate) unsafe fn release_weak(block: NonNull<dyn ControlBlock>) {
    let (free, id) = {
        // SAFETY: A weak reference keeps the block allocated.
        let header = unsafe { block.as_ref() }.header();
        (header.dec_weak() == 0 && header.strong() == 0, header.id())
    };

    if free {
        trace::log_block_freed(id);
        metrics::record_block_freed();
        // SAFETY: Every block is created by `Box` and no reference remains.
        drop(unsafe { Box::from_raw(block.as_ptr()) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::DropLog;

    #[test]
    fn test_header_counts() {
        let header = Header::new(BlockKind::Separate, "u8", false);
        assert_eq!(header.strong(), 1);
        assert_eq!(header.weak(), 0);

        header.inc_strong();
        header.inc_weak();
        header.inc_weak();
        assert_eq!(header.dec_strong(), 1);
        assert_eq!(header.dec_weak(), 1);
        assert_eq!(header.strong(), 1);
        assert_eq!(header.weak(), 1);
    }

    #[test]
    fn test_header_records_self_reference_capability() {
        struct Node {
            this: crate::WeakThis<Node>,
        }

        impl Adopt for Node {
            const SELF_REFERENTIAL: bool = true;

            fn adopt(&self, this: &crate::Weak<Self>) {
                self.this.install(this);
            }
        }

        let (plain, _) = EmbeddedBlock::allocate(7_u16);
        let (node, object) = EmbeddedBlock::allocate(Node {
            this: crate::WeakThis::new(),
        });
        // SAFETY: Both blocks are live with one strong reference each.
        unsafe {
            assert!(!plain.as_ref().header().self_referential());
            assert!(node.as_ref().header().self_referential());
            assert!(!object.as_ref().this.is_installed());
            release_strong(plain);
            release_strong(node);
        }
    }

    #[test]
    fn test_embedded_object_ptr_is_inside_block() {
        let (block, object) = EmbeddedBlock::allocate(0xABCD_u32);
        let start = block.cast::<u8>().as_ptr() as usize;
        let size = std::mem::size_of::<EmbeddedBlock<u32>>();
        let addr = object.as_ptr() as usize;

        assert!(addr >= start && addr < start + size);
        // SAFETY: The block is live with one strong reference.
        unsafe {
            assert_eq!(*object.as_ref(), 0xABCD);
            assert_eq!(block.as_ref().kind(), BlockKind::Embedded);
            release_strong(block);
        }
    }

    #[test]
    fn test_release_strong_without_weak_frees_block() {
        metrics::reset();
        let log = DropLog::new();
        let (block, _) = EmbeddedBlock::allocate(log.track("x"));

        // SAFETY: We own the single strong reference.
        unsafe { release_strong(block) };

        assert_eq!(log.drops_of("x"), 1);
        let m = metrics::snapshot();
        assert_eq!(m.objects_destroyed, 1);
        assert_eq!(m.blocks_freed, 1);
    }

    #[test]
    fn test_release_strong_with_weak_keeps_block() {
        metrics::reset();
        let log = DropLog::new();
        let boxed = Box::new(log.track("y"));
        // SAFETY: Pointer freshly produced by `Box::into_raw`.
        let block = unsafe { SeparateBlock::allocate(NonNull::new_unchecked(Box::into_raw(boxed))) };

        // SAFETY: The block is live; we add and later release one weak ref.
        unsafe {
            block.as_ref().header().inc_weak();
            release_strong(block);
        }

        assert_eq!(log.drops_of("y"), 1);
        assert_eq!(metrics::snapshot().blocks_freed, 0);
        // SAFETY: The weak reference taken above is still owned.
        unsafe {
            assert_eq!(block.as_ref().header().strong(), 0);
            release_weak(block);
        }
        assert_eq!(metrics::snapshot().blocks_freed, 1);
        assert_eq!(log.drops_of("y"), 1);
    }
}
