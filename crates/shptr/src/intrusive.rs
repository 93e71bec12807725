//! Reference counting with the count stored inside the object.
//!
//! A type opts in by embedding a [`RefCount`] and implementing
//! [`RefCounted`]. Because the count travels with the object, a raw pointer
//! can be turned back into an [`Intrusive`] handle at any time.
//!
//! ```ignore
//! use shptr::{Intrusive, RefCount, RefCounted};
//!
//! struct Texture {
//!     refs: RefCount,
//!     id: u32,
//! }
//!
//! // SAFETY: `ref_count` always returns the `refs` field.
//! unsafe impl RefCounted for Texture {
//!     fn ref_count(&self) -> &RefCount {
//!         &self.refs
//!     }
//! }
//!
//! let a = Intrusive::new(Texture { refs: RefCount::new(), id: 3 });
//! let b = Intrusive::clone(&a);
//! assert_eq!(Intrusive::use_count(&b), 2);
//! ```

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

/// The embedded strong count.
#[derive(Default)]
pub struct RefCount(Cell<usize>);

impl RefCount {
    /// A count of zero. The first handle raises it to one.
    #[must_use]
    pub const fn new() -> Self {
        Self(Cell::new(0))
    }

    /// The current number of handles.
    #[must_use]
    pub fn get(&self) -> usize {
        self.0.get()
    }

    fn inc(&self) {
        self.0.set(self.0.get() + 1);
    }

    fn dec(&self) -> usize {
        let count = self.0.get();
        debug_assert!(count > 0, "intrusive count underflow");
        self.0.set(count - 1);
        count - 1
    }
}

impl fmt::Debug for RefCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefCount").field(&self.get()).finish()
    }
}

/// A type carrying its own reference count.
///
/// # Safety
///
/// `ref_count` must return the same [`RefCount`] stored inside `self` on
/// every call, and nothing but [`Intrusive`] may change it. Handing out a
/// different counter lets one handle destroy the object while another still
/// points at it.
///
/// An implementation without `unsafe` is rejected:
///
/// ```compile_fail,E0200
/// use shptr::{RefCount, RefCounted};
///
/// struct Flip {
///     a: RefCount,
///     b: RefCount,
/// }
///
/// impl RefCounted for Flip {
///     fn ref_count(&self) -> &RefCount {
///         if self.a.get() > self.b.get() { &self.b } else { &self.a }
///     }
/// }
/// ```
pub unsafe trait RefCounted {
    /// The embedded count.
    fn ref_count(&self) -> &RefCount;

    /// Destroy an object whose last handle went away.
    ///
    /// The default frees a `Box` allocation.
    ///
    /// # Safety
    ///
    /// `this` is the object's address, the count just reached zero and no
    /// handle will touch the object again.
    unsafe fn destroy(this: NonNull<Self>)
    where
        Self: Sized,
    {
        // SAFETY: Forwarded from the caller; handles only own boxed objects
        // unless `destroy` is overridden.
        drop(unsafe { Box::from_raw(this.as_ptr()) });
    }
}

/// A nullable strong handle to a [`RefCounted`] object.
pub struct Intrusive<T: RefCounted> {
    ptr: Option<NonNull<T>>,
    _marker: PhantomData<T>,
}

impl<T: RefCounted> Intrusive<T> {
    /// Box `value` and own it with a count of one.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Own a boxed object, incrementing its embedded count.
    #[must_use]
    pub fn from_box(boxed: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(boxed));
        // SAFETY: Freshly leaked and live.
        unsafe { Self::acquire(ptr) }
    }

    /// Add a handle to the object at `ptr`. Null yields an empty handle.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a live object that [`RefCounted::destroy`]
    /// can free once its count reaches zero.
    #[must_use]
    pub unsafe fn from_raw(ptr: *const T) -> Self {
        match NonNull::new(ptr.cast_mut()) {
            // SAFETY: Forwarded from the caller.
            Some(ptr) => unsafe { Self::acquire(ptr) },
            None => Self::null(),
        }
    }

    /// An empty handle.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            ptr: None,
            _marker: PhantomData,
        }
    }

    unsafe fn acquire(ptr: NonNull<T>) -> Self {
        // SAFETY: The caller guarantees the object is live.
        unsafe { ptr.as_ref() }.ref_count().inc();
        Self {
            ptr: Some(ptr),
            _marker: PhantomData,
        }
    }

    /// Drop this handle's reference, leaving it empty.
    pub fn reset(this: &mut Self) {
        drop(std::mem::take(this));
    }

    /// Drop this handle's reference, then own `boxed`.
    pub fn reset_with(this: &mut Self, boxed: Box<T>) {
        Self::reset(this);
        *this = Self::from_box(boxed);
    }

    /// Exchange the objects of two handles.
    pub fn swap(a: &mut Self, b: &mut Self) {
        std::mem::swap(&mut a.ptr, &mut b.ptr);
    }

    /// The object's count, or 0 for an empty handle.
    #[must_use]
    pub fn use_count(this: &Self) -> usize {
        Self::get(this).map_or(0, |object| object.ref_count().get())
    }

    /// The object, if any.
    #[must_use]
    pub fn get(this: &Self) -> Option<&T> {
        // SAFETY: The handle's reference keeps the object alive.
        this.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// The object's address, without touching the count.
    #[must_use]
    pub const fn as_ptr(this: &Self) -> Option<NonNull<T>> {
        this.ptr
    }

    /// Whether the handle is empty.
    #[must_use]
    pub const fn is_null(this: &Self) -> bool {
        this.ptr.is_none()
    }

    /// Whether both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.ptr == b.ptr
    }
}

impl<T: RefCounted> Clone for Intrusive<T> {
    fn clone(&self) -> Self {
        match self.ptr {
            // SAFETY: `self` keeps the object alive.
            Some(ptr) => unsafe { Self::acquire(ptr) },
            None => Self::null(),
        }
    }
}

impl<T: RefCounted> Drop for Intrusive<T> {
    fn drop(&mut self) {
        let Some(ptr) = self.ptr.take() else {
            return;
        };
        // SAFETY: This handle held a reference.
        let remaining = unsafe { ptr.as_ref() }.ref_count().dec();
        if remaining == 0 {
            // SAFETY: That was the last reference.
            unsafe { T::destroy(ptr) };
        }
    }
}

impl<T: RefCounted> Deref for Intrusive<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match Self::get(self) {
            Some(object) => object,
            None => panic!("dereferenced an empty Intrusive handle"),
        }
    }
}

impl<T: RefCounted> Default for Intrusive<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: RefCounted> PartialEq for Intrusive<T> {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T: RefCounted> Eq for Intrusive<T> {}

impl<T: RefCounted + fmt::Debug> fmt::Debug for Intrusive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::get(self) {
            Some(object) => f.debug_tuple("Intrusive").field(object).finish(),
            None => write!(f, "Intrusive(<empty>)"),
        }
    }
}
