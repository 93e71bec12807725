//! Single-owner pointer with a pluggable deleter.
//!
//! [`Unique`] is the no-counting peer of [`Shared`](crate::Shared): exactly
//! one handle owns the object, ownership moves with the handle, and a
//! [`Deleter`] decides how the object is destroyed. Zero-sized deleters add
//! no space to the handle.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// How a [`Unique`] destroys the object it owns.
pub trait Deleter<T: ?Sized> {
    /// Destroy the object at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be the object owned by the calling handle. It is never
    /// used again afterwards.
    unsafe fn delete(&mut self, ptr: NonNull<T>);
}

/// Frees objects allocated with [`Box`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultDelete;

impl<T: ?Sized> Deleter<T> for DefaultDelete {
    unsafe fn delete(&mut self, ptr: NonNull<T>) {
        // SAFETY: Handles using `DefaultDelete` only own boxed objects.
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

/// Adapts a closure into a [`Deleter`].
///
/// The closure receives ownership of the pointer and is responsible for
/// releasing whatever it refers to.
#[derive(Clone, Copy, Default)]
pub struct FnDeleter<F>(pub F);

impl<T: ?Sized, F: FnMut(NonNull<T>)> Deleter<T> for FnDeleter<F> {
    unsafe fn delete(&mut self, ptr: NonNull<T>) {
        (self.0)(ptr);
    }
}

impl<F> fmt::Debug for FnDeleter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnDeleter(..)")
    }
}

/// An owning pointer that may be null.
///
/// Like [`Box`], but nullable and generic over its [`Deleter`]. Accessors are
/// associated functions so they never shadow methods of `T`.
///
/// # Examples
///
/// ```ignore
/// use shptr::Unique;
///
/// let mut a = Unique::new(5);
/// *a += 1;
/// let b = Unique::release(&mut a);
/// assert!(Unique::is_null(&a));
/// assert!(b.is_some());
/// ```
pub struct Unique<T: ?Sized, D: Deleter<T> = DefaultDelete> {
    ptr: Option<NonNull<T>>,
    deleter: D,
    _marker: PhantomData<T>,
}

// SAFETY: `Unique` owns its object like `Box` does.
unsafe impl<T: ?Sized + Send, D: Deleter<T> + Send> Send for Unique<T, D> {}
// SAFETY: Shared access only hands out `&T` and `&D`.
unsafe impl<T: ?Sized + Sync, D: Deleter<T> + Sync> Sync for Unique<T, D> {}

impl<T> Unique<T> {
    /// Box `value` and own it.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }
}

impl<T: ?Sized> Unique<T> {
    /// Own an already boxed object.
    #[must_use]
    pub fn from_box(boxed: Box<T>) -> Self {
        Self::with_deleter(boxed, DefaultDelete)
    }

    /// Give the object back as a `Box`, or `None` if the handle is null.
    #[must_use]
    pub fn into_box(mut this: Self) -> Option<Box<T>> {
        // SAFETY: Objects owned through `DefaultDelete` are boxed.
        Self::release(&mut this).map(|ptr| unsafe { Box::from_raw(ptr.as_ptr()) })
    }
}

impl<T: ?Sized, D: Deleter<T> + Default> Unique<T, D> {
    /// A null handle.
    #[must_use]
    pub fn null() -> Self {
        Self {
            ptr: None,
            deleter: D::default(),
            _marker: PhantomData,
        }
    }

    /// Own a raw pointer. Null yields a null handle.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or an object that `D::default()` can delete, and
    /// nothing else may own it.
    #[must_use]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        // SAFETY: Forwarded from the caller.
        unsafe { Self::from_raw_with_deleter(ptr, D::default()) }
    }
}

impl<T: ?Sized, D: Deleter<T>> Unique<T, D> {
    /// Own a boxed object that `deleter` will destroy.
    ///
    /// The deleter receives the pointer produced by [`Box::into_raw`].
    #[must_use]
    pub fn with_deleter(boxed: Box<T>, deleter: D) -> Self {
        Self {
            ptr: Some(NonNull::from(Box::leak(boxed))),
            deleter,
            _marker: PhantomData,
        }
    }

    /// Own a raw pointer that `deleter` will destroy. Null yields a null
    /// handle carrying `deleter`.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or valid for reads and writes until `deleter`
    /// destroys it, and nothing else may own it.
    #[must_use]
    pub unsafe fn from_raw_with_deleter(ptr: *mut T, deleter: D) -> Self {
        Self {
            ptr: NonNull::new(ptr),
            deleter,
            _marker: PhantomData,
        }
    }

    /// Give up ownership without destroying the object.
    ///
    /// The handle becomes null; the caller is now responsible for the object.
    #[must_use = "the released object leaks unless it is deleted"]
    pub fn release(this: &mut Self) -> Option<NonNull<T>> {
        this.ptr.take()
    }

    /// Destroy the owned object, leaving the handle null.
    pub fn reset(this: &mut Self) {
        if let Some(old) = this.ptr.take() {
            // SAFETY: We owned `old` and just gave it up.
            unsafe { this.deleter.delete(old) };
        }
    }

    /// Take ownership of `ptr`, then destroy the previously owned object.
    ///
    /// # Safety
    ///
    /// Same contract as [`Unique::from_raw_with_deleter`] for this handle's
    /// deleter.
    pub unsafe fn reset_raw(this: &mut Self, ptr: *mut T) {
        let old = std::mem::replace(&mut this.ptr, NonNull::new(ptr));
        if let Some(old) = old {
            // SAFETY: We owned `old` and just gave it up.
            unsafe { this.deleter.delete(old) };
        }
    }

    /// Exchange objects and deleters.
    pub fn swap(a: &mut Self, b: &mut Self) {
        std::mem::swap(&mut a.ptr, &mut b.ptr);
        std::mem::swap(&mut a.deleter, &mut b.deleter);
    }

    /// The owned object, if any.
    #[must_use]
    pub fn get(this: &Self) -> Option<&T> {
        // SAFETY: The handle owns the object.
        this.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// The owned object, mutably.
    #[must_use]
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        // SAFETY: The handle owns the object and is borrowed mutably.
        this.ptr.map(|ptr| unsafe { &mut *ptr.as_ptr() })
    }

    /// The owned pointer, without giving up ownership.
    #[must_use]
    pub const fn as_ptr(this: &Self) -> Option<NonNull<T>> {
        this.ptr
    }

    /// Whether the handle owns nothing.
    #[must_use]
    pub const fn is_null(this: &Self) -> bool {
        this.ptr.is_none()
    }

    /// The deleter.
    #[must_use]
    pub const fn deleter(this: &Self) -> &D {
        &this.deleter
    }

    /// The deleter, mutably.
    pub fn deleter_mut(this: &mut Self) -> &mut D {
        &mut this.deleter
    }
}

impl<T: ?Sized, D: Deleter<T>> Drop for Unique<T, D> {
    fn drop(&mut self) {
        Self::reset(self);
    }
}

impl<T: ?Sized, D: Deleter<T>> Deref for Unique<T, D> {
    type Target = T;

    fn deref(&self) -> &T {
        match Self::get(self) {
            Some(object) => object,
            None => panic!("dereferenced a null Unique"),
        }
    }
}

impl<T: ?Sized, D: Deleter<T>> DerefMut for Unique<T, D> {
    fn deref_mut(&mut self) -> &mut T {
        match Self::get_mut(self) {
            Some(object) => object,
            None => panic!("dereferenced a null Unique"),
        }
    }
}

impl<T: ?Sized, D: Deleter<T> + Default> Default for Unique<T, D> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> From<Box<T>> for Unique<T> {
    fn from(boxed: Box<T>) -> Self {
        Self::from_box(boxed)
    }
}

impl<T: ?Sized + fmt::Debug, D: Deleter<T>> fmt::Debug for Unique<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::get(self) {
            Some(object) => f.debug_tuple("Unique").field(&object).finish(),
            None => write!(f, "Unique(<null>)"),
        }
    }
}
