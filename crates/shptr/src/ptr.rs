//! Shared and weak handles.
//!
//! A [`Shared`] or [`Weak`] handle is a (control block, object pointer)
//! pair. The block decides when the object dies; the pointer decides what
//! the handle exposes. Usually both refer to the same object. Aliasing and
//! converting constructors make them diverge on purpose.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::adopt::Adopt;
use crate::block::{release_strong, release_weak, BlockKind, ControlBlock, EmbeddedBlock, SeparateBlock};
use crate::error::ExpiredError;
use crate::metrics;
use crate::tracing::internal as trace;

/// The block and the pointer a handle refers to.
struct Parts<T: ?Sized> {
    block: NonNull<dyn ControlBlock>,
    ptr: NonNull<T>,
}

impl<T: ?Sized> Clone for Parts<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Parts<T> {}

impl<T: ?Sized> Parts<T> {
    #[inline]
    fn header(&self) -> &crate::block::Header {
        // SAFETY: A handle holding these parts keeps the block allocated.
        unsafe { self.block.as_ref() }.header()
    }

    /// Re-run the object's self-reference installation against this block.
    ///
    /// Plain objects skip the dynamic call.
    #[inline]
    fn readopt(self) {
        if !self.header().self_referential() {
            return;
        }
        // SAFETY: Only called while the caller holds a strong reference.
        unsafe { self.block.as_ref().readopt(self.block) };
    }

    #[inline]
    fn retarget<U: ?Sized>(self, ptr: NonNull<U>) -> Parts<U> {
        Parts {
            block: self.block,
            ptr,
        }
    }
}

#[inline]
fn thin<T: ?Sized>(ptr: Option<NonNull<T>>) -> *const () {
    ptr.map_or(std::ptr::null(), |p| p.as_ptr().cast_const().cast::<()>())
}

// ============================================================================
// Shared<T> - strong owning handle
// ============================================================================

/// A single-threaded shared-ownership pointer.
///
/// `Shared<T>` keeps its object alive for as long as at least one strong
/// handle to the same control block exists. [`Weak<T>`] handles observe the
/// object without keeping it alive.
///
/// Unlike `Rc`, a handle may be empty (see [`Shared::null`]) and may point
/// somewhere other than the object it owns (see [`Shared::alias`]).
/// Equality, ordering and hashing use the exposed pointer only.
///
/// Handles are neither `Send` nor `Sync`; the counts are plain cells.
/// Reference cycles between strong handles leak.
///
/// # Examples
///
/// ```ignore
/// use shptr::Shared;
///
/// let a = Shared::new(String::from("hello"));
/// let b = Shared::clone(&a);
/// assert_eq!(Shared::use_count(&a), 2);
/// assert!(Shared::ptr_eq(&a, &b));
/// ```
pub struct Shared<T: ?Sized> {
    parts: Option<Parts<T>>,
    _marker: PhantomData<T>,
}

impl<T: Adopt + 'static> Shared<T> {
    /// Move `value` into a new control block.
    ///
    /// Object and counts share a single allocation.
    #[must_use]
    pub fn new(value: T) -> Self {
        let (block, ptr) = EmbeddedBlock::allocate(value);
        Self::adopted(Parts { block, ptr })
    }

    /// Like [`Shared::new`], building the value with `f`.
    #[must_use]
    pub fn new_with<F: FnOnce() -> T>(f: F) -> Self {
        Self::new(f())
    }
}

impl<T: ?Sized + Adopt + 'static> Shared<T> {
    /// Take ownership of an already boxed object.
    ///
    /// The control block is allocated separately from the object. Works for
    /// unsized objects such as `Box<[T]>` and `Box<str>`.
    #[must_use]
    pub fn from_box(boxed: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(boxed));
        // SAFETY: The pointer was just released from its box.
        let block = unsafe { SeparateBlock::allocate(ptr) };
        Self::adopted(Parts { block, ptr })
    }

    /// Take ownership of a raw pointer. A null pointer yields an empty handle.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from [`Box::into_raw`], and nothing else
    /// may own or free it afterwards.
    #[must_use]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        match NonNull::new(ptr) {
            // SAFETY: Forwarded from the caller.
            Some(ptr) => Self::from_box(unsafe { Box::from_raw(ptr.as_ptr()) }),
            None => Self::null(),
        }
    }

    /// Release the current ownership, then take ownership of `boxed`.
    pub fn reset_with(this: &mut Self, boxed: Box<T>) {
        Self::reset(this);
        *this = Self::from_box(boxed);
    }

    fn adopted(parts: Parts<T>) -> Self {
        if T::SELF_REFERENTIAL {
            parts.readopt();
        }
        Self::from_parts(parts)
    }
}

impl<T: ?Sized> Shared<T> {
    /// An empty handle. Owns nothing and reports a use count of 0.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            parts: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    const fn from_parts(parts: Parts<T>) -> Self {
        Self {
            parts: Some(parts),
            _marker: PhantomData,
        }
    }

    /// Number of strong handles sharing this handle's control block, or 0
    /// for an empty handle.
    #[must_use]
    pub fn use_count(this: &Self) -> usize {
        this.parts.map_or(0, |p| p.header().strong())
    }

    /// Number of weak handles to this handle's control block, including an
    /// installed self reference. 0 for an empty handle.
    ///
    /// While the object's destructor runs, the block holds one extra weak
    /// reference of its own, so the count is one higher than the number of
    /// `Weak` handles.
    #[must_use]
    pub fn weak_count(this: &Self) -> usize {
        this.parts.map_or(0, |p| p.header().weak())
    }

    /// Create a weak handle to the same object.
    #[must_use]
    pub fn downgrade(this: &Self) -> Weak<T> {
        match this.parts {
            // SAFETY: `this` keeps the block alive.
            Some(p) => unsafe { Weak::from_parts(p.block, p.ptr) },
            None => Weak::new(),
        }
    }

    /// Whether this handle is empty.
    #[must_use]
    pub const fn is_null(this: &Self) -> bool {
        this.parts.is_none()
    }

    /// The exposed object, or `None` for an empty handle.
    #[must_use]
    pub fn get(this: &Self) -> Option<&T> {
        // SAFETY: A strong handle keeps the object alive.
        this.parts.map(|p| unsafe { &*p.ptr.as_ptr() })
    }

    /// The exposed pointer, or `None` for an empty handle.
    #[must_use]
    pub fn as_ptr(this: &Self) -> Option<NonNull<T>> {
        this.parts.map(|p| p.ptr)
    }

    /// Whether both handles expose the same address.
    #[must_use]
    pub fn ptr_eq<U: ?Sized>(this: &Self, other: &Shared<U>) -> bool {
        this.addr() == other.addr()
    }

    /// Whether both handles share a control block, regardless of the
    /// pointers they expose. Two empty handles share nothing.
    #[must_use]
    pub fn shares_owner<U: ?Sized>(this: &Self, other: &Shared<U>) -> bool {
        match (this.parts, other.parts) {
            (Some(a), Some(b)) => a.block.cast::<()>() == b.block.cast::<()>(),
            _ => false,
        }
    }

    /// Allocation strategy of the control block, or `None` when empty.
    #[must_use]
    pub fn block_kind(this: &Self) -> Option<BlockKind> {
        // SAFETY: A strong handle keeps the block allocated.
        this.parts.map(|p| unsafe { p.block.as_ref() }.kind())
    }

    /// Move the ownership out of `this`, leaving it empty.
    #[must_use]
    pub fn take(this: &mut Self) -> Self {
        Self {
            parts: this.parts.take(),
            _marker: PhantomData,
        }
    }

    /// Release the current ownership and leave `this` empty.
    pub fn reset(this: &mut Self) {
        drop(Self::take(this));
    }

    /// Exchange the contents of two handles.
    pub fn swap(a: &mut Self, b: &mut Self) {
        std::mem::swap(&mut a.parts, &mut b.parts);
    }

    /// A new owner of the same object, viewed as `U`.
    ///
    /// `f` must return a view of the object itself, typically an unsizing
    /// coercion. Use [`Shared::alias`] for sub-objects.
    ///
    /// ```ignore
    /// use shptr::Shared;
    /// use std::fmt::Display;
    ///
    /// let n = Shared::new(5);
    /// let shown: Shared<dyn Display> = Shared::cast::<dyn Display, _>(&n, |x| x);
    /// assert_eq!(shown.to_string(), "5");
    /// ```
    ///
    /// # Panics
    ///
    /// Panics in debug builds when `f` returns a different address.
    #[must_use]
    pub fn cast<U: ?Sized, F>(this: &Self, f: F) -> Shared<U>
    where
        F: FnOnce(&T) -> &U,
    {
        let Some(parts) = this.retype(f) else {
            return Shared::null();
        };
        debug_assert_eq!(thin(Some(parts.ptr)), this.addr(), "cast changed the object address");
        parts.header().inc_strong();
        parts.readopt();
        Shared::from_parts(parts)
    }

    /// Like [`Shared::cast`], consuming `this`.
    ///
    /// # Panics
    ///
    /// Panics in debug builds when `f` returns a different address.
    #[must_use]
    pub fn into_cast<U: ?Sized, F>(this: Self, f: F) -> Shared<U>
    where
        F: FnOnce(&T) -> &U,
    {
        let Some(parts) = this.retype(f) else {
            return Shared::null();
        };
        debug_assert_eq!(thin(Some(parts.ptr)), this.addr(), "cast changed the object address");
        let mut this = this;
        this.parts = None;
        parts.readopt();
        Shared::from_parts(parts)
    }

    /// A new owner of this handle's object exposing a part of it.
    ///
    /// The result keeps the original object alive while dereferencing to
    /// whatever `f` returns. An empty handle yields an empty handle.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// use shptr::Shared;
    ///
    /// let pair = Shared::new((1, String::from("two")));
    /// let second = Shared::alias(&pair, |p| &p.1);
    /// drop(pair);
    /// assert_eq!(*second, "two");
    /// ```
    #[must_use]
    pub fn alias<U: ?Sized, F>(this: &Self, f: F) -> Shared<U>
    where
        F: FnOnce(&T) -> &U,
    {
        let Some(parts) = this.retype(f) else {
            return Shared::null();
        };
        parts.header().inc_strong();
        Shared::from_parts(parts)
    }

    /// Like [`Shared::alias`], consuming `this` without touching the counts.
    #[must_use]
    pub fn into_alias<U: ?Sized, F>(this: Self, f: F) -> Shared<U>
    where
        F: FnOnce(&T) -> &U,
    {
        let parts = this.retype(f);
        let mut this = this;
        this.parts = None;
        Shared {
            parts,
            _marker: PhantomData,
        }
    }

    /// A new owner of this handle's object exposing an arbitrary pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for reads for as long as the returned handle or
    /// any handle derived from it exists. Keeping `this`'s object alive must
    /// be enough to guarantee that.
    #[must_use]
    pub unsafe fn alias_raw<U: ?Sized>(this: &Self, ptr: NonNull<U>) -> Shared<U> {
        match this.parts {
            Some(p) => {
                p.header().inc_strong();
                Shared::from_parts(p.retarget(ptr))
            }
            None => Shared::null(),
        }
    }

    fn retype<U: ?Sized, F>(&self, f: F) -> Option<Parts<U>>
    where
        F: FnOnce(&T) -> &U,
    {
        let parts = self.parts?;
        // SAFETY: `self` keeps the object alive for the duration of `f`.
        let target = f(unsafe { parts.ptr.as_ref() });
        Some(parts.retarget(NonNull::from(target)))
    }

    #[inline]
    fn addr(&self) -> *const () {
        thin(self.parts.map(|p| p.ptr))
    }
}

impl Shared<dyn Any> {
    /// Recover the concrete type of a type-erased handle.
    ///
    /// # Errors
    ///
    /// Returns the handle unchanged if the object is not a `T`, or if the
    /// handle is empty.
    pub fn downcast<T: Any>(self) -> Result<Shared<T>, Self> {
        if !Self::get(&self).is_some_and(|object| object.is::<T>()) {
            return Err(self);
        }
        Ok(Self::into_cast(self, |object| {
            object.downcast_ref::<T>().unwrap_or_else(|| unreachable!())
        }))
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        let Some(parts) = self.parts else {
            return Self::null();
        };
        parts.header().inc_strong();
        parts.readopt();
        Self::from_parts(parts)
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(parts) = self.parts.take() {
            // SAFETY: This handle owned one strong reference.
            unsafe { release_strong(parts.block) };
        }
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is empty.
    fn deref(&self) -> &Self::Target {
        match Self::get(self) {
            Some(object) => object,
            None => panic!("dereferenced an empty Shared handle"),
        }
    }
}

impl<T: ?Sized> Default for Shared<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Adopt + 'static> From<T> for Shared<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: ?Sized + Adopt + 'static> From<Box<T>> for Shared<T> {
    fn from(boxed: Box<T>) -> Self {
        Self::from_box(boxed)
    }
}

impl<T: ?Sized> TryFrom<&Weak<T>> for Shared<T> {
    type Error = ExpiredError;

    fn try_from(weak: &Weak<T>) -> Result<Self, Self::Error> {
        weak.upgrade()
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Shared<U>> for Shared<T> {
    fn eq(&self, other: &Shared<U>) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized> PartialOrd for Shared<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized> Ord for Shared<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<T: ?Sized> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::get(self) {
            Some(object) => f.debug_tuple("Shared").field(&object).finish(),
            None => write!(f, "Shared(<empty>)"),
        }
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::get(self) {
            Some(object) => fmt::Display::fmt(object, f),
            None => write!(f, "<empty>"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}

// ============================================================================
// Weak<T> - non-owning observer
// ============================================================================

/// A non-owning handle to an object managed by [`Shared`].
///
/// A weak handle keeps the control block allocated, never the object. Use
/// [`Weak::upgrade`] or [`Weak::lock`] to obtain a strong handle while the
/// object is still alive.
///
/// # Examples
///
/// ```ignore
/// use shptr::Shared;
///
/// let strong = Shared::new(42);
/// let weak = Shared::downgrade(&strong);
/// assert_eq!(*weak.upgrade().unwrap(), 42);
///
/// drop(strong);
/// assert!(weak.expired());
/// assert!(weak.upgrade().is_err());
/// ```
pub struct Weak<T: ?Sized> {
    parts: Option<Parts<T>>,
    _marker: PhantomData<T>,
}

impl<T: ?Sized> Weak<T> {
    /// An empty weak handle. It is always expired.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            parts: None,
            _marker: PhantomData,
        }
    }

    /// A weak handle to `block` exposing `ptr`. Increments the weak count.
    ///
    /// # Safety
    ///
    /// `block` must be a live control block and `ptr` must be kept alive by
    /// its object.
    pub(crate) unsafe fn from_parts(block: NonNull<dyn ControlBlock>, ptr: NonNull<T>) -> Self {
        let parts = Parts { block, ptr };
        parts.header().inc_weak();
        Self {
            parts: Some(parts),
            _marker: PhantomData,
        }
    }

    /// Promote to a strong handle.
    ///
    /// # Errors
    ///
    /// Returns [`ExpiredError`] if the object has been destroyed or the
    /// handle is empty.
    pub fn upgrade(&self) -> Result<Shared<T>, ExpiredError> {
        match self.parts {
            Some(parts) if parts.header().strong() > 0 => {
                parts.header().inc_strong();
                metrics::record_promotion(true);
                Ok(Shared::from_parts(parts))
            }
            parts => {
                trace::log_promotion_failed(parts.map(|p| p.header().id()));
                metrics::record_promotion(false);
                Err(ExpiredError)
            }
        }
    }

    /// Promote to a strong handle, or return an empty one if expired.
    #[must_use]
    pub fn lock(&self) -> Shared<T> {
        self.upgrade().unwrap_or_default()
    }

    /// Whether the object is gone. Empty handles are always expired.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Number of strong handles keeping the object alive.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.parts.map_or(0, |p| p.header().strong())
    }

    /// Number of weak handles to the control block, this one included.
    ///
    /// Observed from the object's destructor, the count includes one extra
    /// reference that pins the block until the destructor returns.
    #[must_use]
    pub fn weak_count(&self) -> usize {
        self.parts.map_or(0, |p| p.header().weak())
    }

    /// Release this handle's weak reference and leave it empty.
    pub fn reset(&mut self) {
        if let Some(parts) = self.parts.take() {
            // SAFETY: This handle owned one weak reference.
            unsafe { release_weak(parts.block) };
        }
    }

    /// Whether both handles expose the same address.
    #[must_use]
    pub fn ptr_eq<U: ?Sized>(&self, other: &Weak<U>) -> bool {
        thin(self.as_ptr()) == thin(other.as_ptr())
    }

    /// The exposed pointer. It may dangle once the handle has expired.
    #[must_use]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.parts.map(|p| p.ptr)
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        match self.parts {
            // SAFETY: `self` keeps the block alive.
            Some(p) => unsafe { Self::from_parts(p.block, p.ptr) },
            None => Self::new(),
        }
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized> Default for Weak<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T> {
    fn from(shared: &Shared<T>) -> Self {
        Shared::downgrade(shared)
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_none() {
            write!(f, "Weak(<empty>)")
        } else if self.expired() {
            write!(f, "Weak(<expired>)")
        } else {
            write!(f, "Weak({:p})", thin(self.as_ptr()))
        }
    }
}
