//! The self-reference capability ("shared from this").
//!
//! Every type stored behind a [`Shared`] implements [`Adopt`]. For almost all
//! types the implementation is empty. A type that wants to mint handles to
//! itself embeds a [`WeakThis<Self>`] field and derives `Adopt`; the derive
//! sets [`Adopt::SELF_REFERENTIAL`] and wires [`Adopt::adopt`] to that field.
//! Each time a `Shared` establishes strong ownership of such an object it
//! re-installs the weak self handle, after the strong count was raised.

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet, LinkedList, VecDeque};
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;

use crate::block::ControlBlock;
use crate::error::ExpiredError;
use crate::ptr::{Shared, Weak};

// ============================================================================
// Core Traits
// ============================================================================

/// A type that can be owned by a [`Shared`] handle.
///
/// The hook is consulted at compile time: when [`SELF_REFERENTIAL`] is
/// `false` (the default) no handle operation calls [`adopt`].
///
/// Prefer `#[derive(Adopt)]` over a manual implementation.
///
/// # Examples
///
/// Types without a self reference need an empty impl:
///
/// ```ignore
/// impl shptr::Adopt for MyPlainType {}
/// ```
///
/// A manual self-referential implementation:
///
/// ```ignore
/// use shptr::{Adopt, Weak, WeakThis};
///
/// struct Node {
///     this: WeakThis<Node>,
/// }
///
/// impl Adopt for Node {
///     const SELF_REFERENTIAL: bool = true;
///
///     fn adopt(&self, this: &Weak<Self>) {
///         self.this.install(this);
///     }
/// }
/// ```
///
/// [`SELF_REFERENTIAL`]: Adopt::SELF_REFERENTIAL
/// [`adopt`]: Adopt::adopt
pub trait Adopt {
    /// Whether [`adopt`](Adopt::adopt) must run when ownership is established.
    const SELF_REFERENTIAL: bool = false;

    /// Called with a weak handle to the ownership that was just established.
    fn adopt(&self, _this: &Weak<Self>) {}
}

/// Access to an object's own shared ownership.
///
/// Implemented by `#[derive(Adopt)]` for structs with a [`WeakThis`] field.
pub trait EnableSharedFromThis: Adopt {
    /// The embedded weak self handle.
    fn weak_this(&self) -> &WeakThis<Self>;

    /// A new strong handle sharing ownership with the handles that keep
    /// `self` alive.
    ///
    /// # Errors
    ///
    /// Returns [`ExpiredError`] if no `Shared` handle has ever owned `self`,
    /// or if the object is being destroyed.
    fn shared_from_this(&self) -> Result<Shared<Self>, ExpiredError> {
        self.weak_this().get().upgrade()
    }

    /// The embedded weak self handle. Never fails; the handle may be expired.
    fn weak_from_this(&self) -> Weak<Self> {
        self.weak_this().get()
    }
}

// ============================================================================
// WeakThis - the embedded self reference
// ============================================================================

/// A weak back-reference from an object to its own control block.
///
/// Starts out empty. It is filled in by the `Shared` handle that first owns
/// the object and overwritten by every later copy.
pub struct WeakThis<T: ?Sized> {
    weak: RefCell<Weak<T>>,
}

impl<T: ?Sized> WeakThis<T> {
    /// An empty self reference.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            weak: RefCell::new(Weak::new()),
        }
    }

    /// Point the self reference at `this`.
    pub fn install(&self, this: &Weak<T>) {
        let previous = self.weak.replace(this.clone());
        // Dropped outside the borrow; it may free an unrelated block.
        drop(previous);
    }

    /// A copy of the current self reference.
    #[must_use]
    pub fn get(&self) -> Weak<T> {
        self.weak.borrow().clone()
    }

    /// Whether any `Shared` handle has ever adopted the owner.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.weak.borrow().as_ptr().is_some()
    }
}

impl<T: ?Sized> Default for WeakThis<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for WeakThis<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let weak = self.weak.borrow();
        f.debug_struct("WeakThis")
            .field("installed", &weak.as_ptr().is_some())
            .field("use_count", &weak.use_count())
            .finish()
    }
}

/// Hand `object` a weak handle to `block`.
///
/// # Safety
///
/// `block` must be the live control block owning `object`, with a strong
/// count of at least one.
pub(crate) unsafe fn adopt_into<T: ?Sized + Adopt>(
    block: NonNull<dyn ControlBlock>,
    object: NonNull<T>,
) {
    // SAFETY: Forwarded from the caller.
    let this = unsafe { Weak::from_parts(block, object) };
    // SAFETY: A strong owner keeps the object alive.
    unsafe { object.as_ref() }.adopt(&this);
}

// ============================================================================
// Adopt implementations for std types
// ============================================================================

macro_rules! impl_adopt_plain {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Adopt for $ty {}
        )*
    };
}

impl_adopt_plain!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    str,
    String,
    std::num::NonZeroU8,
    std::num::NonZeroU16,
    std::num::NonZeroU32,
    std::num::NonZeroU64,
    std::num::NonZeroUsize,
    std::num::NonZeroI32,
    std::num::NonZeroI64,
    std::path::Path,
    std::path::PathBuf,
    std::ffi::OsStr,
    std::ffi::OsString,
    std::time::Duration,
    dyn std::any::Any,
    dyn std::error::Error,
);

impl<T: ?Sized> Adopt for &'static T {}
impl<T: ?Sized> Adopt for Box<T> {}
impl<T: ?Sized> Adopt for Rc<T> {}
impl<T: ?Sized> Adopt for Arc<T> {}
impl<T: ?Sized> Adopt for Shared<T> {}
impl<T: ?Sized> Adopt for Weak<T> {}
impl<T: ?Sized> Adopt for WeakThis<T> {}
impl<T: ?Sized> Adopt for RefCell<T> {}
impl<T: ?Sized> Adopt for Cell<T> {}
impl<T> Adopt for OnceCell<T> {}
impl<T> Adopt for Option<T> {}
impl<T, E> Adopt for Result<T, E> {}
impl<T> Adopt for Vec<T> {}
impl<T> Adopt for [T] {}
impl<T, const N: usize> Adopt for [T; N] {}
impl<T> Adopt for VecDeque<T> {}
impl<T> Adopt for LinkedList<T> {}
impl<T> Adopt for BinaryHeap<T> {}
impl<K, V, S> Adopt for HashMap<K, V, S> {}
impl<T, S> Adopt for HashSet<T, S> {}
impl<K, V> Adopt for BTreeMap<K, V> {}
impl<T> Adopt for BTreeSet<T> {}
impl<T: ?Sized> Adopt for std::marker::PhantomData<T> {}
impl<T: ?Sized, D: crate::Deleter<T>> Adopt for crate::Unique<T, D> {}
impl<T: crate::RefCounted> Adopt for crate::Intrusive<T> {}

macro_rules! impl_adopt_for_tuples {
    () => {};
    ($first:ident $(, $rest:ident)*) => {
        impl<$first $(, $rest)*> Adopt for ($first, $($rest,)*) {}
        impl_adopt_for_tuples!($($rest),*);
    };
}

impl_adopt_for_tuples!(A, B, C, D, E, F, G, H, I, J, K, L);

#[cfg(test)]
mod tests {
    use super::*;

    struct Manual {
        this: WeakThis<Self>,
        value: i32,
    }

    impl Adopt for Manual {
        const SELF_REFERENTIAL: bool = true;

        fn adopt(&self, this: &Weak<Self>) {
            self.this.install(this);
        }
    }

    impl EnableSharedFromThis for Manual {
        fn weak_this(&self) -> &WeakThis<Self> {
            &self.this
        }
    }

    #[test]
    fn test_weak_this_starts_empty() {
        let this: WeakThis<i32> = WeakThis::new();
        assert!(!this.is_installed());
        assert!(this.get().expired());
    }

    #[test]
    fn test_plain_types_are_not_self_referential() {
        assert!(!<i32 as Adopt>::SELF_REFERENTIAL);
        assert!(!<String as Adopt>::SELF_REFERENTIAL);
        assert!(!<Vec<Manual> as Adopt>::SELF_REFERENTIAL);
        assert!(<Manual as Adopt>::SELF_REFERENTIAL);
    }

    #[test]
    fn test_manual_impl_is_installed_on_new() {
        let value = Manual {
            this: WeakThis::new(),
            value: 5,
        };
        assert!(value.shared_from_this().is_err());

        let shared = Shared::new(value);
        assert!(shared.this.is_installed());

        let again = shared.shared_from_this().unwrap();
        assert!(Shared::ptr_eq(&shared, &again));
        assert_eq!(again.value, 5);
        assert_eq!(Shared::use_count(&shared), 2);
    }

    #[test]
    fn test_install_replaces_previous() {
        let a = Shared::new(1);
        let b = Shared::new(2);
        let this = WeakThis::new();

        this.install(&Shared::downgrade(&a));
        assert_eq!(*this.get().lock(), 1);
        assert_eq!(Shared::weak_count(&a), 1);

        this.install(&Shared::downgrade(&b));
        assert_eq!(*this.get().lock(), 2);
        assert_eq!(Shared::weak_count(&a), 0);
        assert_eq!(Shared::weak_count(&b), 1);
    }
}
