//! Deterministic smart pointers without a garbage collector.
//!
//! `shptr` provides three families of owning pointers:
//!
//! - [`Shared<T>`] / [`Weak<T>`]: shared ownership through an out-of-line
//!   **control block** holding a strong and a weak count. The block comes in
//!   two flavours behind one interface: *embedded* (object and counts in a
//!   single allocation, used by [`Shared::new`]) and *separate* (wraps an
//!   existing `Box`, used by [`Shared::from_box`]).
//! - [`Unique<T, D>`]: single ownership with a customizable destroy action.
//! - [`Intrusive<T>`]: reference counting with the count stored inside the
//!   object itself.
//!
//! # Quick Start
//!
//! ```ignore
//! use shptr::{Shared, Weak};
//!
//! let a = Shared::new(42);
//! let b = Shared::clone(&a);
//! assert_eq!(Shared::use_count(&a), 2);
//!
//! let w: Weak<i32> = Shared::downgrade(&a);
//! drop(a);
//! drop(b);
//! assert!(w.expired());
//! assert!(Shared::is_null(&w.lock()));
//! ```
//!
//! # Aliasing
//!
//! A handle can share ownership of one object while pointing at a part of it:
//!
//! ```ignore
//! use shptr::Shared;
//!
//! let pair = Shared::new((1, String::from("two")));
//! let second = Shared::alias(&pair, |p| &p.1);
//! drop(pair);
//! assert_eq!(*second, "two"); // the tuple is still alive
//! ```
//!
//! # Shared From This
//!
//! ```ignore
//! use shptr::{Adopt, EnableSharedFromThis, Shared, WeakThis};
//!
//! #[derive(Adopt)]
//! struct Session {
//!     this: WeakThis<Self>,
//!     id: u32,
//! }
//!
//! let s = Shared::new(Session { this: WeakThis::new(), id: 7 });
//! let again = s.shared_from_this().unwrap();
//! assert!(Shared::ptr_eq(&s, &again));
//! ```
//!
//! # Thread Safety
//!
//! Counts are plain, unsynchronized cells. `Shared<T>`, `Weak<T>` and
//! `Intrusive<T>` are `!Send` and `!Sync`, so every handle to one control
//! block stays on the thread that created it.
//!
//! # Cycles
//!
//! Cycles of `Shared` handles are neither detected nor collected: they leak.
//! Break them with `Weak`.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod adopt;
mod block;
mod error;
pub mod intrusive;
pub mod metrics;
mod ptr;
mod tracing;
pub mod unique;

pub use adopt::{Adopt, EnableSharedFromThis, WeakThis};
pub use block::BlockKind;
pub use error::ExpiredError;
pub use intrusive::{Intrusive, RefCount, RefCounted};
pub use metrics::PtrMetrics;
pub use ptr::{Shared, Weak};
pub use unique::{DefaultDelete, Deleter, FnDeleter, Unique};

// Re-export derive macro when feature is enabled
#[cfg(feature = "derive")]
pub use shptr_derive::Adopt;

#[cfg(any(test, feature = "test-util"))]
#[doc(hidden)]
pub mod test_util;
