use thiserror::Error;

/// Promotion of a weak reference failed because no strong owner remains.
///
/// Returned by [`Weak::upgrade`](crate::Weak::upgrade), by
/// `Shared::try_from(&weak)` and by
/// [`EnableSharedFromThis::shared_from_this`](crate::EnableSharedFromThis::shared_from_this)
/// when the object was never owned by a `Shared` handle.
#[derive(Debug, Error, Clone, Copy, Default, PartialEq, Eq)]
#[error("weak reference has expired: no strong owner keeps the object alive")]
pub struct ExpiredError;
