//! Helpers for observing destruction in tests.
//!
//! Enabled for this crate's own tests and, through the `test-util` feature,
//! for downstream crates.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::Adopt;

/// Records how many times each tracked value was dropped.
#[derive(Clone, Default)]
pub struct DropLog {
    drops: Rc<RefCell<BTreeMap<&'static str, usize>>>,
}

impl DropLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A value that records its drop under `name`.
    #[must_use]
    pub fn track(&self, name: &'static str) -> Tracked {
        Tracked {
            name,
            log: self.clone(),
        }
    }

    /// How many values named `name` were dropped.
    #[must_use]
    pub fn drops_of(&self, name: &str) -> usize {
        self.drops.borrow().get(name).copied().unwrap_or(0)
    }

    /// Total drops over all names.
    #[must_use]
    pub fn total(&self) -> usize {
        self.drops.borrow().values().sum()
    }

    /// Whether no name was dropped more than once.
    #[must_use]
    pub fn at_most_once(&self) -> bool {
        self.drops.borrow().values().all(|&n| n <= 1)
    }
}

impl fmt::Debug for DropLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.drops.borrow().iter()).finish()
    }
}

/// A value produced by [`DropLog::track`].
pub struct Tracked {
    name: &'static str,
    log: DropLog,
}

impl Tracked {
    /// The name this value reports when dropped.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl Adopt for Tracked {}

impl Drop for Tracked {
    fn drop(&mut self) {
        *self.log.drops.borrow_mut().entry(self.name).or_insert(0) += 1;
    }
}

impl fmt::Debug for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tracked").field(&self.name).finish()
    }
}
