//! Caching utilities for lazily computed values

use std::sync::OnceLock;

/// Cache for a value that is computed at most once.
///
/// Blocks use it to remember their content id after the first request.
#[derive(Debug)]
pub(crate) struct OnceCache<T> {
    value: OnceLock<T>,
}

impl<T> OnceCache<T> {
    /// Create a new empty cache
    pub(crate) const fn new() -> Self {
        Self {
            value: OnceLock::new(),
        }
    }

    /// Create a cache that already holds `value`
    pub(crate) fn with_value(value: T) -> Self {
        Self {
            value: OnceLock::from(value),
        }
    }

    /// Get the cached value, computing it if necessary
    pub(crate) fn get_or_compute<F>(&self, compute_fn: F) -> &T
    where
        F: FnOnce() -> T,
    {
        self.value.get_or_init(compute_fn)
    }
}

impl<T> Default for OnceCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for OnceCache<T> {
    fn clone(&self) -> Self {
        match self.value.get() {
            Some(value) => Self::with_value(value.clone()),
            None => Self::new(),
        }
    }
}
