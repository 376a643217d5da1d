//! Synchronization utilities for multi-threaded operations.
//!
//! This module provides synchronization primitives that extend beyond the standard
//! library capabilities, specifically designed for serializing work keyed by an
//! identifier across concurrent callers.
//!
//! # Key Components
//!
//! - [`LockSet`] - A set of exclusive, timed locks addressed by key
//!
//! # Design Principles
//!
//! - **Bounded waits**: Acquisition gives up after a caller supplied timeout
//! - **No partial state**: A failed acquisition leaves the set exactly as it was
//! - **Thread Safety**: All operations are thread-safe and can be called concurrently

use std::{
    collections::HashSet,
    hash::Hash,
    sync::{Condvar, Mutex},
    time::Duration,
};

use crate::{Error, Result};

/// A set of exclusive locks addressed by key.
///
/// Each key behaves like an independent non-reentrant mutex that is held from a
/// successful [`LockSet::try_lock`] until the matching [`LockSet::unlock`]. Holding a
/// key is not tied to a thread: the lock for a generation identifier is acquired while
/// the generation is created and released later, possibly by another thread, once the
/// generation is populated.
///
/// Waiters on different keys never block each other beyond the short critical
/// section that updates the set.
///
/// # Examples
///
/// ```rust,ignore
/// use bundlestore::utils::synchronization::LockSet;
/// use std::time::Duration;
///
/// let locks = LockSet::new();
/// assert!(locks.try_lock(7u64, Duration::from_secs(5))?);
///
/// // A second acquisition of the same key waits, then gives up
/// assert!(!locks.try_lock(7u64, Duration::from_millis(10))?);
///
/// assert!(locks.unlock(&7));
/// # Ok::<(), bundlestore::Error>(())
/// ```
#[derive(Debug)]
pub struct LockSet<K> {
    /// Keys that are currently held
    held: Mutex<HashSet<K>>,
    /// Signalled whenever a key is released
    released: Condvar,
}

impl<K> Default for LockSet<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> LockSet<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty lock set.
    pub fn new() -> Self {
        LockSet {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Try to acquire the lock for `key`, waiting at most `timeout`.
    ///
    /// # Arguments
    ///
    /// * `key` - The identifier to lock
    /// * `timeout` - Upper bound for the time spent waiting on another holder
    ///
    /// # Returns
    ///
    /// * `Ok(true)` if the lock was acquired
    /// * `Ok(false)` if `key` was still held when the timeout elapsed
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if a thread panicked while updating the set. The
    /// wait is abandoned in that case and nothing is acquired.
    pub fn try_lock(&self, key: K, timeout: Duration) -> Result<bool> {
        let guard = self.held.lock().map_err(|_| Error::LockError)?;
        let (mut guard, _) = self
            .released
            .wait_timeout_while(guard, timeout, |held| held.contains(&key))
            .map_err(|_| Error::LockError)?;

        // The predicate is re-checked here rather than trusting the timeout flag, a
        // release can race with the deadline.
        if guard.contains(&key) {
            return Ok(false);
        }

        guard.insert(key);
        Ok(true)
    }

    /// Release the lock for `key`.
    ///
    /// # Returns
    ///
    /// `true` if `key` was held, `false` if it was not locked.
    pub fn unlock(&self, key: &K) -> bool {
        let removed = match self.held.lock() {
            Ok(mut guard) => guard.remove(key),
            Err(poisoned) => poisoned.into_inner().remove(key),
        };

        if removed {
            self.released.notify_all();
        }
        removed
    }

    /// Check if `key` is currently held without blocking on it.
    pub fn is_locked(&self, key: &K) -> bool {
        match self.held.lock() {
            Ok(guard) => guard.contains(key),
            Err(poisoned) => poisoned.into_inner().contains(key),
        }
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        match self.held.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Returns `true` if no key is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poison the set by panicking while its mutex is held.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _held = self.held.lock();
            panic!("lock set holder panicked");
        }));
    }
}
