//! Per-bundle generation bookkeeping.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use crate::{
    error::LockFailure,
    storage::{Generation, GenerationFlags, Storage, BUNDLE_DATA_DIR},
    utils::LockSet,
    Error, Result,
};

struct InfoState {
    next_generation_id: u64,
    generation_locks: Option<Arc<LockSet<u64>>>,
}

/// The record of one installed bundle.
///
/// Owns the counter that hands out generation identifiers and the lock set that keeps
/// two creations from materializing the same identifier at once. Generations refer back
/// to their record; the record does not keep its generations.
///
/// # Thread Safety
///
/// All state is guarded by one monitor. It is never held while a generation computes
/// derived state.
pub struct BundleInfo {
    storage: Arc<Storage>,
    bundle_id: u64,
    info_monitor: Mutex<InfoState>,
}

impl BundleInfo {
    /// Create the record of `bundle_id`.
    ///
    /// # Arguments
    /// * `storage` - The storage area the bundle lives in
    /// * `bundle_id` - Stable identity of the bundle
    /// * `next_generation_id` - First identifier to hand out, as persisted for the bundle
    pub fn new(storage: Arc<Storage>, bundle_id: u64, next_generation_id: u64) -> Arc<BundleInfo> {
        Arc::new(BundleInfo {
            storage,
            bundle_id,
            info_monitor: Mutex::new(InfoState {
                next_generation_id,
                generation_locks: None,
            }),
        })
    }

    /// Identity of the bundle.
    pub fn bundle_id(&self) -> u64 {
        self.bundle_id
    }

    /// The identifier the next [`BundleInfo::create_generation`] will try to use.
    pub fn next_generation_id(&self) -> u64 {
        lock!(self.info_monitor).next_generation_id
    }

    /// The storage area the bundle lives in.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Allocate a new, empty generation.
    ///
    /// The identifier is locked with the configured
    /// [`generation_lock_timeout`](crate::StorageConfig::generation_lock_timeout) and stays
    /// locked until [`BundleInfo::unlock_generation`]. The counter only advances when the
    /// lock was obtained.
    ///
    /// # Errors
    /// Returns [`Error::GenerationLock`] if the wait timed out or the lock set was
    /// poisoned.
    pub fn create_generation(self: &Arc<Self>) -> Result<Arc<Generation>> {
        let mut state = lock!(self.info_monitor);
        let locks = Arc::clone(
            state
                .generation_locks
                .get_or_insert_with(|| Arc::new(LockSet::new())),
        );

        let generation_id = state.next_generation_id;
        let timeout = self.storage.config().generation_lock_timeout;
        let failure = match locks.try_lock(generation_id, timeout) {
            Ok(true) => None,
            Ok(false) => Some(LockFailure::Timeout),
            Err(_) => Some(LockFailure::Interrupted),
        };
        if let Some(reason) = failure {
            return Err(Error::GenerationLock {
                bundle_id: self.bundle_id,
                generation_id,
                reason,
            });
        }

        let generation = Generation::new(
            Arc::clone(self),
            generation_id,
            None,
            GenerationFlags::empty(),
        );
        state.next_generation_id += 1;
        log::trace!(
            "Allocated generation {} of bundle {}",
            generation_id,
            self.bundle_id
        );
        Ok(Arc::new(generation))
    }

    /// Release the identifier lock taken by [`BundleInfo::create_generation`].
    ///
    /// # Errors
    /// Returns [`Error::IllegalState`] if this record never created a generation.
    pub fn unlock_generation(&self, generation: &Generation) -> Result<()> {
        let state = lock!(self.info_monitor);
        let Some(locks) = &state.generation_locks else {
            return Err(Error::IllegalState(format!(
                "No generation locks for bundle {}",
                self.bundle_id
            )));
        };

        if !locks.unlock(&generation.generation_id()) {
            log::debug!(
                "Generation {} of bundle {} was not locked",
                generation.generation_id(),
                self.bundle_id
            );
        }
        Ok(())
    }

    /// Rebuild a generation from its persisted attributes.
    ///
    /// No identifier is allocated and nothing is locked.
    pub fn restore_generation(
        self: &Arc<Self>,
        generation_id: u64,
        content: Option<PathBuf>,
        is_directory: bool,
        has_package_info: bool,
    ) -> Arc<Generation> {
        let _state = lock!(self.info_monitor);
        let mut flags = GenerationFlags::empty();
        flags.set(GenerationFlags::DIRECTORY, is_directory);
        flags.set(GenerationFlags::PACKAGE_INFO, has_package_info);
        Arc::new(Generation::new(
            Arc::clone(self),
            generation_id,
            content,
            flags,
        ))
    }

    /// Remove the storage of `generation`.
    ///
    /// Failures are logged and otherwise ignored.
    pub fn delete(&self, generation: &Generation) {
        let target = self
            .storage
            .file(format!("{}/{}", self.bundle_id, generation.generation_id()));
        if let Err(error) = self.storage.delete(&target) {
            log::warn!(
                "Unable to delete generation {} of bundle {} at {}: {}",
                generation.generation_id(),
                self.bundle_id,
                target.display(),
                error
            );
        }
    }

    /// Resolve `path` in the private data directory of the bundle.
    ///
    /// The directory is created on first use. `None` means no data directory is
    /// available, because the storage is read-only or the directory cannot be created.
    pub fn data_file(&self, path: Option<&str>) -> Option<PathBuf> {
        let data_root = self
            .storage
            .file(format!("{}/{}", self.bundle_id, BUNDLE_DATA_DIR));

        if !data_root.is_dir() {
            if self.storage.is_read_only() {
                log::debug!(
                    "No data directory for bundle {}, storage is read-only",
                    self.bundle_id
                );
                return None;
            }
            if let Err(error) = std::fs::create_dir_all(&data_root) {
                log::debug!(
                    "Unable to create data directory {}: {}",
                    data_root.display(),
                    error
                );
                return None;
            }
        }

        Some(match path {
            Some(path) => data_root.join(path),
            None => data_root,
        })
    }

    #[cfg(test)]
    pub(crate) fn generation_locks(&self) -> Option<Arc<LockSet<u64>>> {
        lock!(self.info_monitor).generation_locks.clone()
    }
}

impl std::fmt::Debug for BundleInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleInfo")
            .field("bundle_id", &self.bundle_id)
            .field("next_generation_id", &self.next_generation_id())
            .finish_non_exhaustive()
    }
}
