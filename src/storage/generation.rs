//! One content revision of a bundle and its lazily derived state.
//!
//! # Architecture
//!
//! A [`Generation`] separates what it *is* from what is *derived* from it:
//!
//! - Identity and content (`generation_id`, content location, [`GenerationFlags`]) are
//!   readable at any time, even after the generation was closed.
//! - Derived state (the accessor, the parsed manifest, the localization, the protection
//!   domain, the native code finder) is computed on first request under the generation
//!   monitor and cached for the lifetime of the generation. Concurrent first requests
//!   block until the single computation finishes. A failed computation caches nothing.
//!
//! Collaborators invoked while derived state is computed (wrapper factories, the
//! accessor backend, the security admin) receive the generation and may use its
//! identity and content queries, but must not request its derived state.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use bitflags::bitflags;

use crate::{
    file::{
        fix_trailing_slash, BundleFile, ResourceUrl, SystemBundleFile, BUNDLE_MANIFEST,
        ENTRY_URL_PROTOCOL,
    },
    manifest::{has_package_info, Headers, ManifestLocalization, ResourceBundle},
    storage::{
        AttachedHook, BundleInfo, ExtractLocation, ModuleRevision, NativeCodeFinder,
        ProtectionDomain, Storage, StorageHookFactory,
    },
    Error, Result,
};

bitflags! {
    /// Flags describing the content of a generation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GenerationFlags: u8 {
        /// The content is an unpacked directory
        const DIRECTORY = 0x01;
        /// The manifest carries `Specification-*` or `Implementation-*` headers
        const PACKAGE_INFO = 0x02;
    }
}

struct ContentState {
    content: Option<PathBuf>,
    flags: GenerationFlags,
}

#[derive(Default)]
struct GenerationState {
    bundle_file: Option<Arc<dyn BundleFile>>,
    headers: Option<Arc<Headers>>,
    localization: Option<Arc<ManifestLocalization>>,
    domain: Option<Arc<ProtectionDomain>>,
    native_finder: Option<Arc<NativeCodeFinder>>,
    revision: Option<Arc<ModuleRevision>>,
    storage_hooks: Vec<AttachedHook>,
}

/// One content revision of a bundle.
///
/// Created by [`BundleInfo::create_generation`] or [`BundleInfo::restore_generation`].
pub struct Generation {
    bundle_info: Arc<BundleInfo>,
    generation_id: u64,
    content: RwLock<ContentState>,
    gen_monitor: Mutex<GenerationState>,
}

impl Generation {
    pub(crate) fn new(
        bundle_info: Arc<BundleInfo>,
        generation_id: u64,
        content: Option<PathBuf>,
        flags: GenerationFlags,
    ) -> Self {
        Generation {
            bundle_info,
            generation_id,
            content: RwLock::new(ContentState { content, flags }),
            gen_monitor: Mutex::new(GenerationState::default()),
        }
    }

    /// Identifier of this generation, unique within its bundle.
    pub fn generation_id(&self) -> u64 {
        self.generation_id
    }

    /// Identity of the bundle this generation belongs to.
    pub fn bundle_id(&self) -> u64 {
        self.bundle_info.bundle_id()
    }

    /// The record of the owning bundle.
    pub fn bundle_info(&self) -> &Arc<BundleInfo> {
        &self.bundle_info
    }

    fn storage(&self) -> &Arc<Storage> {
        self.bundle_info.storage()
    }

    /// Location of the payload, `None` until content is set.
    pub fn content(&self) -> Option<PathBuf> {
        read_lock(&self.content).content.clone()
    }

    /// Flags describing the content.
    pub fn flags(&self) -> GenerationFlags {
        read_lock(&self.content).flags
    }

    /// Returns `true` if the content is an unpacked directory.
    pub fn is_directory(&self) -> bool {
        self.flags().contains(GenerationFlags::DIRECTORY)
    }

    /// Returns `true` if the manifest declares package versioning headers.
    pub fn has_package_info(&self) -> bool {
        self.flags().contains(GenerationFlags::PACKAGE_INFO)
    }

    /// Replace the content location.
    ///
    /// The directory flag is recomputed. A cached accessor is closed and dropped together
    /// with everything read through it (headers, localization, native code finder), so the
    /// next request builds them over the new content.
    pub fn set_content(&self, content: impl AsRef<Path>) {
        let content = content.as_ref();
        {
            let mut state = write_lock(&self.content);
            state.content = Some(content.to_path_buf());
            state.flags.set(GenerationFlags::DIRECTORY, content.is_dir());
        }

        let mut state = lock!(self.gen_monitor);
        if let Some(bundle_file) = state.bundle_file.take() {
            log::debug!(
                "Content of generation {} changed, dropping accessor {}",
                self.generation_id,
                bundle_file
            );
            let _ = bundle_file.close();
        }
        state.headers = None;
        state.localization = None;
        state.native_finder = None;
    }

    /// The accessor for this generation's content, decorated by the registered wrappers.
    ///
    /// The platform bundle (id 0) without content is served by a [`SystemBundleFile`].
    ///
    /// # Errors
    /// [`Error::IllegalState`] if no content is set, otherwise failures of the accessor
    /// backend or a wrapper factory.
    pub fn bundle_file(&self) -> Result<Arc<dyn BundleFile>> {
        let mut state = lock!(self.gen_monitor);
        self.bundle_file_locked(&mut state)
    }

    fn bundle_file_locked(&self, state: &mut GenerationState) -> Result<Arc<dyn BundleFile>> {
        if let Some(bundle_file) = &state.bundle_file {
            return Ok(Arc::clone(bundle_file));
        }

        let (content, is_directory) = {
            let content = read_lock(&self.content);
            (
                content.content.clone(),
                content.flags.contains(GenerationFlags::DIRECTORY),
            )
        };

        let bundle_file: Arc<dyn BundleFile> = match content {
            None if self.bundle_id() == 0 => Arc::new(SystemBundleFile::new(
                self.storage().config().system_manifest.as_bytes(),
            )),
            None => {
                return Err(Error::IllegalState(format!(
                    "Generation {} of bundle {} has no content",
                    self.generation_id,
                    self.bundle_id()
                )))
            }
            Some(content) => {
                self.storage()
                    .create_bundle_file(&content, self, is_directory, true)?
            }
        };

        state.bundle_file = Some(Arc::clone(&bundle_file));
        Ok(bundle_file)
    }

    /// The raw manifest headers.
    ///
    /// # Errors
    /// [`Error::ManifestMissing`] if the content has no `META-INF/MANIFEST.MF`,
    /// [`Error::Malformed`] if the manifest cannot be parsed, or any accessor failure.
    pub fn headers(&self) -> Result<Arc<Headers>> {
        let mut state = lock!(self.gen_monitor);
        self.headers_locked(&mut state)
    }

    fn headers_locked(&self, state: &mut GenerationState) -> Result<Arc<Headers>> {
        if let Some(headers) = &state.headers {
            return Ok(Arc::clone(headers));
        }

        let bundle_file = self.bundle_file_locked(state)?;
        let entry = bundle_file
            .entry(BUNDLE_MANIFEST)
            .ok_or_else(|| Error::ManifestMissing(bundle_file.to_string()))?;
        let mut reader = entry.reader()?;
        let headers = Arc::new(self.storage().manifest_parser().parse(&mut *reader)?);

        state.headers = Some(Arc::clone(&headers));
        Ok(headers)
    }

    fn localization(&self) -> Result<Arc<ManifestLocalization>> {
        let mut state = lock!(self.gen_monitor);
        if let Some(localization) = &state.localization {
            return Ok(Arc::clone(localization));
        }

        let headers = self.headers_locked(&mut state)?;
        let bundle_file = self.bundle_file_locked(&mut state)?;
        let config = self.storage().config();
        let localization = Arc::new(ManifestLocalization::new(
            bundle_file,
            headers,
            config.root_locale.clone(),
            config.default_locale.clone(),
        ));

        state.localization = Some(Arc::clone(&localization));
        Ok(localization)
    }

    /// Manifest headers translated for `locale`.
    ///
    /// `None` selects the configured default locale, an empty locale the raw headers.
    ///
    /// # Errors
    /// Same as [`Generation::headers`].
    pub fn localized_headers(&self, locale: Option<&str>) -> Result<Arc<Headers>> {
        Ok(self.localization()?.headers(locale))
    }

    /// Translations for `locale`, `None` selecting the configured default locale.
    ///
    /// # Errors
    /// Same as [`Generation::headers`].
    pub fn resource_bundle(&self, locale: Option<&str>) -> Result<Option<Arc<ResourceBundle>>> {
        Ok(self.localization()?.resource_bundle(locale))
    }

    /// Drop cached translations. The raw headers stay cached.
    pub fn clear_manifest_cache(&self) {
        let state = lock!(self.gen_monitor);
        if let Some(localization) = &state.localization {
            log::debug!(
                "Clearing translations of generation {} of bundle {}",
                self.generation_id,
                self.bundle_id()
            );
            localization.clear_cache();
        }
    }

    /// Associate the revision this generation was installed as.
    pub fn set_revision(&self, revision: Arc<ModuleRevision>) {
        lock!(self.gen_monitor).revision = Some(revision);
    }

    /// The associated revision, if any.
    pub fn revision(&self) -> Option<Arc<ModuleRevision>> {
        lock!(self.gen_monitor).revision.clone()
    }

    /// The protection domain of this generation's code.
    ///
    /// The platform bundle (id 0) has none.
    ///
    /// # Errors
    /// [`Error::IllegalState`] if no revision was associated with
    /// [`Generation::set_revision`], or the security admin's failure.
    pub fn domain(&self) -> Result<Option<Arc<ProtectionDomain>>> {
        if self.bundle_id() == 0 {
            return Ok(None);
        }

        let mut state = lock!(self.gen_monitor);
        if let Some(domain) = &state.domain {
            return Ok(Some(Arc::clone(domain)));
        }

        let Some(revision) = state.revision.clone() else {
            return Err(Error::IllegalState(format!(
                "No revision associated with generation {} of bundle {}",
                self.generation_id,
                self.bundle_id()
            )));
        };
        let domain = Arc::new(
            self.storage()
                .security_admin()
                .create_protection_domain(self, &revision)?,
        );

        state.domain = Some(Arc::clone(&domain));
        Ok(Some(domain))
    }

    /// Location reserved for extracting the entry `path` of this generation.
    ///
    /// The file is not required to exist.
    pub fn extract_file(&self, path: &str) -> PathBuf {
        self.extract_location().file(path)
    }

    /// The directory extracted files of this generation are placed in.
    pub fn extract_location(&self) -> ExtractLocation {
        self.storage()
            .extract_location(self.bundle_id(), self.generation_id)
    }

    /// Find the native library `name` declared in `Bundle-NativeCode`.
    ///
    /// # Errors
    /// Same as [`Generation::headers`].
    pub fn find_library(&self, name: &str) -> Result<Option<PathBuf>> {
        let finder = {
            let mut state = lock!(self.gen_monitor);
            match &state.native_finder {
                Some(finder) => Arc::clone(finder),
                None => {
                    let headers = self.headers_locked(&mut state)?;
                    let bundle_file = self.bundle_file_locked(&mut state)?;
                    let finder = Arc::new(NativeCodeFinder::new(bundle_file, &headers));
                    state.native_finder = Some(Arc::clone(&finder));
                    finder
                }
            }
        };
        Ok(finder.find_library(name))
    }

    /// Attach `hooks` to this generation.
    ///
    /// On install the package-info flag is recomputed from the manifest; an accessor that
    /// cannot be built counts as no package info.
    pub fn set_storage_hooks(&self, hooks: Vec<AttachedHook>, install: bool) {
        if install {
            let package_info = match self.bundle_file() {
                Ok(bundle_file) => has_package_info(Some(bundle_file.as_ref())),
                Err(error) => {
                    log::debug!(
                        "No package info scan for generation {} of bundle {}: {}",
                        self.generation_id,
                        self.bundle_id(),
                        error
                    );
                    has_package_info(None)
                }
            };
            write_lock(&self.content)
                .flags
                .set(GenerationFlags::PACKAGE_INFO, package_info);
        }

        lock!(self.gen_monitor).storage_hooks = hooks;
    }

    /// The attached hooks, in factory registration order.
    pub fn storage_hooks(&self) -> Vec<AttachedHook> {
        lock!(self.gen_monitor).storage_hooks.clone()
    }

    /// The hook attached by factory type `F`, if any.
    pub fn storage_hook<F: StorageHookFactory>(&self) -> Option<Arc<F::Hook>> {
        lock!(self.gen_monitor)
            .storage_hooks
            .iter()
            .find_map(AttachedHook::downcast::<F>)
    }

    /// `bundleentry` URL of the entry at `path`, or `None` if there is no such entry.
    ///
    /// # Errors
    /// Failures building the accessor.
    pub fn entry_url(&self, path: &str) -> Result<Option<ResourceUrl>> {
        let bundle_file = self.bundle_file()?;
        Ok(bundle_file.entry(path).map(|entry| {
            ResourceUrl::new(
                ENTRY_URL_PROTOCOL,
                self.bundle_id(),
                0,
                fix_trailing_slash(path, entry.as_ref()),
            )
        }))
    }

    /// Close the cached accessor, if one was built. Errors are ignored.
    ///
    /// Identity and content queries keep working; later reads may reopen the accessor.
    pub fn close(&self) {
        let state = lock!(self.gen_monitor);
        if let Some(bundle_file) = &state.bundle_file {
            if let Err(error) = bundle_file.close() {
                log::debug!("Closing {} failed: {}", bundle_file, error);
            }
        }
    }

    /// Remove this generation's storage. See [`BundleInfo::delete`].
    pub fn delete(&self) {
        self.bundle_info.delete(self);
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content = read_lock(&self.content);
        f.debug_struct("Generation")
            .field("bundle_id", &self.bundle_id())
            .field("generation_id", &self.generation_id)
            .field("content", &content.content)
            .field("flags", &content.flags)
            .finish_non_exhaustive()
    }
}

fn read_lock(lock: &RwLock<ContentState>) -> RwLockReadGuard<'_, ContentState> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock(lock: &RwLock<ContentState>) -> RwLockWriteGuard<'_, ContentState> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
