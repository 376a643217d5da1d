//! Bundle storage area and the generation lifecycle.
//!
//! The storage area is a directory tree below [`StorageConfig::root`]:
//!
//! ```text
//! <root>/
//!   <bundleId>/
//!     <generationId>/     extracted content of one generation
//!     data/               private data of the bundle
//! ```
//!
//! # Key Components
//!
//! - [`Storage`] - Shared context: configuration, layout and registered extensions
//! - [`BundleInfo`] - Per-bundle record allocating and locking generation identifiers
//! - [`Generation`] - One content revision with lazily derived state
//! - [`BundleFileFactory`] - Backend constructing the raw accessor for generation content
//!
//! # Lifecycle
//!
//! [`Storage::stage_generation`] runs the usual install sequence: allocate and lock a new
//! generation, attach its content and storage hooks, read the manifest, unlock. A
//! failure removes the generation's storage again.
//!
//! ```rust,no_run
//! use bundlestore::{BundleInfo, Storage, StorageConfig};
//!
//! let storage = Storage::new(StorageConfig::new("/var/lib/bundles"))?.into_shared();
//! let info = BundleInfo::new(storage.clone(), 1, 0);
//!
//! let generation = storage.stage_generation(&info, "/opt/bundles/org.example.app")?;
//! println!("{:?}", generation.headers()?.get("Bundle-SymbolicName"));
//! # Ok::<(), bundlestore::Error>(())
//! ```

pub mod bundleinfo;
pub mod generation;
pub mod hooks;
pub mod native;
pub mod security;

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    file::{chain::wrap_bundle_file, BundleFile, BundleFileWrapperFactory, DirBundleFile},
    manifest::{JarManifestParser, ManifestParser},
    Error::NotSupported,
    Result, StorageConfig,
};

pub use bundleinfo::BundleInfo;
pub use generation::{Generation, GenerationFlags};
pub use hooks::{AttachedHook, HookFactoryId, StorageHook, StorageHookFactory};
pub use native::NativeCodeFinder;
pub use security::{DefaultSecurityAdmin, ModuleRevision, ProtectionDomain, SecurityAdmin};

use hooks::ErasedHookFactory;

/// Name of the per-bundle private data directory.
pub const BUNDLE_DATA_DIR: &str = "data";

/// Constructs the undecorated accessor for generation content.
///
/// Runs while the generation monitor is held. The same locking rules as for
/// [`BundleFileWrapperFactory`] apply.
pub trait BundleFileFactory: Send + Sync {
    /// Create the accessor for `content`.
    ///
    /// # Arguments
    /// * `content` - Location of the generation's payload
    /// * `generation` - The generation the accessor is built for
    /// * `is_directory` - `content` is an unpacked directory
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for content the backend cannot serve.
    fn create_bundle_file(
        &self,
        content: &Path,
        generation: &Generation,
        is_directory: bool,
    ) -> Result<Arc<dyn BundleFile>>;
}

/// Serves directory content with [`DirBundleFile`].
#[derive(Debug, Default)]
pub struct DefaultBundleFileFactory;

impl BundleFileFactory for DefaultBundleFileFactory {
    fn create_bundle_file(
        &self,
        content: &Path,
        _generation: &Generation,
        is_directory: bool,
    ) -> Result<Arc<dyn BundleFile>> {
        if !is_directory {
            return Err(NotSupported(format!(
                "{} is not an unpacked bundle",
                content.display()
            )));
        }
        Ok(Arc::new(DirBundleFile::new(content)?))
    }
}

/// Directory reserved for files extracted from one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractLocation {
    root: PathBuf,
    bundle_id: u64,
    generation_id: u64,
}

impl ExtractLocation {
    /// Extract location of generation `generation_id` of `bundle_id` below `root`.
    pub fn new(root: impl Into<PathBuf>, bundle_id: u64, generation_id: u64) -> Self {
        ExtractLocation {
            root: root.into(),
            bundle_id,
            generation_id,
        }
    }

    /// Physical location of the extracted entry `path`.
    ///
    /// Depends only on the bundle id, the generation id and `path`; the file is not
    /// required to exist.
    pub fn file(&self, path: &str) -> PathBuf {
        let mut relative = format!("{}/{}", self.bundle_id, self.generation_id);
        if !path.is_empty() && !path.starts_with('/') {
            relative.push('/');
        }
        relative.push_str(path);
        self.root.join(relative)
    }

    /// The generation directory itself.
    pub fn base(&self) -> PathBuf {
        self.file("")
    }
}

/// Shared context of a bundle storage area.
///
/// Created once, optionally customized with the `with_*` methods, then shared with
/// [`Storage::into_shared`]. Wrapper and hook factories may be registered at any time;
/// they apply to accessors and generations created afterwards.
pub struct Storage {
    config: StorageConfig,
    wrapper_factories: boxcar::Vec<Arc<dyn BundleFileWrapperFactory>>,
    hook_factories: boxcar::Vec<Arc<dyn ErasedHookFactory>>,
    manifest_parser: Arc<dyn ManifestParser>,
    security_admin: Arc<dyn SecurityAdmin>,
    bundle_file_factory: Arc<dyn BundleFileFactory>,
}

impl Storage {
    /// Open the storage area described by `config`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the root cannot be created. Nothing is
    /// created for a read-only storage area.
    pub fn new(config: StorageConfig) -> Result<Storage> {
        if !config.read_only {
            fs::create_dir_all(&config.root)?;
        }

        Ok(Storage {
            config,
            wrapper_factories: boxcar::Vec::new(),
            hook_factories: boxcar::Vec::new(),
            manifest_parser: Arc::new(JarManifestParser),
            security_admin: Arc::new(DefaultSecurityAdmin),
            bundle_file_factory: Arc::new(DefaultBundleFileFactory),
        })
    }

    /// Use `parser` for generation manifests.
    pub fn with_manifest_parser(mut self, parser: Arc<dyn ManifestParser>) -> Self {
        self.manifest_parser = parser;
        self
    }

    /// Use `admin` to build protection domains.
    pub fn with_security_admin(mut self, admin: Arc<dyn SecurityAdmin>) -> Self {
        self.security_admin = admin;
        self
    }

    /// Use `factory` to construct undecorated accessors.
    pub fn with_bundle_file_factory(mut self, factory: Arc<dyn BundleFileFactory>) -> Self {
        self.bundle_file_factory = factory;
        self
    }

    /// Wrap the storage for sharing between bundle records.
    pub fn into_shared(self) -> Arc<Storage> {
        Arc::new(self)
    }

    /// The configuration this storage was opened with.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns `true` if nothing may be written below the root.
    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// The parser used for generation manifests.
    pub fn manifest_parser(&self) -> &Arc<dyn ManifestParser> {
        &self.manifest_parser
    }

    /// The admin building protection domains.
    pub fn security_admin(&self) -> &Arc<dyn SecurityAdmin> {
        &self.security_admin
    }

    /// Register a decorator applied to every accessor built from now on.
    ///
    /// Factories are applied in registration order.
    pub fn register_wrapper_factory(&self, factory: Arc<dyn BundleFileWrapperFactory>) {
        self.wrapper_factories.push(factory);
    }

    /// Register a storage hook factory consulted for every generation staged from now on.
    pub fn register_hook_factory<F: StorageHookFactory>(&self, factory: F) {
        log::debug!("Registered storage hook factory {:?}", HookFactoryId::of::<F>());
        self.hook_factories.push(Arc::new(factory));
    }

    /// Physical location of the root-relative `path`.
    pub fn file(&self, path: impl AsRef<Path>) -> PathBuf {
        self.config.root.join(path)
    }

    /// Extract location of generation `generation_id` of `bundle_id`.
    pub fn extract_location(&self, bundle_id: u64, generation_id: u64) -> ExtractLocation {
        ExtractLocation::new(&self.config.root, bundle_id, generation_id)
    }

    /// Remove `path`, recursively for directories. A missing path is not an error.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if anything below `path` cannot be removed.
    pub fn delete(&self, path: &Path) -> Result<()> {
        let result = match fs::symlink_metadata(path) {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    /// Build the accessor for `content` of `generation`, decorated by every registered
    /// wrapper factory.
    ///
    /// # Arguments
    /// * `content` - Location of the payload
    /// * `generation` - The generation the accessor belongs to
    /// * `is_directory` - `content` is an unpacked directory
    /// * `is_base` - The accessor serves the generation's own content
    ///
    /// # Errors
    /// Propagates failures of the accessor backend and of the wrapper factories.
    pub fn create_bundle_file(
        &self,
        content: &Path,
        generation: &Generation,
        is_directory: bool,
        is_base: bool,
    ) -> Result<Arc<dyn BundleFile>> {
        let bundle_file =
            self.bundle_file_factory
                .create_bundle_file(content, generation, is_directory)?;
        wrap_bundle_file(
            bundle_file,
            self.wrapper_factories.iter().map(|(_, factory)| factory),
            generation,
            is_base,
        )
    }

    /// Ask every registered hook factory for a hook on `generation`.
    ///
    /// The platform bundle (id 0) never gets hooks.
    ///
    /// # Errors
    /// Propagates the first factory error.
    pub fn create_storage_hooks(&self, generation: &Generation) -> Result<Vec<AttachedHook>> {
        if generation.bundle_id() == 0 {
            return Ok(Vec::new());
        }

        let mut hooks = Vec::new();
        for (_, factory) in self.hook_factories.iter() {
            if let Some(hook) = factory.create(generation)? {
                log::trace!(
                    "{:?} attached a hook to generation {} of bundle {}",
                    factory.id(),
                    generation.generation_id(),
                    generation.bundle_id()
                );
                hooks.push(hook);
            }
        }
        Ok(hooks)
    }

    /// Create a generation of `info` holding `content`.
    ///
    /// Allocates and locks a new generation, sets its content, attaches and initializes
    /// the storage hooks and parses the manifest. The generation identifier is unlocked
    /// in every case; on failure the generation's storage is removed again.
    ///
    /// # Errors
    /// [`crate::Error::GenerationLock`] if no identifier could be locked, otherwise the
    /// first failure of the hook factories, the manifest or the hooks.
    pub fn stage_generation(
        &self,
        info: &Arc<BundleInfo>,
        content: impl AsRef<Path>,
    ) -> Result<Arc<Generation>> {
        let generation = info.create_generation()?;
        let staged = self.populate(&generation, content.as_ref());
        let unlocked = info.unlock_generation(&generation);

        match staged {
            Ok(()) => {
                unlocked?;
                Ok(generation)
            }
            Err(error) => {
                log::debug!(
                    "Discarding generation {} of bundle {}: {}",
                    generation.generation_id(),
                    info.bundle_id(),
                    error
                );
                generation.close();
                generation.delete();
                Err(error)
            }
        }
    }

    fn populate(&self, generation: &Generation, content: &Path) -> Result<()> {
        generation.set_content(content);

        let hooks = self.create_storage_hooks(generation)?;
        generation.set_storage_hooks(hooks, true);

        let headers = generation.headers()?;
        for hook in generation.storage_hooks() {
            hook.initialize(&headers)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("config", &self.config)
            .field("wrapper_factories", &self.wrapper_factories.count())
            .field("hook_factories", &self.hook_factories.count())
            .finish_non_exhaustive()
    }
}
