//! Shared fixtures for unit tests.
//!
//! - [`TestStorage`] - A storage area in a temporary directory whose generations are served
//!   from in-memory content registered with [`TestStorage::content`]
//! - [`CountingWrapperFactory`] - A wrapper factory whose wrappers count delegated calls
//! - [`NamingHookFactory`] - A storage hook factory recording the bundle symbolic name

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use tempfile::TempDir;

use crate::{
    file::{BundleEntry, BundleFile, BundleFileWrapperFactory, MemoryBundleFile, ResourceUrl},
    manifest::Headers,
    storage::{
        BundleFileFactory, BundleInfo, DefaultBundleFileFactory, Generation, StorageHook,
        StorageHookFactory,
    },
    Error, Result, Storage, StorageConfig,
};

/// Install a test logger once per process.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Render a manifest with `Manifest-Version: 1.0` followed by `headers`.
pub fn manifest(headers: &[(&str, &str)]) -> String {
    let mut manifest = String::from("Manifest-Version: 1.0\n");
    for (key, value) in headers {
        manifest.push_str(&format!("{key}: {value}\n"));
    }
    manifest
}

/// Accessor backend serving registered in-memory content.
///
/// Content locations that were not registered go to the default backend.
#[derive(Default)]
pub struct MemoryContents {
    entries: Mutex<HashMap<PathBuf, (String, Vec<(String, Vec<u8>)>)>>,
    built: Mutex<Vec<Arc<MemoryBundleFile>>>,
}

impl MemoryContents {
    /// Number of in-memory accessors built so far.
    pub fn created(&self) -> usize {
        lock!(self.built).len()
    }

    /// Entries extracted to disk by all accessors built so far.
    pub fn extractions(&self) -> usize {
        lock!(self.built)
            .iter()
            .map(|bundle_file| bundle_file.extractions())
            .sum()
    }
}

impl BundleFileFactory for MemoryContents {
    fn create_bundle_file(
        &self,
        content: &Path,
        generation: &Generation,
        is_directory: bool,
    ) -> Result<Arc<dyn BundleFile>> {
        let registered = lock!(self.entries).get(content).cloned();
        let Some((name, entries)) = registered else {
            return DefaultBundleFileFactory.create_bundle_file(content, generation, is_directory);
        };

        let mut builder =
            MemoryBundleFile::builder(name).extract_to(generation.extract_location());
        for (path, data) in entries {
            builder = builder.entry(&path, data);
        }

        let bundle_file = Arc::new(builder.build());
        lock!(self.built).push(Arc::clone(&bundle_file));
        Ok(bundle_file)
    }
}

/// A storage area in a temporary directory.
pub struct TestStorage {
    /// The storage under test
    pub storage: Arc<Storage>,
    /// The in-memory accessor backend of `storage`
    pub contents: Arc<MemoryContents>,
    root: TempDir,
}

impl TestStorage {
    /// Storage with default configuration.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Storage with a configuration adjusted by `configure`.
    pub fn with_config(configure: impl FnOnce(StorageConfig) -> StorageConfig) -> Self {
        init_logging();

        let root = tempfile::tempdir().unwrap();
        let config = configure(
            StorageConfig::new(root.path())
                .with_default_locale("en")
                .with_generation_lock_timeout(std::time::Duration::from_secs(5)),
        );
        let contents = Arc::new(MemoryContents::default());
        let storage = Storage::new(config)
            .unwrap()
            .with_bundle_file_factory(contents.clone())
            .into_shared();

        TestStorage {
            storage,
            contents,
            root,
        }
    }

    /// Register in-memory content named `name` and return its content location.
    pub fn content(&self, name: &str, entries: &[(&str, &str)]) -> PathBuf {
        let location = self.root.path().join("content").join(name);
        let entries = entries
            .iter()
            .map(|(path, data)| (path.to_string(), data.as_bytes().to_vec()))
            .collect();
        lock!(self.contents.entries).insert(location.clone(), (name.to_string(), entries));
        location
    }

    /// A restored generation 0 of `bundle_id` without content.
    pub fn generation(&self, bundle_id: u64) -> Arc<Generation> {
        BundleInfo::new(self.storage.clone(), bundle_id, 0).restore_generation(0, None, false, false)
    }
}

enum WrapMode {
    Wrap(&'static str),
    Decline,
    Fail,
}

/// Wrapper factory producing [`CountingWrapper`]s.
pub struct CountingWrapperFactory {
    mode: WrapMode,
    last: Mutex<Option<Arc<CountingWrapper>>>,
}

impl CountingWrapperFactory {
    /// Factory wrapping every accessor in a wrapper labelled `label`.
    pub fn new(label: &'static str) -> Self {
        Self::with_mode(WrapMode::Wrap(label))
    }

    /// Factory that never decorates.
    pub fn declining() -> Self {
        Self::with_mode(WrapMode::Decline)
    }

    /// Factory that always fails.
    pub fn failing() -> Self {
        Self::with_mode(WrapMode::Fail)
    }

    fn with_mode(mode: WrapMode) -> Self {
        CountingWrapperFactory {
            mode,
            last: Mutex::new(None),
        }
    }

    /// The wrapper created last.
    pub fn wrapper(&self) -> Option<Arc<CountingWrapper>> {
        lock!(self.last).clone()
    }
}

impl BundleFileWrapperFactory for CountingWrapperFactory {
    fn wrap_bundle_file(
        &self,
        bundle_file: Arc<dyn BundleFile>,
        _generation: &Generation,
        _is_base: bool,
    ) -> Result<Option<Arc<dyn BundleFile>>> {
        match self.mode {
            WrapMode::Wrap(label) => {
                let wrapper = Arc::new(CountingWrapper::new(label, bundle_file));
                *lock!(self.last) = Some(Arc::clone(&wrapper));
                Ok(Some(wrapper))
            }
            WrapMode::Decline => Ok(None),
            WrapMode::Fail => Err(Error::Error("wrapper factory failed".to_string())),
        }
    }
}

/// Transparent decorator counting the calls it delegates.
pub struct CountingWrapper {
    label: &'static str,
    inner: Arc<dyn BundleFile>,
    /// Number of delegated calls
    pub reads: AtomicUsize,
}

impl CountingWrapper {
    /// Wrap `inner`.
    pub fn new(label: &'static str, inner: Arc<dyn BundleFile>) -> Self {
        CountingWrapper {
            label,
            inner,
            reads: AtomicUsize::new(0),
        }
    }

    fn hop(&self) -> &Arc<dyn BundleFile> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        &self.inner
    }
}

impl BundleFile for CountingWrapper {
    fn open(&self) -> Result<()> {
        self.hop().open()
    }

    fn close(&self) -> Result<()> {
        self.hop().close()
    }

    fn contains_dir(&self, dir: &str) -> bool {
        self.hop().contains_dir(dir)
    }

    fn entry(&self, path: &str) -> Option<Arc<dyn BundleEntry>> {
        self.hop().entry(path)
    }

    fn entry_paths(&self, path: &str) -> Vec<String> {
        self.hop().entry_paths(path)
    }

    fn file(&self, path: &str, native_code: bool) -> Option<PathBuf> {
        self.hop().file(path, native_code)
    }

    fn base_file(&self) -> Option<PathBuf> {
        self.hop().base_file()
    }

    fn resource_url(&self, path: &str, host_bundle_id: u64, index: u32) -> Option<ResourceUrl> {
        self.hop().resource_url(path, host_bundle_id, index)
    }
}

impl fmt::Display for CountingWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label, self.inner)
    }
}

/// Storage hook remembering the symbolic name of its bundle.
#[derive(Default)]
pub struct NamingHook {
    name: Mutex<Option<String>>,
}

impl NamingHook {
    /// The symbolic name seen by [`StorageHook::initialize`].
    pub fn name(&self) -> Option<String> {
        lock!(self.name).clone()
    }
}

impl StorageHook for NamingHook {
    fn initialize(&self, headers: &Headers) -> Result<()> {
        *lock!(self.name) = headers.get("Bundle-SymbolicName").map(str::to_string);
        Ok(())
    }
}

/// Attaches a [`NamingHook`] to every generation.
pub struct NamingHookFactory;

impl StorageHookFactory for NamingHookFactory {
    type Hook = NamingHook;

    fn create_hook(&self, _generation: &Generation) -> Result<Option<NamingHook>> {
        Ok(Some(NamingHook::default()))
    }
}
