//! Decoration chains over bundle content accessors.
//!
//! Wrapper factories registered with a [`Storage`](crate::Storage) may decorate the
//! accessor of every generation, for example to verify signatures or to patch entries.
//! Each decoration is recorded as a [`BundleFileWrapperChain`] link so the applied layers
//! can be walked from the outermost accessor down to the undecorated one.
//!
//! # Chain Shape
//!
//! With factories `A` then `B` decorating an accessor `base`:
//!
//! ```text
//! link(B) --next--> link(A) --next--> link(base) --next--> none
//!   |                 |                 |
//!   wrapped: B        wrapped: A        wrapped: base
//! ```
//!
//! `B` decorates `link(A)` and `A` decorates `base`, so a read on the outermost link
//! passes through every layer before it reaches `base`. A generation stores the
//! outermost link, or the bare accessor when no factory decorated it.

use std::{fmt, path::PathBuf, sync::Arc};

use super::{BundleEntry, BundleFile, ResourceUrl};
use crate::{storage::Generation, Result};

/// Produces decorating accessors for generation content.
///
/// # Locking
///
/// Factories run while the generation monitor is held, and that monitor is not
/// reentrant. Use only the identity and content queries of the generation
/// ([`Generation::bundle_id`], [`Generation::generation_id`], [`Generation::content`],
/// [`Generation::flags`], [`Generation::extract_location`]). Calling
/// [`Generation::headers`], [`Generation::bundle_file`] or any other monitor-guarded
/// accessor of the same generation deadlocks.
pub trait BundleFileWrapperFactory: Send + Sync {
    /// Optionally decorate `bundle_file`.
    ///
    /// # Arguments
    /// * `bundle_file` - The current outermost accessor
    /// * `generation` - The generation the accessor is built for
    /// * `is_base` - `true` for the generation's own content, `false` for nested class path content
    ///
    /// # Returns
    /// The decorating accessor, or `None` to leave `bundle_file` undecorated.
    ///
    /// # Errors
    /// A failing factory aborts construction of the accessor.
    fn wrap_bundle_file(
        &self,
        bundle_file: Arc<dyn BundleFile>,
        generation: &Generation,
        is_base: bool,
    ) -> Result<Option<Arc<dyn BundleFile>>>;
}

/// One link of a decoration chain.
///
/// Every [`BundleFile`] operation is delegated verbatim to [`wrapped`](Self::wrapped).
pub struct BundleFileWrapperChain {
    wrapped: Arc<dyn BundleFile>,
    next: Option<Arc<BundleFileWrapperChain>>,
}

impl BundleFileWrapperChain {
    /// Create a link around `wrapped`, continuing with `next`.
    pub fn new(wrapped: Arc<dyn BundleFile>, next: Option<Arc<BundleFileWrapperChain>>) -> Self {
        BundleFileWrapperChain { wrapped, next }
    }

    /// The accessor this link delegates to.
    pub fn wrapped(&self) -> &Arc<dyn BundleFile> {
        &self.wrapped
    }

    /// The next link toward the undecorated accessor, `None` at the end of the chain.
    pub fn next(&self) -> Option<&Arc<BundleFileWrapperChain>> {
        self.next.as_ref()
    }

    /// Iterate over this link and every link after it.
    pub fn links(&self) -> ChainLinks<'_> {
        ChainLinks {
            current: Some(self),
        }
    }

    /// Number of links from this one to the end of the chain.
    pub fn depth(&self) -> usize {
        self.links().count()
    }

    /// The accessor wrapped by the last link, i.e. the undecorated content.
    pub fn innermost(&self) -> &Arc<dyn BundleFile> {
        let mut last = self;
        while let Some(next) = last.next.as_deref() {
            last = next;
        }
        &last.wrapped
    }
}

/// Iterator over the links of a [`BundleFileWrapperChain`], outermost first.
pub struct ChainLinks<'a> {
    current: Option<&'a BundleFileWrapperChain>,
}

impl<'a> Iterator for ChainLinks<'a> {
    type Item = &'a BundleFileWrapperChain;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.current?;
        self.current = link.next.as_deref();
        Some(link)
    }
}

impl BundleFile for BundleFileWrapperChain {
    fn open(&self) -> Result<()> {
        self.wrapped.open()
    }

    fn close(&self) -> Result<()> {
        self.wrapped.close()
    }

    fn contains_dir(&self, dir: &str) -> bool {
        self.wrapped.contains_dir(dir)
    }

    fn entry(&self, path: &str) -> Option<Arc<dyn BundleEntry>> {
        self.wrapped.entry(path)
    }

    fn entry_paths(&self, path: &str) -> Vec<String> {
        self.wrapped.entry_paths(path)
    }

    fn file(&self, path: &str, native_code: bool) -> Option<PathBuf> {
        self.wrapped.file(path, native_code)
    }

    fn base_file(&self) -> Option<PathBuf> {
        self.wrapped.base_file()
    }

    fn resource_url(&self, path: &str, host_bundle_id: u64, index: u32) -> Option<ResourceUrl> {
        self.wrapped.resource_url(path, host_bundle_id, index)
    }

    fn as_wrapper_chain(&self) -> Option<&BundleFileWrapperChain> {
        Some(self)
    }
}

impl fmt::Display for BundleFileWrapperChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.wrapped, f)
    }
}

/// Apply `factories` in order to `bundle_file` and return the outermost accessor.
///
/// Factories that return `None`, or hand back the accessor they were given, add no link.
///
/// # Errors
/// Propagates the first factory error.
pub fn wrap_bundle_file<'a, I>(
    bundle_file: Arc<dyn BundleFile>,
    factories: I,
    generation: &Generation,
    is_base: bool,
) -> Result<Arc<dyn BundleFile>>
where
    I: IntoIterator<Item = &'a Arc<dyn BundleFileWrapperFactory>>,
{
    let mut outermost = Arc::clone(&bundle_file);
    let mut chain: Option<Arc<BundleFileWrapperChain>> = None;

    for factory in factories {
        let Some(wrapper) =
            factory.wrap_bundle_file(Arc::clone(&outermost), generation, is_base)?
        else {
            continue;
        };
        if same_accessor(&wrapper, &outermost) {
            continue;
        }

        let next = chain.take().unwrap_or_else(|| {
            Arc::new(BundleFileWrapperChain::new(Arc::clone(&bundle_file), None))
        });
        let link = Arc::new(BundleFileWrapperChain::new(wrapper, Some(next)));
        outermost = Arc::clone(&link) as Arc<dyn BundleFile>;
        chain = Some(link);
    }

    if let Some(chain) = &chain {
        log::debug!(
            "Decorated {} with {} wrapper(s)",
            bundle_file,
            chain.depth() - 1
        );
    }
    Ok(outermost)
}

fn same_accessor(a: &Arc<dyn BundleFile>, b: &Arc<dyn BundleFile>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        file::MemoryBundleFile,
        test::{CountingWrapper, CountingWrapperFactory, TestStorage},
    };
    use std::sync::atomic::Ordering;

    fn base() -> Arc<dyn BundleFile> {
        Arc::new(
            MemoryBundleFile::builder("base")
                .entry("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n")
                .entry("a/b.txt", "b")
                .build(),
        )
    }

    #[test]
    fn link_delegates_to_wrapped() {
        let base = base();
        let link = BundleFileWrapperChain::new(Arc::clone(&base), None);

        assert!(link.entry("a/b.txt").is_some());
        assert!(link.contains_dir("a"));
        assert_eq!(link.entry_paths("a"), vec!["a/b.txt".to_string()]);
        assert!(link.file("a/b.txt", false).is_none());
        assert!(link.base_file().is_none());
        assert!(link.open().is_ok());
        assert!(link.close().is_ok());
        assert_eq!(
            link.resource_url("a/b.txt", 1, 0).unwrap().to_string(),
            "bundleresource://1:0/a/b.txt"
        );
        assert_eq!(link.to_string(), "memory:base");
        assert!(link.next().is_none());
        assert!(Arc::ptr_eq(link.wrapped(), &base));
        assert!(link.as_wrapper_chain().is_some());
    }

    #[test]
    fn no_factories_leaves_accessor_bare() {
        let storage = TestStorage::new();
        let generation = storage.generation(1);
        let base = base();

        let factories: Vec<Arc<dyn BundleFileWrapperFactory>> = Vec::new();
        let wrapped = wrap_bundle_file(Arc::clone(&base), &factories, &generation, true).unwrap();

        assert!(same_accessor(&wrapped, &base));
        assert!(wrapped.as_wrapper_chain().is_none());
    }

    #[test]
    fn declining_factory_adds_no_link() {
        let storage = TestStorage::new();
        let generation = storage.generation(1);
        let base = base();

        let factories: Vec<Arc<dyn BundleFileWrapperFactory>> =
            vec![Arc::new(CountingWrapperFactory::declining())];
        let wrapped = wrap_bundle_file(Arc::clone(&base), &factories, &generation, true).unwrap();

        assert!(same_accessor(&wrapped, &base));
    }

    #[test]
    fn chain_records_decoration_order() {
        let storage = TestStorage::new();
        let generation = storage.generation(1);
        let base = base();

        let first = Arc::new(CountingWrapperFactory::new("first"));
        let second = Arc::new(CountingWrapperFactory::new("second"));
        let factories: Vec<Arc<dyn BundleFileWrapperFactory>> =
            vec![first.clone(), second.clone()];
        let wrapped = wrap_bundle_file(Arc::clone(&base), &factories, &generation, true).unwrap();

        let chain = wrapped.as_wrapper_chain().unwrap();
        assert_eq!(chain.depth(), 3);
        assert!(Arc::ptr_eq(chain.innermost(), &base));

        let labels: Vec<String> = chain.links().map(|link| link.wrapped().to_string()).collect();
        assert_eq!(
            labels,
            vec![
                "second(first(memory:base))".to_string(),
                "first(memory:base)".to_string(),
                "memory:base".to_string()
            ]
        );

        // A read on the outermost link passes through both decorations once
        assert!(wrapped.entry("a/b.txt").is_some());
        assert_eq!(first.wrapper().unwrap().reads.load(Ordering::SeqCst), 1);
        assert_eq!(second.wrapper().unwrap().reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_factory_aborts() {
        let storage = TestStorage::new();
        let generation = storage.generation(1);

        let factories: Vec<Arc<dyn BundleFileWrapperFactory>> =
            vec![Arc::new(CountingWrapperFactory::failing())];
        assert!(wrap_bundle_file(base(), &factories, &generation, true).is_err());
    }

    #[test]
    fn counting_wrapper_is_transparent() {
        let wrapper = CountingWrapper::new("solo", base());
        assert_eq!(wrapper.entry_paths("").len(), 2);
        assert_eq!(wrapper.reads.load(Ordering::SeqCst), 1);
    }
}
