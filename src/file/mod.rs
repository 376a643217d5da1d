//! Content accessor abstraction for bundle generations.
//!
//! This module defines the read contract every generation payload is accessed through,
//! regardless of whether it is a directory on disk, an in-memory image or the platform
//! bundle itself, and the decoration chain that lets pluggable layers wrap an accessor
//! without changing that contract.
//!
//! # Key Components
//!
//! ## Core Types
//! - [`crate::file::BundleFile`] - Trait for generation content (entries, files, URLs)
//! - [`crate::file::BundleEntry`] - A single entry with a byte stream
//! - [`crate::file::ResourceUrl`] - URL handed out for entries and resources
//!
//! ## Accessor Implementations
//! - [`crate::file::directory::DirBundleFile`] - Directory content, entries memory-mapped on read
//! - [`crate::file::memory::MemoryBundleFile`] - In-memory content that extracts on demand
//! - [`crate::file::system::SystemBundleFile`] - The platform bundle (id 0) without content
//!
//! ## Decoration
//! - [`crate::file::chain::BundleFileWrapperChain`] - One link of a decoration chain
//! - [`crate::file::chain::BundleFileWrapperFactory`] - Produces a decorating accessor
//!
//! # Examples
//!
//! ```rust,no_run
//! use bundlestore::file::{BundleFile, DirBundleFile};
//!
//! let bundle_file = DirBundleFile::new("/opt/bundles/org.example.app")?;
//! if let Some(entry) = bundle_file.entry("META-INF/MANIFEST.MF") {
//!     println!("manifest is {} bytes", entry.size());
//! }
//! for path in bundle_file.entry_paths("OSGI-INF/") {
//!     println!("{}", path);
//! }
//! # Ok::<(), bundlestore::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! All accessors are `Send + Sync` and are shared between the generation that caches
//! them and every caller reading entries.

pub mod chain;
pub mod directory;
pub mod memory;
pub mod system;

use std::{
    fmt,
    io::Read,
    path::PathBuf,
    sync::Arc,
};

use crate::Result;

pub use chain::{BundleFileWrapperChain, BundleFileWrapperFactory, ChainLinks};
pub use directory::DirBundleFile;
pub use memory::MemoryBundleFile;
pub use system::SystemBundleFile;

/// The single recognized location of the bundle manifest.
pub const BUNDLE_MANIFEST: &str = "META-INF/MANIFEST.MF";

/// Protocol of URLs pointing at raw generation entries.
pub const ENTRY_URL_PROTOCOL: &str = "bundleentry";

/// Protocol of URLs pointing at resources found through a host bundle's class path.
pub const RESOURCE_URL_PROTOCOL: &str = "bundleresource";

/// A single entry of a generation's content.
pub trait BundleEntry: Send + Sync {
    /// Entry path relative to the content root. Directory entries end with `/`.
    fn name(&self) -> &str;

    /// Size of the entry in bytes (0 for directories).
    fn size(&self) -> u64;

    /// Opens a byte stream over the entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the backing data cannot be read.
    fn reader(&self) -> Result<Box<dyn Read + Send + '_>>;

    /// Returns `true` if the entry denotes a directory.
    fn is_directory(&self) -> bool {
        self.name().ends_with('/')
    }

    /// Reads the entire entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the backing data cannot be read.
    fn bytes(&self) -> Result<Vec<u8>> {
        let mut reader = self.reader()?;
        let mut data = Vec::with_capacity(self.size() as usize);
        reader.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Read contract over the payload of a generation.
///
/// Implementations must be thread-safe; a single accessor is cached per generation and
/// shared by every reader. [`fmt::Display`] renders the accessor for diagnostics, usually
/// as the location it serves.
pub trait BundleFile: fmt::Display + Send + Sync {
    /// Opens the accessor. Called implicitly by readers that need open backing data.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the backing data cannot be opened.
    fn open(&self) -> Result<()>;

    /// Releases resources held by the accessor. Later reads may reopen it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if releasing the backing data fails.
    fn close(&self) -> Result<()>;

    /// Returns `true` if the content contains the directory `dir`.
    fn contains_dir(&self, dir: &str) -> bool;

    /// Looks up the entry at `path`, or `None` if the content has no such entry.
    fn entry(&self, path: &str) -> Option<Arc<dyn BundleEntry>>;

    /// Lists the direct children of the directory at `path`. Directory children end with `/`.
    fn entry_paths(&self, path: &str) -> Vec<String>;

    /// Returns a physical file holding the entry at `path`, extracting it if needed.
    ///
    /// # Arguments
    /// * `path` - Entry path relative to the content root
    /// * `native_code` - The file is a native library about to be loaded
    fn file(&self, path: &str, native_code: bool) -> Option<PathBuf>;

    /// Location of the content on disk, if it has one.
    fn base_file(&self) -> Option<PathBuf>;

    /// Builds the URL under which the resource at `path` is served for a host bundle.
    ///
    /// # Arguments
    /// * `path` - Entry path relative to the content root
    /// * `host_bundle_id` - Bundle whose class path contains this content
    /// * `index` - Position of this content on the host's class path
    fn resource_url(&self, path: &str, host_bundle_id: u64, index: u32) -> Option<ResourceUrl> {
        let entry = self.entry(path)?;
        Some(ResourceUrl::new(
            RESOURCE_URL_PROTOCOL,
            host_bundle_id,
            index,
            fix_trailing_slash(path, entry.as_ref()),
        ))
    }

    /// Returns this accessor as a decoration chain link, if it is one.
    fn as_wrapper_chain(&self) -> Option<&BundleFileWrapperChain> {
        None
    }
}

/// URL handed out for generation entries and class path resources.
///
/// Renders as `<protocol>://<bundleId>:<index><path>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceUrl {
    /// [`ENTRY_URL_PROTOCOL`] or [`RESOURCE_URL_PROTOCOL`]
    pub protocol: &'static str,
    /// Bundle the URL resolves against
    pub bundle_id: u64,
    /// Class path index, 0 for plain entries
    pub index: u32,
    /// Absolute entry path, always starting with `/`
    pub path: String,
}

impl ResourceUrl {
    /// Creates a URL, normalizing `path` to start with `/`.
    pub fn new(protocol: &'static str, bundle_id: u64, index: u32, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        ResourceUrl {
            protocol,
            bundle_id,
            index,
            path,
        }
    }
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}{}",
            self.protocol, self.bundle_id, self.index, self.path
        )
    }
}

/// Makes the trailing slash of `path` agree with whether `entry` is a directory.
///
/// The returned path always starts with `/`; an empty path becomes `/`.
pub fn fix_trailing_slash(path: &str, entry: &dyn BundleEntry) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut fixed = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    let name = entry.name();
    if name.is_empty() {
        return fixed;
    }

    let path_slash = fixed.ends_with('/');
    let entry_slash = name.ends_with('/');
    if entry_slash && !path_slash {
        fixed.push('/');
    } else if !entry_slash && path_slash && fixed.len() > 1 {
        fixed.pop();
    }
    fixed
}

/// Strips leading slashes so entry lookups are always relative to the content root.
pub(crate) fn relative_path(path: &str) -> &str {
    path.trim_start_matches('/')
}
