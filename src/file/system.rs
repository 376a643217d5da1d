//! Content accessor of the platform bundle.

use std::{
    fmt,
    io::{Cursor, Read},
    path::PathBuf,
    sync::Arc,
};

use super::{relative_path, BundleEntry, BundleFile, BUNDLE_MANIFEST};
use crate::Result;

/// Accessor for the platform bundle (id 0) when it has no content of its own.
///
/// The only entry it serves is the platform manifest taken from the storage
/// configuration; everything else is reported missing.
pub struct SystemBundleFile {
    manifest: Arc<[u8]>,
}

impl SystemBundleFile {
    /// Create the platform accessor serving `manifest`.
    pub fn new(manifest: impl Into<Vec<u8>>) -> Self {
        let manifest: Vec<u8> = manifest.into();
        SystemBundleFile {
            manifest: Arc::from(manifest),
        }
    }
}

impl BundleFile for SystemBundleFile {
    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn contains_dir(&self, dir: &str) -> bool {
        relative_path(dir).trim_end_matches('/') == "META-INF"
    }

    fn entry(&self, path: &str) -> Option<Arc<dyn BundleEntry>> {
        if relative_path(path) != BUNDLE_MANIFEST {
            return None;
        }
        Some(Arc::new(SystemEntry {
            data: Arc::clone(&self.manifest),
        }))
    }

    fn entry_paths(&self, path: &str) -> Vec<String> {
        match relative_path(path).trim_end_matches('/') {
            "" => vec!["META-INF/".to_string()],
            "META-INF" => vec![BUNDLE_MANIFEST.to_string()],
            _ => Vec::new(),
        }
    }

    fn file(&self, _path: &str, _native_code: bool) -> Option<PathBuf> {
        None
    }

    fn base_file(&self) -> Option<PathBuf> {
        None
    }
}

impl fmt::Display for SystemBundleFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system")
    }
}

struct SystemEntry {
    data: Arc<[u8]>,
}

impl BundleEntry for SystemEntry {
    fn name(&self) -> &str {
        BUNDLE_MANIFEST
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn reader(&self) -> Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(Cursor::new(&self.data[..])))
    }
}
