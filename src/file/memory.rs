//! In-memory bundle content.
//!
//! [`MemoryBundleFile`] serves entries from memory and writes an entry to the
//! generation's extract location only when a caller asks for it as a file.

use std::{
    collections::BTreeMap,
    fmt, fs,
    io::{Cursor, Read},
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use super::{relative_path, BundleEntry, BundleFile};
use crate::{storage::ExtractLocation, Result};

/// Bundle content held in memory.
///
/// Entries have no physical location of their own; [`BundleFile::file`] writes them to
/// the generation's extract location on first request and serves the extracted copy
/// afterwards.
pub struct MemoryBundleFile {
    name: String,
    entries: BTreeMap<String, Arc<[u8]>>,
    extract_to: Option<ExtractLocation>,
    extractions: AtomicUsize,
}

/// Builder for [`MemoryBundleFile`].
pub struct MemoryBundleFileBuilder {
    name: String,
    entries: BTreeMap<String, Arc<[u8]>>,
    extract_to: Option<ExtractLocation>,
}

impl MemoryBundleFileBuilder {
    /// Add a file entry at `path`.
    pub fn entry(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        self.entries
            .insert(relative_path(path).to_string(), Arc::from(data));
        self
    }

    /// Extract entries requested through [`BundleFile::file`] to `location`.
    pub fn extract_to(mut self, location: ExtractLocation) -> Self {
        self.extract_to = Some(location);
        self
    }

    /// Consume the builder.
    pub fn build(self) -> MemoryBundleFile {
        MemoryBundleFile {
            name: self.name,
            entries: self.entries,
            extract_to: self.extract_to,
            extractions: AtomicUsize::new(0),
        }
    }
}

impl MemoryBundleFile {
    /// Start building an in-memory bundle identified by `name` in diagnostics.
    pub fn builder(name: impl Into<String>) -> MemoryBundleFileBuilder {
        MemoryBundleFileBuilder {
            name: name.into(),
            entries: BTreeMap::new(),
            extract_to: None,
        }
    }

    /// Number of entries written to disk so far.
    pub fn extractions(&self) -> usize {
        self.extractions.load(Ordering::Acquire)
    }

    fn directory_prefix(path: &str) -> String {
        let path = relative_path(path);
        if path.is_empty() || path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        }
    }

    fn extract(&self, location: &ExtractLocation, path: &str, data: &[u8]) -> Option<PathBuf> {
        let target = location.file(path);
        if target.is_file() {
            return Some(target);
        }

        if let Some(parent) = target.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                log::warn!("Unable to create {}: {}", parent.display(), error);
                return None;
            }
        }

        match fs::write(&target, data) {
            Ok(()) => {
                self.extractions.fetch_add(1, Ordering::AcqRel);
                log::debug!("Extracted {} to {}", path, target.display());
                Some(target)
            }
            Err(error) => {
                log::warn!("Unable to extract {} to {}: {}", path, target.display(), error);
                None
            }
        }
    }
}

impl BundleFile for MemoryBundleFile {
    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn contains_dir(&self, dir: &str) -> bool {
        let prefix = Self::directory_prefix(dir);
        self.entries.keys().any(|name| name.starts_with(&prefix))
    }

    fn entry(&self, path: &str) -> Option<Arc<dyn BundleEntry>> {
        let relative = relative_path(path);
        if let Some(data) = self.entries.get(relative.trim_end_matches('/')) {
            if !relative.ends_with('/') {
                return Some(Arc::new(MemoryEntry {
                    name: relative.to_string(),
                    data: Arc::clone(data),
                }));
            }
        }

        if self.contains_dir(relative) {
            return Some(Arc::new(MemoryEntry {
                name: Self::directory_prefix(relative),
                data: Arc::from(Vec::new()),
            }));
        }
        None
    }

    fn entry_paths(&self, path: &str) -> Vec<String> {
        let prefix = Self::directory_prefix(path);
        let mut children: Vec<String> = Vec::new();
        for name in self.entries.keys() {
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let child = match rest.find('/') {
                Some(end) => format!("{}{}", prefix, &rest[..=end]),
                None => format!("{prefix}{rest}"),
            };
            if !children.contains(&child) {
                children.push(child);
            }
        }
        children
    }

    fn file(&self, path: &str, _native_code: bool) -> Option<PathBuf> {
        let location = self.extract_to.as_ref()?;
        let relative = relative_path(path);
        let data = self.entries.get(relative)?;
        self.extract(location, relative, data)
    }

    fn base_file(&self) -> Option<PathBuf> {
        None
    }
}

impl fmt::Display for MemoryBundleFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory:{}", self.name)
    }
}

struct MemoryEntry {
    name: String,
    data: Arc<[u8]>,
}

impl BundleEntry for MemoryEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn reader(&self) -> Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(Cursor::new(&self.data[..])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestStorage;

    fn sample() -> MemoryBundleFile {
        MemoryBundleFile::builder("sample")
            .entry("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n")
            .entry("lib/linux/libfoo.so", vec![0x7F, b'E', b'L', b'F'])
            .entry("lib/readme.txt", "native libraries")
            .entry("top.txt", "top")
            .build()
    }

    #[test]
    fn entries_and_directories() {
        let bundle_file = sample();

        assert!(bundle_file.entry("top.txt").is_some());
        assert!(bundle_file.entry("/top.txt").is_some());
        assert!(bundle_file.entry("missing.txt").is_none());

        let dir = bundle_file.entry("lib").unwrap();
        assert_eq!(dir.name(), "lib/");
        assert!(dir.is_directory());
        assert_eq!(dir.size(), 0);

        assert!(bundle_file.contains_dir("lib"));
        assert!(bundle_file.contains_dir("lib/linux/"));
        assert!(!bundle_file.contains_dir("META"));
    }

    #[test]
    fn entry_paths_lists_direct_children() {
        let bundle_file = sample();

        assert_eq!(
            bundle_file.entry_paths("lib/"),
            vec!["lib/linux/".to_string(), "lib/readme.txt".to_string()]
        );
        assert_eq!(
            bundle_file.entry_paths(""),
            vec![
                "META-INF/".to_string(),
                "lib/".to_string(),
                "top.txt".to_string()
            ]
        );
        assert!(bundle_file.entry_paths("nothing").is_empty());
    }

    #[test]
    fn file_without_extract_location() {
        let bundle_file = sample();
        assert!(bundle_file.file("top.txt", false).is_none());
        assert!(bundle_file.base_file().is_none());
        assert_eq!(bundle_file.to_string(), "memory:sample");
    }

    #[test]
    fn file_extracts_once() {
        let storage = TestStorage::new();
        let location = storage.storage.extract_location(5, 2);
        let bundle_file = MemoryBundleFile::builder("native")
            .entry("lib/linux/libfoo.so", vec![1u8, 2, 3])
            .extract_to(location.clone())
            .build();

        let first = bundle_file.file("lib/linux/libfoo.so", true).unwrap();
        let second = bundle_file.file("/lib/linux/libfoo.so", true).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, location.file("lib/linux/libfoo.so"));
        assert_eq!(fs::read(&first).unwrap(), vec![1, 2, 3]);
        assert_eq!(bundle_file.extractions(), 1);
        assert!(bundle_file.file("lib/linux/missing.so", true).is_none());
    }
}
