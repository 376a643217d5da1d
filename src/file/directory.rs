//! Directory backed bundle content.
//!
//! [`DirBundleFile`] serves a generation whose content is an unpacked directory. Entry
//! data is memory-mapped when a reader is opened, the same way large inputs are accessed
//! elsewhere in the crate, so reading a manifest or translation file does not copy the
//! whole file up front.

use std::{
    fmt, fs,
    io::{Cursor, Read},
    path::{Path, PathBuf},
    sync::Arc,
};

use memmap2::Mmap;

use super::{relative_path, BundleEntry, BundleFile};
use crate::{Error::NotSupported, Result};

/// Bundle content stored as a directory on disk.
#[derive(Debug)]
pub struct DirBundleFile {
    base: PathBuf,
}

impl DirBundleFile {
    /// Create an accessor over the directory at `base`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if `base` cannot be inspected or
    /// [`crate::Error::NotSupported`] if it is not a directory.
    pub fn new(base: impl AsRef<Path>) -> Result<DirBundleFile> {
        let base = base.as_ref();
        if !fs::metadata(base)?.is_dir() {
            return Err(NotSupported(format!(
                "{} is not a directory",
                base.display()
            )));
        }

        Ok(DirBundleFile {
            base: base.to_path_buf(),
        })
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = relative_path(path);
        // Entries never escape the content root
        if relative.split('/').any(|segment| segment == "..") {
            return None;
        }
        Some(self.base.join(relative))
    }
}

impl BundleFile for DirBundleFile {
    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn contains_dir(&self, dir: &str) -> bool {
        self.resolve(dir).is_some_and(|path| path.is_dir())
    }

    fn entry(&self, path: &str) -> Option<Arc<dyn BundleEntry>> {
        let physical = self.resolve(path)?;
        let metadata = fs::metadata(&physical).ok()?;
        let relative = relative_path(path);

        if metadata.is_dir() {
            let name = if relative.is_empty() || relative.ends_with('/') {
                relative.to_string()
            } else {
                format!("{relative}/")
            };
            return Some(Arc::new(FileEntry {
                name,
                path: physical,
                size: 0,
            }));
        }

        if relative.ends_with('/') {
            return None;
        }
        Some(Arc::new(FileEntry {
            name: relative.to_string(),
            path: physical,
            size: metadata.len(),
        }))
    }

    fn entry_paths(&self, path: &str) -> Vec<String> {
        let Some(dir) = self.resolve(path) else {
            return Vec::new();
        };
        let Ok(read_dir) = fs::read_dir(&dir) else {
            return Vec::new();
        };

        let prefix = relative_path(path);
        let prefix = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };

        let mut children: Vec<String> = read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                match entry.file_type() {
                    Ok(kind) if kind.is_dir() => format!("{prefix}{name}/"),
                    _ => format!("{prefix}{name}"),
                }
            })
            .collect();
        children.sort();
        children
    }

    fn file(&self, path: &str, _native_code: bool) -> Option<PathBuf> {
        self.resolve(path).filter(|physical| physical.exists())
    }

    fn base_file(&self) -> Option<PathBuf> {
        Some(self.base.clone())
    }
}

impl fmt::Display for DirBundleFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base.display())
    }
}

/// An entry of a [`DirBundleFile`], read through a memory map.
#[derive(Debug)]
struct FileEntry {
    name: String,
    path: PathBuf,
    size: u64,
}

impl BundleEntry for FileEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn reader(&self) -> Result<Box<dyn Read + Send + '_>> {
        let file = fs::File::open(&self.path)?;
        if file.metadata()?.len() == 0 {
            // Zero-length files cannot be mapped
            return Ok(Box::new(std::io::empty()));
        }

        let mmap = unsafe { Mmap::map(&file) }?;
        Ok(Box::new(Cursor::new(mmap)))
    }
}
