//! Native library lookup for a generation.
//!
//! The `Bundle-NativeCode` header lists native libraries as clauses separated by `,`.
//! Each clause holds one or more paths and optional `name=value` attributes, all
//! separated by `;`. A trailing `*` clause marks the header as optional and carries no
//! paths.
//!
//! ```text
//! Bundle-NativeCode: lib/linux/libhttp.so; osname=Linux,
//!   lib/win32/http.dll; osname=Win32, *
//! ```

use std::{
    env::consts::{DLL_PREFIX, DLL_SUFFIX},
    fmt,
    path::PathBuf,
    sync::Arc,
};

use dashmap::DashMap;

use crate::{
    file::BundleFile,
    manifest::{Headers, BUNDLE_NATIVECODE},
};

/// Resolves library names to extracted native files of one generation.
pub struct NativeCodeFinder {
    bundle_file: Arc<dyn BundleFile>,
    paths: Vec<String>,
    resolved: DashMap<String, Option<PathBuf>>,
}

impl NativeCodeFinder {
    /// Create a finder over the native code declared in `headers`.
    pub fn new(bundle_file: Arc<dyn BundleFile>, headers: &Headers) -> Self {
        let paths = headers
            .get(BUNDLE_NATIVECODE)
            .map(native_code_paths)
            .unwrap_or_default();

        NativeCodeFinder {
            bundle_file,
            paths,
            resolved: DashMap::new(),
        }
    }

    /// Declared native library paths, in header order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Find the file of the library `name` (`http` for `libhttp.so` on Linux).
    ///
    /// The declared path is extracted through the generation's accessor on first lookup.
    /// Lookups are cached per name; concurrent first lookups extract once.
    pub fn find_library(&self, name: &str) -> Option<PathBuf> {
        self.resolved
            .entry(name.to_string())
            .or_insert_with(|| self.lookup(name))
            .value()
            .clone()
    }

    fn lookup(&self, name: &str) -> Option<PathBuf> {
        let mapped = map_library_name(name);
        let path = self
            .paths
            .iter()
            .find(|path| library_file_name(path) == mapped)?;

        let file = self.bundle_file.file(path, true);
        match &file {
            Some(file) => log::debug!("Resolved native library {} to {}", name, file.display()),
            None => log::debug!(
                "Native library {} declared at {} is missing from {}",
                name,
                path,
                self.bundle_file
            ),
        }
        file
    }
}

impl fmt::Debug for NativeCodeFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCodeFinder")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

/// Platform file name of the library `name`.
pub fn map_library_name(name: &str) -> String {
    format!("{DLL_PREFIX}{name}{DLL_SUFFIX}")
}

/// Paths declared by a `Bundle-NativeCode` value.
pub fn native_code_paths(value: &str) -> Vec<String> {
    value
        .split(',')
        .flat_map(|clause| clause.split(';'))
        .map(|item| item.trim().trim_matches('"'))
        .filter(|item| !item.is_empty() && *item != "*" && !item.contains('='))
        .map(str::to_string)
        .collect()
}

fn library_file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
