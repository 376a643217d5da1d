//! Bundle manifest headers, parsing and the package-info scan.
//!
//! # Key Components
//!
//! - [`Headers`] - Ordered manifest headers with case-insensitive lookup
//! - [`ManifestParser`] - Turns a manifest byte stream into [`Headers`]
//! - [`JarManifestParser`] - The default `Key: value` parser with continuation lines
//! - [`has_package_info`] - Cheap line scan for package versioning headers
//! - [`localization::ManifestLocalization`] - Per-locale translation of header values
//!
//! # Examples
//!
//! ```rust
//! use bundlestore::manifest::{JarManifestParser, ManifestParser};
//!
//! let mut input = "Bundle-SymbolicName: org.example\nBundle-Version: 1.2.0\n".as_bytes();
//! let headers = JarManifestParser.parse(&mut input)?;
//!
//! assert_eq!(headers.get("bundle-symbolicname"), Some("org.example"));
//! assert_eq!(headers.len(), 2);
//! # Ok::<(), bundlestore::Error>(())
//! ```

pub mod localization;

use std::io::{BufRead, BufReader, Read};

use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::{
    file::{BundleFile, BUNDLE_MANIFEST},
    Result,
};

pub use localization::{ManifestLocalization, ResourceBundle};

/// Header naming the base path of the bundle's translation files.
pub const BUNDLE_LOCALIZATION: &str = "Bundle-Localization";

/// Header declaring the bundle's native libraries.
pub const BUNDLE_NATIVECODE: &str = "Bundle-NativeCode";

/// Shortest manifest line that can carry a package-info header.
const MIN_PACKAGE_INFO_LINE: usize = 20;

/// Ordered manifest headers.
///
/// Keys compare case-insensitively, the original spelling and order are preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header set.
    pub fn new() -> Self {
        Headers::default()
    }

    /// Look up the value of `key`, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key)
            .map(|index| self.entries[index].1.as_str())
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Add a header that must not be present yet.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `key` is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if self.contains_key(&key) {
            return Err(malformed_error!("Duplicate manifest header: {}", key));
        }
        self.entries.push((key, value.into()));
        Ok(())
    }

    /// Add or replace a header, keeping the position of a replaced one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(index) => self.entries[index].1 = value.into(),
            None => self.entries.push((key, value.into())),
        }
    }

    /// Iterate over `(key, value)` pairs in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(key))
    }
}

/// Parses a manifest byte stream into [`Headers`].
pub trait ManifestParser: Send + Sync {
    /// Parse the manifest read from `input`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for structurally invalid manifests and
    /// [`crate::Error::FileError`] if `input` cannot be read.
    fn parse(&self, input: &mut dyn Read) -> Result<Headers>;
}

/// Parser for the `Key: value` manifest format.
///
/// Only the main section is read: parsing stops at the first empty line after a header.
/// Lines starting with a single space continue the previous value.
#[derive(Debug, Default, Clone, Copy)]
pub struct JarManifestParser;

impl ManifestParser for JarManifestParser {
    fn parse(&self, input: &mut dyn Read) -> Result<Headers> {
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;
        let text = String::from_utf8(data)
            .map_err(|error| malformed_error!("Manifest is not valid UTF-8: {}", error))?;

        let mut headers = Headers::new();
        let mut current: Option<(String, String)> = None;

        for (number, line) in text.lines().enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);

            if line.is_empty() {
                if current.is_some() || !headers.is_empty() {
                    break;
                }
                continue;
            }

            if let Some(continuation) = line.strip_prefix(' ') {
                match current.as_mut() {
                    Some((_, value)) => value.push_str(continuation),
                    None => {
                        return Err(malformed_error!(
                            "Continuation without a header on line {}",
                            number + 1
                        ))
                    }
                }
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                return Err(malformed_error!(
                    "Missing ':' in manifest line {}: {}",
                    number + 1,
                    line
                ));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(malformed_error!("Empty header name on line {}", number + 1));
            }

            if let Some((key, value)) = current.take() {
                headers.insert(key, value)?;
            }
            current = Some((key.to_string(), value.trim_start().to_string()));
        }

        if let Some((key, value)) = current {
            headers.insert(key, value)?;
        }
        Ok(headers)
    }
}

/// Manifest headers whose presence means the manifest carries package versioning data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum PackageInfoHeader {
    /// `Specification-Title`
    #[strum(serialize = "Specification-Title")]
    SpecificationTitle,
    /// `Specification-Version`
    #[strum(serialize = "Specification-Version")]
    SpecificationVersion,
    /// `Specification-Vendor`
    #[strum(serialize = "Specification-Vendor")]
    SpecificationVendor,
    /// `Implementation-Title`
    #[strum(serialize = "Implementation-Title")]
    ImplementationTitle,
    /// `Implementation-Version`
    #[strum(serialize = "Implementation-Version")]
    ImplementationVersion,
    /// `Implementation-Vendor`
    #[strum(serialize = "Implementation-Vendor")]
    ImplementationVendor,
}

impl PackageInfoHeader {
    /// The header name.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Returns `true` if `line` declares this header (`Name: value`).
    pub fn matches(self, line: &str) -> bool {
        line.strip_prefix(self.name())
            .is_some_and(|rest| rest.starts_with(": "))
    }
}

/// Returns `true` if the manifest of `bundle_file` declares package versioning headers.
///
/// This is a line scan, not a manifest parse. A missing accessor, a missing manifest
/// or any read failure all count as "not found".
pub fn has_package_info(bundle_file: Option<&dyn BundleFile>) -> bool {
    let Some(bundle_file) = bundle_file else {
        return false;
    };
    let Some(manifest) = bundle_file.entry(BUNDLE_MANIFEST) else {
        return false;
    };
    let found = match manifest.reader() {
        Ok(reader) => scan_package_info(BufReader::new(reader)),
        Err(error) => {
            log::debug!("Unable to read manifest of {}: {}", bundle_file, error);
            false
        }
    };
    found
}

/// Scan manifest lines from `reader` for package versioning headers.
///
/// Lines end at `\n`, `\r` or `\r\n`; bytes that are not valid UTF-8 are replaced
/// and the scan goes on. Lines shorter than 20 bytes are skipped. An I/O error ends
/// the scan with `false`.
pub fn scan_package_info<R: BufRead>(mut reader: R) -> bool {
    let mut chunk = Vec::new();
    loop {
        chunk.clear();
        match reader.read_until(b'\n', &mut chunk) {
            Ok(0) => return false,
            Ok(_) => {}
            Err(error) => {
                log::debug!("Package info scan aborted: {}", error);
                return false;
            }
        }

        if chunk.last() == Some(&b'\n') {
            chunk.pop();
        }
        if chunk
            .split(|byte| *byte == b'\r')
            .any(|line| is_package_info_line(&String::from_utf8_lossy(line)))
        {
            return true;
        }
    }
}

fn is_package_info_line(line: &str) -> bool {
    if line.len() < MIN_PACKAGE_INFO_LINE {
        return false;
    }

    let Some(first) = line.chars().next() else {
        return false;
    };
    if first != 'S' && first != 'I' {
        return false;
    }

    PackageInfoHeader::iter()
        .filter(|header| header.name().starts_with(first))
        .any(|header| header.matches(line))
}
