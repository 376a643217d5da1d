//! Configuration for the bundle storage area.
//!
//! [`StorageConfig`] collects the policy values the storage layer needs: where the
//! storage root lives, whether it may be written to, the locale settings used by
//! manifest localization and the bounded wait applied when generation identifiers
//! are locked.

use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

/// Default wait for a generation identifier lock.
pub const DEFAULT_GENERATION_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default root locale; translations for it live in the base `.properties` file.
pub const DEFAULT_ROOT_LOCALE: &str = "en";

/// Configuration for a [`Storage`](crate::Storage) area.
///
/// # Examples
///
/// ```rust
/// use bundlestore::StorageConfig;
/// use std::time::Duration;
///
/// let config = StorageConfig::new("/var/lib/bundles")
///     .with_root_locale("de")
///     .with_generation_lock_timeout(Duration::from_millis(500));
///
/// assert_eq!(config.root_locale, "de");
/// assert!(!config.read_only);
/// ```
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory of the storage area. Generations live under `<root>/<bundleId>/<generationId>`.
    pub root: PathBuf,

    /// When set, nothing is created below `root` (default: false).
    pub read_only: bool,

    /// Locale whose translations are stored in the base resource file (default: `en`).
    pub root_locale: String,

    /// Locale used when callers do not ask for one (default: from `LC_ALL`/`LANG`, else `en`).
    pub default_locale: String,

    /// Bounded wait for locking a new generation identifier (default: 5 seconds).
    pub generation_lock_timeout: Duration,

    /// Manifest served by the platform bundle (id 0) when it has no content.
    pub system_manifest: String,
}

impl StorageConfig {
    /// Creates a configuration rooted at `root` with default policy values.
    pub fn new(root: impl AsRef<Path>) -> Self {
        StorageConfig {
            root: root.as_ref().to_path_buf(),
            ..StorageConfig::default()
        }
    }

    /// Mark the storage area as read-only.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the root locale used by manifest localization.
    pub fn with_root_locale(mut self, locale: impl Into<String>) -> Self {
        self.root_locale = locale.into();
        self
    }

    /// Set the locale used when no locale is requested.
    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    /// Set the bounded wait for generation identifier locks.
    pub fn with_generation_lock_timeout(mut self, timeout: Duration) -> Self {
        self.generation_lock_timeout = timeout;
        self
    }

    /// Set the manifest served for the platform bundle.
    pub fn with_system_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.system_manifest = manifest.into();
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            root: PathBuf::from("bundles"),
            read_only: false,
            root_locale: DEFAULT_ROOT_LOCALE.to_string(),
            default_locale: locale_from_env().unwrap_or_else(|| DEFAULT_ROOT_LOCALE.to_string()),
            generation_lock_timeout: DEFAULT_GENERATION_LOCK_TIMEOUT,
            system_manifest: "Manifest-Version: 1.0\nBundle-ManifestVersion: 2\nBundle-SymbolicName: system.bundle\n"
                .to_string(),
        }
    }
}

/// Reads the process locale from the POSIX environment, e.g. `de_DE.UTF-8` -> `de_DE`.
fn locale_from_env() -> Option<String> {
    ["LC_ALL", "LANG"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find_map(|value| normalize_posix_locale(&value))
}

fn normalize_posix_locale(value: &str) -> Option<String> {
    let locale = value.split(['.', '@']).next().unwrap_or_default().trim();
    if locale.is_empty() || locale == "C" || locale == "POSIX" {
        return None;
    }
    Some(locale.to_string())
}
