// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'file/directory.rs' uses mmap to map entries into memory

//! # bundlestore
//!
//! Versioned on-disk storage for the bundles of a modular runtime. Every installed bundle
//! owns a sequence of content revisions ("generations"); `bundlestore` allocates and
//! serializes generation identifiers, lays generations out below a storage root and
//! derives the expensive per-generation state (content accessor, manifest headers,
//! translations, protection domain, native libraries) exactly once, on first use.
//!
//! ## Features
//!
//! - **Safe identifier allocation** - Generation ids are unique per bundle, creation of one
//!   id is serialized with a bounded wait
//! - **Compute-once caches** - Derived state is built at most once per generation, even
//!   under concurrent first access
//! - **Decoration chains** - Pluggable wrapper factories decorate content accessors while
//!   the applied layers stay traceable
//! - **Storage hooks** - Extension state attached to generations at install time and looked
//!   up by factory type
//!
//! ## Quick Start
//!
//! ### Using the Prelude
//!
//! ```rust,no_run
//! use bundlestore::prelude::*;
//!
//! let storage = Storage::new(StorageConfig::new("/var/lib/bundles"))?.into_shared();
//! let info = BundleInfo::new(storage.clone(), 12, 0);
//!
//! let generation = storage.stage_generation(&info, "/opt/bundles/org.example.app")?;
//! let headers = generation.localized_headers(Some("de"))?;
//! println!("Installed {:?}", headers.get("Bundle-Name"));
//! # Ok::<(), bundlestore::Error>(())
//! ```
//!
//! ### Step by Step
//!
//! ```rust,no_run
//! use bundlestore::{BundleInfo, Storage, StorageConfig};
//!
//! let storage = Storage::new(StorageConfig::new("/var/lib/bundles"))?.into_shared();
//! let info = BundleInfo::new(storage, 12, 0);
//!
//! // The identifier stays locked until the generation is populated
//! let generation = info.create_generation()?;
//! generation.set_content("/opt/bundles/org.example.app");
//! let headers = generation.headers()?;
//! info.unlock_generation(&generation)?;
//!
//! println!("{} headers in generation {}", headers.len(), generation.generation_id());
//! # Ok::<(), bundlestore::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`storage`] - [`Storage`], [`BundleInfo`] and [`Generation`]
//! - [`file`] - The [`file::BundleFile`] accessor contract and the decoration chain
//! - [`manifest`] - Manifest headers, parsing, localization and the package-info scan
//! - [`utils`] - The keyed [`utils::LockSet`]
//! - [`Error`] and [`Result`] - Error handling
//!
//! ### Storage Layout
//!
//! ```text
//! <root>/<bundleId>/<generationId>/...   generation storage and extracted files
//! <root>/<bundleId>/data/...             private data of the bundle
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result). Cleanup and best-effort
//! heuristics (deleting a generation, creating the data directory, scanning for package
//! info) never fail; they log through the [`log`] facade and return a default.
//!
//! ```rust,no_run
//! use bundlestore::{BundleInfo, Error, Storage, StorageConfig};
//!
//! let storage = Storage::new(StorageConfig::new("/var/lib/bundles"))?.into_shared();
//! let info = BundleInfo::new(storage, 3, 0);
//!
//! match info.create_generation() {
//!     Ok(generation) => println!("generation {}", generation.generation_id()),
//!     Err(error) if error.is_state_change() => println!("install aborted: {}", error),
//!     Err(error) => println!("Other error: {}", error),
//! }
//! # Ok::<(), bundlestore::Error>(())
//! ```
//!
//! ## Development and Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//!
//! # Fuzz the manifest parser
//! cargo +nightly fuzz run manifest --release
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use bundlestore::prelude::*;
///
/// let storage = Storage::new(StorageConfig::default())?.into_shared();
/// let info = BundleInfo::new(storage, 1, 0);
/// let generation = info.create_generation()?;
/// info.unlock_generation(&generation)?;
/// # Ok::<(), bundlestore::Error>(())
/// ```
pub mod prelude;

mod config;

/// Content accessors for generation payloads and their decoration chains.
pub mod file;

/// Manifest headers, parsing, localization and the package-info scan.
pub mod manifest;

/// The storage area, bundle records and generations.
///
/// See [`Storage`], [`BundleInfo`] and [`Generation`] for the entry points.
pub mod storage;

/// Utilities that are not specific to bundles.
pub mod utils;

/// `bundlestore` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `bundlestore` Error type
///
/// The main error type for all operations in this crate, see its variants for the
/// categories of failures.
pub use error::{Error, LockFailure};

/// Configuration of a storage area.
pub use config::{StorageConfig, DEFAULT_GENERATION_LOCK_TIMEOUT, DEFAULT_ROOT_LOCALE};

/// Core lifecycle types.
pub use storage::{BundleInfo, Generation, GenerationFlags, Storage};
