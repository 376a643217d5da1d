//! # bundlestore Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the bundlestore library. Import this module to get quick access to the essential
//! types for managing bundle generations.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all bundlestore operations
pub use crate::Error;

/// The result type used throughout bundlestore
pub use crate::Result;

/// Why a generation identifier could not be locked
pub use crate::LockFailure;

/// Configuration of a storage area
pub use crate::StorageConfig;

// ================================================================================================
// Generation Lifecycle
// ================================================================================================

/// Storage area, bundle record and generation
pub use crate::storage::{BundleInfo, Generation, GenerationFlags, Storage};

/// Backend constructing undecorated accessors
pub use crate::storage::{BundleFileFactory, DefaultBundleFileFactory, ExtractLocation};

/// Storage hooks
pub use crate::storage::{AttachedHook, HookFactoryId, StorageHook, StorageHookFactory};

/// Security context
pub use crate::storage::{DefaultSecurityAdmin, ModuleRevision, ProtectionDomain, SecurityAdmin};

// ================================================================================================
// Content Access
// ================================================================================================

/// Accessor contract and entry URLs
pub use crate::file::{BundleEntry, BundleFile, ResourceUrl};

/// Accessor implementations
pub use crate::file::{DirBundleFile, MemoryBundleFile, SystemBundleFile};

/// Decoration chains
pub use crate::file::{BundleFileWrapperChain, BundleFileWrapperFactory};

// ================================================================================================
// Manifest
// ================================================================================================

/// Headers and parsing
pub use crate::manifest::{Headers, JarManifestParser, ManifestParser};

/// Localization
pub use crate::manifest::{ManifestLocalization, ResourceBundle};
