//! Protection domains of generations.
//!
//! A [`ProtectionDomain`] ties the code of one generation to the revision it belongs to.
//! Domains are built by the storage's [`SecurityAdmin`] the first time
//! [`Generation::domain`](crate::Generation::domain) is requested.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{manifest::Headers, storage::Generation, Result};

/// Header carrying the symbolic name of a bundle.
pub const BUNDLE_SYMBOLICNAME: &str = "Bundle-SymbolicName";
/// Header carrying the version of a bundle.
pub const BUNDLE_VERSION: &str = "Bundle-Version";

/// The revision a generation's content was installed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRevision {
    /// Symbolic name of the bundle
    pub symbolic_name: String,
    /// Version string, `0.0.0` when the manifest has none
    pub version: String,
}

impl ModuleRevision {
    /// Create a revision from its identity.
    pub fn new(symbolic_name: impl Into<String>, version: impl Into<String>) -> Self {
        ModuleRevision {
            symbolic_name: symbolic_name.into(),
            version: version.into(),
        }
    }

    /// Build the revision identity declared by `headers`.
    ///
    /// Directives following the symbolic name (`;singleton:=true`) are dropped.
    pub fn from_headers(headers: &Headers) -> Option<Self> {
        let symbolic_name = headers
            .get(BUNDLE_SYMBOLICNAME)?
            .split(';')
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())?;
        let version = headers.get(BUNDLE_VERSION).map(str::trim).unwrap_or("0.0.0");
        Some(ModuleRevision::new(symbolic_name, version))
    }
}

impl fmt::Display for ModuleRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.symbolic_name, self.version)
    }
}

/// Security context of a generation's code.
#[derive(Debug, Clone)]
pub struct ProtectionDomain {
    bundle_id: u64,
    code_source: Option<PathBuf>,
    revision: Arc<ModuleRevision>,
}

impl ProtectionDomain {
    /// Create a domain for code of `bundle_id` loaded from `code_source`.
    pub fn new(bundle_id: u64, code_source: Option<PathBuf>, revision: Arc<ModuleRevision>) -> Self {
        ProtectionDomain {
            bundle_id,
            code_source,
            revision,
        }
    }

    /// The bundle the code belongs to.
    pub fn bundle_id(&self) -> u64 {
        self.bundle_id
    }

    /// Where the code is loaded from, if it has a location.
    pub fn code_source(&self) -> Option<&Path> {
        self.code_source.as_deref()
    }

    /// The revision the domain was created for.
    pub fn revision(&self) -> &Arc<ModuleRevision> {
        &self.revision
    }
}

/// Builds protection domains.
///
/// # Locking
///
/// Called while the generation monitor is held, and that monitor is not reentrant.
/// Implementations may use the identity and content queries of `generation`
/// ([`Generation::bundle_id`], [`Generation::generation_id`], [`Generation::content`],
/// [`Generation::flags`]). Calling [`Generation::headers`], [`Generation::bundle_file`],
/// [`Generation::revision`] or any other monitor-guarded accessor of the same generation
/// deadlocks.
pub trait SecurityAdmin: Send + Sync {
    /// Create the domain of `generation` installed as `revision`.
    ///
    /// # Errors
    /// A failure is returned from [`Generation::domain`] and nothing is cached.
    fn create_protection_domain(
        &self,
        generation: &Generation,
        revision: &Arc<ModuleRevision>,
    ) -> Result<ProtectionDomain>;
}

/// Domain per bundle id with the generation content as code source.
#[derive(Debug, Default)]
pub struct DefaultSecurityAdmin;

impl SecurityAdmin for DefaultSecurityAdmin {
    fn create_protection_domain(
        &self,
        generation: &Generation,
        revision: &Arc<ModuleRevision>,
    ) -> Result<ProtectionDomain> {
        Ok(ProtectionDomain::new(
            generation.bundle_id(),
            generation.content(),
            Arc::clone(revision),
        ))
    }
}
