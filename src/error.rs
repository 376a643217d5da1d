use thiserror::Error;

use strum::Display;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Why a generation identifier could not be locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LockFailure {
    /// The bounded wait elapsed while another creation held the identifier.
    #[strum(serialize = "timed out")]
    Timeout,
    /// The wait was abandoned because the lock set was poisoned by a panicking holder.
    #[strum(serialize = "interrupted")]
    Interrupted,
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Fatal
/// - [`Error::GenerationLock`] - A generation identifier could not be locked (state-change error)
/// - [`Error::ManifestMissing`] - The generation content has no bundle manifest
/// - [`Error::Malformed`] - The bundle manifest or a translation file could not be parsed
/// - [`Error::IllegalState`] - An operation was called out of contract
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::NotSupported`] - The content cannot be served by the configured backend
///
/// Conditions that are only "could not clean up" or "heuristic inconclusive" never surface
/// as an [`Error`]; those operations degrade to a default value and log instead.
///
/// # Examples
///
/// ```rust,no_run
/// use bundlestore::{BundleInfo, Error, Storage, StorageConfig};
///
/// let storage = Storage::new(StorageConfig::new("/var/lib/bundles"))?.into_shared();
/// let info = BundleInfo::new(storage, 7, 0);
///
/// match info.create_generation() {
///     Ok(generation) => println!("allocated generation {}", generation.generation_id()),
///     Err(Error::GenerationLock { generation_id, reason, .. }) => {
///         eprintln!("generation {} is busy: {}", generation_id, reason);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok::<(), bundlestore::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The manifest or a translation resource is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The generation content does not contain `META-INF/MANIFEST.MF`.
    #[error("Bundle manifest not found in {0}")]
    ManifestMissing(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Failed to obtain the identifier lock for a new generation.
    ///
    /// This is a state-change failure: the install or update that asked for the
    /// generation must be aborted. The generation counter is left untouched.
    #[error("Failed to obtain id locks for generation {generation_id} of bundle {bundle_id} ({reason})")]
    GenerationLock {
        /// The bundle whose generation was being created
        bundle_id: u64,
        /// The identifier that could not be locked
        generation_id: u64,
        /// Whether the wait timed out or was interrupted
        reason: LockFailure,
    },

    /// An operation was invoked in a state its contract does not allow.
    ///
    /// These are programming errors (for example asking for a protection domain
    /// before a revision is associated) and are never retried.
    #[error("Illegal state - {0}")]
    IllegalState(String),

    /// Failed to lock target.
    ///
    /// A mutex guarding shared state was poisoned by a panicking thread.
    #[error("Failed to lock target")]
    LockError,

    /// The content cannot be opened by the configured backend.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories, such as failures
    /// reported by storage hooks.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Returns `true` for failures that abort a bundle state change (install, update).
    pub fn is_state_change(&self) -> bool {
        matches!(self, Error::GenerationLock { .. })
    }
}
