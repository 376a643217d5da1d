//! Storage hooks attached to generations at install time.
//!
//! A [`StorageHookFactory`] registered with the [`Storage`](crate::Storage) is asked for a
//! hook for every staged generation. Hooks are stored type-erased on the generation
//! ([`AttachedHook`]) together with the identity of the factory that produced them, and
//! are looked up again through that identity with
//! [`Generation::storage_hook`](crate::Generation::storage_hook).

use std::{
    any::{type_name, Any, TypeId},
    fmt,
    sync::Arc,
};

use crate::{manifest::Headers, storage::Generation, Result};

/// Extension state attached to a generation.
pub trait StorageHook: Send + Sync + 'static {
    /// Called once the generation's manifest is available.
    ///
    /// # Errors
    /// An error aborts staging of the generation.
    fn initialize(&self, headers: &Headers) -> Result<()> {
        let _ = headers;
        Ok(())
    }
}

/// Creates [`StorageHook`]s for new generations.
pub trait StorageHookFactory: Send + Sync + 'static {
    /// The hook type this factory produces.
    type Hook: StorageHook;

    /// Create the hook for `generation`, or `None` if this factory does not apply to it.
    ///
    /// # Errors
    /// An error aborts staging of the generation.
    fn create_hook(&self, generation: &Generation) -> Result<Option<Self::Hook>>;
}

/// Stable identity of a hook factory type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookFactoryId {
    type_id: TypeId,
    name: &'static str,
}

impl HookFactoryId {
    /// Identity of the factory type `F`.
    pub fn of<F: StorageHookFactory>() -> Self {
        HookFactoryId {
            type_id: TypeId::of::<F>(),
            name: type_name::<F>(),
        }
    }

    /// Type name of the factory, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for HookFactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A hook attached to a generation, tagged with the factory that created it.
#[derive(Clone)]
pub struct AttachedHook {
    factory: HookFactoryId,
    hook: Arc<dyn StorageHook>,
    any: Arc<dyn Any + Send + Sync>,
}

impl AttachedHook {
    /// Attach `hook` as produced by factory type `F`.
    pub fn new<F: StorageHookFactory>(hook: F::Hook) -> Self {
        let hook = Arc::new(hook);
        AttachedHook {
            factory: HookFactoryId::of::<F>(),
            hook: Arc::clone(&hook) as Arc<dyn StorageHook>,
            any: hook,
        }
    }

    /// Identity of the factory this hook came from.
    pub fn factory(&self) -> HookFactoryId {
        self.factory
    }

    /// Forward to [`StorageHook::initialize`].
    ///
    /// # Errors
    /// Propagates the hook's error.
    pub fn initialize(&self, headers: &Headers) -> Result<()> {
        self.hook.initialize(headers)
    }

    /// The hook as produced by factory type `F`, if it came from `F`.
    pub fn downcast<F: StorageHookFactory>(&self) -> Option<Arc<F::Hook>> {
        if self.factory != HookFactoryId::of::<F>() {
            return None;
        }
        Arc::clone(&self.any).downcast::<F::Hook>().ok()
    }
}

impl fmt::Debug for AttachedHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedHook")
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

/// Object-safe view of a [`StorageHookFactory`], as stored by the storage.
pub(crate) trait ErasedHookFactory: Send + Sync {
    fn id(&self) -> HookFactoryId;

    fn create(&self, generation: &Generation) -> Result<Option<AttachedHook>>;
}

impl<F: StorageHookFactory> ErasedHookFactory for F {
    fn id(&self) -> HookFactoryId {
        HookFactoryId::of::<F>()
    }

    fn create(&self, generation: &Generation) -> Result<Option<AttachedHook>> {
        Ok(self
            .create_hook(generation)?
            .map(|hook| AttachedHook::new::<F>(hook)))
    }
}
