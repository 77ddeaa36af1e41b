//! Lazy, cycle-safe type registry.
//!
//! The registry constructs each named type at most once and hands out the
//! same [`TypeHandle`] for every later request. Construction is a two-phase
//! protocol:
//!
//! 1. the name is marked as initializing on the current construction path
//! 2. the registered factory runs; it may call [`TypeRegistry::get`] for the
//!    types it references
//! 3. the result is stored and the name becomes ready
//!
//! A factory that eagerly requests a type still initializing on its own
//! construction path fails with [`SchemaError::CircularType`]. The same
//! reference inside a deferred field list succeeds, because the list is only
//! produced once its owner is ready.
//!
//! # Example
//!
//! ```ignore
//! let registry = TypeRegistry::new();
//! registry.register("Category", |registry| {
//!     Ok(TypeConfig::object("Category", FieldList::deferred(|registry| {
//!         let category = registry.get("Category")?;
//!         Ok(vec![FieldConfig::new("parent", WireType::of(&category))])
//!     })))
//! });
//! let category = registry.get("Category")?;
//! ```

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::error::SchemaError;
use crate::types::TypeConfig;

/// Shared handle to a constructed type.
pub type TypeHandle = Arc<TypeConfig>;

type TypeFactory = Arc<dyn Fn(&TypeRegistry) -> Result<TypeConfig, SchemaError> + Send + Sync>;

/// Construction state of a type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeState {
    /// Not constructed yet.
    Uninitialized,
    /// Being constructed on the current thread.
    Initializing,
    /// Constructed and stored.
    Ready,
}

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Types under construction on this thread, tagged with their registry.
    static CONSTRUCTING: RefCell<Vec<(u64, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a name as initializing for the lifetime of the guard.
struct ConstructionGuard {
    registry_id: u64,
}

impl ConstructionGuard {
    fn enter(registry_id: u64, name: &str) -> Self {
        CONSTRUCTING.with(|stack| stack.borrow_mut().push((registry_id, name.to_string())));
        Self { registry_id }
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        CONSTRUCTING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|(id, _)| *id == self.registry_id) {
                stack.remove(pos);
            }
        });
    }
}

/// Factory producing exactly one instance per named type.
pub struct TypeRegistry {
    id: u64,
    factories: DashMap<String, TypeFactory>,
    types: DashMap<String, TypeHandle>,
    generation: AtomicU64,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("factories", &self.factories.len())
            .field("types", &self.types.len())
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            factories: DashMap::new(),
            types: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Registers the constructor of a type.
    ///
    /// Replacing a factory does not affect an instance already constructed.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&TypeRegistry) -> Result<TypeConfig, SchemaError> + Send + Sync + 'static,
    {
        let name = name.into();
        trace!(type_name = %name, "Registering type factory");
        self.factories.insert(name, Arc::new(factory));
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Counter advanced by every registration and reset.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns the instance for `name`, constructing it on first request.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::InvalidType`] if no factory is registered for `name`
    ///   or the factory produced a differently named type
    /// - [`SchemaError::CircularType`] if `name` is requested while its own
    ///   construction is in progress on this thread
    /// - any error returned by the factory
    pub fn get(&self, name: &str) -> Result<TypeHandle, SchemaError> {
        if let Some(handle) = self.types.get(name).map(|e| Arc::clone(e.value())) {
            return Ok(handle);
        }

        if self.is_constructing(name) {
            debug!(type_name = %name, "Circular type reference during eager construction");
            return Err(SchemaError::CircularType {
                name: name.to_string(),
            });
        }

        let factory = self
            .factories
            .get(name)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| SchemaError::InvalidType {
                name: name.to_string(),
            })?;

        let config = {
            let _guard = ConstructionGuard::enter(self.id, name);
            trace!(type_name = %name, "Constructing type");
            factory(self)?
        };

        if config.name != name {
            return Err(SchemaError::InvalidType {
                name: name.to_string(),
            });
        }

        // A concurrent construction may have finished first; keep its instance.
        let handle = self
            .types
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(config))
            .value()
            .clone();
        debug!(type_name = %name, kind = ?handle.kind, "Type ready");
        Ok(handle)
    }

    /// Returns the construction state of `name`.
    pub fn state(&self, name: &str) -> TypeState {
        if self.types.contains_key(name) {
            TypeState::Ready
        } else if self.is_constructing(name) {
            TypeState::Initializing
        } else {
            TypeState::Uninitialized
        }
    }

    /// Whether a factory is registered for `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Number of constructed types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Drops all constructed instances; factories stay registered.
    pub fn reset(&self) {
        debug!(count = self.types.len(), "Resetting type registry");
        self.types.clear();
        self.generation.fetch_add(1, Ordering::Release);
    }

    fn is_constructing(&self, name: &str) -> bool {
        CONSTRUCTING.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|(id, n)| *id == self.id && n == name)
        })
    }
}
