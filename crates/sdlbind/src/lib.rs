//! # sdlbind
//!
//! GraphQL schema construction and resolution engine.
//!
//! Endpoints expose a schema built either from root types registered in code
//! (typed mode) or from an SDL file (SDL mode). Every named type is bound to
//! application resolvers by name, and every field argument is coerced to a
//! domain type before a resolver sees it.
//!
//! ## Overview
//!
//! - Types are produced lazily by a [`TypeRegistry`], at most once per name.
//!   Field lists may be deferred so that types can reference themselves.
//! - Parsed SDL documents are cached by a [`SchemaStore`], tagged with their
//!   source path and invalidated when the file changes.
//! - A [`ResolverBindingRegistry`] decorates each SDL type with the resolver
//!   found for it, either by explicit binding or by a path pattern.
//! - A [`FieldResolver`] resolves fields without a bound handler by calling a
//!   member of the parent value, then reading a property.
//!
//! ## Configuration
//!
//! ```toml
//! [endpoints.shop]
//! schema = "schema/shop.graphql"
//! resolver_path_pattern = "shop::{Type}Resolver"
//! type_namespaces = ["shop::types"]
//! max_depth = 15
//! introspection = true
//!
//! [watch]
//! enabled = true
//! debounce_ms = 500
//! ```
//!
//! ## Modules
//!
//! - [`registry`] - Lazy, cycle-safe type registry
//! - [`types`] - Type configurations and wire types
//! - [`binding`] - Resolvers and resolver binding
//! - [`coercion`] - Argument coercion to domain types
//! - [`resolver`] - Default field resolution
//! - [`schema`] - Schema assembly and SDL registration
//! - [`store`] - Schema store and SDL cache
//! - [`error`] - Error types

pub mod binding;
pub mod coercion;
pub mod context;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod types;
pub mod value;

// Re-export main types
pub use binding::{Resolver, ResolverBindingRegistry, ResolverCatalog};
pub use coercion::{Argument, ArgumentCoercer, Arguments, DomainTypeCatalog, DomainValue, TypeNamespace};
pub use context::RequestContext;
pub use error::{ResultExt, SchemaError};
pub use registry::{TypeHandle, TypeRegistry, TypeState};
pub use resolver::{FieldResolver, default_resolve, default_resolve_type};
pub use schema::{RootTypes, SchemaAssembler, SchemaLimits};
pub use store::{SchemaCache, SchemaStore, sanitize_tag};
pub use types::{
    ArgumentConfig, EnumValueConfig, FieldConfig, FieldHandler, FieldList, ScalarParser, ScalarSerializer,
    TypeConfig, TypeKind, WireType,
};
pub use value::{FieldResult, FieldSource, Record, Resolved};

pub use sdlbind_config::{EndpointConfig, GatewayConfig, SCHEMA_FILE_MONITOR};

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
