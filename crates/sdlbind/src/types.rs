//! Raw and decorated type configurations.
//!
//! A [`TypeConfig`] describes one named GraphQL type before it is turned into
//! an executable schema type. Field lists are either eager or deferred; a
//! deferred list is produced on first use, after its owning type has been
//! stored in the [`TypeRegistry`], which is what allows types to reference
//! themselves or each other.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use async_graphql::Value;
use async_graphql::dynamic::TypeRef;
use async_graphql_parser::types::{BaseType, Type};
use futures_util::future::{BoxFuture, FutureExt};

use crate::coercion::{Arguments, DomainValue};
use crate::context::RequestContext;
use crate::error::SchemaError;
use crate::registry::{TypeHandle, TypeRegistry};
use crate::value::{FieldResult, Resolved};

/// Names of the built-in scalars, which are never registered.
pub const BUILTIN_SCALARS: [&str; 5] = [
    TypeRef::STRING,
    TypeRef::INT,
    TypeRef::FLOAT,
    TypeRef::BOOLEAN,
    TypeRef::ID,
];

/// Returns whether `name` is a built-in scalar.
pub fn is_builtin_scalar(name: &str) -> bool {
    BUILTIN_SCALARS.contains(&name)
}

type SyncHandler = dyn Fn(&Resolved, &Arguments, &RequestContext) -> FieldResult + Send + Sync;
type AsyncHandler =
    dyn Fn(Resolved, Arguments, RequestContext) -> BoxFuture<'static, FieldResult> + Send + Sync;

/// Field resolve handler: `(source, arguments, context) -> value`.
///
/// Asynchronous handlers take their inputs by value so that the returned
/// future may outlive the call.
#[derive(Clone)]
pub enum FieldHandler {
    Sync(Arc<SyncHandler>),
    Async(Arc<AsyncHandler>),
}

impl FieldHandler {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Resolved, &Arguments, &RequestContext) -> FieldResult + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(handler))
    }

    pub fn from_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(Resolved, Arguments, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FieldResult> + Send + 'static,
    {
        Self::Async(Arc::new(move |source, args, ctx| handler(source, args, ctx).boxed()))
    }

    /// Runs the handler, awaiting it if it is asynchronous.
    pub async fn call(&self, source: &Resolved, args: &Arguments, ctx: &RequestContext) -> FieldResult {
        match self {
            Self::Sync(handler) => handler(source, args, ctx),
            Self::Async(handler) => handler(source.clone(), args.clone(), ctx.clone()).await,
        }
    }
}

impl fmt::Debug for FieldHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("FieldHandler::Sync"),
            Self::Async(_) => f.write_str("FieldHandler::Async"),
        }
    }
}

/// Resolves the concrete object type name of an interface or union value.
pub type ResolveTypeFn = Arc<dyn Fn(&Resolved, &RequestContext) -> Option<String> + Send + Sync>;

/// Validates input literals of a custom scalar.
pub type ScalarValidator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Parses an input value of the named custom scalar into a domain value.
pub type ScalarParser = Arc<dyn Fn(&str, &Value) -> Result<DomainValue, String> + Send + Sync>;

/// Serializes an output value of a custom scalar.
pub type ScalarSerializer = Arc<dyn Fn(&Resolved) -> Result<Value, String> + Send + Sync>;

/// Wraps a typed parse function; the domain value is named after the scalar.
pub(crate) fn scalar_parser<T, F>(parse: F) -> ScalarParser
where
    T: Any + Send + Sync,
    F: Fn(&Value) -> Result<T, String> + Send + Sync + 'static,
{
    Arc::new(move |name, value| parse(value).map(|parsed| DomainValue::new(name, parsed)))
}

/// Wraps a typed serialize function.
///
/// Domain values of type `T` go through `serialize`; plain scalars pass
/// through unchanged.
pub(crate) fn scalar_serializer<T, F>(serialize: F) -> ScalarSerializer
where
    T: Any,
    F: Fn(&T) -> Result<Value, String> + Send + Sync + 'static,
{
    Arc::new(move |resolved| match resolved {
        Resolved::Domain(domain) => match domain.downcast_ref::<T>() {
            Some(value) => serialize(value),
            None => Err(format!("Unexpected domain value of type \"{}\"", domain.type_name())),
        },
        Resolved::Value(value) | Resolved::Enum { value, .. } => Ok(value.clone()),
        Resolved::Null => Ok(Value::Null),
        _ => Err("Value is not a scalar".to_string()),
    })
}

/// A wire type reference, e.g. `[Product!]!`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WireType {
    Named(String),
    NonNull(Box<WireType>),
    List(Box<WireType>),
}

impl WireType {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// References a registered type.
    pub fn of(handle: &TypeHandle) -> Self {
        Self::Named(handle.name.clone())
    }

    #[must_use]
    pub fn non_null(self) -> Self {
        match self {
            Self::NonNull(_) => self,
            other => Self::NonNull(Box::new(other)),
        }
    }

    #[must_use]
    pub fn list(self) -> Self {
        Self::List(Box::new(self))
    }

    /// Name of the innermost named type.
    pub fn base_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::NonNull(inner) | Self::List(inner) => inner.base_name(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// Unwraps a non-null wrapper, then one list level (and the element's
    /// non-null wrapper). Returns the element type name and whether a list
    /// was unwrapped.
    pub fn coercion_target(&self) -> (&str, bool) {
        let unwrapped = match self {
            Self::NonNull(inner) => inner.as_ref(),
            other => other,
        };
        match unwrapped {
            Self::List(element) => (element.base_name(), true),
            other => (other.base_name(), false),
        }
    }

    /// Converts a parsed SDL type.
    pub fn from_ast(ty: &Type) -> Self {
        let inner = match &ty.base {
            BaseType::Named(name) => Self::Named(name.to_string()),
            BaseType::List(element) => Self::List(Box::new(Self::from_ast(element))),
        };
        if ty.nullable {
            inner
        } else {
            Self::NonNull(Box::new(inner))
        }
    }

    pub fn to_type_ref(&self) -> TypeRef {
        match self {
            Self::Named(name) => TypeRef::named(name.clone()),
            Self::NonNull(inner) => TypeRef::NonNull(Box::new(inner.to_type_ref())),
            Self::List(inner) => TypeRef::List(Box::new(inner.to_type_ref())),
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
            Self::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// Kind of a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    Scalar,
}

impl TypeKind {
    /// Interfaces and unions need a runtime type resolver.
    pub fn is_abstract(self) -> bool {
        matches!(self, Self::Interface | Self::Union)
    }

    pub fn has_fields(self) -> bool {
        matches!(self, Self::Object | Self::Interface)
    }
}

/// A declared argument or input object field.
#[derive(Debug, Clone)]
pub struct ArgumentConfig {
    pub name: String,
    pub ty: WireType,
    pub description: Option<String>,
    pub default_value: Option<Value>,
}

impl ArgumentConfig {
    pub fn new(name: impl Into<String>, ty: WireType) -> Self {
        Self {
            name: name.into(),
            ty,
            description: None,
            default_value: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// A declared output field.
#[derive(Clone)]
pub struct FieldConfig {
    pub name: String,
    pub ty: WireType,
    pub args: Vec<ArgumentConfig>,
    pub description: Option<String>,
    /// Deprecation reason; `Some` marks the field deprecated.
    pub deprecation: Option<String>,
    /// Bound resolve handler; `None` uses the default field resolution.
    pub handler: Option<FieldHandler>,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>, ty: WireType) -> Self {
        Self {
            name: name.into(),
            ty,
            args: Vec::new(),
            description: None,
            deprecation: None,
            handler: None,
        }
    }

    #[must_use]
    pub fn argument(mut self, argument: ArgumentConfig) -> Self {
        self.args.push(argument);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecation = Some(reason.into());
        self
    }

    /// Binds a resolve handler to this field.
    #[must_use]
    pub fn resolve<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Resolved, &Arguments, &RequestContext) -> FieldResult + Send + Sync + 'static,
    {
        self.handler = Some(FieldHandler::new(handler));
        self
    }

    /// Binds an asynchronous resolve handler to this field.
    #[must_use]
    pub fn resolve_async<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Resolved, Arguments, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FieldResult> + Send + 'static,
    {
        self.handler = Some(FieldHandler::from_async(handler));
        self
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for FieldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldConfig")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("args", &self.args)
            .field("deprecation", &self.deprecation)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// One enum case and its underlying scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueConfig {
    pub name: String,
    pub value: Value,
    pub description: Option<String>,
    pub deprecation: Option<String>,
}

impl EnumValueConfig {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: None,
            deprecation: None,
        }
    }

    /// A case whose underlying scalar is its own name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), name)
    }

    #[must_use]
    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecation = Some(reason.into());
        self
    }
}

type FieldProducer = dyn Fn(&TypeRegistry) -> Result<Vec<FieldConfig>, SchemaError> + Send + Sync;

/// A field list produced on first use and memoized.
pub struct DeferredFields {
    producer: Box<FieldProducer>,
    fields: OnceLock<Result<Arc<Vec<FieldConfig>>, SchemaError>>,
}

impl DeferredFields {
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(&TypeRegistry) -> Result<Vec<FieldConfig>, SchemaError> + Send + Sync + 'static,
    {
        Self {
            producer: Box::new(producer),
            fields: OnceLock::new(),
        }
    }

    /// Evaluates the producer once; later calls return the memoized result.
    pub fn resolve(&self, registry: &TypeRegistry) -> Result<Arc<Vec<FieldConfig>>, SchemaError> {
        self.fields
            .get_or_init(|| (self.producer)(registry).map(Arc::new))
            .clone()
    }

    pub fn is_evaluated(&self) -> bool {
        self.fields.get().is_some()
    }
}

/// Fields of an object or interface type.
#[derive(Clone)]
pub enum FieldList {
    Eager(Arc<Vec<FieldConfig>>),
    Deferred(Arc<DeferredFields>),
}

impl FieldList {
    pub fn eager(fields: Vec<FieldConfig>) -> Self {
        Self::Eager(Arc::new(fields))
    }

    /// A field list evaluated after the owning type is registered.
    pub fn deferred<F>(producer: F) -> Self
    where
        F: Fn(&TypeRegistry) -> Result<Vec<FieldConfig>, SchemaError> + Send + Sync + 'static,
    {
        Self::Deferred(Arc::new(DeferredFields::new(producer)))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    pub fn resolve(&self, registry: &TypeRegistry) -> Result<Arc<Vec<FieldConfig>>, SchemaError> {
        match self {
            Self::Eager(fields) => Ok(Arc::clone(fields)),
            Self::Deferred(deferred) => deferred.resolve(registry),
        }
    }

    /// Applies `f` to the fields, keeping a deferred list deferred.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(Vec<FieldConfig>) -> Vec<FieldConfig> + Send + Sync + 'static,
    {
        match self {
            Self::Eager(fields) => Self::eager(f(fields.as_ref().clone())),
            Self::Deferred(inner) => {
                let inner = Arc::clone(inner);
                Self::deferred(move |registry| {
                    let fields = inner.resolve(registry)?;
                    Ok(f(fields.as_ref().clone()))
                })
            }
        }
    }
}

impl Default for FieldList {
    fn default() -> Self {
        Self::eager(Vec::new())
    }
}

impl fmt::Debug for FieldList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eager(fields) => f.debug_tuple("Eager").field(fields).finish(),
            Self::Deferred(deferred) => f
                .debug_struct("Deferred")
                .field("evaluated", &deferred.is_evaluated())
                .finish(),
        }
    }
}

/// Configuration of one named type.
#[derive(Clone)]
pub struct TypeConfig {
    pub name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
    /// Output fields (objects and interfaces).
    pub fields: FieldList,
    /// Input fields (input objects).
    pub input_fields: Vec<ArgumentConfig>,
    /// Implemented interfaces (objects and interfaces).
    pub interfaces: Vec<String>,
    /// Member types (unions).
    pub possible_types: Vec<String>,
    /// Cases (enums).
    pub values: Vec<EnumValueConfig>,
    /// Runtime type resolution (interfaces and unions).
    pub resolve_type: Option<ResolveTypeFn>,
    /// Input validation (custom scalars).
    pub scalar_validator: Option<ScalarValidator>,
    /// Input parsing into a domain value (custom scalars).
    pub scalar_parser: Option<ScalarParser>,
    /// Output serialization (custom scalars).
    pub scalar_serializer: Option<ScalarSerializer>,
}

impl TypeConfig {
    fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            fields: FieldList::default(),
            input_fields: Vec::new(),
            interfaces: Vec::new(),
            possible_types: Vec::new(),
            values: Vec::new(),
            resolve_type: None,
            scalar_validator: None,
            scalar_parser: None,
            scalar_serializer: None,
        }
    }

    pub fn object(name: impl Into<String>, fields: FieldList) -> Self {
        Self {
            fields,
            ..Self::new(name, TypeKind::Object)
        }
    }

    pub fn interface(name: impl Into<String>, fields: FieldList) -> Self {
        Self {
            fields,
            ..Self::new(name, TypeKind::Interface)
        }
    }

    pub fn union<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            possible_types: members.into_iter().map(Into::into).collect(),
            ..Self::new(name, TypeKind::Union)
        }
    }

    pub fn enumeration(name: impl Into<String>, values: Vec<EnumValueConfig>) -> Self {
        Self {
            values,
            ..Self::new(name, TypeKind::Enum)
        }
    }

    pub fn input_object(name: impl Into<String>, fields: Vec<ArgumentConfig>) -> Self {
        Self {
            input_fields: fields,
            ..Self::new(name, TypeKind::InputObject)
        }
    }

    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Scalar)
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    #[must_use]
    pub fn with_resolve_type<F>(mut self, resolve_type: F) -> Self
    where
        F: Fn(&Resolved, &RequestContext) -> Option<String> + Send + Sync + 'static,
    {
        self.resolve_type = Some(Arc::new(resolve_type));
        self
    }

    /// Parses input values of this scalar into domain values of type `T`.
    #[must_use]
    pub fn parse_with<T, F>(mut self, parse: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Value) -> Result<T, String> + Send + Sync + 'static,
    {
        self.scalar_parser = Some(scalar_parser(parse));
        self
    }

    /// Serializes domain values of type `T` returned for this scalar.
    #[must_use]
    pub fn serialize_with<T, F>(mut self, serialize: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.scalar_serializer = Some(scalar_serializer(serialize));
        self
    }

    /// Names of all types this type refers to, excluding built-in scalars.
    ///
    /// Evaluates a deferred field list.
    pub fn referenced_types(&self, registry: &TypeRegistry) -> Result<Vec<String>, SchemaError> {
        let mut names: Vec<String> = Vec::new();
        if self.kind.has_fields() {
            for field in self.fields.resolve(registry)?.iter() {
                names.push(field.ty.base_name().to_string());
                names.extend(field.args.iter().map(|a| a.ty.base_name().to_string()));
            }
        }
        names.extend(self.input_fields.iter().map(|a| a.ty.base_name().to_string()));
        names.extend(self.interfaces.iter().cloned());
        names.extend(self.possible_types.iter().cloned());
        names.retain(|name| !is_builtin_scalar(name));
        names.dedup();
        Ok(names)
    }
}

impl fmt::Debug for TypeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("fields", &self.fields)
            .field("interfaces", &self.interfaces)
            .field("possible_types", &self.possible_types)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}
