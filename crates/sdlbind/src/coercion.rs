//! Argument coercion from wire values to domain types.
//!
//! Every declared argument is coerced before a resolver sees it:
//!
//! 1. non-null and list wrappers are unwrapped, noting plurality
//! 2. the candidate domain type name is the wire name with a trailing
//!    `Input` stripped, pluralized with `s` for lists
//! 3. the configured namespaces are searched in order for that name
//! 4. a match constructs the domain value; failure is an
//!    [`SchemaError::ArgumentCoercion`]
//! 5. without a match the raw value passes through unchanged

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_graphql::{Name, Value};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::SchemaError;
use crate::types::{ArgumentConfig, EnumValueConfig, ScalarParser, WireType};

/// A constructed domain value.
#[derive(Clone)]
pub struct DomainValue {
    type_name: String,
    value: Arc<dyn Any + Send + Sync>,
}

impl DomainValue {
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            value: Arc::new(value),
        }
    }

    /// Name of the domain type this value was constructed as.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Whether both handles share one value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for DomainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A coerced argument.
#[derive(Debug, Clone)]
pub enum Argument {
    /// Native scalar or unmatched type, passed through.
    Raw(Value),
    /// Value constructed as a domain type.
    Domain(DomainValue),
    /// List of parsed custom scalar values.
    List(Vec<Argument>),
}

impl Argument {
    pub fn as_domain<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Domain(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

/// Coerced arguments of one field invocation, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    values: IndexMap<String, Argument>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, argument: Argument) -> Self {
        self.values.insert(name.into(), argument);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.values.get(name)
    }

    /// Returns a pass-through value.
    pub fn raw(&self, name: &str) -> Option<&Value> {
        match self.values.get(name) {
            Some(Argument::Raw(value)) => Some(value),
            _ => None,
        }
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.raw(name) {
            Some(Value::String(s)) => Some(s.as_str()),
            Some(Value::Enum(n)) => Some(n.as_str()),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.raw(name) {
            Some(Value::Number(n)) => n.as_i64(),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.raw(name) {
            Some(Value::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Returns a domain value of type `T`.
    pub fn domain<T: Any>(&self, name: &str) -> Option<&T> {
        self.values.get(name).and_then(Argument::as_domain::<T>)
    }

    /// Returns the items of a parsed custom scalar list.
    pub fn list(&self, name: &str) -> Option<&[Argument]> {
        match self.values.get(name) {
            Some(Argument::List(items)) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Returns a domain value of type `T` or a field error naming the argument.
    pub fn require<T: Any>(&self, name: &str) -> Result<&T, async_graphql::Error> {
        self.domain::<T>(name)
            .ok_or_else(|| async_graphql::Error::new(format!("Missing argument \"{name}\"")))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Argument)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

type Constructor = Arc<dyn Fn(&Value) -> Result<DomainValue, String> + Send + Sync>;

/// A named collection of domain types and enum descriptions.
#[derive(Clone)]
pub struct TypeNamespace {
    name: String,
    constructors: HashMap<String, Constructor>,
    enums: HashMap<String, Vec<EnumValueConfig>>,
}

impl TypeNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructors: HashMap::new(),
            enums: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a domain type constructed through `serde`.
    ///
    /// Validation lives in the type's `Deserialize` implementation, e.g.
    /// `#[serde(try_from = "String")]`.
    #[must_use]
    pub fn register<T>(self, type_name: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Any + Send + Sync,
    {
        let type_name = type_name.into();
        let name = type_name.clone();
        self.register_with(type_name, move |value: &Value| {
            let json = value.clone().into_json().map_err(|e| e.to_string())?;
            serde_json::from_value::<T>(json).map_err(|e| {
                trace!(type_name = %name, error = %e, "Domain type rejected value");
                e.to_string()
            })
        })
    }

    /// Registers a domain type with an explicit constructor.
    #[must_use]
    pub fn register_with<T, F>(mut self, type_name: impl Into<String>, constructor: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Value) -> Result<T, String> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        let name = type_name.clone();
        self.constructors.insert(
            type_name,
            Arc::new(move |value| constructor(value).map(|v| DomainValue::new(name.clone(), v))),
        );
        self
    }

    /// Describes a domain enum as `case name → underlying scalar` pairs.
    #[must_use]
    pub fn register_enum<I, V>(mut self, type_name: impl Into<String>, cases: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<Value>,
    {
        let values = cases
            .into_iter()
            .map(|(name, value)| EnumValueConfig::new(name, value))
            .collect();
        self.enums.insert(type_name.into(), values);
        self
    }

    fn constructor(&self, type_name: &str) -> Option<&Constructor> {
        self.constructors.get(type_name)
    }

    fn enum_values(&self, type_name: &str) -> Option<&[EnumValueConfig]> {
        self.enums.get(type_name).map(Vec::as_slice)
    }
}

/// Process-wide catalog of domain type namespaces.
#[derive(Default)]
pub struct DomainTypeCatalog {
    namespaces: DashMap<String, Arc<TypeNamespace>>,
    generation: AtomicU64,
}

impl DomainTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a namespace.
    pub fn register(&self, namespace: TypeNamespace) {
        debug!(namespace = %namespace.name(), "Registering domain type namespace");
        self.namespaces
            .insert(namespace.name().to_string(), Arc::new(namespace));
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Counter advanced by every registration.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Builds a coercer searching the given namespaces in order.
    ///
    /// Unknown namespace names contribute no types.
    pub fn coercer(&self, namespaces: &[String]) -> ArgumentCoercer {
        let resolved = namespaces
            .iter()
            .filter_map(|name| {
                let found = self.namespaces.get(name).map(|ns| Arc::clone(ns.value()));
                if found.is_none() {
                    debug!(namespace = %name, "Configured type namespace is not registered");
                }
                found
            })
            .collect();
        ArgumentCoercer::new(resolved)
    }
}

/// Derives the candidate domain type name for a wire type.
pub fn candidate_type_name(ty: &WireType) -> String {
    let (base, plural) = ty.coercion_target();
    let mut name = base.strip_suffix("Input").unwrap_or(base).to_string();
    if plural {
        name.push('s');
    }
    name
}

/// Coerces raw arguments using an ordered list of namespaces.
#[derive(Clone, Default)]
pub struct ArgumentCoercer {
    namespaces: Vec<Arc<TypeNamespace>>,
    enums: Arc<HashMap<String, Vec<EnumValueConfig>>>,
    scalars: Arc<HashMap<String, ScalarParser>>,
}

impl ArgumentCoercer {
    pub fn new(namespaces: Vec<Arc<TypeNamespace>>) -> Self {
        Self {
            namespaces,
            enums: Arc::default(),
            scalars: Arc::default(),
        }
    }

    /// Attaches the enum value tables of the schema being served, used to map
    /// incoming enum names to their underlying scalars.
    #[must_use]
    pub fn with_schema_enums(mut self, enums: HashMap<String, Vec<EnumValueConfig>>) -> Self {
        self.enums = Arc::new(enums);
        self
    }

    /// Attaches the parsers of the custom scalars of the schema being served.
    /// A parsed scalar is never looked up in the namespaces.
    #[must_use]
    pub fn with_schema_scalars(mut self, scalars: HashMap<String, ScalarParser>) -> Self {
        self.scalars = Arc::new(scalars);
        self
    }

    /// Finds the first namespace defining `type_name`.
    fn constructor(&self, type_name: &str) -> Option<&Constructor> {
        self.namespaces
            .iter()
            .find_map(|ns| ns.constructor(type_name))
    }

    /// Returns the domain enum description for `type_name`, if any.
    pub fn enum_values(&self, type_name: &str) -> Option<&[EnumValueConfig]> {
        self.namespaces
            .iter()
            .find_map(|ns| ns.enum_values(type_name))
    }

    /// Whether a domain type is registered for `type_name`.
    pub fn has_domain_type(&self, type_name: &str) -> bool {
        self.constructor(type_name).is_some()
    }

    /// Coerces one argument value declared with wire type `ty`.
    pub fn coerce(&self, ty: &WireType, value: Value) -> Result<Argument, SchemaError> {
        if matches!(value, Value::Null) {
            return Ok(Argument::Raw(Value::Null));
        }

        if let Some(parser) = self.scalars.get(ty.base_name()) {
            trace!(scalar = %ty.base_name(), "Parsing custom scalar argument");
            return parse_scalar(parser, ty, value)
                .map_err(|message| SchemaError::coercion(ty.base_name(), message));
        }

        let value = match self.enums.get(ty.base_name()) {
            Some(cases) => enum_to_backing(cases, value),
            None => value,
        };

        let candidate = candidate_type_name(ty);
        match self.constructor(&candidate) {
            Some(constructor) => {
                trace!(type_name = %candidate, "Coercing argument to domain type");
                constructor(&value)
                    .map(Argument::Domain)
                    .map_err(|message| SchemaError::coercion(candidate, message))
            }
            None => Ok(Argument::Raw(value)),
        }
    }

    /// Coerces every declared argument present in `raw`.
    ///
    /// Undeclared entries pass through unchanged.
    pub fn coerce_arguments(
        &self,
        declared: &[ArgumentConfig],
        mut raw: IndexMap<String, Value>,
    ) -> Result<Arguments, SchemaError> {
        let mut values = IndexMap::with_capacity(raw.len());
        for argument in declared {
            if let Some(value) = raw.shift_remove(&argument.name) {
                values.insert(argument.name.clone(), self.coerce(&argument.ty, value)?);
            }
        }
        for (name, value) in raw {
            values.insert(name, Argument::Raw(value));
        }
        Ok(Arguments { values })
    }
}

/// Parses a custom scalar value, item by item for list types.
fn parse_scalar(parser: &ScalarParser, ty: &WireType, value: Value) -> Result<Argument, String> {
    match (ty, value) {
        (_, Value::Null) => Ok(Argument::Raw(Value::Null)),
        (WireType::NonNull(inner), value) => parse_scalar(parser, inner, value),
        (WireType::List(element), Value::List(items)) => items
            .into_iter()
            .map(|item| parse_scalar(parser, element, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Argument::List),
        (WireType::List(element), value) => Ok(Argument::List(vec![parse_scalar(parser, element, value)?])),
        (WireType::Named(name), value) => parser(name, &value).map(Argument::Domain),
    }
}

/// Maps enum case names (also inside lists) to their underlying scalar.
fn enum_to_backing(cases: &[EnumValueConfig], value: Value) -> Value {
    match value {
        Value::List(items) => Value::List(
            items
                .into_iter()
                .map(|item| enum_to_backing(cases, item))
                .collect(),
        ),
        Value::Enum(name) => backing_for(cases, name.as_str()).unwrap_or(Value::Enum(name)),
        Value::String(s) => backing_for(cases, &s).unwrap_or(Value::String(s)),
        other => other,
    }
}

fn backing_for(cases: &[EnumValueConfig], name: &str) -> Option<Value> {
    cases
        .iter()
        .find(|case| case.name == name)
        .map(|case| case.value.clone())
}

/// Maps an underlying scalar back to its enum case name for output.
pub(crate) fn backing_to_enum(cases: &[EnumValueConfig], value: &Value) -> Option<Value> {
    if let Some(case) = cases.iter().find(|case| &case.value == value) {
        return Some(Value::Enum(Name::new(&case.name)));
    }
    let name = match value {
        Value::Enum(name) => name.as_str(),
        Value::String(s) => s.as_str(),
        _ => return None,
    };
    cases
        .iter()
        .any(|case| case.name == name)
        .then(|| Value::Enum(Name::new(name)))
}
