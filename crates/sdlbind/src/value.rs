//! Resolved values and field sources.
//!
//! A [`FieldSource`] is an application object whose members are looked up by
//! field name: first a callable member, then a readable property. The lookup
//! is an explicit capability check, implemented per type or through the
//! [`Record`] builder.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_graphql::Value;
use indexmap::IndexMap;

use crate::coercion::{Arguments, DomainValue};
use crate::context::RequestContext;

/// Result of a field resolution.
pub type FieldResult = Result<Resolved, async_graphql::Error>;

/// An application object exposing members by name.
pub trait FieldSource: Send + Sync {
    /// Name of the GraphQL object type this value represents.
    ///
    /// Used to resolve the concrete type of interface and union fields when
    /// the bound resolver does not supply its own `resolve_type`.
    fn type_name(&self) -> &str;

    /// Invokes the callable member `member`.
    ///
    /// Returns `None` when the source has no such callable.
    fn call(&self, member: &str, args: &Arguments, ctx: &RequestContext) -> Option<FieldResult> {
        let _ = (member, args, ctx);
        None
    }

    /// Reads the property `member`.
    ///
    /// Returns `None` when the source has no such property.
    fn read(&self, member: &str) -> Option<Resolved> {
        let _ = member;
        None
    }
}

/// A value produced by a resolver, before it is handed to the executor.
#[derive(Clone, Default)]
pub enum Resolved {
    /// Absent value.
    #[default]
    Null,
    /// A scalar, or a JSON-like object whose entries are read as properties.
    Value(Value),
    /// An application object.
    Object(Arc<dyn FieldSource>),
    /// A list of values.
    List(Vec<Resolved>),
    /// An enumerated value, returned to the executor as its underlying scalar.
    Enum {
        /// Symbolic case name.
        case: String,
        /// Underlying scalar.
        value: Value,
    },
    /// A domain value of a custom scalar, serialized on output.
    Domain(DomainValue),
}

impl Resolved {
    /// Wraps an application object.
    pub fn object(source: impl FieldSource + 'static) -> Self {
        Self::Object(Arc::new(source))
    }

    /// Creates an enumerated value.
    pub fn enum_case(case: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Enum {
            case: case.into(),
            value: value.into(),
        }
    }

    /// Wraps a domain value of the custom scalar `type_name`.
    pub fn domain<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self::Domain(DomainValue::new(type_name, value))
    }

    /// Converts a JSON value; `null` becomes [`Resolved::Null`].
    pub fn json(json: serde_json::Value) -> Self {
        match Value::from_json(json) {
            Ok(Value::Null) | Err(_) => Self::Null,
            Ok(value) => Self::Value(value),
        }
    }

    /// Creates a list from anything convertible into resolved values.
    pub fn list<T: Into<Resolved>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Value(Value::Null))
    }

    /// Replaces enumerated values (also inside lists) with their underlying
    /// scalar.
    #[must_use]
    pub fn into_backing(self) -> Self {
        match self {
            Self::Enum { value, .. } => Self::Value(value),
            Self::List(items) => Self::List(items.into_iter().map(Self::into_backing).collect()),
            other => other,
        }
    }

    /// Returns the scalar value, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_domain(&self) -> Option<&DomainValue> {
        match self {
            Self::Domain(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the application object, if this is one.
    pub fn as_object(&self) -> Option<&Arc<dyn FieldSource>> {
        match self {
            Self::Object(source) => Some(source),
            _ => None,
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Object(source) => f.debug_tuple("Object").field(&source.type_name()).finish(),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Enum { case, value } => f
                .debug_struct("Enum")
                .field("case", case)
                .field("value", value)
                .finish(),
            Self::Domain(value) => f.debug_tuple("Domain").field(value).finish(),
        }
    }
}

impl PartialEq for Resolved {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_null() && b.is_null() => true,
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => a == b,
            (
                Self::Enum { case: a, value: va },
                Self::Enum { case: b, value: vb },
            ) => a == b && va == vb,
            (Self::Domain(a), Self::Domain(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            value => Self::Value(value),
        }
    }
}

impl<T: Into<Resolved>> From<Option<T>> for Resolved {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Resolved>> From<Vec<T>> for Resolved {
    fn from(items: Vec<T>) -> Self {
        Self::list(items)
    }
}

macro_rules! resolved_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Resolved {
                fn from(value: $ty) -> Self {
                    Self::Value(Value::from(value))
                }
            }
        )*
    };
}

resolved_from_scalar!(&str, String, bool, i32, i64, u32, u64);

impl From<f64> for Resolved {
    fn from(value: f64) -> Self {
        async_graphql::Number::from_f64(value).map_or(Self::Null, |n| Self::Value(Value::Number(n)))
    }
}

type MethodFn = Arc<dyn Fn(&Arguments, &RequestContext) -> FieldResult + Send + Sync>;

/// A [`FieldSource`] assembled from named methods and properties.
///
/// # Example
///
/// ```ignore
/// let product = Record::new("Product")
///     .property("name", "Sneaker")
///     .method("price", |args, _ctx| Ok(Resolved::from(42)));
/// ```
#[derive(Clone)]
pub struct Record {
    type_name: String,
    methods: HashMap<String, MethodFn>,
    properties: IndexMap<String, Resolved>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            methods: HashMap::new(),
            properties: IndexMap::new(),
        }
    }

    /// Adds a readable property.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, value: impl Into<Resolved>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Adds a callable member.
    #[must_use]
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Arguments, &RequestContext) -> FieldResult + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Wraps the record as a resolved object.
    pub fn into_resolved(self) -> Resolved {
        Resolved::object(self)
    }
}

impl FieldSource for Record {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn call(&self, member: &str, args: &Arguments, ctx: &RequestContext) -> Option<FieldResult> {
        self.methods.get(member).map(|method| method(args, ctx))
    }

    fn read(&self, member: &str) -> Option<Resolved> {
        self.properties.get(member).cloned()
    }
}

impl From<Record> for Resolved {
    fn from(record: Record) -> Self {
        record.into_resolved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion() {
        assert!(Resolved::json(json!(null)).is_null());
        assert_eq!(Resolved::json(json!("shoes")), Resolved::from("shoes"));
        assert!(matches!(
            Resolved::json(json!({"name": "Sneaker"})),
            Resolved::Value(Value::Object(_))
        ));
    }

    #[test]
    fn test_into_backing_replaces_enum_cases() {
        let value = Resolved::list([
            Resolved::enum_case("SHOES", "shoes"),
            Resolved::enum_case("HATS", "hats"),
        ]);
        assert_eq!(
            value.into_backing(),
            Resolved::list(["shoes", "hats"])
        );
    }

    #[test]
    fn test_record_members() {
        let record = Record::new("Product")
            .property("name", "Sneaker")
            .method("price", |_, _| Ok(Resolved::from(42)));

        assert_eq!(record.type_name(), "Product");
        assert_eq!(record.read("name"), Some(Resolved::from("Sneaker")));
        assert!(record.read("price").is_none());

        let args = Arguments::default();
        let ctx = RequestContext::default();
        let price = record.call("price", &args, &ctx).expect("callable").unwrap();
        assert_eq!(price, Resolved::from(42));
        assert!(record.call("name", &args, &ctx).is_none());
    }

    #[test]
    fn test_object_equality_is_identity() {
        let a = Record::new("Product").into_resolved();
        let b = Record::new("Product").into_resolved();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
