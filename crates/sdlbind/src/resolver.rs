//! Generic field resolution.
//!
//! Every field of an assembled schema is resolved through one
//! [`FieldResolver`]. Before a handler runs, the declared arguments are
//! coerced to domain types; a coercion failure is reported as a field error
//! and the handler is never invoked. Fields without a bound handler use
//! [`default_resolve`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_graphql::dynamic::{FieldValue, ResolverContext};
use async_graphql::{Name, Value};
use indexmap::IndexMap;
use tracing::{trace, warn};

use crate::coercion::{ArgumentCoercer, Arguments, backing_to_enum};
use crate::context::RequestContext;
use crate::types::{EnumValueConfig, FieldConfig, ResolveTypeFn, ScalarSerializer, WireType};
use crate::value::{FieldResult, FieldSource, Resolved};

/// Key a JSON-like object uses to name its own type.
pub const TYPENAME_KEY: &str = "__typename";

/// Resolves `field` on `source` without a bound handler.
///
/// Resolution order:
/// 1. a callable member named `field`, invoked with the coerced arguments
/// 2. a readable property named `field`
/// 3. an entry named `field` of a JSON-like object
/// 4. `null`
pub fn default_resolve(field: &str, source: &Resolved, args: &Arguments, ctx: &RequestContext) -> FieldResult {
    match source {
        Resolved::Object(object) => {
            if let Some(result) = object.call(field, args, ctx) {
                return result;
            }
            Ok(object.read(field).unwrap_or_default())
        }
        Resolved::Value(Value::Object(map)) => Ok(map
            .get(&Name::new(field))
            .cloned()
            .map(Resolved::from)
            .unwrap_or_default()),
        _ => Ok(Resolved::Null),
    }
}

/// Concrete type of an abstract value, taken from the value itself.
///
/// Application objects report their [`FieldSource::type_name`]; JSON-like
/// objects their `__typename` entry.
pub fn default_resolve_type(value: &Resolved, _ctx: &RequestContext) -> Option<String> {
    match value {
        Resolved::Object(object) => Some(object.type_name().to_string()),
        Resolved::Value(Value::Object(map)) => match map.get(TYPENAME_KEY) {
            Some(Value::String(name)) => Some(name.clone()),
            _ => None,
        },
        _ => None,
    }
}

struct AbstractType {
    resolve_type: ResolveTypeFn,
    possible_types: HashSet<String>,
}

/// Resolves fields of one assembled schema.
#[derive(Default)]
pub struct FieldResolver {
    coercer: ArgumentCoercer,
    root: Option<Arc<dyn FieldSource>>,
    enums: HashMap<String, Vec<EnumValueConfig>>,
    abstracts: HashMap<String, AbstractType>,
    objects: HashSet<String>,
    scalars: HashMap<String, ScalarSerializer>,
}

impl FieldResolver {
    pub fn new(coercer: ArgumentCoercer) -> Self {
        Self {
            coercer,
            ..Default::default()
        }
    }

    /// Sets the source used for root fields, whose parent value is null.
    #[must_use]
    pub fn with_root(mut self, root: Option<Arc<dyn FieldSource>>) -> Self {
        self.root = root;
        self
    }

    /// Registers the cases of an output enum.
    #[must_use]
    pub fn with_enum(mut self, name: impl Into<String>, values: Vec<EnumValueConfig>) -> Self {
        self.enums.insert(name.into(), values);
        self
    }

    /// Registers an interface or union and its possible object types.
    #[must_use]
    pub fn with_abstract(
        mut self,
        name: impl Into<String>,
        resolve_type: ResolveTypeFn,
        possible_types: HashSet<String>,
    ) -> Self {
        self.abstracts.insert(
            name.into(),
            AbstractType {
                resolve_type,
                possible_types,
            },
        );
        self
    }

    /// Registers an object type; its values are passed to child fields as
    /// parent values.
    #[must_use]
    pub fn with_object(mut self, name: impl Into<String>) -> Self {
        self.objects.insert(name.into());
        self
    }

    /// Registers the output serializer of a custom scalar.
    #[must_use]
    pub fn with_scalar(mut self, name: impl Into<String>, serializer: ScalarSerializer) -> Self {
        self.scalars.insert(name.into(), serializer);
        self
    }

    pub fn coercer(&self) -> &ArgumentCoercer {
        &self.coercer
    }

    /// Resolves one field invocation.
    ///
    /// Arguments are coerced first; a coercion failure becomes a field error
    /// before any handler runs. A null parent is replaced by the root source.
    /// Enumerated results are returned as their underlying scalar.
    pub async fn resolve(
        &self,
        field: &FieldConfig,
        parent: &Resolved,
        raw_args: IndexMap<String, Value>,
        ctx: &RequestContext,
    ) -> FieldResult {
        self.resolve_value(field, parent, raw_args, ctx)
            .await
            .map(Resolved::into_backing)
    }

    /// Like [`FieldResolver::resolve`], but keeps enumerated cases so the
    /// executor can map them to the declared enum.
    async fn resolve_value(
        &self,
        field: &FieldConfig,
        parent: &Resolved,
        raw_args: IndexMap<String, Value>,
        ctx: &RequestContext,
    ) -> FieldResult {
        let args = self
            .coercer
            .coerce_arguments(&field.args, raw_args)
            .map_err(|e| {
                trace!(field = %field.name, error = %e, "Argument coercion failed");
                e.into_field_error()
            })?;

        let root;
        let source = match (parent.is_null(), &self.root) {
            (true, Some(object)) => {
                root = Resolved::Object(Arc::clone(object));
                &root
            }
            _ => parent,
        };

        match &field.handler {
            Some(handler) => handler.call(source, &args, ctx).await,
            None => default_resolve(&field.name, source, &args, ctx),
        }
    }

    /// Resolves a field for the executor and converts the result to the
    /// field's declared output type.
    pub(crate) async fn resolve_field<'a>(
        &self,
        field: &FieldConfig,
        ctx: &ResolverContext<'_>,
    ) -> Result<Option<FieldValue<'a>>, async_graphql::Error> {
        let parent = parent_value(ctx.parent_value);
        let request = request_context(ctx);
        let value = self
            .resolve_value(field, &parent, collect_arguments(ctx), &request)
            .await?;
        self.to_field_value(&field.ty, value, &request)
    }

    /// Resolves a subscription root field into the events it emits.
    ///
    /// A list result emits one event per item; any other result emits a
    /// single event.
    pub(crate) async fn resolve_events(
        &self,
        field: &FieldConfig,
        ctx: &ResolverContext<'_>,
    ) -> Result<Vec<Result<FieldValue<'static>, async_graphql::Error>>, async_graphql::Error> {
        let parent = parent_value(ctx.parent_value);
        let request = request_context(ctx);
        let resolved = self
            .resolve_value(field, &parent, collect_arguments(ctx), &request)
            .await?;
        let items = match resolved {
            Resolved::List(items) => items,
            Resolved::Null => Vec::new(),
            other => vec![other],
        };
        Ok(items
            .into_iter()
            .map(|item| {
                self.to_field_value(&field.ty, item, &request)
                    .map(|value| value.unwrap_or(FieldValue::NULL))
            })
            .collect())
    }

    /// Converts a resolved value to an executor value of type `ty`.
    pub(crate) fn to_field_value<'a>(
        &self,
        ty: &WireType,
        value: Resolved,
        ctx: &RequestContext,
    ) -> Result<Option<FieldValue<'a>>, async_graphql::Error> {
        if value.is_null() {
            return Ok(None);
        }
        match ty {
            WireType::NonNull(inner) => self.to_field_value(inner, value, ctx),
            WireType::List(element) => {
                let items = match value {
                    Resolved::List(items) => items,
                    Resolved::Value(Value::List(items)) => items.into_iter().map(Resolved::from).collect(),
                    other => vec![other],
                };
                let values = items
                    .into_iter()
                    .map(|item| {
                        self.to_field_value(element, item, ctx)
                            .map(|value| value.unwrap_or(FieldValue::NULL))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(FieldValue::list(values)))
            }
            WireType::Named(name) => self.to_named_value(name, value, ctx).map(Some),
        }
    }

    fn to_named_value<'a>(
        &self,
        name: &str,
        value: Resolved,
        ctx: &RequestContext,
    ) -> Result<FieldValue<'a>, async_graphql::Error> {
        if let Some(cases) = self.enums.get(name) {
            let case = match &value {
                Resolved::Enum { case, .. } => Some(Value::Enum(Name::new(case))),
                Resolved::Value(backing) => backing_to_enum(cases, backing),
                _ => None,
            };
            return case.map(FieldValue::value).ok_or_else(|| {
                warn!(enum_type = %name, ?value, "Value is not a case of the enum");
                async_graphql::Error::new(format!("Value is not a case of enum \"{name}\""))
            });
        }

        if let Some(abstract_type) = self.abstracts.get(name) {
            let concrete = (abstract_type.resolve_type)(&value, ctx)
                .filter(|concrete| abstract_type.possible_types.contains(concrete));
            return match concrete {
                Some(concrete) => Ok(FieldValue::owned_any(value).with_type(concrete)),
                None => {
                    warn!(abstract_type = %name, ?value, "Unable to resolve concrete type");
                    Err(async_graphql::Error::new(format!(
                        "Unable to resolve the concrete type of \"{name}\""
                    )))
                }
            };
        }

        if self.objects.contains(name) {
            return Ok(FieldValue::owned_any(value));
        }

        if let Some(serialize) = self.scalars.get(name) {
            return serialize(&value).map(FieldValue::value).map_err(|message| {
                warn!(scalar = %name, ?value, %message, "Unable to serialize scalar");
                async_graphql::Error::new(format!("Unable to serialize scalar \"{name}\": {message}"))
            });
        }

        into_scalar(value).map(FieldValue::value).ok_or_else(|| {
            async_graphql::Error::new(format!("Expected a scalar value for type \"{name}\""))
        })
    }
}

fn into_scalar(value: Resolved) -> Option<Value> {
    match value {
        Resolved::Null => Some(Value::Null),
        Resolved::Value(value) | Resolved::Enum { value, .. } => Some(value),
        Resolved::List(items) => items
            .into_iter()
            .map(into_scalar)
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
        Resolved::Object(_) | Resolved::Domain(_) => None,
    }
}

/// Extracts the parent value passed down by the executor.
fn parent_value(parent: &FieldValue<'_>) -> Resolved {
    if let Some(resolved) = parent.downcast_ref::<Resolved>() {
        return resolved.clone();
    }
    parent.as_value().cloned().map(Resolved::from).unwrap_or_default()
}

fn collect_arguments(ctx: &ResolverContext<'_>) -> IndexMap<String, Value> {
    ctx.args
        .iter()
        .map(|(name, value)| (name.to_string(), value.as_value().clone()))
        .collect()
}

fn request_context(ctx: &ResolverContext<'_>) -> RequestContext {
    ctx.ctx.data_opt::<RequestContext>().cloned().unwrap_or_default()
}
