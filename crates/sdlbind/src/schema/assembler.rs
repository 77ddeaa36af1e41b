//! Assembly of executable schemas from type configurations.
//!
//! Starting from the root types, every reachable type is obtained from the
//! [`TypeRegistry`] and converted into its `async_graphql::dynamic`
//! counterpart. All output fields resolve through one shared
//! [`FieldResolver`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, InputObject, InputValue, Interface, InterfaceField, Object,
    Scalar, Schema, SchemaBuilder, Subscription, SubscriptionField, SubscriptionFieldFuture, Union,
};
use indexmap::IndexMap;
use sdlbind_config::EndpointConfig;
use tracing::{debug, trace};

use crate::coercion::ArgumentCoercer;
use crate::error::SchemaError;
use crate::registry::{TypeHandle, TypeRegistry};
use crate::resolver::{FieldResolver, default_resolve_type};
use crate::types::{ArgumentConfig, FieldConfig, TypeConfig, TypeKind, is_builtin_scalar};
use crate::value::FieldSource;

/// Names of the root operation types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootTypes {
    pub query: String,
    pub mutation: Option<String>,
    pub subscription: Option<String>,
}

impl RootTypes {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mutation: None,
            subscription: None,
        }
    }

    #[must_use]
    pub fn with_mutation(mut self, mutation: impl Into<String>) -> Self {
        self.mutation = Some(mutation.into());
        self
    }

    #[must_use]
    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = Some(subscription.into());
        self
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.query.as_str())
            .chain(self.mutation.as_deref())
            .chain(self.subscription.as_deref())
    }
}

/// Query limits applied to an assembled schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaLimits {
    /// Maximum query depth allowed.
    pub max_depth: usize,

    /// Maximum query complexity allowed.
    pub max_complexity: usize,

    /// Whether to enable introspection queries.
    pub introspection: bool,
}

impl Default for SchemaLimits {
    fn default() -> Self {
        Self::from(&EndpointConfig::default())
    }
}

impl From<&EndpointConfig> for SchemaLimits {
    fn from(endpoint: &EndpointConfig) -> Self {
        Self {
            max_depth: endpoint.max_depth,
            max_complexity: endpoint.max_complexity,
            introspection: endpoint.introspection,
        }
    }
}

/// Builds an executable schema from the types of a registry.
///
/// # Example
///
/// ```ignore
/// let schema = SchemaAssembler::new(&registry, coercer)
///     .with_limits(SchemaLimits::from(&endpoint))
///     .assemble(&RootTypes::new("Query"), &[])?;
/// ```
pub struct SchemaAssembler<'r> {
    registry: &'r TypeRegistry,
    coercer: ArgumentCoercer,
    root: Option<Arc<dyn FieldSource>>,
    limits: SchemaLimits,
}

impl<'r> SchemaAssembler<'r> {
    pub fn new(registry: &'r TypeRegistry, coercer: ArgumentCoercer) -> Self {
        Self {
            registry,
            coercer,
            root: None,
            limits: SchemaLimits::default(),
        }
    }

    /// Sets the source resolving root fields.
    #[must_use]
    pub fn with_root(mut self, root: Option<Arc<dyn FieldSource>>) -> Self {
        self.root = root;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: SchemaLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Assembles the schema reachable from `roots`, plus `extra` types that
    /// are not referenced from the roots (e.g. interface implementations).
    ///
    /// # Errors
    ///
    /// Fails with the first type registry error, when a root is not an
    /// object type, or when the executor rejects the schema.
    pub fn assemble(&self, roots: &RootTypes, extra: &[String]) -> Result<Schema, SchemaError> {
        let types = self.collect_types(roots, extra)?;

        for root in roots.names() {
            if types.get(root).map(|t| t.kind) != Some(TypeKind::Object) {
                return Err(SchemaError::Build(format!(
                    "Root operation type \"{root}\" must be an object type"
                )));
            }
        }

        let resolver = Arc::new(self.field_resolver(&types));
        let mut builder = Schema::build(
            roots.query.as_str(),
            roots.mutation.as_deref(),
            roots.subscription.as_deref(),
        );

        for config in types.values() {
            builder = if roots.subscription.as_deref() == Some(config.name.as_str()) {
                builder.register(self.build_subscription(config, &resolver)?)
            } else {
                self.register_type(builder, config, &resolver)?
            };
        }

        let mut builder = builder
            .limit_depth(self.limits.max_depth)
            .limit_complexity(self.limits.max_complexity);
        if !self.limits.introspection {
            builder = builder.disable_introspection();
        }

        let schema = builder
            .finish()
            .map_err(|e| SchemaError::Build(e.to_string()))?;

        debug!(query = %roots.query, types = types.len(), "Schema assembled");
        Ok(schema)
    }

    /// Breadth-first walk over all types reachable from the roots.
    fn collect_types(
        &self,
        roots: &RootTypes,
        extra: &[String],
    ) -> Result<IndexMap<String, TypeHandle>, SchemaError> {
        let mut types = IndexMap::new();
        let mut queue: VecDeque<String> = roots
            .names()
            .map(str::to_string)
            .chain(extra.iter().cloned())
            .collect();

        while let Some(name) = queue.pop_front() {
            if types.contains_key(&name) || is_builtin_scalar(&name) {
                continue;
            }
            let handle = self.registry.get(&name)?;
            for referenced in handle.referenced_types(self.registry)? {
                if !types.contains_key(&referenced) {
                    queue.push_back(referenced);
                }
            }
            trace!(type_name = %name, kind = ?handle.kind, "Collected type");
            types.insert(name, handle);
        }

        Ok(types)
    }

    fn field_resolver(&self, types: &IndexMap<String, TypeHandle>) -> FieldResolver {
        let enums: HashMap<_, _> = types
            .values()
            .filter(|t| t.kind == TypeKind::Enum)
            .map(|t| (t.name.clone(), t.values.clone()))
            .collect();

        let parsers: HashMap<_, _> = types
            .values()
            .filter(|t| t.kind == TypeKind::Scalar)
            .filter_map(|t| t.scalar_parser.clone().map(|parser| (t.name.clone(), parser)))
            .collect();

        let coercer = self
            .coercer
            .clone()
            .with_schema_enums(enums.clone())
            .with_schema_scalars(parsers);
        let mut resolver = FieldResolver::new(coercer).with_root(self.root.clone());

        for (name, values) in enums {
            resolver = resolver.with_enum(name, values);
        }

        for config in types.values() {
            match config.kind {
                TypeKind::Object => resolver = resolver.with_object(config.name.clone()),
                TypeKind::Scalar => {
                    if let Some(serializer) = &config.scalar_serializer {
                        resolver = resolver.with_scalar(config.name.clone(), Arc::clone(serializer));
                    }
                }
                TypeKind::Interface | TypeKind::Union => {
                    let possible_types: HashSet<String> = if config.kind == TypeKind::Union {
                        config.possible_types.iter().cloned().collect()
                    } else {
                        types
                            .values()
                            .filter(|t| t.kind == TypeKind::Object && t.interfaces.contains(&config.name))
                            .map(|t| t.name.clone())
                            .collect()
                    };
                    let resolve_type = config
                        .resolve_type
                        .clone()
                        .unwrap_or_else(|| Arc::new(default_resolve_type));
                    resolver = resolver.with_abstract(config.name.clone(), resolve_type, possible_types);
                }
                _ => {}
            }
        }

        resolver
    }

    fn register_type(
        &self,
        builder: SchemaBuilder,
        config: &TypeConfig,
        resolver: &Arc<FieldResolver>,
    ) -> Result<SchemaBuilder, SchemaError> {
        let builder = match config.kind {
            TypeKind::Object => {
                let mut object = Object::new(config.name.as_str());
                if let Some(description) = &config.description {
                    object = object.description(description.as_str());
                }
                for interface in &config.interfaces {
                    object = object.implement(interface.as_str());
                }
                for field in self.fields(config)?.iter() {
                    object = object.field(build_field(field, resolver));
                }
                builder.register(object)
            }
            TypeKind::Interface => {
                let mut interface = Interface::new(config.name.as_str());
                if let Some(description) = &config.description {
                    interface = interface.description(description.as_str());
                }
                for field in self.fields(config)?.iter() {
                    interface = interface.field(build_interface_field(field));
                }
                builder.register(interface)
            }
            TypeKind::Union => {
                let mut union = Union::new(config.name.as_str());
                if let Some(description) = &config.description {
                    union = union.description(description.as_str());
                }
                for member in &config.possible_types {
                    union = union.possible_type(member.as_str());
                }
                builder.register(union)
            }
            TypeKind::Enum => {
                let mut enumeration = Enum::new(config.name.as_str());
                if let Some(description) = &config.description {
                    enumeration = enumeration.description(description.as_str());
                }
                for value in &config.values {
                    let mut item = EnumItem::new(value.name.as_str());
                    if let Some(description) = &value.description {
                        item = item.description(description.as_str());
                    }
                    if let Some(reason) = &value.deprecation {
                        item = item.deprecation(Some(reason.as_str()));
                    }
                    enumeration = enumeration.item(item);
                }
                builder.register(enumeration)
            }
            TypeKind::InputObject => {
                let mut input = InputObject::new(config.name.as_str());
                if let Some(description) = &config.description {
                    input = input.description(description.as_str());
                }
                for field in &config.input_fields {
                    input = input.field(build_input_value(field));
                }
                builder.register(input)
            }
            TypeKind::Scalar => {
                let mut scalar = Scalar::new(config.name.as_str());
                if let Some(description) = &config.description {
                    scalar = scalar.description(description.as_str());
                }
                if let Some(validator) = &config.scalar_validator {
                    let validator = Arc::clone(validator);
                    scalar = scalar.validator(move |value| validator(value));
                }
                builder.register(scalar)
            }
        };
        Ok(builder)
    }

    fn build_subscription(
        &self,
        config: &TypeConfig,
        resolver: &Arc<FieldResolver>,
    ) -> Result<Subscription, SchemaError> {
        let mut subscription = Subscription::new(config.name.as_str());
        if let Some(description) = &config.description {
            subscription = subscription.description(description.as_str());
        }
        for field in self.fields(config)?.iter() {
            subscription = subscription.field(build_subscription_field(field, resolver));
        }
        Ok(subscription)
    }

    fn fields(&self, config: &TypeConfig) -> Result<Arc<Vec<FieldConfig>>, SchemaError> {
        config.fields.resolve(self.registry)
    }
}

fn build_input_value(argument: &ArgumentConfig) -> InputValue {
    let mut input = InputValue::new(argument.name.as_str(), argument.ty.to_type_ref());
    if let Some(description) = &argument.description {
        input = input.description(description.as_str());
    }
    if let Some(default_value) = &argument.default_value {
        input = input.default_value(default_value.clone());
    }
    input
}

fn build_field(config: &FieldConfig, resolver: &Arc<FieldResolver>) -> Field {
    let field = Arc::new(config.clone());
    let resolver = Arc::clone(resolver);
    let mut output = Field::new(config.name.as_str(), config.ty.to_type_ref(), move |ctx| {
        let field = Arc::clone(&field);
        let resolver = Arc::clone(&resolver);
        FieldFuture::new(async move { resolver.resolve_field(&field, &ctx).await })
    });
    if let Some(description) = &config.description {
        output = output.description(description.as_str());
    }
    if let Some(reason) = &config.deprecation {
        output = output.deprecation(Some(reason.as_str()));
    }
    for argument in &config.args {
        output = output.argument(build_input_value(argument));
    }
    output
}

fn build_interface_field(config: &FieldConfig) -> InterfaceField {
    let mut output = InterfaceField::new(config.name.as_str(), config.ty.to_type_ref());
    if let Some(description) = &config.description {
        output = output.description(description.as_str());
    }
    if let Some(reason) = &config.deprecation {
        output = output.deprecation(Some(reason.as_str()));
    }
    for argument in &config.args {
        output = output.argument(build_input_value(argument));
    }
    output
}

fn build_subscription_field(config: &FieldConfig, resolver: &Arc<FieldResolver>) -> SubscriptionField {
    let field = Arc::new(config.clone());
    let resolver = Arc::clone(resolver);
    let mut output = SubscriptionField::new(config.name.as_str(), config.ty.to_type_ref(), move |ctx| {
        let field = Arc::clone(&field);
        let resolver = Arc::clone(&resolver);
        SubscriptionFieldFuture::new(async move {
            let events = resolver.resolve_events(&field, &ctx).await?;
            Ok(futures_util::stream::iter(events))
        })
    });
    if let Some(description) = &config.description {
        output = output.description(description.as_str());
    }
    for argument in &config.args {
        output = output.argument(build_input_value(argument));
    }
    output
}
