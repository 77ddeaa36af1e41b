//! Resolver binding.
//!
//! A [`Resolver`] carries the application logic of one named type: an
//! optional `resolve_type` for interfaces and unions, per-field handlers, and
//! and for custom scalars an input validator and parse/serialize functions. Resolvers are registered
//! by id in a [`ResolverCatalog`]; the [`ResolverBindingRegistry`] of an
//! endpoint maps type names to those ids and decorates raw type
//! configurations with what it finds.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_graphql::Value;
use dashmap::DashMap;
use sdlbind_config::EndpointConfig;
use tracing::{debug, trace};

use crate::coercion::{ArgumentCoercer, Arguments};
use crate::context::RequestContext;
use crate::resolver::default_resolve_type;
use crate::types::{
    FieldConfig, FieldHandler, ResolveTypeFn, ScalarParser, ScalarSerializer, ScalarValidator, TypeConfig,
    TypeKind, scalar_parser, scalar_serializer,
};
use crate::value::{FieldResult, Resolved};

/// Application logic bound to one named type.
#[derive(Clone, Default)]
pub struct Resolver {
    resolve_type: Option<ResolveTypeFn>,
    fields: HashMap<String, FieldHandler>,
    scalar_validator: Option<ScalarValidator>,
    scalar_parser: Option<ScalarParser>,
    scalar_serializer: Option<ScalarSerializer>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concrete type resolution of an interface or union.
    #[must_use]
    pub fn with_resolve_type<F>(mut self, resolve_type: F) -> Self
    where
        F: Fn(&Resolved, &RequestContext) -> Option<String> + Send + Sync + 'static,
    {
        self.resolve_type = Some(Arc::new(resolve_type));
        self
    }

    /// Binds a handler to the field `name`.
    #[must_use]
    pub fn field<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Resolved, &Arguments, &RequestContext) -> FieldResult + Send + Sync + 'static,
    {
        self.fields.insert(name.into(), FieldHandler::new(handler));
        self
    }

    /// Binds an asynchronous handler to the field `name`.
    ///
    /// ```ignore
    /// Resolver::new().field_async("product", move |_, args, _| {
    ///     let db = db.clone();
    ///     async move { db.product(args.string("id")).await }
    /// })
    /// ```
    #[must_use]
    pub fn field_async<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Resolved, Arguments, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FieldResult> + Send + 'static,
    {
        self.fields.insert(name.into(), FieldHandler::from_async(handler));
        self
    }

    /// Sets the input validator of a custom scalar.
    #[must_use]
    pub fn scalar_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.scalar_validator = Some(Arc::new(validator));
        self
    }

    /// Parses input values of a custom scalar into domain values of type `T`.
    ///
    /// Handlers read the parsed value with [`Arguments::domain`].
    #[must_use]
    pub fn scalar_parse<T, F>(mut self, parse: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Value) -> Result<T, String> + Send + Sync + 'static,
    {
        self.scalar_parser = Some(scalar_parser(parse));
        self
    }

    /// Serializes domain values of type `T` returned for a custom scalar.
    #[must_use]
    pub fn scalar_serialize<T, F>(mut self, serialize: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.scalar_serializer = Some(scalar_serializer(serialize));
        self
    }

    pub fn resolve_type(&self) -> Option<&ResolveTypeFn> {
        self.resolve_type.as_ref()
    }

    pub fn handler(&self, field: &str) -> Option<&FieldHandler> {
        self.fields.get(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Applies this resolver to a raw type configuration.
    ///
    /// A handler replaces the default resolution of the field with the same
    /// name; fields without a handler are left as they are. A deferred field
    /// list stays deferred.
    pub fn decorate(&self, mut config: TypeConfig) -> TypeConfig {
        if let Some(resolve_type) = &self.resolve_type
            && config.kind.is_abstract()
        {
            config.resolve_type = Some(Arc::clone(resolve_type));
        }

        if config.kind.has_fields() && !self.fields.is_empty() {
            let handlers = self.fields.clone();
            config.fields = config.fields.map(move |fields| bind_handlers(fields, &handlers));
        }

        if config.kind == TypeKind::Scalar {
            if let Some(validator) = &self.scalar_validator {
                config.scalar_validator = Some(Arc::clone(validator));
            }
            if let Some(parser) = &self.scalar_parser {
                config.scalar_parser = Some(Arc::clone(parser));
            }
            if let Some(serializer) = &self.scalar_serializer {
                config.scalar_serializer = Some(Arc::clone(serializer));
            }
        }

        config
    }
}

fn bind_handlers(fields: Vec<FieldConfig>, handlers: &HashMap<String, FieldHandler>) -> Vec<FieldConfig> {
    fields
        .into_iter()
        .map(|mut field| {
            if let Some(handler) = handlers.get(&field.name) {
                field.handler = Some(handler.clone());
            }
            field
        })
        .collect()
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<_> = self.fields.keys().collect();
        fields.sort();
        f.debug_struct("Resolver")
            .field("resolve_type", &self.resolve_type.is_some())
            .field("fields", &fields)
            .field("scalar_validator", &self.scalar_validator.is_some())
            .field("scalar_parser", &self.scalar_parser.is_some())
            .field("scalar_serializer", &self.scalar_serializer.is_some())
            .finish()
    }
}

/// Process-wide catalog of resolvers keyed by id.
#[derive(Default)]
pub struct ResolverCatalog {
    resolvers: DashMap<String, Arc<Resolver>>,
    generation: AtomicU64,
}

impl ResolverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the resolver with the given id.
    pub fn register(&self, id: impl Into<String>, resolver: Resolver) {
        let id = id.into();
        debug!(resolver_id = %id, ?resolver, "Registering resolver");
        self.resolvers.insert(id, Arc::new(resolver));
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Counter advanced by every registration.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Resolver>> {
        self.resolvers.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resolvers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

/// Decorates raw type configurations of one endpoint with their resolvers.
#[derive(Clone)]
pub struct ResolverBindingRegistry {
    endpoint: EndpointConfig,
    catalog: Arc<ResolverCatalog>,
    coercer: ArgumentCoercer,
}

impl ResolverBindingRegistry {
    pub fn new(endpoint: EndpointConfig, catalog: Arc<ResolverCatalog>, coercer: ArgumentCoercer) -> Self {
        Self {
            endpoint,
            catalog,
            coercer,
        }
    }

    /// Finds the resolver bound to `type_name`.
    ///
    /// The explicit binding map is consulted first, then the resolver path
    /// pattern. A pattern match is only used when the catalog actually
    /// contains the derived id; otherwise the type stays undecorated.
    pub fn lookup(&self, type_name: &str) -> Option<Arc<Resolver>> {
        if let Some(id) = self.endpoint.resolvers.get(type_name) {
            let resolver = self.catalog.get(id);
            if resolver.is_none() {
                debug!(type_name = %type_name, resolver_id = %id, "Bound resolver is not registered");
            }
            return resolver;
        }

        let id = self.endpoint.resolver_id_for_pattern(type_name)?;
        let resolver = self.catalog.get(&id);
        if resolver.is_some() {
            trace!(type_name = %type_name, resolver_id = %id, "Resolver found through path pattern");
        }
        resolver
    }

    /// Returns the decorated configuration of a raw type.
    pub fn decorate(&self, mut config: TypeConfig) -> TypeConfig {
        if config.kind.is_abstract() && config.resolve_type.is_none() {
            config.resolve_type = Some(Arc::new(default_resolve_type));
        }

        if config.kind == TypeKind::Enum
            && let Some(values) = self.coercer.enum_values(&config.name)
        {
            trace!(type_name = %config.name, count = values.len(), "Using domain enum values");
            config.values = values
                .iter()
                .map(|value| {
                    let mut value = value.clone();
                    if let Some(declared) = config.values.iter().find(|v| v.name == value.name) {
                        value.description = value.description.or_else(|| declared.description.clone());
                        value.deprecation = value.deprecation.or_else(|| declared.deprecation.clone());
                    }
                    value
                })
                .collect();
        }

        match self.lookup(&config.name) {
            Some(resolver) => resolver.decorate(config),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coercion::{DomainTypeCatalog, TypeNamespace};
    use crate::registry::TypeRegistry;
    use crate::types::{EnumValueConfig, FieldList, WireType};
    use crate::value::Record;

    fn query_config() -> TypeConfig {
        TypeConfig::object(
            "Query",
            FieldList::eager(vec![
                FieldConfig::new("products", WireType::named("Product").list()),
                FieldConfig::new("version", WireType::named("String")),
            ]),
        )
    }

    fn catalog() -> Arc<ResolverCatalog> {
        let catalog = ResolverCatalog::new();
        catalog.register(
            "shop::QueryResolver",
            Resolver::new().field("products", |_, _, _| Ok(Resolved::list(["a", "b"]))),
        );
        catalog.register(
            "shop::ItemResolver",
            Resolver::new().with_resolve_type(|_, _| Some("Book".to_string())),
        );
        Arc::new(catalog)
    }

    fn bindings(endpoint: EndpointConfig) -> ResolverBindingRegistry {
        ResolverBindingRegistry::new(endpoint, catalog(), ArgumentCoercer::default())
    }

    #[test]
    fn test_explicit_binding_wins_over_pattern() {
        let endpoint = EndpointConfig::sdl("shop.graphql")
            .with_resolver("Query", "shop::ItemResolver")
            .with_resolver_path_pattern("shop::{Type}Resolver");
        let bindings = bindings(endpoint);
        let resolver = bindings.lookup("Query").unwrap();
        assert!(resolver.resolve_type().is_some());
        assert!(resolver.handler("products").is_none());
    }

    #[test]
    fn test_pattern_fallback() {
        let endpoint = EndpointConfig::sdl("shop.graphql").with_resolver_path_pattern("shop::{Type}Resolver");
        let bindings = bindings(endpoint);
        assert!(bindings.lookup("Query").is_some());
        assert!(bindings.lookup("Product").is_none());
    }

    #[test]
    fn test_no_binding_is_not_an_error() {
        let bindings = bindings(EndpointConfig::sdl("shop.graphql"));
        assert!(bindings.lookup("Query").is_none());
        let decorated = bindings.decorate(query_config());
        let fields = decorated.fields.resolve(&TypeRegistry::new()).unwrap();
        assert!(fields.iter().all(|f| !f.has_handler()));
    }

    #[tokio::test]
    async fn test_handler_replaces_default_only_for_named_field() {
        let endpoint = EndpointConfig::sdl("shop.graphql").with_resolver("Query", "shop::QueryResolver");
        let decorated = bindings(endpoint).decorate(query_config());
        let fields = decorated.fields.resolve(&TypeRegistry::new()).unwrap();

        let products = fields.iter().find(|f| f.name == "products").unwrap();
        let version = fields.iter().find(|f| f.name == "version").unwrap();
        assert!(products.has_handler());
        assert!(!version.has_handler());

        let handler = products.handler.as_ref().unwrap();
        let value = handler
            .call(&Resolved::Null, &Arguments::new(), &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(value, Resolved::list(["a", "b"]));
    }

    #[test]
    fn test_deferred_fields_stay_deferred() {
        let endpoint = EndpointConfig::sdl("shop.graphql").with_resolver("Query", "shop::QueryResolver");
        let raw = TypeConfig::object(
            "Query",
            FieldList::deferred(|_| Ok(vec![FieldConfig::new("products", WireType::named("String"))])),
        );
        let decorated = bindings(endpoint).decorate(raw);
        assert!(decorated.fields.is_deferred());
        let fields = decorated.fields.resolve(&TypeRegistry::new()).unwrap();
        assert!(fields[0].has_handler());
    }

    #[test]
    fn test_abstract_types_get_resolve_type() {
        let bindings = bindings(
            EndpointConfig::sdl("shop.graphql").with_resolver("SearchResult", "shop::ItemResolver"),
        );

        let union = bindings.decorate(TypeConfig::union("SearchResult", ["Book", "Movie"]));
        let resolve_type = union.resolve_type.expect("resolve_type attached");
        assert_eq!(
            resolve_type(&Resolved::Null, &RequestContext::new()).as_deref(),
            Some("Book")
        );

        let interface = bindings.decorate(TypeConfig::interface("Node", FieldList::default()));
        let fallback = interface.resolve_type.expect("fallback attached");
        let movie = Record::new("Movie").into_resolved();
        assert_eq!(fallback(&movie, &RequestContext::new()).as_deref(), Some("Movie"));
    }

    #[test]
    fn test_enum_values_from_domain_namespace() {
        let domain = DomainTypeCatalog::new();
        domain.register(
            TypeNamespace::new("shop::types").register_enum("Category", [("SHOES", "shoes"), ("HATS", "hats")]),
        );
        let endpoint = EndpointConfig::sdl("shop.graphql").with_type_namespace("shop::types");
        let bindings = ResolverBindingRegistry::new(
            endpoint.clone(),
            catalog(),
            domain.coercer(&endpoint.type_namespaces),
        );

        let raw = TypeConfig::enumeration(
            "Category",
            vec![
                EnumValueConfig::named("SHOES"),
                EnumValueConfig::named("HATS").deprecated("Out of season"),
            ],
        );
        let decorated = bindings.decorate(raw);
        assert_eq!(decorated.values[0], EnumValueConfig::new("SHOES", "shoes"));
        assert_eq!(decorated.values[1].value, Value::from("hats"));
        assert_eq!(decorated.values[1].deprecation.as_deref(), Some("Out of season"));

        let untouched = bindings.decorate(TypeConfig::enumeration("Size", vec![EnumValueConfig::named("S")]));
        assert_eq!(untouched.values, vec![EnumValueConfig::named("S")]);
    }

    #[test]
    fn test_scalar_validator_attached() {
        let catalog = ResolverCatalog::new();
        catalog.register(
            "Sku",
            Resolver::new().scalar_validator(|value| matches!(value, Value::String(s) if s.len() == 8)),
        );
        let bindings = ResolverBindingRegistry::new(
            EndpointConfig::sdl("shop.graphql").with_resolver("Sku", "Sku"),
            Arc::new(catalog),
            ArgumentCoercer::default(),
        );
        let decorated = bindings.decorate(TypeConfig::scalar("Sku"));
        let validator = decorated.scalar_validator.unwrap();
        assert!(validator(&Value::from("ABCD1234")));
        assert!(!validator(&Value::from("ABC")));
    }

    #[test]
    fn test_scalar_codec_attached_only_to_scalars() {
        let catalog = ResolverCatalog::new();
        catalog.register(
            "Cents",
            Resolver::new()
                .scalar_parse(|value| value.clone().into_json().map_err(|e| e.to_string()))
                .scalar_serialize(|json: &serde_json::Value| Value::from_json(json.clone()).map_err(|e| e.to_string())),
        );
        let bindings = ResolverBindingRegistry::new(
            EndpointConfig::sdl("shop.graphql")
                .with_resolver("Cents", "Cents")
                .with_resolver("Price", "Cents"),
            Arc::new(catalog),
            ArgumentCoercer::default(),
        );

        let scalar = bindings.decorate(TypeConfig::scalar("Cents"));
        let parse = scalar.scalar_parser.unwrap();
        let parsed = parse("Cents", &Value::from(250)).unwrap();
        assert_eq!(parsed.type_name(), "Cents");
        assert_eq!(parsed.downcast_ref::<serde_json::Value>(), Some(&serde_json::json!(250)));

        let serialize = scalar.scalar_serializer.unwrap();
        assert_eq!(serialize(&Resolved::Domain(parsed)), Ok(Value::from(250)));
        assert_eq!(serialize(&Resolved::from("plain")), Ok(Value::from("plain")));

        let object = bindings.decorate(TypeConfig::object("Price", FieldList::default()));
        assert!(object.scalar_parser.is_none());
        assert!(object.scalar_serializer.is_none());
    }

    #[test]
    fn test_decoration_is_repeatable() {
        let endpoint = EndpointConfig::sdl("shop.graphql").with_resolver("Query", "shop::QueryResolver");
        let bindings = bindings(endpoint);
        let registry = TypeRegistry::new();
        let first = bindings.decorate(query_config());
        let second = bindings.decorate(query_config());
        let a = first.fields.resolve(&registry).unwrap();
        let b = second.fields.resolve(&registry).unwrap();
        let handlers = |fields: &[FieldConfig]| fields.iter().map(|f| (f.name.clone(), f.has_handler())).collect::<Vec<_>>();
        assert_eq!(handlers(&a), handlers(&b));
    }
}
