//! Endpoint configuration.
//!
//! Each endpoint either names typed root types (`query_schema`,
//! `mutation_schema`, `subscription_schema`) that are looked up in the type
//! registry, or points at an SDL file (`schema`) that is parsed and cached.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Placeholder substituted with a type name in `resolver_path_pattern`.
pub const TYPE_PLACEHOLDER: &str = "{Type}";

/// Top-level configuration: all endpoints plus file monitoring settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Endpoints keyed by id, in declaration order.
    #[serde(default)]
    pub endpoints: IndexMap<String, EndpointConfig>,

    /// SDL file monitoring.
    #[serde(default)]
    pub watch: WatchConfig,
}

impl GatewayConfig {
    /// Parses configuration from TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::parse(e.to_string()))
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Adds an endpoint, replacing any previous one with the same id.
    #[must_use]
    pub fn with_endpoint(mut self, id: impl Into<String>, endpoint: EndpointConfig) -> Self {
        self.endpoints.insert(id.into(), endpoint);
        self
    }

    /// Returns the configuration of an endpoint.
    pub fn endpoint(&self, id: &str) -> Option<&EndpointConfig> {
        self.endpoints.get(id)
    }

    /// All SDL source paths, one per SDL-mode endpoint.
    pub fn schema_paths(&self) -> Vec<PathBuf> {
        self.endpoints
            .values()
            .filter_map(|e| e.schema.clone())
            .collect()
    }

    /// Validates every endpoint.
    ///
    /// File existence is not checked here; a missing SDL file is reported
    /// when the schema is first requested.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (id, endpoint) in &self.endpoints {
            endpoint
                .validate()
                .map_err(|msg| ConfigError::validation(format!("endpoints.{id}: {msg}")))?;
        }
        if self.watch.enabled && self.watch.debounce_ms == 0 {
            return Err(ConfigError::validation(
                "watch.debounce_ms must be > 0 when watching is enabled",
            ));
        }
        Ok(())
    }
}

/// Where the root schema of an endpoint comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSource<'a> {
    /// Root types are resolved by name through the type registry.
    Typed {
        query: &'a str,
        mutation: Option<&'a str>,
        subscription: Option<&'a str>,
    },
    /// Schema is parsed from an SDL file.
    Sdl(&'a Path),
}

/// Configuration of a single GraphQL endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Registered type name of the query root (typed mode).
    #[serde(default)]
    pub query_schema: Option<String>,

    /// Registered type name of the mutation root (typed mode).
    #[serde(default)]
    pub mutation_schema: Option<String>,

    /// Registered type name of the subscription root (typed mode).
    #[serde(default)]
    pub subscription_schema: Option<String>,

    /// Path of the SDL file (SDL mode).
    #[serde(default, alias = "schema_path")]
    pub schema: Option<PathBuf>,

    /// Explicit type name → resolver id bindings.
    #[serde(default)]
    pub resolvers: HashMap<String, String>,

    /// Fallback resolver id template, e.g. `shop::{Type}Resolver`.
    #[serde(default)]
    pub resolver_path_pattern: Option<String>,

    /// Ordered namespaces searched for domain types during argument coercion.
    #[serde(default)]
    pub type_namespaces: Vec<String>,

    /// Maximum query depth allowed.
    /// Default: 15
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum query complexity allowed.
    /// Default: 500
    #[serde(default = "default_max_complexity")]
    pub max_complexity: usize,

    /// Enable GraphQL introspection queries.
    /// Default: true
    #[serde(default = "default_introspection")]
    pub introspection: bool,
}

fn default_max_depth() -> usize {
    15
}

fn default_max_complexity() -> usize {
    500
}

fn default_introspection() -> bool {
    true
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            query_schema: None,
            mutation_schema: None,
            subscription_schema: None,
            schema: None,
            resolvers: HashMap::new(),
            resolver_path_pattern: None,
            type_namespaces: Vec::new(),
            max_depth: default_max_depth(),
            max_complexity: default_max_complexity(),
            introspection: default_introspection(),
        }
    }
}

impl EndpointConfig {
    /// Creates a typed-mode endpoint with the given query root type.
    #[must_use]
    pub fn typed(query_schema: impl Into<String>) -> Self {
        Self {
            query_schema: Some(query_schema.into()),
            ..Default::default()
        }
    }

    /// Creates an SDL-mode endpoint reading the given file.
    #[must_use]
    pub fn sdl(schema: impl Into<PathBuf>) -> Self {
        Self {
            schema: Some(schema.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_mutation(mut self, mutation_schema: impl Into<String>) -> Self {
        self.mutation_schema = Some(mutation_schema.into());
        self
    }

    #[must_use]
    pub fn with_subscription(mut self, subscription_schema: impl Into<String>) -> Self {
        self.subscription_schema = Some(subscription_schema.into());
        self
    }

    /// Binds a type name to a resolver id.
    #[must_use]
    pub fn with_resolver(mut self, type_name: impl Into<String>, resolver_id: impl Into<String>) -> Self {
        self.resolvers.insert(type_name.into(), resolver_id.into());
        self
    }

    #[must_use]
    pub fn with_resolver_path_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.resolver_path_pattern = Some(pattern.into());
        self
    }

    /// Appends a namespace to the domain type search path.
    #[must_use]
    pub fn with_type_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.type_namespaces.push(namespace.into());
        self
    }

    /// Returns the root schema source, or `None` if neither a query root
    /// nor an SDL file is configured. Typed mode wins when both are set.
    pub fn source(&self) -> Option<SchemaSource<'_>> {
        if let Some(query) = self.query_schema.as_deref() {
            return Some(SchemaSource::Typed {
                query,
                mutation: self.mutation_schema.as_deref(),
                subscription: self.subscription_schema.as_deref(),
            });
        }
        self.schema.as_deref().map(SchemaSource::Sdl)
    }

    /// Whether the endpoint is served from an SDL file.
    pub fn is_sdl(&self) -> bool {
        matches!(self.source(), Some(SchemaSource::Sdl(_)))
    }

    /// Substitutes `type_name` into the resolver path pattern.
    pub fn resolver_id_for_pattern(&self, type_name: &str) -> Option<String> {
        self.resolver_path_pattern
            .as_deref()
            .map(|pattern| pattern.replace(TYPE_PLACEHOLDER, type_name))
    }

    /// Validates the endpoint.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_depth == 0 {
            return Err("max_depth must be > 0".into());
        }
        if self.max_complexity == 0 {
            return Err("max_complexity must be > 0".into());
        }
        if let Some(pattern) = &self.resolver_path_pattern {
            if !pattern.contains(TYPE_PLACEHOLDER) {
                return Err(format!(
                    "resolver_path_pattern \"{pattern}\" must contain {TYPE_PLACEHOLDER}"
                ));
            }
        }
        if self.query_schema.is_none()
            && (self.mutation_schema.is_some() || self.subscription_schema.is_some())
        {
            return Err("mutation_schema and subscription_schema require query_schema".into());
        }
        Ok(())
    }
}

/// SDL file monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Watch SDL files and invalidate cached schemas on change.
    /// Default: false
    #[serde(default)]
    pub enabled: bool,

    /// Debounce window for rapid successive writes, in milliseconds.
    /// Default: 500
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let config = EndpointConfig::default();
        assert_eq!(config.max_depth, 15);
        assert_eq!(config.max_complexity, 500);
        assert!(config.introspection);
        assert!(config.source().is_none());
    }

    #[test]
    fn test_typed_source_wins() {
        let mut config = EndpointConfig::typed("Query").with_mutation("Mutation");
        config.schema = Some(PathBuf::from("schema.graphql"));
        assert_eq!(
            config.source(),
            Some(SchemaSource::Typed {
                query: "Query",
                mutation: Some("Mutation"),
                subscription: None,
            })
        );
        assert!(!config.is_sdl());
    }

    #[test]
    fn test_sdl_source() {
        let config = EndpointConfig::sdl("schema.graphql");
        assert_eq!(
            config.source(),
            Some(SchemaSource::Sdl(Path::new("schema.graphql")))
        );
    }

    #[test]
    fn test_resolver_pattern_substitution() {
        let config = EndpointConfig::sdl("schema.graphql")
            .with_resolver_path_pattern("shop::{Type}Resolver");
        assert_eq!(
            config.resolver_id_for_pattern("Product").as_deref(),
            Some("shop::ProductResolver")
        );
        assert!(EndpointConfig::default().resolver_id_for_pattern("Product").is_none());
    }

    #[test]
    fn test_invalid_pattern() {
        let config = EndpointConfig::sdl("schema.graphql").with_resolver_path_pattern("shop::Resolver");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mutation_without_query() {
        let config = EndpointConfig {
            mutation_schema: Some("Mutation".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_from_toml() {
        let toml = r#"
            [watch]
            enabled = true

            [endpoints.shop]
            schema = "schema.graphql"
            resolver_path_pattern = "shop::{Type}Resolver"
            type_namespaces = ["shop::types", "common::types"]
            max_depth = 20

            [endpoints.shop.resolvers]
            Query = "shop::QueryResolver"

            [endpoints.admin]
            query_schema = "AdminQuery"
            introspection = false
        "#;

        let config = GatewayConfig::from_toml(toml).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.watch.enabled);
        assert_eq!(config.watch.debounce_ms, 500);

        let ids: Vec<_> = config.endpoints.keys().cloned().collect();
        assert_eq!(ids, vec!["shop".to_string(), "admin".to_string()]);

        let shop = config.endpoint("shop").unwrap();
        assert!(shop.is_sdl());
        assert_eq!(shop.max_depth, 20);
        assert_eq!(shop.type_namespaces.len(), 2);
        assert_eq!(
            shop.resolvers.get("Query").map(String::as_str),
            Some("shop::QueryResolver")
        );

        let admin = config.endpoint("admin").unwrap();
        assert!(!admin.introspection);
        assert_eq!(config.schema_paths(), vec![PathBuf::from("schema.graphql")]);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            GatewayConfig::from_toml("endpoints = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validate_reports_endpoint_id() {
        let config = GatewayConfig::default().with_endpoint(
            "broken",
            EndpointConfig {
                max_depth: 0,
                ..EndpointConfig::typed("Query")
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("endpoints.broken"));
    }
}
