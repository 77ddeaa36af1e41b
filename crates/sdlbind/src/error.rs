//! Error types for schema construction and field resolution.
//!
//! Configuration, parse, build and type registry errors are fatal to the
//! request that triggered them. Argument coercion errors are client errors
//! and are reported per field through the executor.

use async_graphql::ErrorExtensions;

/// Errors that can occur while obtaining a schema or resolving a field.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    /// Endpoint unknown, no root schema configured, or SDL source missing.
    #[error("Configuration error for endpoint \"{endpoint}\": {message}")]
    Configuration {
        /// Endpoint id.
        endpoint: String,
        /// What is wrong.
        message: String,
    },

    /// Malformed SDL.
    #[error("Failed to parse schema for endpoint \"{endpoint}\": {message}")]
    Parse {
        /// Endpoint id.
        endpoint: String,
        /// Parser message, including the source location when known.
        message: String,
        /// Line of the first error position.
        line: Option<usize>,
        /// Column of the first error position.
        column: Option<usize>,
    },

    /// A type was requested while its eager construction was in progress.
    #[error(
        "Circular reference to type \"{name}\" during construction; declare the referencing field list with a deferred producer"
    )]
    CircularType {
        /// The type that was re-entered.
        name: String,
    },

    /// The name does not denote a registered type.
    #[error("\"{name}\" is not a registered type")]
    InvalidType {
        /// Requested type name.
        name: String,
    },

    /// A wire value failed domain validation.
    #[error("Validation error for {argument_type}: {message}")]
    ArgumentCoercion {
        /// Domain type name derived from the argument's wire type.
        argument_type: String,
        /// Validation message.
        message: String,
    },

    /// The assembled schema was rejected.
    #[error("Failed to build GraphQL schema: {0}")]
    Build(String),
}

impl SchemaError {
    /// Creates a configuration error.
    pub fn configuration(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates an argument coercion error.
    pub fn coercion(argument_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArgumentCoercion {
            argument_type: argument_type.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for GraphQL error extensions.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Parse { .. } => "SCHEMA_PARSE_ERROR",
            Self::CircularType { .. } => "CIRCULAR_TYPE",
            Self::InvalidType { .. } => "INVALID_TYPE",
            Self::ArgumentCoercion { .. } => "BAD_USER_INPUT",
            Self::Build(_) => "SCHEMA_BUILD_FAILED",
        }
    }

    /// Whether the error was caused by the client request rather than the
    /// server setup.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ArgumentCoercion { .. })
    }

    /// Converts the error into a field-scoped GraphQL error.
    #[must_use]
    pub fn into_field_error(self) -> async_graphql::Error {
        let code = self.error_code();
        let client = self.is_client_error();
        let argument_type = match &self {
            Self::ArgumentCoercion { argument_type, .. } => Some(argument_type.clone()),
            _ => None,
        };
        async_graphql::Error::new(self.to_string()).extend_with(|_, ext| {
            ext.set("code", code);
            ext.set("category", if client { "request" } else { "internal" });
            if let Some(argument_type) = &argument_type {
                ext.set("argumentType", argument_type.as_str());
            }
        })
    }
}

/// Converts schema results into field results that keep the error
/// extensions.
///
/// `?` alone goes through async-graphql's `Display` conversion and drops
/// `code`, `category` and `argumentType`.
///
/// # Example
///
/// ```ignore
/// .field("product", |_, args, _| {
///     let sku = catalog.coercer().coerce(&sku_type, raw).into_field_result()?;
///     ...
/// })
/// ```
pub trait ResultExt<T> {
    fn into_field_result(self) -> Result<T, async_graphql::Error>;
}

impl<T> ResultExt<T> for Result<T, SchemaError> {
    fn into_field_result(self) -> Result<T, async_graphql::Error> {
        self.map_err(SchemaError::into_field_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SchemaError::configuration("shop", "missing").error_code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(
            SchemaError::CircularType { name: "Node".into() }.error_code(),
            "CIRCULAR_TYPE"
        );
        assert_eq!(SchemaError::coercion("Foo", "bad").error_code(), "BAD_USER_INPUT");
    }

    #[test]
    fn test_only_coercion_is_client_error() {
        assert!(SchemaError::coercion("Foo", "bad").is_client_error());
        assert!(!SchemaError::configuration("shop", "missing").is_client_error());
        assert!(!SchemaError::Build("boom".into()).is_client_error());
        assert!(!SchemaError::InvalidType { name: "X".into() }.is_client_error());
    }

    #[test]
    fn test_messages_name_the_subject() {
        let err = SchemaError::CircularType { name: "Node".into() };
        assert!(err.to_string().contains("\"Node\""));

        let err = SchemaError::coercion("Foo", "must not be empty");
        assert_eq!(err.to_string(), "Validation error for Foo: must not be empty");
    }

    #[test]
    fn test_field_error_extensions() {
        let err = SchemaError::coercion("Foo", "must not be empty").into_field_error();
        assert!(err.message.contains("Foo"));
        let ext = err.extensions.expect("extensions set");
        assert_eq!(
            ext.get("code"),
            Some(&async_graphql::Value::from("BAD_USER_INPUT"))
        );
        assert_eq!(
            ext.get("argumentType"),
            Some(&async_graphql::Value::from("Foo"))
        );
        assert_eq!(ext.get("category"), Some(&async_graphql::Value::from("request")));
    }

    #[test]
    fn test_field_result_keeps_extensions() {
        fn lookup() -> Result<u32, async_graphql::Error> {
            let value: Result<u32, SchemaError> = Err(SchemaError::coercion("Sku", "too short"));
            let value = value.into_field_result()?;
            Ok(value + 1)
        }

        let err = lookup().unwrap_err();
        let ext = err.extensions.expect("extensions set");
        assert_eq!(ext.get("code"), Some(&async_graphql::Value::from("BAD_USER_INPUT")));
        assert_eq!(ext.get("argumentType"), Some(&async_graphql::Value::from("Sku")));
        assert_eq!(ext.get("category"), Some(&async_graphql::Value::from("request")));

        let ok: Result<u32, SchemaError> = Ok(1);
        assert_eq!(ok.into_field_result().unwrap(), 1);
    }
}
