//! Endpoint configuration and schema file monitoring for sdlbind.
//!
//! This crate provides:
//! - [`GatewayConfig`] / [`EndpointConfig`]: the per-endpoint settings that
//!   decide whether a schema is assembled from typed root types or parsed
//!   from an SDL file, and how resolvers are bound to type names
//! - [`SchemaFileWatcher`]: a debounced file monitor that reports changed
//!   SDL sources as [`FileChangeEvent`]s
//!
//! # Example Configuration
//!
//! ```toml
//! [endpoints.shop]
//! schema = "schema.graphql"
//! resolver_path_pattern = "shop::{Type}Resolver"
//! type_namespaces = ["shop::types"]
//!
//! [endpoints.shop.resolvers]
//! Query = "shop::QueryResolver"
//!
//! [endpoints.admin]
//! query_schema = "AdminQuery"
//! ```

pub mod endpoint;
pub mod events;
pub mod watcher;

pub use endpoint::{EndpointConfig, GatewayConfig, SchemaSource, WatchConfig};
pub use events::{FileChangeEvent, SCHEMA_FILE_MONITOR};
pub use watcher::{SchemaFileWatcher, WatchHandle, WatcherConfig};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Watcher error: {0}")]
    Watcher(String),
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
