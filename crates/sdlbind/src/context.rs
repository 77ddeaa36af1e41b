//! Per-request context handed to every resolver.
//!
//! The context is attached to the `async_graphql::Request` as data; resolvers
//! receive a reference to it regardless of whether it was provided, falling
//! back to an empty context.

use std::collections::HashMap;

/// Request-scoped values visible to all resolvers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Endpoint the request was routed to.
    pub endpoint: Option<String>,

    /// Request ID for tracing and correlation.
    pub request_id: Option<String>,

    /// Free-form values supplied by the transport (headers, auth claims).
    attributes: HashMap<String, String>,
}

impl RequestContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns an attribute supplied by the transport.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
