//! Schema store.
//!
//! The [`SchemaStore`] owns everything needed to produce the executable
//! schema of an endpoint: the shared type registry for typed endpoints, the
//! resolver and domain type catalogs, and a cache of parsed SDL documents.
//!
//! ## SDL cache
//!
//! Parsed documents are cached under the endpoint id and tagged with the
//! sanitized path of their source file. Invalidating a path flushes only the
//! entries carrying its tag; the next request for those endpoints reads and
//! parses the file again.
//!
//! Assembled schemas are kept per endpoint as well. They are evicted together
//! with their document and rebuilt when a resolver, domain type, typed
//! factory or root value has been registered since they were assembled.
//!
//! ```ignore
//! let store = Arc::new(SchemaStore::new(config));
//! store.resolvers().register("shop::QueryResolver", Resolver::new().field("products", products));
//! let schema = store.get_schema("shop")?;
//! store.invalidate("schema/shop.graphql");
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use async_graphql::dynamic::Schema;
use async_graphql::{Request, Response, ServerError};
use async_graphql_parser::types::ServiceDocument;
use dashmap::DashMap;
use regex::bytes::Regex;
use sdlbind_config::{
    ConfigError, EndpointConfig, FileChangeEvent, GatewayConfig, SCHEMA_FILE_MONITOR, SchemaFileWatcher,
    SchemaSource, WatchHandle, WatcherConfig,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::binding::{ResolverBindingRegistry, ResolverCatalog};
use crate::coercion::DomainTypeCatalog;
use crate::context::RequestContext;
use crate::error::SchemaError;
use crate::registry::TypeRegistry;
use crate::schema::{RootTypes, SchemaAssembler, SchemaLimits, register_document};
use crate::value::FieldSource;

/// Maximum length of a cache tag.
pub const MAX_TAG_LENGTH: usize = 250;

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)[^a-zA-Z0-9_%\-&]").expect("Invalid tag regex"));

/// Derives a cache tag from a source path.
///
/// Every byte outside `[A-Za-z0-9_%-&]` is replaced by `_`, so a multi-byte
/// character yields one `_` per byte. The result is truncated to
/// [`MAX_TAG_LENGTH`] bytes.
pub fn sanitize_tag(path: &str) -> String {
    let sanitized = TAG_REGEX.replace_all(path.as_bytes(), &b"_"[..]);
    let end = sanitized.len().min(MAX_TAG_LENGTH);
    // only ASCII bytes remain
    String::from_utf8_lossy(&sanitized[..end]).into_owned()
}

#[derive(Clone)]
struct CachedDocument {
    document: Arc<ServiceDocument>,
    tags: Vec<String>,
}

/// Parsed SDL documents keyed by endpoint id, with a tag → keys index.
#[derive(Default)]
pub struct SchemaCache {
    entries: DashMap<String, CachedDocument>,
    tags: DashMap<String, HashSet<String>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<ServiceDocument>> {
        self.entries.get(key).map(|e| Arc::clone(&e.document))
    }

    /// Stores a document, replacing any previous entry and its tags.
    pub fn set(&self, key: &str, document: Arc<ServiceDocument>, tags: Vec<String>) {
        if let Some(previous) = self.entries.get(key).map(|e| e.tags.clone()) {
            self.untag(key, &previous);
        }
        self.entries.insert(
            key.to_string(),
            CachedDocument {
                document,
                tags: tags.clone(),
            },
        );
        for tag in tags {
            self.tags.entry(tag).or_default().insert(key.to_string());
        }
    }

    /// Removes every entry carrying `tag` and returns their keys.
    pub fn flush_by_tag(&self, tag: &str) -> Vec<String> {
        let Some((_, keys)) = self.tags.remove(tag) else {
            return Vec::new();
        };
        let mut flushed: Vec<String> = keys.into_iter().collect();
        flushed.sort();
        for key in &flushed {
            if let Some((_, entry)) = self.entries.remove(key) {
                self.untag(key, &entry.tags);
            }
        }
        flushed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys of all cached entries, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.tags.clear();
    }

    fn untag(&self, key: &str, tags: &[String]) {
        for tag in tags {
            if let Some(mut keys) = self.tags.get_mut(tag) {
                keys.remove(key);
            }
            self.tags.remove_if(tag, |_, keys| keys.is_empty());
        }
    }
}

/// Registration counters a schema was assembled against.
type Generation = [u64; 4];

struct AssembledSchema {
    schema: Arc<Schema>,
    generation: Generation,
}

/// Produces and caches the schemas of all configured endpoints.
pub struct SchemaStore {
    config: GatewayConfig,
    registry: Arc<TypeRegistry>,
    resolvers: Arc<ResolverCatalog>,
    domain_types: Arc<DomainTypeCatalog>,
    cache: SchemaCache,
    schemas: DashMap<String, AssembledSchema>,
    roots: DashMap<String, Arc<dyn FieldSource>>,
    root_generation: AtomicU64,
    parses: AtomicUsize,
}

impl SchemaStore {
    /// Creates a store with empty registries.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            registry: Arc::new(TypeRegistry::new()),
            resolvers: Arc::new(ResolverCatalog::new()),
            domain_types: Arc::new(DomainTypeCatalog::new()),
            cache: SchemaCache::new(),
            schemas: DashMap::new(),
            roots: DashMap::new(),
            root_generation: AtomicU64::new(0),
            parses: AtomicUsize::new(0),
        }
    }

    /// Creates a store serving a single endpoint.
    pub fn single(id: impl Into<String>, endpoint: EndpointConfig) -> Self {
        Self::new(GatewayConfig::default().with_endpoint(id, endpoint))
    }

    /// Uses a shared type registry for typed endpoints.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Uses a shared resolver catalog.
    #[must_use]
    pub fn with_resolvers(mut self, resolvers: Arc<ResolverCatalog>) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Uses a shared domain type catalog.
    #[must_use]
    pub fn with_domain_types(mut self, domain_types: Arc<DomainTypeCatalog>) -> Self {
        self.domain_types = domain_types;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Registry of typed root types.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn resolvers(&self) -> &Arc<ResolverCatalog> {
        &self.resolvers
    }

    pub fn domain_types(&self) -> &Arc<DomainTypeCatalog> {
        &self.domain_types
    }

    /// Sets the source resolving root fields of an endpoint.
    pub fn set_root_value(&self, endpoint: impl Into<String>, source: impl FieldSource + 'static) {
        self.roots.insert(endpoint.into(), Arc::new(source));
        self.root_generation.fetch_add(1, Ordering::Release);
    }

    /// Returns the executable schema of an endpoint.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::Configuration`] if the endpoint is unknown, has
    ///   neither typed roots nor an SDL file, or its SDL file is missing
    /// - [`SchemaError::Parse`] if the SDL file is malformed
    /// - type registry and assembly errors
    pub fn get_schema(&self, endpoint: &str) -> Result<Arc<Schema>, SchemaError> {
        let generation = self.generation();
        if let Some(assembled) = self.schemas.get(endpoint)
            && assembled.generation == generation
        {
            debug!(endpoint = %endpoint, "Using assembled schema");
            return Ok(Arc::clone(&assembled.schema));
        }

        let config = self
            .config
            .endpoint(endpoint)
            .ok_or_else(|| SchemaError::configuration(endpoint, "endpoint is not configured"))?;

        let source = config.source().ok_or_else(|| {
            SchemaError::configuration(endpoint, "no root query schema or SDL schema file is configured")
        })?;

        let coercer = self.domain_types.coercer(&config.type_namespaces);
        let root = self.roots.get(endpoint).map(|r| Arc::clone(r.value()));

        let schema = match source {
            SchemaSource::Typed {
                query,
                mutation,
                subscription,
            } => {
                let roots = RootTypes {
                    query: query.to_string(),
                    mutation: mutation.map(str::to_string),
                    subscription: subscription.map(str::to_string),
                };
                SchemaAssembler::new(&self.registry, coercer)
                    .with_root(root)
                    .with_limits(SchemaLimits::from(config))
                    .assemble(&roots, &[])?
            }
            SchemaSource::Sdl(path) => {
                let document = self.document(endpoint, path)?;
                let registry = TypeRegistry::new();
                let bindings = Arc::new(ResolverBindingRegistry::new(
                    config.clone(),
                    Arc::clone(&self.resolvers),
                    coercer.clone(),
                ));
                let types = register_document(endpoint, &document, &registry, &bindings)?;
                SchemaAssembler::new(&registry, coercer)
                    .with_root(root)
                    .with_limits(SchemaLimits::from(config))
                    .assemble(&types.roots, &types.type_names)?
            }
        };

        let schema = Arc::new(schema);
        self.schemas.insert(
            endpoint.to_string(),
            AssembledSchema {
                schema: Arc::clone(&schema),
                generation,
            },
        );
        Ok(schema)
    }

    /// Executes a request against an endpoint.
    ///
    /// Schema errors are returned as request errors.
    pub async fn execute(&self, endpoint: &str, request: impl Into<Request>, ctx: RequestContext) -> Response {
        let schema = match self.get_schema(endpoint) {
            Ok(schema) => schema,
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Schema unavailable");
                return Response::from_errors(vec![ServerError::new(e.to_string(), None)]);
            }
        };
        let request = request.into().data(ctx.with_endpoint(endpoint));
        schema.execute(request).await
    }

    /// Flushes the cached documents read from `path` and returns their
    /// endpoint ids.
    pub fn invalidate(&self, path: impl AsRef<Path>) -> Vec<String> {
        let tag = sanitize_tag(&path.as_ref().to_string_lossy());
        let flushed = self.cache.flush_by_tag(&tag);
        for endpoint in &flushed {
            self.schemas.remove(endpoint);
        }
        if !flushed.is_empty() {
            info!(tag = %tag, endpoints = ?flushed, "Invalidated cached schemas");
        }
        flushed
    }

    /// Invalidates changed SDL files reported by the schema file monitor.
    ///
    /// Events from other monitors are ignored.
    pub fn handle_file_changes(&self, monitor_id: &str, paths: &[String]) -> Vec<String> {
        if monitor_id != SCHEMA_FILE_MONITOR {
            debug!(monitor_id = %monitor_id, "Ignoring file changes from foreign monitor");
            return Vec::new();
        }
        paths.iter().flat_map(|path| self.invalidate(path)).collect()
    }

    /// Parses and caches the documents of all SDL endpoints.
    ///
    /// Every document is read again, replacing any cached entry. Returns the
    /// warmed endpoint ids.
    ///
    /// # Errors
    ///
    /// Fails with the first endpoint whose document cannot be loaded.
    pub fn warmup(&self) -> Result<Vec<String>, SchemaError> {
        let mut warmed = Vec::new();
        for (id, endpoint) in &self.config.endpoints {
            if let Some(SchemaSource::Sdl(path)) = endpoint.source() {
                self.load_document(id, path)?;
                self.schemas.remove(id);
                warmed.push(id.clone());
            }
        }
        info!(endpoints = ?warmed, "Schema cache warmed up");
        Ok(warmed)
    }

    /// Drops all cached documents and constructed typed types.
    pub fn reset(&self) {
        self.cache.clear();
        self.schemas.clear();
        self.registry.reset();
        info!("Schema store reset");
    }

    /// Endpoint ids with a cached document.
    pub fn cached_endpoints(&self) -> Vec<String> {
        self.cache.keys()
    }

    pub fn is_cached(&self, endpoint: &str) -> bool {
        self.cache.contains(endpoint)
    }

    fn generation(&self) -> Generation {
        [
            self.registry.generation(),
            self.resolvers.generation(),
            self.domain_types.generation(),
            self.root_generation.load(Ordering::Acquire),
        ]
    }

    /// Number of SDL documents parsed so far.
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }

    /// Feeds file change events into [`handle_file_changes`](Self::handle_file_changes)
    /// until the channel closes.
    pub fn spawn_invalidation_listener(self: &Arc<Self>, mut rx: mpsc::Receiver<FileChangeEvent>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                debug!(monitor_id = %event.monitor_id, paths = ?event.paths, "Received file change event");
                store.handle_file_changes(&event.monitor_id, &event.paths);
            }
            debug!("File change channel closed");
        })
    }

    /// Starts monitoring the SDL files of all endpoints.
    ///
    /// Returns `None` when watching is disabled or no endpoint uses SDL.
    ///
    /// # Errors
    ///
    /// Returns an error if the file watcher cannot be started.
    pub async fn watch_schema_files(self: &Arc<Self>) -> Result<Option<WatchHandle>, ConfigError> {
        let paths = self.config.schema_paths();
        if !self.config.watch.enabled || paths.is_empty() {
            return Ok(None);
        }

        let watcher =
            SchemaFileWatcher::new(WatcherConfig::new(paths).with_debounce(self.config.watch.debounce()));
        let (tx, rx) = mpsc::channel(32);
        let handle = watcher.watch(tx).await?;
        self.spawn_invalidation_listener(rx);
        Ok(Some(handle))
    }

    fn document(&self, endpoint: &str, path: &Path) -> Result<Arc<ServiceDocument>, SchemaError> {
        if let Some(document) = self.cache.get(endpoint) {
            debug!(endpoint = %endpoint, "Using cached schema document");
            return Ok(document);
        }
        self.load_document(endpoint, path)
    }

    /// Reads, parses and caches the document of an endpoint.
    fn load_document(&self, endpoint: &str, path: &Path) -> Result<Arc<ServiceDocument>, SchemaError> {
        if !path.exists() {
            return Err(SchemaError::configuration(
                endpoint,
                format!("schema file does not exist at {}", path.display()),
            ));
        }

        let sdl = std::fs::read_to_string(path).map_err(|e| {
            SchemaError::configuration(endpoint, format!("failed to read {}: {e}", path.display()))
        })?;

        let document = async_graphql_parser::parse_schema(&sdl).map_err(|e| {
            let position = e.positions().next();
            warn!(endpoint = %endpoint, path = %path.display(), error = %e, "Failed to parse schema");
            SchemaError::Parse {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
                line: position.map(|p| p.line),
                column: position.map(|p| p.column),
            }
        })?;
        self.parses.fetch_add(1, Ordering::Relaxed);

        let document = Arc::new(document);
        let tag = sanitize_tag(&path.to_string_lossy());
        self.cache.set(endpoint, Arc::clone(&document), vec![tag]);
        info!(endpoint = %endpoint, path = %path.display(), "Parsed and cached schema document");
        Ok(document)
    }
}

impl std::fmt::Debug for SchemaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaStore")
            .field("endpoints", &self.config.endpoints.keys().collect::<Vec<_>>())
            .field("cached", &self.cache.keys())
            .field("assembled", &self.schemas.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Resolver;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sdl_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn document() -> Arc<ServiceDocument> {
        Arc::new(async_graphql_parser::parse_schema("type Query { a: Int }").unwrap())
    }

    #[test]
    fn test_sanitize_tag() {
        assert_eq!(sanitize_tag("/srv/schema/shop.graphql"), "_srv_schema_shop_graphql");
        assert_eq!(sanitize_tag("a-b&c%d_e"), "a-b&c%d_e");
        assert_eq!(sanitize_tag(&"x".repeat(300)).len(), MAX_TAG_LENGTH);
    }

    #[test]
    fn test_sanitize_tag_replaces_each_byte() {
        assert_eq!(sanitize_tag("/srv/caf\u{e9}.graphql"), "_srv_caf___graphql");
        assert_eq!(sanitize_tag("\u{1f4c4}"), "____");
        assert_eq!(sanitize_tag(&"\u{e9}".repeat(200)).len(), MAX_TAG_LENGTH);
    }

    #[test]
    fn test_flush_only_affects_tagged_entries() {
        let cache = SchemaCache::new();
        cache.set("shop", document(), vec!["shop_graphql".into()]);
        cache.set("admin", document(), vec!["admin_graphql".into()]);
        cache.set("mirror", document(), vec!["shop_graphql".into(), "mirror_graphql".into()]);

        assert_eq!(cache.flush_by_tag("shop_graphql"), vec!["mirror", "shop"]);
        assert!(!cache.contains("shop"));
        assert!(!cache.contains("mirror"));
        assert!(cache.contains("admin"));
        assert!(cache.flush_by_tag("mirror_graphql").is_empty());
        assert!(cache.flush_by_tag("unknown").is_empty());
    }

    #[test]
    fn test_set_replaces_previous_tags() {
        let cache = SchemaCache::new();
        cache.set("shop", document(), vec!["old".into()]);
        cache.set("shop", document(), vec!["new".into()]);
        assert!(cache.flush_by_tag("old").is_empty());
        assert_eq!(cache.flush_by_tag("new"), vec!["shop"]);
    }

    #[test]
    fn test_unknown_endpoint() {
        let store = SchemaStore::new(GatewayConfig::default());
        let err = store.get_schema("shop").err().unwrap();
        assert!(matches!(err, SchemaError::Configuration { ref endpoint, .. } if endpoint == "shop"));
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn test_endpoint_without_root() {
        let store = SchemaStore::single("shop", EndpointConfig::default());
        let err = store.get_schema("shop").err().unwrap();
        assert!(err.to_string().contains("no root query schema"));
    }

    #[test]
    fn test_missing_sdl_file() {
        let store = SchemaStore::single("shop", EndpointConfig::sdl("/nonexistent/shop.graphql"));
        let err = store.get_schema("shop").err().unwrap();
        assert!(matches!(err, SchemaError::Configuration { .. }));
        assert!(err.to_string().contains("does not exist at /nonexistent/shop.graphql"));
    }

    #[test]
    fn test_parse_error_reports_position() {
        let file = sdl_file("type Query {\n  products: [Product!\n}");
        let store = SchemaStore::single("shop", EndpointConfig::sdl(file.path()));
        match store.get_schema("shop").err().unwrap() {
            SchemaError::Parse { endpoint, line, .. } => {
                assert_eq!(endpoint, "shop");
                assert!(line.is_some());
            }
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(!store.is_cached("shop"));
    }

    #[test]
    fn test_document_is_parsed_once() {
        let file = sdl_file("type Query { version: String }");
        let store = SchemaStore::single("shop", EndpointConfig::sdl(file.path()));

        store.get_schema("shop").unwrap();
        store.get_schema("shop").unwrap();
        assert_eq!(store.parse_count(), 1);
        assert_eq!(store.cached_endpoints(), vec!["shop"]);
    }

    #[test]
    fn test_assembled_schema_is_reused_until_invalidated() {
        let file = sdl_file("type Query { version: String }");
        let store = SchemaStore::single("shop", EndpointConfig::sdl(file.path()));

        let first = store.get_schema("shop").unwrap();
        assert!(Arc::ptr_eq(&first, &store.get_schema("shop").unwrap()));

        assert_eq!(store.invalidate(file.path()), vec!["shop"]);
        let second = store.get_schema("shop").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(store.parse_count(), 2);
    }

    #[test]
    fn test_registrations_rebuild_assembled_schema() {
        let file = sdl_file("type Query { version: String }");
        let store = SchemaStore::single("shop", EndpointConfig::sdl(file.path()));
        let first = store.get_schema("shop").unwrap();

        store.resolvers().register("shop::QueryResolver", Resolver::new());
        let second = store.get_schema("shop").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        store.set_root_value("shop", crate::value::Record::new("Api").property("version", "2"));
        let third = store.get_schema("shop").unwrap();
        assert!(!Arc::ptr_eq(&second, &third));
        assert!(Arc::ptr_eq(&third, &store.get_schema("shop").unwrap()));
        assert_eq!(store.parse_count(), 1);
    }

    #[test]
    fn test_file_changes_from_other_monitors_are_ignored() {
        let file = sdl_file("type Query { version: String }");
        let path = file.path().to_string_lossy().to_string();
        let store = SchemaStore::single("shop", EndpointConfig::sdl(file.path()));
        store.get_schema("shop").unwrap();

        assert!(store.handle_file_changes("config_files", &[path.clone()]).is_empty());
        assert!(store.is_cached("shop"));

        assert_eq!(store.handle_file_changes(SCHEMA_FILE_MONITOR, &[path]), vec!["shop"]);
        assert!(!store.is_cached("shop"));
    }

    #[test]
    fn test_warmup_reparses_sdl_endpoints() {
        let file = sdl_file("type Query { version: String }");
        let config = GatewayConfig::default()
            .with_endpoint("shop", EndpointConfig::sdl(file.path()))
            .with_endpoint("admin", EndpointConfig::typed("AdminQuery"));
        let store = SchemaStore::new(config);

        assert_eq!(store.warmup().unwrap(), vec!["shop"]);
        assert_eq!(store.warmup().unwrap(), vec!["shop"]);
        assert_eq!(store.parse_count(), 2);
        assert!(store.is_cached("shop"));
        assert!(!store.is_cached("admin"));
    }

    #[tokio::test]
    async fn test_execute_reports_schema_errors() {
        let store = SchemaStore::new(GatewayConfig::default());
        let response = store.execute("shop", "{ version }", RequestContext::new()).await;
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].message.contains("not configured"));
    }

    #[tokio::test]
    async fn test_listener_invalidates_on_events() {
        let file = sdl_file("type Query { version: String }");
        let path = file.path().to_string_lossy().to_string();
        let store = Arc::new(SchemaStore::single("shop", EndpointConfig::sdl(file.path())));
        store.get_schema("shop").unwrap();

        let (tx, rx) = mpsc::channel(4);
        let listener = store.spawn_invalidation_listener(rx);
        tx.send(FileChangeEvent::schema_files(vec![path])).await.unwrap();
        drop(tx);
        listener.await.unwrap();

        assert!(!store.is_cached("shop"));
    }
}
