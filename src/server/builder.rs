//! ServerBuilder: fluent wiring from resource specs to a running server
//!
//! # Example
//!
//! ```ignore
//! let app = ServerBuilder::new()
//!     .with_store(MemoryStore::new())
//!     .register(ResourceSpec::new("article", schema).with_policy(policy))
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{OriginalUri, Path, Query};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::audit::{AuditBus, AuditSink};
use crate::core::context::{RequestContext, context_from_headers};
use crate::core::error::{EngineError, EngineResult};
use crate::core::operation::effective_method;
use crate::core::query::ArgumentParser;
use crate::server::endpoint::{RequestScope, ResourceEndpoint};
use crate::server::extract::Submission;
use crate::server::registry::RegistryBuilder;
use crate::server::render::{
    negotiate, RenderMode, ResponseRenderer, ViewRenderer,
};
use crate::server::route::{ResourceSpec, RouteDescriptor};
use crate::storage::EntityStore;

/// Shared handler state
struct AppState {
    endpoint: ResourceEndpoint,
    renderer: ResponseRenderer,
}

/// Builder for the full resource server
pub struct ServerBuilder {
    registry: RegistryBuilder,
    store: Option<Arc<dyn EntityStore>>,
    renderer: ResponseRenderer,
    audit: AuditBus,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            registry: RegistryBuilder::new(),
            store: None,
            renderer: ResponseRenderer::new(),
            audit: AuditBus::default(),
            custom_routes: Vec::new(),
        }
    }

    /// Set the entity store (required)
    pub fn with_store(mut self, store: impl EntityStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Register a resource spec
    pub fn register(mut self, spec: ResourceSpec) -> Self {
        self.registry = self.registry.register(spec);
        self
    }

    /// Enable server-rendered views
    pub fn with_views(mut self, renderer: Arc<dyn ViewRenderer>) -> Self {
        self.renderer = self.renderer.with_views(renderer);
        self
    }

    /// Where unauthenticated browsers are sent (defaults to `/login`)
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.renderer = self.renderer.with_login_path(path);
        self
    }

    /// Attach an audit sink
    pub fn with_audit_sink(self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit.attach(sink);
        self
    }

    /// Add routes that do not fit the resource pattern
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Validate the registry and build the axum router.
    ///
    /// Fails fast on registry errors or a missing store; a server that
    /// starts serves only valid routes.
    pub fn build(self) -> EngineResult<Router> {
        let registry = Arc::new(self.registry.build()?);
        let store = self.store.ok_or_else(|| EngineError::Config {
            message: "an entity store is required; call .with_store()".to_string(),
        })?;
        let endpoint = ResourceEndpoint::new(registry.clone(), store, self.audit);
        let state = Arc::new(AppState {
            endpoint,
            renderer: self.renderer,
        });

        let mut router = Router::new()
            .route("/health", get(health))
            .route("/healthz", get(health));

        let names: Vec<String> = registry.resource_names().map(String::from).collect();
        for name in names {
            let route = registry.route(&name)?.clone();
            router = router.merge(resource_routes(state.clone(), name, route)?);
        }

        for custom in self.custom_routes {
            router = router.merge(custom);
        }

        Ok(router.layer(TraceLayer::new_for_http()))
    }

    /// Build and serve with graceful shutdown on SIGTERM / Ctrl+C
    pub async fn serve(self, addr: &str) -> EngineResult<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

type Params = Path<HashMap<String, String>>;
type Raw = Query<HashMap<String, String>>;

/// Build the canonical route set for one resource
fn resource_routes(
    state: Arc<AppState>,
    name: String,
    route: RouteDescriptor,
) -> EngineResult<Router> {
    let spec = state.endpoint.registry().spec(&name)?;
    let custom_ops = spec.custom_operations.clone();

    let mut router = Router::new();

    // GET /plural → list, POST /plural → create
    {
        let (s, n, r) = (state.clone(), name.clone(), route.clone());
        router = router.route(
            &route.collection_path(),
            get(
                move |headers: HeaderMap,
                      OriginalUri(uri): OriginalUri,
                      Path(params): Params,
                      Query(raw): Raw| {
                    let (s, n, r) = (s.clone(), n.clone(), r.clone());
                    async move {
                        handle_list(s, n, r, headers, uri.path().to_string(), params, raw).await
                    }
                },
            ),
        );
        let (s, n, r) = (state.clone(), name.clone(), route.clone());
        router = router.route(
            &route.collection_path(),
            post(
                move |headers: HeaderMap,
                      OriginalUri(uri): OriginalUri,
                      Path(params): Params,
                      Query(raw): Raw,
                      body: Submission| {
                    let (s, n, r) = (s.clone(), n.clone(), r.clone());
                    async move {
                        handle_create(s, n, r, headers, uri.path().to_string(), params, raw, body)
                            .await
                    }
                },
            ),
        );
    }

    // GET /plural/new → empty form
    {
        let (s, n, r) = (state.clone(), name.clone(), route.clone());
        router = router.route(
            &route.new_path(),
            get(move |headers: HeaderMap, Query(raw): Raw| {
                let (s, n, _r) = (s.clone(), n.clone(), r.clone());
                async move { handle_new_form(s, n, headers, raw).await }
            }),
        );
    }

    // Item verbs
    {
        let item_path = route.item_path();
        for method in [Method::GET, Method::PATCH, Method::PUT, Method::DELETE, Method::POST] {
            let (s, n, r) = (state.clone(), name.clone(), route.clone());
            let m = method.clone();
            let handler = move |headers: HeaderMap,
                                OriginalUri(uri): OriginalUri,
                                Path(params): Params,
                                Query(raw): Raw,
                                body: Submission| {
                let (s, n, r, m) = (s.clone(), n.clone(), r.clone(), m.clone());
                async move {
                    handle_item(s, n, r, m, headers, uri.path().to_string(), params, raw, body)
                        .await
                }
            };
            let method_router = if method == Method::GET {
                get(handler)
            } else if method == Method::PATCH {
                patch(handler)
            } else if method == Method::PUT {
                put(handler)
            } else if method == Method::DELETE {
                delete(handler)
            } else {
                post(handler)
            };
            router = router.route(&item_path, method_router);
        }
    }

    // GET /plural/{id}/edit → pre-filled form
    {
        let (s, n, r) = (state.clone(), name.clone(), route.clone());
        router = router.route(
            &route.edit_path(),
            get(
                move |headers: HeaderMap,
                      OriginalUri(uri): OriginalUri,
                      Path(params): Params,
                      Query(raw): Raw| {
                    let (s, n, r) = (s.clone(), n.clone(), r.clone());
                    async move {
                        handle_edit_form(s, n, r, headers, uri.path().to_string(), params, raw)
                            .await
                    }
                },
            ),
        );
    }

    // POST /plural/{id}/{op} for each registered custom operation
    for op in custom_ops {
        let (s, n, r) = (state.clone(), name.clone(), route.clone());
        let op_name = op.clone();
        router = router.route(
            &route.custom_path(&op),
            post(
                move |headers: HeaderMap,
                      OriginalUri(uri): OriginalUri,
                      Path(params): Params,
                      Query(raw): Raw| {
                    let (s, n, r, op_name) =
                        (s.clone(), n.clone(), r.clone(), op_name.clone());
                    async move {
                        handle_custom(
                            s,
                            n,
                            r,
                            op_name,
                            headers,
                            uri.path().to_string(),
                            params,
                            raw,
                        )
                        .await
                    }
                },
            ),
        );
    }

    Ok(router)
}

/// Parse the tenant and ancestor ids a route's path carries
fn scope_from(
    params: &HashMap<String, String>,
    route: &RouteDescriptor,
) -> EngineResult<RequestScope> {
    let mut scope = RequestScope::root();
    if route.tenant_prefixed {
        scope.tenant = params.get("tenant").cloned();
    }
    for (_, param) in &route.ancestors {
        let raw = params.get(param).ok_or_else(|| EngineError::BadRequest {
            message: format!("missing path parameter '{}'", param),
        })?;
        let id = Uuid::parse_str(raw).map_err(|_| EngineError::BadRequest {
            message: format!("'{}' is not a valid id", raw),
        })?;
        scope.ancestors.push(id);
    }
    Ok(scope)
}

fn id_from(params: &HashMap<String, String>, route: &RouteDescriptor) -> EngineResult<Uuid> {
    let raw = params
        .get(&route.id_param)
        .ok_or_else(|| EngineError::BadRequest {
            message: format!("missing path parameter '{}'", route.id_param),
        })?;
    Uuid::parse_str(raw).map_err(|_| EngineError::BadRequest {
        message: format!("'{}' is not a valid id", raw),
    })
}

fn request_parts(
    headers: &HeaderMap,
    raw: &HashMap<String, String>,
) -> (RequestContext, RenderMode) {
    let ctx = context_from_headers(headers);
    let mode = negotiate(headers, raw.get("render").map(String::as_str));
    (ctx, mode)
}

#[allow(clippy::too_many_arguments)]
async fn handle_list(
    state: Arc<AppState>,
    name: String,
    route: RouteDescriptor,
    headers: HeaderMap,
    path: String,
    params: HashMap<String, String>,
    raw: HashMap<String, String>,
) -> Response {
    let (ctx, mode) = request_parts(&headers, &raw);
    let result = async {
        let scope = scope_from(&params, &route)?;
        state.endpoint.list(&name, &ctx, &scope, &raw).await
    }
    .await;

    match result {
        Ok(outcome) => state.renderer.list(mode, &name, &outcome),
        Err(err) => state.renderer.error(mode, &Method::GET, &path, &name, err),
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_create(
    state: Arc<AppState>,
    name: String,
    route: RouteDescriptor,
    headers: HeaderMap,
    path: String,
    params: HashMap<String, String>,
    raw: HashMap<String, String>,
    Submission(body): Submission,
) -> Response {
    let (ctx, mode) = request_parts(&headers, &raw);
    let descriptor = match state.endpoint.registry().spec(&name) {
        Ok(spec) => ArgumentParser::parse(&raw, &spec.query),
        Err(err) => return state.renderer.error(mode, &Method::POST, &path, &name, err),
    };

    let result = async {
        let scope = scope_from(&params, &route)?;
        state.endpoint.create(&name, &ctx, &scope, &body).await
    }
    .await;

    match result {
        Ok(outcome) => state.renderer.mutation(
            mode,
            &outcome,
            StatusCode::CREATED,
            descriptor.next.as_deref(),
        ),
        Err(err) => state.renderer.error(mode, &Method::POST, &path, &name, err),
    }
}

/// Dispatch an item request through the canonical verb table, applying the
/// POST method override first.
#[allow(clippy::too_many_arguments)]
async fn handle_item(
    state: Arc<AppState>,
    name: String,
    route: RouteDescriptor,
    method: Method,
    headers: HeaderMap,
    path: String,
    params: HashMap<String, String>,
    raw: HashMap<String, String>,
    Submission(body): Submission,
) -> Response {
    let (ctx, mode) = request_parts(&headers, &raw);
    let method = effective_method(&method, raw.get("method").map(String::as_str));
    let descriptor = match state.endpoint.registry().spec(&name) {
        Ok(spec) => ArgumentParser::parse(&raw, &spec.query),
        Err(err) => return state.renderer.error(mode, &method, &path, &name, err),
    };

    let result: EngineResult<Response> = async {
        let scope = scope_from(&params, &route)?;
        let id = id_from(&params, &route)?;

        if method == Method::GET {
            let resource = state.endpoint.view(&name, &ctx, &scope, &id).await?;
            Ok(state
                .renderer
                .item(mode, &name, &resource, descriptor.out.as_deref()))
        } else if method == Method::PATCH {
            let outcome = state.endpoint.edit(&name, &ctx, &scope, &id, &body).await?;
            Ok(state.renderer.mutation(
                mode,
                &outcome,
                StatusCode::OK,
                descriptor.next.as_deref(),
            ))
        } else if method == Method::PUT {
            let outcome = state
                .endpoint
                .replace(&name, &ctx, &scope, &id, &body)
                .await?;
            Ok(state.renderer.mutation(
                mode,
                &outcome,
                StatusCode::OK,
                descriptor.next.as_deref(),
            ))
        } else if method == Method::DELETE {
            let outcome = state.endpoint.delete(&name, &ctx, &scope, &id).await?;
            Ok(state.renderer.mutation(
                mode,
                &outcome,
                StatusCode::OK,
                descriptor.next.as_deref(),
            ))
        } else {
            // A bare POST on an item path has no canonical operation
            Err(EngineError::BadRequest {
                message: "POST on an item requires a method override".to_string(),
            })
        }
    }
    .await;

    match result {
        Ok(response) => response,
        Err(err) => state.renderer.error(mode, &method, &path, &name, err),
    }
}

async fn handle_new_form(
    state: Arc<AppState>,
    name: String,
    headers: HeaderMap,
    raw: HashMap<String, String>,
) -> Response {
    let (_ctx, mode) = request_parts(&headers, &raw);
    let spec = match state.endpoint.registry().spec(&name) {
        Ok(spec) => spec,
        Err(err) => return err.into_response(),
    };
    let descriptor = ArgumentParser::parse(&raw, &spec.query);
    let intent = descriptor.intent.as_deref().unwrap_or("create");
    let defaults = spec.schema.defaults();

    match mode {
        RenderMode::Structured => {
            Json(json!({ "values": defaults, "intent": intent })).into_response()
        }
        RenderMode::View => {
            let mut context = tera::Context::new();
            context.insert("values", &defaults);
            context.insert("intent", intent);
            context.insert(
                "errors",
                &std::collections::BTreeMap::<String, Vec<String>>::new(),
            );
            context.insert("root", "page");
            render_template(&state, &format!("{}/form.html", name), &context)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_edit_form(
    state: Arc<AppState>,
    name: String,
    route: RouteDescriptor,
    headers: HeaderMap,
    path: String,
    params: HashMap<String, String>,
    raw: HashMap<String, String>,
) -> Response {
    let (ctx, mode) = request_parts(&headers, &raw);
    let intent = match state.endpoint.registry().spec(&name) {
        Ok(spec) => ArgumentParser::parse(&raw, &spec.query)
            .intent
            .unwrap_or_else(|| "edit".to_string()),
        Err(err) => return err.into_response(),
    };
    let result = async {
        let scope = scope_from(&params, &route)?;
        let id = id_from(&params, &route)?;
        state.endpoint.view(&name, &ctx, &scope, &id).await
    }
    .await;

    match result {
        Ok(resource) => match mode {
            RenderMode::Structured => Json(&resource).into_response(),
            RenderMode::View => {
                let mut context = tera::Context::new();
                context.insert("values", &resource.fields);
                context.insert("resource", &resource);
                context.insert("intent", &intent);
                context.insert(
                    "errors",
                    &std::collections::BTreeMap::<String, Vec<String>>::new(),
                );
                context.insert("root", "page");
                render_template(&state, &format!("{}/form.html", name), &context)
            }
        },
        Err(err) => state.renderer.error(mode, &Method::GET, &path, &name, err),
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_custom(
    state: Arc<AppState>,
    name: String,
    route: RouteDescriptor,
    operation: String,
    headers: HeaderMap,
    path: String,
    params: HashMap<String, String>,
    raw: HashMap<String, String>,
) -> Response {
    let (ctx, mode) = request_parts(&headers, &raw);
    let descriptor = match state.endpoint.registry().spec(&name) {
        Ok(spec) => ArgumentParser::parse(&raw, &spec.query),
        Err(err) => return state.renderer.error(mode, &Method::POST, &path, &name, err),
    };
    let result = async {
        let scope = scope_from(&params, &route)?;
        let id = id_from(&params, &route)?;
        state
            .endpoint
            .custom(&name, &ctx, &scope, &id, &operation)
            .await
    }
    .await;

    match result {
        Ok(outcome) => state.renderer.mutation(
            mode,
            &outcome,
            StatusCode::OK,
            descriptor.next.as_deref(),
        ),
        Err(err) => state.renderer.error(mode, &Method::POST, &path, &name, err),
    }
}

fn render_template(state: &Arc<AppState>, template: &str, context: &tera::Context) -> Response {
    // Delegate through the renderer's error path for a missing view layer
    state
        .renderer
        .render_raw(template, context)
        .unwrap_or_else(|err| err.into_response())
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        },
    }
}
