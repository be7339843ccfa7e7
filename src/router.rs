//! Request router and the validated-route builder.
//!
//! One radix tree per HTTP method plus an any-method tree. Registration
//! happens during startup; [`Router::routes`] and
//! [`Router::allowed_methods`] snapshot the tables when the server mounts
//! them, so the per-request lookup path touches only immutable data behind
//! an `Arc`.
//!
//! A `Router` is a cheap clonable handle: the server's registry and your
//! local binding see the same tables, and every registration method hands
//! the handle back so calls chain.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use http::{Method, StatusCode};
use matchit::Router as PathTrie;

use crate::context::Context;
use crate::middleware::{BoxFuture, BoxedMiddleware, Flow, Middleware, Next};
use crate::response::Response;
use crate::schema::Schema;
use crate::signal;
use crate::validate::{ValidationOptions, validate_body};

/// Options accepted by [`Server::create_router`](crate::Server::create_router).
#[derive(Clone, Debug)]
pub struct RouterOptions {
    /// Prepended to every path registered on the router.
    pub prefix: Option<String>,
    /// When false, the server does not remember the router and nothing is
    /// mounted at listen-time; mount `routes()` yourself.
    pub auto_register: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            auto_register: true,
        }
    }
}

// ── Router ───────────────────────────────────────────────────────────────────

/// The application router.
///
/// Route paths use matchit `{name}` parameter syntax — `req.param("name")`
/// retrieves the bound value:
///
/// ```rust
/// use trellis::{Context, Flow, Next, Response, Router};
///
/// async fn get_user(ctx: Context, _next: Next) -> Flow {
///     let id = ctx.request.param("id").unwrap_or("unknown");
///     Ok(Response::text(format!("user {id}")))
/// }
///
/// Router::new()
///     .get("/users/{id}", get_user)
///     .redirect("/me", "/users/self", None);
/// ```
#[derive(Clone)]
pub struct Router {
    inner: Arc<Mutex<RouterInner>>,
}

#[derive(Clone, Default)]
struct RouterInner {
    prefix: Option<String>,
    middlewares: Vec<BoxedMiddleware>,
    methods: HashMap<Method, PathTrie<usize>>,
    any: PathTrie<usize>,
    entries: Vec<Vec<BoxedMiddleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RouterInner {
                prefix: options.prefix,
                ..RouterInner::default()
            })),
        }
    }

    pub fn get(self, path: &str, handler: impl Middleware) -> Self {
        self.register(Some(Method::GET), path, vec![Arc::new(handler)])
    }

    pub fn post(self, path: &str, handler: impl Middleware) -> Self {
        self.register(Some(Method::POST), path, vec![Arc::new(handler)])
    }

    pub fn put(self, path: &str, handler: impl Middleware) -> Self {
        self.register(Some(Method::PUT), path, vec![Arc::new(handler)])
    }

    pub fn patch(self, path: &str, handler: impl Middleware) -> Self {
        self.register(Some(Method::PATCH), path, vec![Arc::new(handler)])
    }

    pub fn delete(self, path: &str, handler: impl Middleware) -> Self {
        self.register(Some(Method::DELETE), path, vec![Arc::new(handler)])
    }

    pub fn options(self, path: &str, handler: impl Middleware) -> Self {
        self.register(Some(Method::OPTIONS), path, vec![Arc::new(handler)])
    }

    pub fn head(self, path: &str, handler: impl Middleware) -> Self {
        self.register(Some(Method::HEAD), path, vec![Arc::new(handler)])
    }

    /// Registers a handler for every HTTP method.
    pub fn all(self, path: &str, handler: impl Middleware) -> Self {
        self.register(None, path, vec![Arc::new(handler)])
    }

    /// Appends a router-level middleware, run before the handlers of every
    /// matched route. (`use` in other frameworks — a keyword here.)
    pub fn with(self, middleware: impl Middleware) -> Self {
        self.lock().middlewares.push(Arc::new(middleware));
        self
    }

    /// Registers an any-method redirect from `source` to `destination`,
    /// default `302 Found`.
    pub fn redirect(self, source: &str, destination: &str, status: Option<StatusCode>) -> Self {
        let destination = destination.to_owned();
        self.all(source, move |_ctx: Context, _next: Next| {
            let destination = destination.clone();
            async move { signal::redirect(&destination, status) }
        })
    }

    /// Starts a validated route: `schema` guards the body before any
    /// handler registered through the returned builder runs.
    pub fn input(self, schema: impl Schema, options: ValidationOptions) -> ValidatedRoute {
        let validator: BoxedMiddleware = Arc::new(validate_body(schema, options));
        ValidatedRoute {
            router: self,
            validator,
        }
    }

    /// The route-dispatch middleware over a snapshot of the current
    /// tables. Matched routes run `[router middlewares…, handlers…]` ahead
    /// of the rest of the chain; an unmatched request passes through
    /// untouched.
    pub fn routes(&self) -> BoxedMiddleware {
        Arc::new(RouteDispatch {
            table: self.snapshot(),
        })
    }

    /// The method-negotiation middleware: answers `OPTIONS` with 204 +
    /// `Allow` and wrong-method requests with `405 Method Not Allowed`,
    /// for paths that exist under some other method.
    pub fn allowed_methods(&self) -> BoxedMiddleware {
        Arc::new(MethodNegotiation {
            table: self.snapshot(),
        })
    }

    fn register(
        self,
        method: Option<Method>,
        path: &str,
        handlers: Vec<BoxedMiddleware>,
    ) -> Self {
        {
            let mut inner = self.lock();
            let full = inner.prefixed(path);
            let id = inner.entries.len();
            inner.entries.push(handlers);
            let tree = match method {
                Some(method) => inner.methods.entry(method).or_default(),
                None => &mut inner.any,
            };
            tree.insert(&full, id)
                .unwrap_or_else(|e| panic!("invalid route `{full}`: {e}"));
        }
        self
    }

    fn snapshot(&self) -> Arc<RouterInner> {
        Arc::new(self.lock().clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RouterInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterInner {
    fn prefixed(&self, path: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix.trim_end_matches('/'), path),
            None => path.to_owned(),
        }
    }

    /// Resolves a request to `(middlewares, params)`. HEAD falls back to
    /// GET routes, and the any-method tree catches what the per-method
    /// trees miss.
    fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Vec<BoxedMiddleware>, HashMap<String, String>)> {
        let hit = self
            .methods
            .get(method)
            .and_then(|tree| tree.at(path).ok())
            .or_else(|| {
                if *method == Method::HEAD {
                    self.methods
                        .get(&Method::GET)
                        .and_then(|tree| tree.at(path).ok())
                } else {
                    None
                }
            })
            .or_else(|| self.any.at(path).ok())?;

        let params = hit
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        let mut middlewares = self.middlewares.clone();
        middlewares.extend(self.entries[*hit.value].iter().cloned());
        Some((middlewares, params))
    }

    fn allowed(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = self
            .methods
            .iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.clone())
            .collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}

// ── Mounted middlewares ──────────────────────────────────────────────────────

struct RouteDispatch {
    table: Arc<RouterInner>,
}

impl Middleware for RouteDispatch {
    fn handle(&self, mut ctx: Context, mut next: Next) -> BoxFuture<Flow> {
        let table = Arc::clone(&self.table);
        Box::pin(async move {
            let method = ctx.request.method().clone();
            let path = ctx.request.path().to_owned();
            if let Some((middlewares, params)) = table.lookup(&method, &path) {
                ctx.request.set_params(params);
                next.prepend(middlewares);
            }
            next.run(ctx).await
        })
    }
}

struct MethodNegotiation {
    table: Arc<RouterInner>,
}

impl Middleware for MethodNegotiation {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Flow> {
        let table = Arc::clone(&self.table);
        Box::pin(async move {
            let method = ctx.request.method().clone();
            let path = ctx.request.path().to_owned();

            let response = next.run(ctx).await?;
            if response.status() != StatusCode::NOT_FOUND {
                return Ok(response);
            }

            let allowed = table.allowed(&path);
            if allowed.is_empty() {
                return Ok(response);
            }
            let allow = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");

            if method == Method::OPTIONS {
                return Ok(Response::builder()
                    .status(StatusCode::NO_CONTENT)
                    .header("allow", &allow)
                    .finish_empty());
            }
            if !allowed.contains(&method) {
                return Ok(Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .header("allow", &allow)
                    .finish_empty());
            }
            Ok(response)
        })
    }
}

// ── ValidatedRoute ───────────────────────────────────────────────────────────

/// A route builder carrying one or more body validators.
///
/// Obtained from [`Router::input`]. Each registration method splices the
/// accumulated validators immediately before the handler and returns the
/// parent [`Router`], so one registration ends the builder:
///
/// ```rust,ignore
/// router
///     .input(create_user_schema(), Default::default())
///     .post("/users", create_user)   // ← back to plain Router
///     .get("/users/{id}", get_user); // plain, unvalidated route
/// ```
///
/// Chained `input()` calls compose strictly in order: a failure anywhere
/// in the chain skips every later validator and the handler, and each
/// successful validator merges its parsed fields into `state.body` before
/// the next one runs.
pub struct ValidatedRoute {
    router: Router,
    validator: BoxedMiddleware,
}

impl ValidatedRoute {
    /// Adds another validator behind the accumulated ones.
    pub fn input(self, schema: impl Schema, options: ValidationOptions) -> ValidatedRoute {
        let first = self.validator;
        let second: BoxedMiddleware = Arc::new(validate_body(schema, options));
        let chained = move |ctx: Context, mut next: Next| {
            let first = Arc::clone(&first);
            let second = Arc::clone(&second);
            async move {
                // `second` only runs if `first` continues the chain.
                next.prepend(vec![second]);
                first.handle(ctx, next).await
            }
        };
        ValidatedRoute {
            router: self.router,
            validator: Arc::new(chained),
        }
    }

    pub fn get(self, path: &str, handler: impl Middleware) -> Router {
        self.register(Some(Method::GET), path, handler)
    }

    pub fn post(self, path: &str, handler: impl Middleware) -> Router {
        self.register(Some(Method::POST), path, handler)
    }

    pub fn put(self, path: &str, handler: impl Middleware) -> Router {
        self.register(Some(Method::PUT), path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Middleware) -> Router {
        self.register(Some(Method::PATCH), path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Middleware) -> Router {
        self.register(Some(Method::DELETE), path, handler)
    }

    pub fn options(self, path: &str, handler: impl Middleware) -> Router {
        self.register(Some(Method::OPTIONS), path, handler)
    }

    pub fn head(self, path: &str, handler: impl Middleware) -> Router {
        self.register(Some(Method::HEAD), path, handler)
    }

    pub fn all(self, path: &str, handler: impl Middleware) -> Router {
        self.register(None, path, handler)
    }

    fn register(self, method: Option<Method>, path: &str, handler: impl Middleware) -> Router {
        self.router
            .register(method, path, vec![self.validator, Arc::new(handler)])
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{self, FieldKind};
    use crate::signal::{Signal, success};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn drive(router: &Router, ctx: Context) -> Response {
        let chain: VecDeque<BoxedMiddleware> =
            vec![router.routes(), router.allowed_methods()].into_iter().collect();
        match Next::new(chain).run(ctx).await {
            Ok(response) | Err(Signal::Respond(response)) => response,
            Err(Signal::Fault(err)) => panic!("unexpected fault: {err}"),
        }
    }

    fn body_json(response: &Response) -> Value {
        serde_json::from_slice(response.body()).expect("json body")
    }

    async fn echo_param(ctx: Context, _next: Next) -> Flow {
        let id = ctx.request.param("id").unwrap_or("missing").to_owned();
        Ok(Response::text(id))
    }

    async fn echo_body(ctx: Context, _next: Next) -> Flow {
        success(ctx.state.body.clone())
    }

    #[tokio::test]
    async fn dispatches_by_method_and_path() {
        let router = Router::new().get("/users/{id}", echo_param);
        let response = drive(&router, Context::test_get("/users/42")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"42");
    }

    #[tokio::test]
    async fn unmatched_path_falls_through_to_404() {
        let router = Router::new().get("/users", echo_param);
        let response = drive(&router, Context::test_get("/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn head_falls_back_to_get_routes() {
        let router = Router::new().get("/users", echo_param);
        let ctx = Context::test_with(Method::HEAD, "/users", None, b"");
        let response = drive(&router, ctx).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_method_negotiates_405_with_allow() {
        let router = Router::new().get("/users", echo_param);
        let ctx = Context::test_with(Method::DELETE, "/users", None, b"");
        let response = drive(&router, ctx).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get("allow").unwrap(), "GET");
    }

    #[tokio::test]
    async fn options_negotiates_allow_without_a_route() {
        let router = Router::new().get("/users", echo_param).post("/users", echo_param);
        let ctx = Context::test_with(Method::OPTIONS, "/users", None, b"");
        let response = drive(&router, ctx).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers().get("allow").unwrap(), "GET, POST");
    }

    #[tokio::test]
    async fn all_routes_match_any_method() {
        let router = Router::new().all("/anything", echo_param);
        let ctx = Context::test_with(Method::PATCH, "/anything", None, b"");
        assert_eq!(drive(&router, ctx).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn redirect_registers_an_any_method_found_route() {
        let router = Router::new().redirect("/old", "/new", None);
        let response = drive(&router, Context::test_get("/old")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get("location").unwrap(), "/new");
    }

    #[tokio::test]
    async fn prefix_applies_to_every_registration() {
        let router = Router::with_options(RouterOptions {
            prefix: Some("/api".into()),
            auto_register: true,
        })
        .get("/users", echo_param);
        assert_eq!(
            drive(&router, Context::test_get("/api/users")).await.status(),
            StatusCode::OK
        );
        assert_eq!(
            drive(&router, Context::test_get("/users")).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn router_level_middleware_runs_before_handlers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let marker = {
            let hits = Arc::clone(&hits);
            move |ctx: Context, next: Next| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    next.run(ctx).await
                }
            }
        };
        let router = Router::new().with(marker).get("/users", echo_param);

        drive(&router, Context::test_get("/users")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Unmatched requests never see router-level middleware.
        drive(&router, Context::test_get("/other")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validated_post_rejects_and_admits_per_schema() {
        let router = Router::new()
            .input(
                schema::object()
                    .field("name", FieldKind::String)
                    .field("age", FieldKind::Number),
                ValidationOptions::default(),
            )
            .post("/users", echo_body);

        // Missing `age` → 400 with the flattened field error.
        let rejected = drive(
            &router,
            Context::test_json(Method::POST, "/users", r#"{"name":"a"}"#),
        )
        .await;
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(&rejected),
            json!({"hasError": true, "error": {"age": ["Required"]}, "data": null})
        );

        // Valid body → handler sees the parsed fields.
        let admitted = drive(
            &router,
            Context::test_json(Method::POST, "/users", r#"{"name":"a","age":5}"#),
        )
        .await;
        assert_eq!(admitted.status(), StatusCode::OK);
        assert_eq!(
            body_json(&admitted),
            json!({"hasError": false, "error": null, "data": {"name": "a", "age": 5}})
        );
    }

    #[tokio::test]
    async fn chained_inputs_merge_fields_in_order() {
        let router = Router::new()
            .input(
                schema::object().field("name", FieldKind::String),
                ValidationOptions::default(),
            )
            .input(
                schema::object().field("age", FieldKind::Number),
                ValidationOptions::default(),
            )
            .post("/users", echo_body);

        let response = drive(
            &router,
            Context::test_json(Method::POST, "/users", r#"{"name":"a","age":5}"#),
        )
        .await;
        assert_eq!(
            body_json(&response)["data"],
            json!({"name": "a", "age": 5})
        );
    }

    #[tokio::test]
    async fn failed_first_validator_skips_the_second_entirely() {
        let probed = Arc::new(AtomicUsize::new(0));
        let probe_options = {
            let probed = Arc::clone(&probed);
            ValidationOptions::new().reader(move |_| {
                probed.fetch_add(1, Ordering::SeqCst);
                Ok(Some(json!({"age": 5})))
            })
        };

        let router = Router::new()
            .input(
                schema::object().field("name", FieldKind::String),
                ValidationOptions::default(),
            )
            .input(schema::object().field("age", FieldKind::Number), probe_options)
            .post("/users", echo_body);

        // First schema rejects; the second validator's reader must never run.
        let response = drive(
            &router,
            Context::test_json(Method::POST, "/users", r#"{"wrong":true}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(probed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn registration_after_builder_returns_to_plain_router() {
        let router = Router::new()
            .input(
                schema::object().field("name", FieldKind::String),
                ValidationOptions::default(),
            )
            .post("/users", echo_body)
            .get("/ping", echo_param); // plain registration on the returned Router

        let response = drive(&router, Context::test_get("/ping")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic_at_registration() {
        let _ = Router::new()
            .get("/users/{id}", echo_param)
            .get("/users/{name}", echo_param);
    }
}
