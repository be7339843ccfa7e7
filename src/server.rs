//! Server composition, the request dispatcher, and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before SIGKILL. The
//! server reacts by immediately ceasing to accept connections, letting
//! every in-flight connection task run to completion, and then returning
//! from [`Server::listen`] so `main` can exit cleanly.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::context::Context;
use crate::error::Error;
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Router, RouterOptions};
use crate::signal::Signal;
use crate::static_files::StaticOptions;

// ── Listen configuration ─────────────────────────────────────────────────────

/// Where to bind, and what to do once bound.
pub struct ListenOptions {
    pub hostname: String,
    pub port: u16,
    on_listen: Option<Box<dyn FnOnce(&ListenEvent) + Send>>,
}

impl ListenOptions {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            on_listen: None,
        }
    }

    /// Replaces the default "server running on …" announcement. The event
    /// carries the *effective* address — bind port 0 to get an ephemeral
    /// port back.
    pub fn on_listen(mut self, hook: impl FnOnce(&ListenEvent) + Send + 'static) -> Self {
        self.on_listen = Some(Box::new(hook));
        self
    }
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self::new("0.0.0.0", 8000)
    }
}

/// The effective bind address, handed to the listen hook.
#[derive(Clone, Debug)]
pub struct ListenEvent {
    pub hostname: String,
    pub port: u16,
}

fn default_on_listen(event: &ListenEvent) {
    info!(
        "server running on http://{}:{}",
        display_host(&event.hostname),
        event.port
    );
}

/// Wildcard binds are reachable on loopback; announce them that way.
fn display_host(hostname: &str) -> &str {
    match hostname {
        "0.0.0.0" | "::" => "localhost",
        other => other,
    }
}

// ── Server ───────────────────────────────────────────────────────────────────

/// Top-level composition: the global middleware chain and the router
/// registry.
///
/// ```rust,no_run
/// use trellis::{Context, Flow, ListenOptions, Next, RouterOptions, Server, success};
///
/// async fn whoami(ctx: Context, _next: Next) -> Flow {
///     success(ctx.state.body.clone())
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), trellis::Error> {
///     let mut server = Server::new();
///     server
///         .create_router(RouterOptions::default())
///         .post("/whoami", whoami);
///     server.listen(ListenOptions::default()).await
/// }
/// ```
#[derive(Default)]
pub struct Server {
    middlewares: Vec<BoxedMiddleware>,
    routers: Vec<Router>,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware to the global chain, ahead of anything mounted
    /// at listen-time. Returns the server for chaining.
    pub fn with(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Creates a router. Unless `options.auto_register` is off, the server
    /// remembers it and mounts its routes — in creation order — when
    /// `listen` is called.
    pub fn create_router(&mut self, options: RouterOptions) -> Router {
        let auto_register = options.auto_register;
        let router = Router::with_options(options);
        if auto_register {
            self.routers.push(router.clone());
        }
        router
    }

    /// Appends a static-file middleware: every request is first offered to
    /// the file tree under `options.root`, and falls through on a miss.
    pub fn serve_static(&mut self, options: StaticOptions) -> &mut Self {
        self.middlewares.push(Arc::new(options.into_middleware()));
        self
    }

    /// Mounts every auto-registered router, binds, announces, and serves
    /// until a shutdown signal drains the last connection.
    pub async fn listen(self, options: ListenOptions) -> Result<(), Error> {
        let ListenOptions {
            hostname,
            port,
            on_listen,
        } = options;
        let addr: SocketAddr = format!("{hostname}:{port}")
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("{hostname}:{port}")))?;

        let chain = self.into_chain();

        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let event = ListenEvent {
            hostname: local.ip().to_string(),
            port: local.port(),
        };
        match on_listen {
            Some(hook) => hook(&event),
            None => default_on_listen(&event),
        }

        // JoinSet tracks every connection task so shutdown can drain them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting even if
                // more connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let chain = Arc::clone(&chain);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection, not
                        // once per connection.
                        let svc = service_fn(move |req| {
                            let chain = Arc::clone(&chain);
                            async move { dispatch(chain, req).await }
                        });

                        // `auto` negotiates HTTP/1.1 or HTTP/2 per client.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow unbounded.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("server stopped");
        Ok(())
    }

    /// Final chain assembly: globals in registration order, then each
    /// registry router's dispatch and method-negotiation middleware in
    /// creation order.
    fn into_chain(mut self) -> Arc<Vec<BoxedMiddleware>> {
        for router in &self.routers {
            self.middlewares.push(router.routes());
            self.middlewares.push(router.allowed_methods());
        }
        Arc::new(self.middlewares)
    }
}

// ── Request dispatch ─────────────────────────────────────────────────────────

/// Core hot path: runs one request through the chain and unwinds the
/// result into a wire response.
///
/// This is the single place early-response signals are handled: a raised
/// `Signal::Respond` lands on the wire exactly like a returned response,
/// while a `Signal::Fault` is logged and answered with a bare 500. The
/// error type is [`Infallible`](std::convert::Infallible) — hyper never
/// sees a failure.
async fn dispatch(
    chain: Arc<Vec<BoxedMiddleware>>,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let ctx = Context::new(Request::from_hyper(req));
    let stack: VecDeque<BoxedMiddleware> = chain.iter().cloned().collect();

    let response = match Next::new(stack).run(ctx).await {
        Ok(response) => response,
        Err(Signal::Respond(response)) => response,
        Err(Signal::Fault(err)) => {
            error!(error = %err, "unhandled fault in middleware chain");
            Response::empty(http::StatusCode::INTERNAL_SERVER_ERROR)
        }
    };

    Ok(response.into_http())
}

// ── Shutdown signal ──────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives: SIGTERM
/// (Kubernetes) or SIGINT (Ctrl-C) on Unix, Ctrl-C elsewhere.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
