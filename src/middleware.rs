//! Middleware chain model.
//!
//! # How the chain is stored and driven
//!
//! Every unit of request-processing logic — handlers, validators, the
//! static file server, route dispatch itself — is a [`Middleware`]: it
//! receives the [`Context`] by value together with a [`Next`] holding the
//! rest of the chain, and resolves to a [`Flow`].
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! async fn hello(ctx: Context, next: Next) -> Flow { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! Arc::new(hello)                              ← Middleware blanket impl
//!        ↓  stored as BoxedMiddleware = Arc<dyn Middleware>
//! mw.handle(ctx, next)  at request time        ← one vtable dispatch
//!        ↓
//! Box::pin(hello(ctx, next))                   ← BoxFuture
//! ```
//!
//! The context is *moved* down the chain, never shared: calling
//! [`Next::run`] hands the request to the remaining middlewares and
//! suspends until that subtree completes. A middleware that never calls
//! `next` short-circuits everything downstream.
//!
//! The only runtime cost per request is one `Arc` clone per chain entry
//! plus one virtual call — negligible compared to network I/O.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;

use crate::context::Context;
use crate::response::Response;
use crate::signal::Signal;

// ── Core types ────────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` because the runtime polls the future in-place; `Send +
/// 'static` let tokio move it across worker threads. Every capture must be
/// owned — middlewares clone their `Arc`'d state into the future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// The result of running a middleware.
///
/// `Ok(response)` is the ordinary completion path. `Err(signal)` carries
/// either an early response raised from arbitrary call depth or a genuine
/// fault; only the top-level dispatcher tells the two apart.
pub type Flow = Result<Response, Signal>;

/// A heap-allocated, type-erased middleware shared across concurrent
/// requests.
pub type BoxedMiddleware = Arc<dyn Middleware>;

// ── Middleware trait ──────────────────────────────────────────────────────────

/// Implemented for every unit of the request pipeline.
///
/// You rarely implement this yourself: it is automatically satisfied for
/// any `async fn` with the signature
///
/// ```text
/// async fn name(ctx: Context, next: Next) -> Flow
/// ```
///
/// A handler that produces a response simply returns it (or raises it via
/// [`success`](crate::success) and friends) without touching `next`; a
/// pass-through middleware does its work and ends with `next.run(ctx).await`.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Flow>;
}

/// Any function or closure with the right owned-argument signature is a
/// middleware. The `'static` bound on the future means closures must clone
/// captured state into the returned future rather than borrow it.
impl<F, Fut> Middleware for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Flow> + Send + 'static,
{
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Flow> {
        Box::pin(self(ctx, next))
    }
}

// ── Next ─────────────────────────────────────────────────────────────────────

/// The remainder of the middleware chain.
///
/// `Next` owns its slice of the chain, so running it consumes it — a
/// middleware can delegate at most once. An exhausted chain resolves to
/// `404 Not Found`, the default response of an application that never
/// produced one.
pub struct Next {
    stack: VecDeque<BoxedMiddleware>,
}

impl Next {
    pub(crate) fn new(stack: VecDeque<BoxedMiddleware>) -> Self {
        Self { stack }
    }

    /// Splices `middlewares` in front of the remaining chain, preserving
    /// their order. Route dispatch uses this to run a matched route's
    /// handlers before the rest of the application.
    pub(crate) fn prepend(&mut self, middlewares: Vec<BoxedMiddleware>) {
        for mw in middlewares.into_iter().rev() {
            self.stack.push_front(mw);
        }
    }

    /// Runs the rest of the chain to completion.
    pub fn run(mut self, ctx: Context) -> BoxFuture<Flow> {
        match self.stack.pop_front() {
            Some(mw) => mw.handle(ctx, self),
            None => Box::pin(std::future::ready(Ok(Response::empty(StatusCode::NOT_FOUND)))),
        }
    }
}

// ── Composition ──────────────────────────────────────────────────────────────

/// Composes several middlewares into one, running them in order.
///
/// Registration points accept a single middleware; `stack` is how a route
/// gets more than one handler:
///
/// ```rust,ignore
/// router.get("/admin", stack(vec![Arc::new(require_auth), Arc::new(admin_page)]));
/// ```
pub fn stack(middlewares: Vec<BoxedMiddleware>) -> impl Middleware {
    move |ctx: Context, mut next: Next| {
        let middlewares = middlewares.clone();
        async move {
            next.prepend(middlewares);
            next.run(ctx).await
        }
    }
}
