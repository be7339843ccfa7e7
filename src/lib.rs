//! # trellis
//!
//! An ergonomic layer on top of hyper: fluent routing, schema-validated
//! request bodies, a stable JSON envelope, and static files. Nothing more.
//! Nothing less.
//!
//! ## The contract
//!
//! hyper owns the protocol — the accept loop, header parsing, HTTP/1.1
//! and HTTP/2 negotiation. [`matchit`] owns path matching. trellis owns
//! the part that changes between applications: how routes, validators,
//! and responses compose.
//!
//! - **Routing** — per-method radix trees, `{name}` path parameters,
//!   method negotiation (405 + `Allow`) for free
//! - **Validation** — `.input(schema)` guards a route; parsed fields land
//!   in `ctx.state.body`, failures answer with a 400 envelope before your
//!   handler ever runs
//! - **Early responses** — [`success`], [`fail`], and [`redirect`] raise a
//!   response from any call depth; the dispatcher unwinds it onto the wire
//! - **Static files** — serve-or-fall-through, with precompressed-sibling
//!   negotiation and cache headers
//!
//! Every JSON response from this layer wears the same envelope:
//!
//! ```text
//! success: { "hasError": false, "error": null, "data": <T> }
//! fail:    { "hasError": true,  "error": <E>,  "data": null }
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use trellis::schema::{self, FieldKind};
//! use trellis::{Context, Flow, ListenOptions, Next, RouterOptions, Server, success};
//!
//! async fn create_user(ctx: Context, _next: Next) -> Flow {
//!     // Both fields are guaranteed present and well-typed here.
//!     success(ctx.state.body.clone())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), trellis::Error> {
//!     let mut server = Server::new();
//!
//!     server
//!         .create_router(RouterOptions::default())
//!         .input(
//!             schema::object()
//!                 .field("name", FieldKind::String)
//!                 .field("age", FieldKind::Number),
//!             Default::default(),
//!         )
//!         .post("/users", create_user);
//!
//!     server.listen(ListenOptions::default()).await
//! }
//! ```

mod context;
mod error;
mod middleware;
mod request;
mod response;
mod router;
mod server;
mod signal;
mod static_files;
mod validate;

pub mod health;
pub mod schema;

pub use context::{Context, State};
pub use error::Error;
pub use http::{Method, StatusCode};
pub use middleware::{BoxFuture, BoxedMiddleware, Flow, Middleware, Next, stack};
pub use request::Request;
pub use response::{Response, ResponseBuilder};
pub use router::{Router, RouterOptions, ValidatedRoute};
pub use schema::Schema;
pub use server::{ListenEvent, ListenOptions, Server};
pub use signal::{Envelope, Signal, fail, fail_with, json, redirect, success, success_with};
pub use static_files::StaticOptions;
pub use validate::{ValidationFailure, ValidationOptions, validate_body};
