//! Minimal trellis example — a validated JSON API with health checks and
//! a static front-end.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8000/healthz
//!   curl -X POST http://localhost:8000/api/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice","age":30}'
//!   curl -X POST http://localhost:8000/api/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'          # → 400, {"age":["Required"]}
//!   curl -i http://localhost:8000/old-docs

use serde::Deserialize;
use trellis::schema::{self, FieldKind};
use trellis::{
    Context, Flow, ListenOptions, Next, RouterOptions, Server, StaticOptions, health, success,
};

#[derive(Deserialize)]
struct CreateUser {
    name: String,
    age: u32,
}

#[tokio::main]
async fn main() -> Result<(), trellis::Error> {
    tracing_subscriber::fmt::init();

    let mut server = Server::new();

    // Everything under ./public is offered first; misses fall through to
    // the routers below.
    server.serve_static(StaticOptions::new("./public").index("index.html"));

    server
        .create_router(RouterOptions {
            prefix: Some("/api".into()),
            ..RouterOptions::default()
        })
        .input(
            schema::object()
                .field("name", FieldKind::String)
                .field("age", FieldKind::Number),
            Default::default(),
        )
        .post("/users", create_user)
        .get("/users/{id}", get_user);

    server
        .create_router(RouterOptions::default())
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness)
        .redirect("/old-docs", "/docs", None);

    server.listen(ListenOptions::default()).await
}

// POST /api/users
//
// The validator has already run: `state.body` holds exactly the parsed
// schema fields, so the typed view cannot fail on shape.
async fn create_user(ctx: Context, _next: Next) -> Flow {
    let user: CreateUser = ctx.state.body_as()?;
    success(serde_json::json!({
        "id": 99,
        "name": user.name,
        "age": user.age,
    }))
}

// GET /api/users/{id}
async fn get_user(ctx: Context, _next: Next) -> Flow {
    let id = ctx.request.param("id").unwrap_or("unknown");
    success(serde_json::json!({ "id": id, "name": "alice" }))
}
