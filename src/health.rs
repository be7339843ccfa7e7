//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them on any router:
//!
//! ```rust
//! use trellis::{Router, health};
//!
//! Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```
//!
//! Replace `readiness` with your own handler to gate on dependency
//! availability (database connections, downstream services, and so on).

use crate::context::Context;
use crate::middleware::{Flow, Next};
use crate::response::Response;

/// Liveness probe handler.
///
/// Always `200 OK` with body `"ok"` — if the process can respond to HTTP
/// at all, it is alive. Intentionally has no dependencies.
pub async fn liveness(_ctx: Context, _next: Next) -> Flow {
    Ok(Response::text("ok"))
}

/// Readiness probe handler (default implementation).
///
/// `200 OK` with body `"ready"`. Swap in your own handler if the
/// application needs a warm-up period or must verify dependency health
/// before accepting traffic.
pub async fn readiness(_ctx: Context, _next: Next) -> Flow {
    Ok(Response::text("ready"))
}
