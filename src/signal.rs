//! Early-response protocol.
//!
//! Deeply nested code — a validator three calls down, a helper inside a
//! handler — often needs to end the request *now* with a specific
//! response. Threading that response back through every frame by hand is
//! noise, and unwind machinery is the wrong tool for an expected outcome.
//! Instead, the response rides the error channel of [`Flow`] as a
//! [`Signal`]: `?` carries it up through any function returning
//! `Result<_, Signal>`, and the dispatcher — nothing else — unwinds it
//! onto the wire.
//!
//! Two kinds of signal exist and are never confused:
//!
//! - [`Signal::Respond`] — a response-shaped short-circuit. Handled at the
//!   top level exactly like a normally returned response.
//! - [`Signal::Fault`] — a genuine failure. Not handled by this layer: the
//!   dispatcher logs it and answers with a bare 500.
//!
//! The helpers below build `Respond` signals wrapped in the stable JSON
//! envelope:
//!
//! ```text
//! success: { "hasError": false, "error": null, "data": <T> }
//! fail:    { "hasError": true,  "error": <E>,  "data": null }
//! ```
//!
//! Every helper returns a [`Flow`] that is always `Err`, so a call in tail
//! position terminates the handler — the type system's version of a
//! function that never returns:
//!
//! ```rust
//! use trellis::{Context, Flow, Next, success};
//!
//! async fn whoami(ctx: Context, _next: Next) -> Flow {
//!     success(ctx.state.body.clone())
//! }
//! ```

use http::{HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::middleware::Flow;
use crate::response::Response;

// ── Signal ───────────────────────────────────────────────────────────────────

/// A value raised through the middleware chain's error channel.
#[derive(Debug)]
pub enum Signal {
    /// Terminate the request with this response. Suppressed (handled) by
    /// the dispatcher only.
    Respond(Response),
    /// A genuine failure. Propagates to the dispatcher's generic 500 path
    /// untouched.
    Fault(Error),
}

impl From<Response> for Signal {
    fn from(response: Response) -> Self {
        Self::Respond(response)
    }
}

impl From<Error> for Signal {
    fn from(err: Error) -> Self {
        Self::Fault(err)
    }
}

impl From<std::io::Error> for Signal {
    fn from(err: std::io::Error) -> Self {
        Self::Fault(err.into())
    }
}

impl From<serde_json::Error> for Signal {
    fn from(err: serde_json::Error) -> Self {
        Self::Fault(err.into())
    }
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// The stable JSON shape of every `success`/`fail` response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T, E> {
    pub has_error: bool,
    pub error: Option<E>,
    pub data: Option<T>,
}

// ── Terminal helpers ─────────────────────────────────────────────────────────

/// Raises `data` as a JSON response with the given status.
///
/// Terminal: the returned [`Flow`] is always `Err`, so this is the last
/// thing a code path does. A serialization failure degrades to
/// [`Signal::Fault`].
pub fn json<T: Serialize>(data: &T, status: StatusCode) -> Flow {
    let bytes = serde_json::to_vec(data).map_err(Error::from)?;
    Err(Signal::Respond(
        Response::builder().status(status).json(bytes),
    ))
}

/// Raises a `200 OK` success envelope around `data`.
pub fn success<T: Serialize>(data: T) -> Flow {
    success_with(data, StatusCode::OK)
}

/// Raises a success envelope with an explicit status.
pub fn success_with<T: Serialize>(data: T, status: StatusCode) -> Flow {
    json(
        &Envelope::<T, ()> {
            has_error: false,
            error: None,
            data: Some(data),
        },
        status,
    )
}

/// Raises a `400 Bad Request` failure envelope around `error`.
pub fn fail<E: Serialize>(error: E) -> Flow {
    fail_with(error, StatusCode::BAD_REQUEST)
}

/// Raises a failure envelope with an explicit status.
pub fn fail_with<E: Serialize>(error: E, status: StatusCode) -> Flow {
    json(
        &Envelope::<(), E> {
            has_error: true,
            error: Some(error),
            data: None,
        },
        status,
    )
}

/// Raises a redirect to `url`, default `302 Found`.
pub fn redirect(url: &str, status: Option<StatusCode>) -> Flow {
    let location = HeaderValue::try_from(url)
        .map_err(|_| Error::InvalidLocation(url.to_owned()))?;
    Err(Signal::Respond(Response::located(
        location,
        status.unwrap_or(StatusCode::FOUND),
    )))
}
