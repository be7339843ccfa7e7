//! Unified error type.

/// The error type returned by trellis's fallible operations.
///
/// Application-level outcomes (validation failures, redirects, 404s) are
/// expressed as [`Response`](crate::Response) values or short-circuit
/// [`Signal`](crate::Signal)s, not as `Error`s. This type surfaces
/// infrastructure failures: binding a listener, reading a request body,
/// serializing an envelope.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The `host:port` string handed to `listen` did not parse.
    #[error("invalid bind address `{0}`")]
    InvalidAddress(String),

    /// A redirect target that cannot be carried in a `location` header.
    #[error("invalid redirect location `{0}`")]
    InvalidLocation(String),

    /// Listener or file I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope or body serialization failure.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// The request body stream failed mid-read.
    #[error("body read: {0}")]
    BodyRead(String),

    /// The query string did not parse as `key=value` pairs.
    #[error("query parse: {0}")]
    InvalidQuery(String),
}

impl Error {
    pub(crate) fn body(err: impl std::fmt::Display) -> Self {
        Self::BodyRead(err.to_string())
    }
}
