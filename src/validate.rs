//! Request-body validation middleware.

use std::sync::Arc;

use http::StatusCode;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::Error;
use crate::middleware::{Flow, Middleware, Next};
use crate::response::Response;
use crate::schema::{FieldErrors, Schema};
use crate::signal::{Signal, fail, fail_with};

type Reader = Arc<dyn Fn(&Context) -> Result<Option<Value>, Error> + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&ValidationFailure) -> Option<Response> + Send + Sync>;

/// Why a validator refused a request, handed to the `on_err` hook.
#[derive(Debug)]
pub enum ValidationFailure {
    /// The candidate could not be read at all (body stream failure,
    /// malformed JSON, broken query string).
    Read(Error),
    /// The candidate was read but the schema rejected it.
    Schema(FieldErrors),
}

/// Configuration for [`validate_body`]. Two knobs, both optional.
#[derive(Clone, Default)]
pub struct ValidationOptions {
    reader: Option<Reader>,
    on_err: Option<ErrorHook>,
}

impl ValidationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the default JSON-body read with a custom candidate
    /// extractor.
    pub fn reader(
        mut self,
        reader: impl Fn(&Context) -> Result<Option<Value>, Error> + Send + Sync + 'static,
    ) -> Self {
        self.reader = Some(Arc::new(reader));
        self
    }

    /// Supplies a custom failure response. Returning `None` falls back to
    /// the default envelope for that failure.
    pub fn on_err(
        mut self,
        hook: impl Fn(&ValidationFailure) -> Option<Response> + Send + Sync + 'static,
    ) -> Self {
        self.on_err = Some(Arc::new(hook));
        self
    }

    /// Ready-made options that validate the URL query string instead of
    /// the body. Every query value arrives as a string.
    pub fn from_query() -> Self {
        Self::new().reader(|ctx| {
            let query = ctx.request.query().unwrap_or_default();
            let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
                .map_err(|e| Error::InvalidQuery(e.to_string()))?;
            let fields: Map<String, Value> = pairs
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect();
            Ok(Some(Value::Object(fields)))
        })
    }

    fn custom_response(&self, failure: &ValidationFailure) -> Option<Response> {
        self.on_err.as_ref().and_then(|hook| hook(failure))
    }
}

/// Builds a middleware that validates the request body against `schema`.
///
/// On success the parsed fields are shallow-merged into `state.body` (new
/// keys overwrite same-named ones, fields from earlier validators survive)
/// and the next middleware runs — exactly once. On failure nothing
/// downstream runs:
///
/// - schema rejection raises a `400` envelope whose `error` is the
///   flattened field → messages mapping;
/// - a read failure raises the default `500` "Internal Server Error"
///   envelope.
///
/// In both cases a supplied `on_err` that returns a response wins over the
/// default.
///
/// A request without a JSON content type (or with an empty body) has no
/// candidate value; the schema sees an absent input and reports its
/// required fields as missing rather than letting the request through
/// unvalidated.
pub fn validate_body(schema: impl Schema, options: ValidationOptions) -> impl Middleware {
    let schema: Arc<dyn Schema> = Arc::new(schema);
    move |mut ctx: Context, next: Next| {
        let schema = Arc::clone(&schema);
        let options = options.clone();
        async move {
            let candidate = match read_candidate(&mut ctx, &options).await {
                Ok(candidate) => candidate,
                Err(err) => {
                    if let Some(response) = options.custom_response(&ValidationFailure::Read(err))
                    {
                        return Err(Signal::Respond(response));
                    }
                    return fail_with("Internal Server Error", StatusCode::INTERNAL_SERVER_ERROR);
                }
            };

            match schema.safe_parse(candidate.as_ref()) {
                Ok(parsed) => {
                    ctx.state.merge_body(parsed);
                    next.run(ctx).await
                }
                Err(errors) => {
                    if let Some(response) =
                        options.custom_response(&ValidationFailure::Schema(errors.clone()))
                    {
                        return Err(Signal::Respond(response));
                    }
                    fail(errors)
                }
            }
        }
    }
}

async fn read_candidate(
    ctx: &mut Context,
    options: &ValidationOptions,
) -> Result<Option<Value>, Error> {
    match &options.reader {
        Some(reader) => reader(ctx),
        None => ctx.request.body_json().await,
    }
}
