//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, Uri};
use http_body_util::BodyExt;
use serde_json::Value;

use crate::error::Error;

/// An incoming HTTP request.
///
/// Header parsing and connection handling belong to hyper; this type holds
/// the parsed parts plus the path parameters bound by route dispatch. The
/// body is buffered lazily: nothing is read from the wire until a handler
/// or validator asks for it.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    params: HashMap<String, String>,
    body: BodyState,
}

enum BodyState {
    Pending(hyper::body::Incoming),
    Buffered(Bytes),
}

impl Request {
    pub(crate) fn from_hyper(req: hyper::Request<hyper::body::Incoming>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            params: HashMap::new(),
            body: BodyState::Pending(body),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// The raw query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Case-insensitive header lookup; non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// Reads and buffers the request body.
    ///
    /// The first call drains the wire; later calls hand back the buffered
    /// bytes. `Bytes` clones are reference-counted, not copies.
    pub async fn body_bytes(&mut self) -> Result<Bytes, Error> {
        match std::mem::replace(&mut self.body, BodyState::Buffered(Bytes::new())) {
            BodyState::Pending(incoming) => {
                let bytes = incoming.collect().await.map_err(Error::body)?.to_bytes();
                self.body = BodyState::Buffered(bytes.clone());
                Ok(bytes)
            }
            BodyState::Buffered(bytes) => {
                self.body = BodyState::Buffered(bytes.clone());
                Ok(bytes)
            }
        }
    }

    /// Reads the body as a JSON value, going by the declared content type.
    ///
    /// Returns `Ok(None)` when the request does not declare a JSON content
    /// type or the body is empty — there is no candidate value to speak of.
    /// A declared-JSON body that fails to parse is an error.
    pub async fn body_json(&mut self) -> Result<Option<Value>, Error> {
        if !self.is_json() {
            return Ok(None);
        }
        let bytes = self.body_bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_slice(&bytes)?;
        Ok(Some(value))
    }

    /// True for `application/json` and `+json` suffixed media types.
    pub fn is_json(&self) -> bool {
        self.header(CONTENT_TYPE.as_str()).is_some_and(|ct| {
            let essence = ct.split(';').next().unwrap_or_default().trim();
            essence == "application/json" || essence.ends_with("+json")
        })
    }

    #[cfg(test)]
    pub(crate) fn synthetic(
        method: Method,
        path_and_query: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Self {
        let uri: Uri = path_and_query.parse().expect("test uri");
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, ct.parse().expect("test content type"));
        }
        Self {
            method,
            uri,
            headers,
            params: HashMap::new(),
            body: BodyState::Buffered(Bytes::copy_from_slice(body)),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_header(&mut self, name: &'static str, value: &str) {
        self.headers.insert(
            http::header::HeaderName::from_static(name),
            value.parse().expect("test header value"),
        );
    }
}
