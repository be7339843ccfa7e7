//! Per-request context and accumulated state.

use http::Extensions;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::request::Request;

/// The per-request context, owned exclusively by one in-flight request.
///
/// A `Context` is created by the dispatcher, moved down the middleware
/// chain, and destroyed when the chain completes. Nothing about it is
/// shared between requests, so there is nothing to lock.
pub struct Context {
    /// The incoming request.
    pub request: Request,
    /// State accumulated along the chain — most importantly the validated
    /// body fields merged in by [`validate_body`](crate::validate_body).
    pub state: State,
    /// Typed per-request values for user middleware (request ids,
    /// authenticated principals, and the like).
    pub extensions: Extensions,
}

impl Context {
    pub(crate) fn new(request: Request) -> Self {
        Self {
            request,
            state: State::default(),
            extensions: Extensions::new(),
        }
    }
}

/// The mutable state bag carried by a [`Context`].
#[derive(Default)]
pub struct State {
    /// Parsed body fields, accumulated by validators in chain order.
    ///
    /// Each validator shallow-merges its parsed object here: new keys
    /// overwrite same-named keys, keys from earlier validators survive.
    pub body: Map<String, Value>,
}

impl State {
    /// Deserializes the accumulated body fields into a caller-chosen type.
    ///
    /// By the time a handler registered through a validated route runs,
    /// every field of every `input()` schema in the chain is present here.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.body.clone()))
    }

    pub(crate) fn merge_body(&mut self, parsed: Value) {
        if let Value::Object(fields) = parsed {
            self.body.extend(fields);
        }
    }
}

#[cfg(test)]
impl Context {
    pub(crate) fn test_get(path: &str) -> Self {
        Self::new(Request::synthetic(http::Method::GET, path, None, b""))
    }

    pub(crate) fn test_json(method: http::Method, path: &str, body: &str) -> Self {
        Self::new(Request::synthetic(
            method,
            path,
            Some("application/json"),
            body.as_bytes(),
        ))
    }

    pub(crate) fn test_with(
        method: http::Method,
        path: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Self {
        Self::new(Request::synthetic(method, path, content_type, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn merge_overwrites_same_keys_and_keeps_others() {
        let mut state = State::default();
        state.merge_body(json!({"name": "a", "age": 5}));
        state.merge_body(json!({"age": 7, "role": "admin"}));

        assert_eq!(state.body["name"], "a");
        assert_eq!(state.body["age"], 7);
        assert_eq!(state.body["role"], "admin");
    }

    #[test]
    fn non_object_merge_is_inert() {
        let mut state = State::default();
        state.merge_body(json!({"name": "a"}));
        state.merge_body(json!("not an object"));
        assert_eq!(state.body.len(), 1);
    }

    #[test]
    fn body_as_deserializes_accumulated_fields() {
        #[derive(Deserialize)]
        struct User {
            name: String,
            age: u32,
        }

        let mut state = State::default();
        state.merge_body(json!({"name": "a"}));
        state.merge_body(json!({"age": 5}));

        let user: User = state.body_as().expect("typed body");
        assert_eq!(user.name, "a");
        assert_eq!(user.age, 5);
    }
}
