//! Body schemas and the non-throwing parse they expose.
//!
//! A [`Schema`] checks a candidate JSON value and either hands back the
//! parsed data or a flattened field → messages mapping that serializes
//! straight into the failure envelope. Validation never throws and never
//! stops at the first problem — every field reports.
//!
//! [`ObjectSchema`] is the workhorse:
//!
//! ```rust
//! use trellis::schema::{self, FieldKind, Schema};
//! use serde_json::json;
//!
//! let create_user = schema::object()
//!     .field("name", FieldKind::String)
//!     .field("age", FieldKind::Number)
//!     .optional("nickname", FieldKind::String);
//!
//! let parsed = create_user
//!     .safe_parse(Some(&json!({"name": "a", "age": 5, "extra": true})))
//!     .unwrap();
//! assert_eq!(parsed, json!({"name": "a", "age": 5})); // unknown keys stripped
//!
//! let errors = create_user.safe_parse(Some(&json!({"name": "a"}))).unwrap_err();
//! assert_eq!(errors["age"], vec!["Required".to_string()]);
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Flattened validation errors: field name → ordered message list.
///
/// A `BTreeMap` keeps the serialized order deterministic. Errors that do
/// not belong to a single field (a non-object candidate) report under the
/// `"."` key.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// A non-throwing body schema.
///
/// `input` is `None` when the request carried no usable candidate (no
/// body, or a non-JSON content type) — schemas treat that like an empty
/// object, so required fields report as missing.
pub trait Schema: Send + Sync + 'static {
    fn safe_parse(&self, input: Option<&Value>) -> Result<Value, FieldErrors>;
}

/// Starts an [`ObjectSchema`] with no fields.
pub fn object() -> ObjectSchema {
    ObjectSchema { fields: Vec::new() }
}

/// The expected type of a single object field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// Any non-null JSON value.
    Any,
}

impl FieldKind {
    fn check(self, value: &Value) -> Result<(), &'static str> {
        let ok = match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        };
        if ok { Ok(()) } else { Err(self.expectation()) }
    }

    fn expectation(self) -> &'static str {
        match self {
            Self::String => "Expected string",
            Self::Number => "Expected number",
            Self::Integer => "Expected integer",
            Self::Boolean => "Expected boolean",
            Self::Array => "Expected array",
            Self::Object => "Expected object",
            Self::Any => "Expected a value",
        }
    }
}

/// A flat object schema: named, typed fields, required unless declared
/// optional. Unknown keys are stripped from the parsed output.
#[derive(Clone, Debug)]
pub struct ObjectSchema {
    fields: Vec<Field>,
}

#[derive(Clone, Debug)]
struct Field {
    name: String,
    kind: FieldKind,
    required: bool,
}

impl ObjectSchema {
    /// Declares a required field.
    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name: name.to_owned(),
            kind,
            required: true,
        });
        self
    }

    /// Declares an optional field: absent (or null) passes, present must
    /// type-check.
    pub fn optional(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name: name.to_owned(),
            kind,
            required: false,
        });
        self
    }
}

impl Schema for ObjectSchema {
    fn safe_parse(&self, input: Option<&Value>) -> Result<Value, FieldErrors> {
        let mut errors = FieldErrors::new();

        let empty = Map::new();
        let candidate = match input {
            None => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => {
                errors.insert(".".to_owned(), vec!["Expected object".to_owned()]);
                return Err(errors);
            }
        };

        let mut parsed = Map::new();
        for field in &self.fields {
            match candidate.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        errors
                            .entry(field.name.clone())
                            .or_default()
                            .push("Required".to_owned());
                    }
                }
                Some(value) => match field.kind.check(value) {
                    Ok(()) => {
                        parsed.insert(field.name.clone(), value.clone());
                    }
                    Err(message) => {
                        errors
                            .entry(field.name.clone())
                            .or_default()
                            .push(message.to_owned());
                    }
                },
            }
        }

        if errors.is_empty() {
            Ok(Value::Object(parsed))
        } else {
            Err(errors)
        }
    }
}
