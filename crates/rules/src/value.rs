//! Engine result values and their promise-aware JSON encoding.
//!
//! Host operations return [`EngineValue`], which is plain JSON plus three
//! engine-side leaf kinds that have no native JSON form:
//! - [`Callable`]: a rule action (the `then` of a rule)
//! - [`Promise`]: a deferred action result
//! - [`Opaque`]: anything else the engine could not express as JSON
//!
//! Callables and promises encode as the literal string `"function"`.
//! Opaque values fail to encode with an error naming the value.

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Sentinel emitted in place of callables and deferred results.
pub const FUNCTION_SENTINEL: &str = "function";

/// Reference to an engine-side action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callable {
    pub name: String,
}

/// Deferred result of an asynchronous action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promise {
    pub action: String,
}

/// Engine value without a JSON representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opaque {
    pub type_name: String,
    pub repr: String,
}

impl fmt::Display for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.type_name, self.repr)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineValue {
    Json(Value),
    Array(Vec<EngineValue>),
    Object(IndexMap<String, EngineValue>),
    Callable(Callable),
    Promise(Promise),
    Opaque(Opaque),
}

impl EngineValue {
    pub fn callable(name: impl Into<String>) -> Self {
        EngineValue::Callable(Callable { name: name.into() })
    }

    pub fn promise(action: impl Into<String>) -> Self {
        EngineValue::Promise(Promise { action: action.into() })
    }

    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, EngineValue)>,
        K: Into<String>,
    {
        EngineValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Encode to a JSON value, replacing callables and promises with [`FUNCTION_SENTINEL`].
    pub fn to_json(&self) -> Result<Value, EncodeError> {
        serde_json::to_value(self).map_err(|e| EncodeError(e.to_string()))
    }
}

impl From<Value> for EngineValue {
    fn from(value: Value) -> Self {
        EngineValue::Json(value)
    }
}

impl Serialize for EngineValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EngineValue::Json(value) => value.serialize(serializer),
            EngineValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            EngineValue::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            EngineValue::Callable(_) | EngineValue::Promise(_) => {
                serializer.serialize_str(FUNCTION_SENTINEL)
            }
            EngineValue::Opaque(opaque) => Err(S::Error::custom(format!(
                "{} is not JSON serializable",
                opaque
            ))),
        }
    }
}

/// Encoding failure: the value contained an [`Opaque`] leaf.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct EncodeError(pub String);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn callables_and_promises_encode_as_sentinel() {
        let value = EngineValue::object([
            ("name", EngineValue::Json(json!("t1"))),
            ("then", EngineValue::callable("on_k")),
            ("later", EngineValue::promise("notify")),
        ]);
        assert_eq!(
            value.to_json().unwrap(),
            json!({"name": "t1", "then": "function", "later": "function"})
        );
    }

    #[test]
    fn bare_promise_is_a_json_string() {
        assert_eq!(
            serde_json::to_string(&EngineValue::promise("x")).unwrap(),
            "\"function\""
        );
    }

    #[test]
    fn nested_arrays_keep_order() {
        let value = EngineValue::Array(vec![
            EngineValue::Json(json!(1)),
            EngineValue::Array(vec![EngineValue::callable("a")]),
            EngineValue::Json(json!({"k": null})),
        ]);
        assert_eq!(value.to_json().unwrap(), json!([1, ["function"], {"k": null}]));
    }

    #[test]
    fn opaque_value_fails_naming_the_value() {
        let value = EngineValue::object([(
            "handle",
            EngineValue::Opaque(Opaque {
                type_name: "socket".into(),
                repr: "fd=3".into(),
            }),
        )]);
        let err = value.to_json().unwrap_err();
        assert!(err.0.contains("<socket fd=3> is not JSON serializable"), "{}", err);
    }
}
