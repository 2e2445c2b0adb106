//! Versioned envelope encoding (bundle/unbundle)
//!
//! Values are wrapped in a self-describing JSON envelope:
//!
//! ```text
//! {"format_version": 1, "version": <string|null>, "data": <payload>}
//! ```
//!
//! The substrate is plain JSON, which has no native bytes, tuples or sets.
//! Those shapes are written as tagged objects (`{"__type": "bytes", "data":
//! "<base64>"}`, `{"__type": "tuple"|"set", "items": [...]}`); a map that
//! itself carries the tag key is written as `{"__type": "map", "items":
//! {...}}` so decoding stays unambiguous. An envelope whose `format_version`
//! is unknown to this build fails decoding hard; misreading binary data
//! must never look like a cache miss.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Map as JsonMap, Value as Json};

use crate::bundle::value::Value;
use crate::error::{CacheError, Result};

/// Envelope format version written by this build
pub const FORMAT_VERSION: u64 = 1;

/// Tag key used for shapes the JSON substrate cannot express natively
const TYPE_TAG: &str = "__type";

/// Encode a value into a versioned envelope without an entry version
pub fn bundle(value: &Value) -> Result<Vec<u8>> {
    bundle_versioned(value, None)
}

/// Encode a value into a versioned envelope carrying an entry version string
pub fn bundle_versioned(value: &Value, version: Option<&str>) -> Result<Vec<u8>> {
    let envelope = json!({
        "format_version": FORMAT_VERSION,
        "version": version,
        "data": value_to_json(value)?,
    });
    serde_json::to_vec(&envelope).map_err(|e| CacheError::Encode(e.to_string()))
}

/// Decode an envelope, discarding the entry version
pub fn unbundle(bytes: &[u8]) -> Result<Value> {
    unbundle_versioned(bytes).map(|(value, _)| value)
}

/// Decode an envelope into the stored value and its entry version
pub fn unbundle_versioned(bytes: &[u8]) -> Result<(Value, Option<String>)> {
    let envelope: Json = serde_json::from_slice(bytes)
        .map_err(|e| CacheError::MalformedEnvelope(e.to_string()))?;
    let fields = envelope
        .as_object()
        .ok_or_else(|| CacheError::MalformedEnvelope("envelope is not an object".to_string()))?;

    let format_version = fields
        .get("format_version")
        .and_then(Json::as_u64)
        .ok_or_else(|| {
            CacheError::MalformedEnvelope("missing format_version field".to_string())
        })?;
    if format_version != FORMAT_VERSION {
        return Err(CacheError::UnsupportedFormat {
            found: format_version,
        });
    }

    let version = match fields.get("version") {
        None | Some(Json::Null) => None,
        Some(Json::String(s)) => Some(s.clone()),
        Some(other) => {
            return Err(CacheError::MalformedEnvelope(format!(
                "version field is not a string: {other}"
            )))
        }
    };

    let data = fields
        .get("data")
        .ok_or_else(|| CacheError::MalformedEnvelope("missing data field".to_string()))?;
    Ok((value_from_json(data)?, version))
}

fn value_to_json(value: &Value) -> Result<Json> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => Json::Number(serde_json::Number::from(*n)),
        Value::Float(f) => {
            let number = serde_json::Number::from_f64(*f)
                .ok_or_else(|| CacheError::Encode(format!("non-finite float {f}")))?;
            Json::Number(number)
        }
        Value::Text(s) => Json::String(s.clone()),
        Value::Bytes(data) => json!({ (TYPE_TAG): "bytes", "data": BASE64.encode(data) }),
        Value::List(items) => Json::Array(items_to_json(items)?),
        Value::Tuple(items) => json!({ (TYPE_TAG): "tuple", "items": items_to_json(items)? }),
        Value::Set(items) => {
            let encoded: Result<Vec<Json>> = items.iter().map(value_to_json).collect();
            json!({ (TYPE_TAG): "set", "items": encoded? })
        }
        Value::Map(entries) => {
            let mut object = JsonMap::new();
            for (key, entry) in entries {
                object.insert(key.clone(), value_to_json(entry)?);
            }
            if entries.contains_key(TYPE_TAG) {
                // The map collides with the tag key; wrap it so decoding
                // cannot mistake user data for a shape tag.
                json!({ (TYPE_TAG): "map", "items": Json::Object(object) })
            } else {
                Json::Object(object)
            }
        }
    })
}

fn items_to_json(items: &[Value]) -> Result<Vec<Json>> {
    items.iter().map(value_to_json).collect()
}

fn value_from_json(json: &Json) -> Result<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                return Err(CacheError::MalformedEnvelope(format!(
                    "unrepresentable number {n}"
                )));
            }
        }
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::List(items_from_json(items)?),
        Json::Object(fields) => match fields.get(TYPE_TAG) {
            None => {
                let mut entries = std::collections::BTreeMap::new();
                for (key, field) in fields {
                    entries.insert(key.clone(), value_from_json(field)?);
                }
                Value::Map(entries)
            }
            Some(Json::String(tag)) => tagged_from_json(tag, fields)?,
            Some(other) => {
                return Err(CacheError::MalformedEnvelope(format!(
                    "shape tag is not a string: {other}"
                )))
            }
        },
    })
}

fn tagged_from_json(tag: &str, fields: &JsonMap<String, Json>) -> Result<Value> {
    match tag {
        "bytes" => {
            let encoded = fields.get("data").and_then(Json::as_str).ok_or_else(|| {
                CacheError::MalformedEnvelope("bytes tag without data field".to_string())
            })?;
            let data = BASE64
                .decode(encoded)
                .map_err(|e| CacheError::MalformedEnvelope(format!("invalid base64: {e}")))?;
            Ok(Value::Bytes(data))
        }
        "tuple" | "set" => {
            let items = fields.get("items").and_then(Json::as_array).ok_or_else(|| {
                CacheError::MalformedEnvelope(format!("{tag} tag without items array"))
            })?;
            let items = items_from_json(items)?;
            if tag == "tuple" {
                Ok(Value::Tuple(items))
            } else {
                Ok(Value::Set(items.into_iter().collect()))
            }
        }
        "map" => {
            let items = fields.get("items").and_then(Json::as_object).ok_or_else(|| {
                CacheError::MalformedEnvelope("map tag without items object".to_string())
            })?;
            let mut entries = std::collections::BTreeMap::new();
            for (key, field) in items {
                entries.insert(key.clone(), value_from_json(field)?);
            }
            Ok(Value::Map(entries))
        }
        other => Err(CacheError::MalformedEnvelope(format!(
            "unknown shape tag '{other}'"
        ))),
    }
}

fn items_from_json(items: &[Json]) -> Result<Vec<Value>> {
    items.iter().map(value_from_json).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) {
        let bytes = bundle(&value).unwrap();
        assert_eq!(unbundle(&bytes).unwrap(), value);
    }

    #[test]
    fn test_scalar_roundtrips() {
        roundtrip(Value::Null);
        roundtrip(Value::from(true));
        roundtrip(Value::from(-42));
        roundtrip(Value::from(3.25));
        roundtrip(Value::from("hello"));
    }

    #[test]
    fn test_bytes_roundtrip() {
        roundtrip(Value::bytes(b"\x00\x01binary\xff".to_vec()));
    }

    #[test]
    fn test_container_roundtrips() {
        roundtrip(Value::List(vec![
            Value::from(1),
            Value::from("two"),
            Value::Null,
        ]));
        roundtrip(Value::tuple([Value::from(1), Value::from(2), Value::from(3)]));
        roundtrip(Value::set([Value::from(7), Value::from(8), Value::from(9)]));
    }

    #[test]
    fn test_nested_roundtrip() {
        // A set inside a mapping inside a sequence
        let value = Value::List(vec![Value::map([
            ("inner", Value::set([Value::from(1), Value::from(2)])),
            ("blob", Value::bytes(b"data".to_vec())),
            ("coords", Value::tuple([Value::from(4), Value::from(5)])),
        ])]);
        roundtrip(value);
    }

    #[test]
    fn test_float_stays_float() {
        let bytes = bundle(&Value::from(2.0)).unwrap();
        assert_eq!(unbundle(&bytes).unwrap(), Value::Float(2.0));

        let bytes = bundle(&Value::from(2)).unwrap();
        assert_eq!(unbundle(&bytes).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_map_colliding_with_tag_key() {
        roundtrip(Value::map([("__type", Value::from("sneaky"))]));
    }

    #[test]
    fn test_entry_version_passthrough() {
        let bytes = bundle_versioned(&Value::from("v"), Some("1.7")).unwrap();
        let (value, version) = unbundle_versioned(&bytes).unwrap();
        assert_eq!(value, Value::from("v"));
        assert_eq!(version.as_deref(), Some("1.7"));

        let bytes = bundle(&Value::from("v")).unwrap();
        let (_, version) = unbundle_versioned(&bytes).unwrap();
        assert_eq!(version, None);
    }

    #[test]
    fn test_unknown_format_version_is_fatal() {
        let raw = br#"{"format_version": 999, "version": null, "data": {}}"#;
        match unbundle(raw) {
            Err(CacheError::UnsupportedFormat { found }) => assert_eq!(found, 999),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_envelope_is_fatal() {
        assert!(matches!(
            unbundle(b"not json at all"),
            Err(CacheError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            unbundle(br#"{"version": null, "data": 1}"#),
            Err(CacheError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        assert!(matches!(
            bundle(&Value::from(f64::NAN)),
            Err(CacheError::Encode(_))
        ));
    }
}
