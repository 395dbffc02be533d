//! JSON <-> msgpack conversion for command-line arguments and output.
//!
//! Remote objects render as `{"type": "Buffer", "handle": 1}` and the same
//! shape is accepted back as an argument when the type is known to the peer.

use nvim_core::{ApiInfo, RemoteObject, Value};
use serde_json::{json, Map, Number};

/// Render a msgpack value as JSON.
pub fn to_json(value: &Value, api: Option<&ApiInfo>) -> serde_json::Value {
    match value {
        Value::Nil => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(n) => n
            .as_i64()
            .map(Number::from)
            .or_else(|| n.as_u64().map(Number::from))
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::F32(f) => float(f64::from(*f)),
        Value::F64(f) => float(*f),
        Value::String(s) => match s.as_str() {
            Some(s) => serde_json::Value::String(s.to_string()),
            None => serde_json::Value::String(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        },
        Value::Binary(bytes) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|item| to_json(item, api)).collect())
        }
        Value::Map(entries) => {
            let mut object = Map::new();
            for (key, value) in entries {
                let key = match key.as_str() {
                    Some(key) => key.to_string(),
                    None => key.to_string(),
                };
                object.insert(key, to_json(value, api));
            }
            serde_json::Value::Object(object)
        }
        Value::Ext(code, data) => {
            match api.and_then(|api| RemoteObject::from_value(api, value).ok()) {
                Some(object) => json!({ "type": object.type_name(), "handle": object.handle() }),
                None => json!({ "ext": code, "data": data }),
            }
        }
    }
}

fn float(f: f64) -> serde_json::Value {
    Number::from_f64(f)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Convert a JSON argument to msgpack.
pub fn from_json(json: &serde_json::Value, api: Option<&ApiInfo>) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::from(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                Value::from(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => {
            Value::Array(items.iter().map(|item| from_json(item, api)).collect())
        }
        serde_json::Value::Object(object) => {
            if let Some(remote) = remote_object(object, api) {
                return remote.to_value();
            }
            Value::Map(
                object
                    .iter()
                    .map(|(key, value)| (Value::from(key.as_str()), from_json(value, api)))
                    .collect(),
            )
        }
    }
}

fn remote_object(object: &Map<String, serde_json::Value>, api: Option<&ApiInfo>) -> Option<RemoteObject> {
    if object.len() != 2 {
        return None;
    }
    let type_name = object.get("type")?.as_str()?;
    let handle = object.get("handle")?.as_i64()?;
    let ty = api?.object_type_named(type_name)?;
    Some(RemoteObject::new(ty.name.as_str(), ty.code, handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> ApiInfo {
        let buffer = Value::Map(vec![
            (Value::from("id"), Value::from(0)),
            (Value::from("prefix"), Value::from("nvim_buf_")),
        ]);
        let metadata = Value::Map(vec![(
            Value::from("types"),
            Value::Map(vec![(Value::from("Buffer"), buffer)]),
        )]);
        ApiInfo::from_metadata(Some(1), metadata).unwrap()
    }

    #[test]
    fn test_scalars_and_containers() {
        let value = Value::Map(vec![
            (Value::from("n"), Value::from(-3)),
            (Value::from("ok"), Value::from(true)),
            (Value::from("lines"), Value::Array(vec![Value::from("a"), Value::Nil])),
        ]);
        assert_eq!(
            to_json(&value, None),
            json!({ "n": -3, "ok": true, "lines": ["a", null] })
        );
    }

    #[test]
    fn test_remote_object_shape() {
        let api = api();
        let buffer = RemoteObject::new("Buffer", 0, 7).to_value();
        let rendered = to_json(&buffer, Some(&api));
        assert_eq!(rendered, json!({ "type": "Buffer", "handle": 7 }));
        assert_eq!(from_json(&rendered, Some(&api)), buffer);
    }

    #[test]
    fn test_unknown_object_type_stays_a_map() {
        let api = api();
        let value = from_json(&json!({ "type": "Window", "handle": 1 }), Some(&api));
        assert!(value.is_map());
    }

    #[test]
    fn test_json_arguments() {
        assert_eq!(
            from_json(&json!(["echo", 1, 2.5, null]), None),
            Value::Array(vec![
                Value::from("echo"),
                Value::from(1),
                Value::from(2.5),
                Value::Nil
            ])
        );
    }
}
