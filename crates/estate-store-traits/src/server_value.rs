//! Server-resolved placeholder values

use serde_json::{Map, Value, json};

const SV_KEY: &str = ".sv";

/// Placeholders that the store replaces with a server-side value on write.
pub struct ServerValue;

impl ServerValue {
    /// Placeholder for the store's clock, in epoch milliseconds.
    pub fn timestamp() -> Value {
        json!({ SV_KEY: "timestamp" })
    }

    /// Whether `value` is an unresolved placeholder.
    pub fn is_placeholder(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|map| map.len() == 1 && map.contains_key(SV_KEY))
    }
}

/// Replace every timestamp placeholder inside `value` with `now_ms`.
pub fn resolve_server_values(value: Value, now_ms: i64) -> Value {
    match value {
        v if ServerValue::is_placeholder(&v) => Value::from(now_ms),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, resolve_server_values(v, now_ms)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}
