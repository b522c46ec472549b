use serde_json::Value;

use super::Message;

/// Delivery indicator shown to the author of a message.
#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadReceipt {
    Sent,
    Seen,
}

/// Epoch milliseconds for any timestamp shape the stores produce.
///
/// Numbers are already milliseconds. `{seconds, nanoseconds}` objects (with or
/// without a leading underscore) come from document stores. Strings may hold
/// digits or RFC 3339. Unresolved server placeholders and everything else
/// map to `0`, so pending local writes sort first.
pub fn normalize_timestamp_ms(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::Object(map) => {
            if map.contains_key(".sv") {
                return 0;
            }
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64);
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            match seconds {
                Some(s) => s.saturating_mul(1000).saturating_add(nanos / 1_000_000),
                None => 0,
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                return s.parse::<i64>().unwrap_or(0);
            }
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Ascending by timestamp. Ties keep their input order, which is store key
/// order and therefore insertion order.
pub fn order_messages(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by_key(|m| m.timestamp);
    messages
}

/// Receipt for `viewer_id`, `None` unless the viewer wrote the message.
pub fn read_receipt(message: &Message, viewer_id: &str) -> Option<ReadReceipt> {
    if message.sender_id != viewer_id {
        return None;
    }
    Some(if message.read {
        ReadReceipt::Seen
    } else {
        ReadReceipt::Sent
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::chat::ParticipantRole;

    fn msg(id: &str, timestamp: i64) -> Message {
        Message {
            id: id.to_string(),
            text: id.to_string(),
            sender_id: "a".to_string(),
            sender_role: ParticipantRole::Admin,
            timestamp,
            read: false,
        }
    }

    #[test]
    fn normalizes_known_shapes() {
        assert_eq!(normalize_timestamp_ms(&json!(1_700_000_000_123_i64)), 1_700_000_000_123);
        assert_eq!(
            normalize_timestamp_ms(&json!({"seconds": 1_700_000_000, "nanoseconds": 5_000_000})),
            1_700_000_000_005
        );
        assert_eq!(
            normalize_timestamp_ms(&json!({"_seconds": 2, "_nanoseconds": 999_999_999})),
            2_999
        );
        assert_eq!(normalize_timestamp_ms(&json!("1700000000000")), 1_700_000_000_000);
        assert_eq!(
            normalize_timestamp_ms(&json!("2024-01-02T03:04:05.250Z")),
            1_704_164_645_250
        );
    }

    #[test]
    fn unknown_shapes_sort_first() {
        assert_eq!(normalize_timestamp_ms(&json!({".sv": "timestamp"})), 0);
        assert_eq!(normalize_timestamp_ms(&Value::Null), 0);
        assert_eq!(normalize_timestamp_ms(&json!("yesterday")), 0);
        assert_eq!(normalize_timestamp_ms(&json!([1, 2])), 0);
        assert_eq!(normalize_timestamp_ms(&json!({"nanoseconds": 5})), 0);
    }

    #[test]
    fn order_is_stable_on_ties() {
        let ordered = order_messages(vec![
            msg("m5", 5),
            msg("m3a", 3),
            msg("pending", 0),
            msg("m3b", 3),
        ]);
        let ids: Vec<&str> = ordered.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["pending", "m3a", "m3b", "m5"]);
    }

    #[test]
    fn receipts_only_for_author() {
        let mut m = msg("m", 1);
        assert_eq!(read_receipt(&m, "a"), Some(ReadReceipt::Sent));
        assert_eq!(read_receipt(&m, "r"), None);
        m.read = true;
        assert_eq!(read_receipt(&m, "a"), Some(ReadReceipt::Seen));
    }
}
