use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::ordering::normalize_timestamp_ms;

#[derive(uniffi::Enum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Admin,
    #[default]
    User,
}

impl ParticipantRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: ParticipantRole,
    #[serde(
        default,
        deserialize_with = "de_opt_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_read: Option<i64>,
}

/// Room record as stored under `chatRooms/{id}`, without its messages.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub admin_id: String,
    pub resident_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_opt_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_message_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sender_id: Option<String>,
    #[serde(default)]
    pub participants: BTreeMap<String, Participant>,
}

impl Room {
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.get(user_id)
    }
}

/// One chat message. `id` is the store key and is not part of the record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub text: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_role: ParticipantRole,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub timestamp: i64,
    #[serde(default)]
    pub read: bool,
}

impl Message {
    pub fn is_unread_for(&self, user_id: &str) -> bool {
        !self.read && self.sender_id != user_id
    }
}

/// Messages of a `messages` node in store key order. Entries that do not
/// decode are skipped.
pub(crate) fn messages_from_node(node: Option<Value>) -> Vec<Message> {
    let Some(Value::Object(map)) = node else {
        return Vec::new();
    };
    map.into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<Message>(value) {
            Ok(mut message) => {
                message.id = key;
                Some(message)
            }
            Err(err) => {
                tracing::warn!(message_id = %key, %err, "skipping undecodable message");
                None
            }
        })
        .collect()
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(normalize_timestamp_ms(&value))
}

fn de_opt_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(normalize_timestamp_ms(&value)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn room_decodes_wire_shape() {
        let room: Room = serde_json::from_value(json!({
            "id": "a_r",
            "adminId": "a",
            "residentId": "r",
            "createdAt": 1_700_000_000_000_i64,
            "lastMessage": "hello",
            "lastMessageTimestamp": {"seconds": 1_700_000_001, "nanoseconds": 0},
            "lastSenderId": "r",
            "participants": {
                "a": {"id": "a", "role": "admin"},
                "r": {"id": "r", "role": "user", "lastRead": 1_700_000_002_000_i64}
            }
        }))
        .unwrap();
        assert_eq!(room.context_id, None);
        assert_eq!(room.last_message_timestamp, Some(1_700_000_001_000));
        assert_eq!(room.participant("a").unwrap().last_read, None);
        assert_eq!(room.participant("r").unwrap().role, ParticipantRole::User);
    }

    #[test]
    fn messages_keep_key_order_and_skip_garbage() {
        let node = json!({
            "-N1": {"text": "one", "senderId": "a", "senderRole": "admin", "timestamp": 10, "read": true},
            "-N2": {"unexpected": true},
            "-N3": {"text": "three", "senderId": "r", "senderRole": "user", "timestamp": {".sv": "timestamp"}}
        });
        let messages = messages_from_node(Some(node));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "-N1");
        assert_eq!(messages[1].id, "-N3");
        assert_eq!(messages[1].timestamp, 0);
        assert!(!messages[1].read);
        assert!(messages[1].is_unread_for("a"));
        assert!(!messages[1].is_unread_for("r"));
    }
}
