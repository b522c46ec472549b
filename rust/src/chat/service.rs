use std::sync::Arc;

use estate_store_profiles::{profile_for, StoreNamespace};
use estate_store_traits::{ServerValue, StorePath, Subscription, TreeStore};
use serde_json::{json, Map, Value};

use super::model::messages_from_node;
use super::{order_messages, resolve_room_id, ChatError, Message, ParticipantRole, Room, RoomKey};

const MESSAGES: &str = "messages";

/// Chat rooms of one namespace.
///
/// Owns every read and write under `{rooms_root}/{room}`. Cheap to clone;
/// clones share the injected store.
#[derive(Clone)]
pub struct ChatService {
    namespace: StoreNamespace,
    rooms_root: StorePath,
    store: Arc<dyn TreeStore>,
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("namespace", &self.namespace)
            .field("rooms_root", &self.rooms_root)
            .field("backend", &self.store.backend())
            .finish()
    }
}

impl ChatService {
    pub fn new(namespace: StoreNamespace, store: Arc<dyn TreeStore>) -> Result<Self, ChatError> {
        let rooms_root = StorePath::parse(profile_for(namespace).rooms_root)?;
        Ok(Self {
            namespace,
            rooms_root,
            store,
        })
    }

    pub fn namespace(&self) -> StoreNamespace {
        self.namespace
    }

    fn room_path(&self, room: &RoomKey) -> Result<StorePath, ChatError> {
        if room.as_str().trim().is_empty() {
            return Err(ChatError::Validation { field: "room_id" });
        }
        Ok(self.rooms_root.child(room.as_str())?)
    }

    fn messages_path(&self, room: &RoomKey) -> Result<StorePath, ChatError> {
        Ok(self.room_path(room)?.child(MESSAGES)?)
    }

    /// Create the room for the two parties unless it already exists.
    ///
    /// Returns the room key either way. Concurrent callers converge on one
    /// record with the first writer's `createdAt`.
    pub async fn create_or_get_room(
        &self,
        admin_id: &str,
        resident_id: &str,
        context_id: Option<&str>,
    ) -> Result<RoomKey, ChatError> {
        require("admin_id", admin_id)?;
        require("resident_id", resident_id)?;
        let context_id = context_id.filter(|ctx| !ctx.trim().is_empty());
        let key = resolve_room_id(admin_id, resident_id, context_id);
        let path = self.room_path(&key)?;

        let mut participants = Map::new();
        participants.insert(
            admin_id.to_string(),
            json!({"id": admin_id, "role": ParticipantRole::Admin.as_str()}),
        );
        participants.insert(
            resident_id.to_string(),
            json!({"id": resident_id, "role": ParticipantRole::User.as_str()}),
        );
        let mut room = json!({
            "id": key.as_str(),
            "adminId": admin_id,
            "residentId": resident_id,
            "createdAt": ServerValue::timestamp(),
            "participants": Value::Object(participants),
        });
        if let Some(ctx) = context_id {
            room["contextId"] = Value::from(ctx);
        }

        let created = self.store.set_if_absent(&path, room).await?;
        tracing::debug!(
            namespace = self.namespace.as_str(),
            room = %key,
            created,
            "create_or_get_room"
        );
        Ok(key)
    }

    /// Room record without its messages; `None` when it does not exist.
    pub async fn get_room_details(&self, room: &RoomKey) -> Result<Option<Room>, ChatError> {
        let Some(mut node) = self.store.get(&self.room_path(room)?).await? else {
            return Ok(None);
        };
        if let Some(map) = node.as_object_mut() {
            map.remove(MESSAGES);
        }
        let room = serde_json::from_value::<Room>(node)
            .map_err(|e| ChatError::Malformed(format!("room {room}: {e}")))?;
        Ok(Some(room))
    }

    /// Append a message and refresh the room summary. Returns the message id.
    pub async fn append_message(
        &self,
        room: &RoomKey,
        sender_id: &str,
        text: &str,
        sender_role: ParticipantRole,
    ) -> Result<String, ChatError> {
        require("room_id", room.as_str())?;
        require("sender_id", sender_id)?;
        require("text", text)?;

        let message = json!({
            "text": text,
            "senderId": sender_id,
            "senderRole": sender_role.as_str(),
            "timestamp": ServerValue::timestamp(),
            "read": false,
        });
        let message_id = self.store.push(&self.messages_path(room)?, message).await?;

        let mut summary = Map::new();
        summary.insert("lastMessage".into(), Value::from(text));
        summary.insert("lastMessageTimestamp".into(), ServerValue::timestamp());
        summary.insert("lastSenderId".into(), Value::from(sender_id));
        if let Err(err) = self.store.update(&self.room_path(room)?, summary).await {
            // The message itself is stored; a stale summary heals on the next send.
            tracing::warn!(room = %room, %message_id, %err, "room summary update failed");
        }
        Ok(message_id)
    }

    /// Live, ordered message list of `room`.
    pub async fn subscribe_messages(&self, room: &RoomKey) -> Result<MessageFeed, ChatError> {
        let subscription = self.store.subscribe(&self.messages_path(room)?).await?;
        Ok(MessageFeed {
            room: room.clone(),
            subscription,
        })
    }

    /// Stamp `user_id`'s `lastRead` and flip `read` on every unread message
    /// the other party sent, in a single update. Returns how many messages
    /// were flipped.
    pub async fn mark_read(&self, room: &RoomKey, user_id: &str) -> Result<u32, ChatError> {
        require("user_id", user_id)?;
        let room_path = self.room_path(room)?;
        let messages = messages_from_node(self.store.get(&room_path.child(MESSAGES)?).await?);

        // Rejects ids that cannot be a key.
        room_path.child("participants")?.child(user_id)?;
        let mut fields = Map::new();
        fields.insert(
            format!("participants/{user_id}/lastRead"),
            ServerValue::timestamp(),
        );
        let mut flipped = 0u32;
        for message in messages.iter().filter(|m| m.is_unread_for(user_id)) {
            fields.insert(format!("{MESSAGES}/{}/read", message.id), Value::Bool(true));
            flipped += 1;
        }
        self.store.update(&room_path, fields).await?;
        tracing::debug!(room = %room, flipped, "mark_read");
        Ok(flipped)
    }

    /// Messages in `room` that `user_id` did not write and has not read.
    pub async fn get_unread_count(&self, room: &RoomKey, user_id: &str) -> Result<u32, ChatError> {
        require("user_id", user_id)?;
        let messages = messages_from_node(self.store.get(&self.messages_path(room)?).await?);
        Ok(messages.iter().filter(|m| m.is_unread_for(user_id)).count() as u32)
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ChatError> {
    if value.trim().is_empty() {
        return Err(ChatError::Validation { field });
    }
    Ok(())
}

/// Live message feed of one room.
///
/// Every item is the full ordered list. The listener is released by
/// [`MessageFeed::unsubscribe`] or on drop.
#[derive(Debug)]
pub struct MessageFeed {
    room: RoomKey,
    subscription: Subscription,
}

impl MessageFeed {
    pub fn room(&self) -> &RoomKey {
        &self.room
    }

    /// Next full snapshot, `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<Result<Vec<Message>, ChatError>> {
        let event = self.subscription.next().await?;
        Some(
            event
                .map(|node| order_messages(messages_from_node(node)))
                .map_err(ChatError::from),
        )
    }

    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use estate_memory_store::MemoryTreeStore;
    use estate_store_traits::StoreError;

    use super::*;

    fn service(store: &MemoryTreeStore) -> ChatService {
        ChatService::new(StoreNamespace::General, Arc::new(store.clone())).unwrap()
    }

    fn counter_clock() -> impl Fn() -> i64 + Send + Sync + 'static {
        let next = std::sync::atomic::AtomicI64::new(1_000);
        move || next.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    #[tokio::test]
    async fn create_or_get_room_is_idempotent() {
        let store = MemoryTreeStore::with_clock(counter_clock());
        let chat = service(&store);

        let first = chat.create_or_get_room("admin1", "res1", None).await.unwrap();
        let second = chat.create_or_get_room("admin1", "res1", Some("")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.write_count(), 1);

        let room = chat.get_room_details(&first).await.unwrap().unwrap();
        assert_eq!(room.id, "admin1_res1");
        assert_eq!(room.created_at, 1_000);
        assert_eq!(room.participants.len(), 2);
        assert_eq!(room.participant("admin1").unwrap().role, ParticipantRole::Admin);
        assert_eq!(room.participant("res1").unwrap().last_read, None);
    }

    #[tokio::test]
    async fn context_rooms_are_separate() {
        let store = MemoryTreeStore::new();
        let chat = service(&store);
        let plain = chat.create_or_get_room("a", "r", None).await.unwrap();
        let scoped = chat.create_or_get_room("a", "r", Some("apt9")).await.unwrap();
        assert_ne!(plain, scoped);
        let room = chat.get_room_details(&scoped).await.unwrap().unwrap();
        assert_eq!(room.context_id.as_deref(), Some("apt9"));
    }

    #[tokio::test]
    async fn missing_room_is_none() {
        let store = MemoryTreeStore::new();
        let chat = service(&store);
        assert_eq!(
            chat.get_room_details(&RoomKey::from_raw("nobody_here")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn empty_inputs_fail_validation_without_store_access() {
        let store = MemoryTreeStore::new();
        store.set_offline(true);
        let chat = service(&store);
        let room = RoomKey::from_raw("a_r");

        let err = chat
            .append_message(&room, "a", "   ", ParticipantRole::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation { field: "text" }));
        let err = chat
            .append_message(&room, "", "hi", ParticipantRole::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation { field: "sender_id" }));
        let err = chat
            .append_message(&RoomKey::from_raw(""), "a", "hi", ParticipantRole::Admin)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        let err = chat.create_or_get_room("", "r", None).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn append_updates_summary_after_push() {
        let store = MemoryTreeStore::with_clock(counter_clock());
        let chat = service(&store);
        let room = chat.create_or_get_room("a", "r", None).await.unwrap();

        let id = chat
            .append_message(&room, "r", "leaky tap", ParticipantRole::User)
            .await
            .unwrap();
        assert!(!id.is_empty());

        let details = chat.get_room_details(&room).await.unwrap().unwrap();
        assert_eq!(details.last_message.as_deref(), Some("leaky tap"));
        assert_eq!(details.last_sender_id.as_deref(), Some("r"));
        assert!(details.last_message_timestamp.unwrap() > details.created_at);
    }

    #[tokio::test]
    async fn failed_push_leaves_summary_untouched() {
        let store = MemoryTreeStore::new();
        let chat = service(&store);
        let room = chat.create_or_get_room("a", "r", None).await.unwrap();
        store.fail_writes_under(StorePath::parse("chatRooms/a_r/messages").unwrap());

        let err = chat
            .append_message(&room, "a", "hello", ParticipantRole::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Store(StoreError::Network(_))));
        let details = chat.get_room_details(&room).await.unwrap().unwrap();
        assert_eq!(details.last_message, None);
    }

    #[tokio::test]
    async fn mark_read_flips_only_other_party_messages() {
        let store = MemoryTreeStore::new();
        let chat = service(&store);
        let room = chat.create_or_get_room("a", "r", None).await.unwrap();
        chat.append_message(&room, "a", "from admin", ParticipantRole::Admin)
            .await
            .unwrap();
        chat.append_message(&room, "r", "from resident", ParticipantRole::User)
            .await
            .unwrap();
        chat.append_message(&room, "a", "again", ParticipantRole::Admin)
            .await
            .unwrap();

        assert_eq!(chat.get_unread_count(&room, "r").await.unwrap(), 2);
        assert_eq!(chat.get_unread_count(&room, "a").await.unwrap(), 1);

        let writes_before = store.write_count();
        assert_eq!(chat.mark_read(&room, "r").await.unwrap(), 2);
        assert_eq!(store.write_count(), writes_before + 1);

        assert_eq!(chat.get_unread_count(&room, "r").await.unwrap(), 0);
        assert_eq!(chat.get_unread_count(&room, "a").await.unwrap(), 1);
        let details = chat.get_room_details(&room).await.unwrap().unwrap();
        assert!(details.participant("r").unwrap().last_read.is_some());
        assert_eq!(details.participant("a").unwrap().last_read, None);
    }

    #[tokio::test]
    async fn feed_delivers_ordered_snapshots_until_unsubscribed() {
        let store = MemoryTreeStore::new();
        let chat = service(&store);
        let room = chat.create_or_get_room("a", "r", None).await.unwrap();

        let mut feed = chat.subscribe_messages(&room).await.unwrap();
        assert_eq!(feed.room(), &room);
        assert!(feed.next().await.unwrap().unwrap().is_empty());

        chat.append_message(&room, "a", "first", ParticipantRole::Admin)
            .await
            .unwrap();
        let snapshot = feed.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].text, "first");

        feed.unsubscribe();
        assert_eq!(store.watcher_count(), 0);
    }
}
