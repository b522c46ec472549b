// One open chat room: creation, live feed, sends and read receipts.

use tokio::task::JoinHandle;

use super::*;
use crate::chat::{read_receipt, Message, ParticipantRole, RoomKey};
use crate::state::{AuthState, ChatMessageView, ChatNamespace, ChatPhase, ChatViewState, UserRole};

pub(super) struct ChatSession {
    token: u64,
    service: Arc<ChatService>,
    namespace: ChatNamespace,
    admin_id: String,
    resident_id: String,
    context_id: Option<String>,
    viewer_id: String,
    viewer_role: ParticipantRole,
    room: Option<RoomKey>,
    pending_note: Option<String>,
    init_task: Option<JoinHandle<()>>,
    feed_task: Option<JoinHandle<()>>,
}

impl ChatSession {
    fn is_for(
        &self,
        namespace: ChatNamespace,
        admin_id: &str,
        resident_id: &str,
        context_id: Option<&str>,
    ) -> bool {
        self.namespace == namespace
            && self.admin_id == admin_id
            && self.resident_id == resident_id
            && self.context_id.as_deref() == context_id
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(task) = self.init_task.take() {
            task.abort();
        }
        // Aborting drops the feed, which releases the store listener.
        if let Some(task) = self.feed_task.take() {
            task.abort();
        }
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn message_view(message: &Message, viewer_id: &str) -> ChatMessageView {
    ChatMessageView {
        id: message.id.clone(),
        text: message.text.clone(),
        sender_id: message.sender_id.clone(),
        sender_role: message.sender_role,
        timestamp_ms: message.timestamp,
        is_mine: message.sender_id == viewer_id,
        receipt: read_receipt(message, viewer_id),
    }
}

impl AppCore {
    pub(super) fn open_chat_room(
        &mut self,
        namespace: ChatNamespace,
        admin_id: String,
        resident_id: String,
        context_id: Option<String>,
        pending_note: Option<String>,
    ) {
        let context_id = blank_to_none(context_id);
        let pending_note = blank_to_none(pending_note);

        // Reopening a room that is already live is a no-op; one still
        // initializing is retried from scratch.
        if let Some(chat) = self.chat.as_ref() {
            if chat.room.is_some()
                && chat.is_for(namespace, &admin_id, &resident_id, context_id.as_deref())
            {
                if pending_note.is_some() {
                    tracing::info!(room = ?chat.room, "room already open, pending note ignored");
                }
                return;
            }
        }
        self.close_chat_session();

        self.push_screen(Screen::ChatRoom {
            namespace,
            admin_id: admin_id.clone(),
            resident_id: resident_id.clone(),
            context_id: context_id.clone(),
            pending_note: pending_note.clone(),
        });

        let (viewer_id, viewer_role) = match &self.state.auth {
            AuthState::LoggedIn { user_id, role, .. } => (
                user_id.clone(),
                match role {
                    UserRole::Admin => ParticipantRole::Admin,
                    UserRole::Resident => ParticipantRole::User,
                },
            ),
            AuthState::LoggedOut => (String::new(), ParticipantRole::User),
        };

        let missing = [
            ("admin id", &admin_id),
            ("resident id", &resident_id),
            ("signed-in user", &viewer_id),
        ]
        .into_iter()
        .find(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name);
        if let Some(name) = missing {
            tracing::warn!(missing = name, "chat room blocked");
            self.state.chat = Some(ChatViewState {
                namespace,
                room_id: None,
                phase: ChatPhase::Blocked {
                    reason: format!("Missing {name}"),
                },
                messages: vec![],
                draft: String::new(),
                sending: false,
            });
            self.emit_state();
            return;
        }

        let service = match self.chat_service(namespace.into()) {
            Ok(service) => service,
            Err(e) => {
                self.toast(format!("Chat unavailable: {e}"));
                return;
            }
        };

        self.chat_token = self.chat_token.wrapping_add(1);
        let token = self.chat_token;
        let init_task = {
            let service = service.clone();
            let tx = self.core_sender.clone();
            let (admin_id, resident_id, context_id) =
                (admin_id.clone(), resident_id.clone(), context_id.clone());
            self.runtime.spawn(async move {
                let result = service
                    .create_or_get_room(&admin_id, &resident_id, context_id.as_deref())
                    .await
                    .map_err(|e| e.to_string());
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ChatRoomReady {
                    session: token,
                    result,
                })));
            })
        };

        self.chat = Some(ChatSession {
            token,
            service,
            namespace,
            admin_id,
            resident_id,
            context_id,
            viewer_id,
            viewer_role,
            room: None,
            pending_note,
            init_task: Some(init_task),
            feed_task: None,
        });
        self.state.chat = Some(ChatViewState {
            namespace,
            room_id: None,
            phase: ChatPhase::Initializing,
            messages: vec![],
            draft: String::new(),
            sending: false,
        });
        self.emit_state();
    }

    fn current_chat(&mut self, session: u64) -> Option<&mut ChatSession> {
        self.chat.as_mut().filter(|c| c.token == session)
    }

    pub(super) fn on_chat_room_ready(&mut self, session: u64, result: Result<RoomKey, String>) {
        let Some(chat) = self.current_chat(session) else {
            tracing::debug!(session, "stale room result dropped");
            return;
        };
        chat.init_task = None;
        let room = match result {
            Ok(room) => room,
            Err(e) => {
                // Stays Initializing; reopening the screen retries.
                self.toast(format!("Could not open chat: {e}"));
                return;
            }
        };
        chat.room = Some(room.clone());

        let note = chat.pending_note.clone();
        let service = chat.service.clone();
        let admin_id = chat.admin_id.clone();

        let feed_task = {
            let service = service.clone();
            let room = room.clone();
            let tx = self.core_sender.clone();
            self.runtime.spawn(async move {
                let mut feed = match service.subscribe_messages(&room).await {
                    Ok(feed) => feed,
                    Err(e) => {
                        let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ChatSnapshot {
                            session,
                            result: Err(e.to_string()),
                        })));
                        return;
                    }
                };
                while let Some(item) = feed.next().await {
                    let result = item.map_err(|e| e.to_string());
                    let failed = result.is_err();
                    if tx
                        .send(CoreMsg::Internal(Box::new(InternalEvent::ChatSnapshot {
                            session,
                            result,
                        })))
                        .is_err()
                        || failed
                    {
                        break;
                    }
                }
                tracing::debug!(%room, "message feed ended");
            })
        };
        if let Some(chat) = self.current_chat(session) {
            chat.feed_task = Some(feed_task);
        }

        if let Some(view) = self.state.chat.as_mut() {
            view.room_id = Some(room.to_string());
            view.phase = ChatPhase::Ready;
        }
        self.emit_state();

        if let Some(note) = note {
            let tx = self.core_sender.clone();
            self.runtime.spawn(async move {
                let result = service
                    .append_message(&room, &admin_id, &note, ParticipantRole::Admin)
                    .await
                    .map_err(|e| e.to_string());
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ChatSendFinished {
                    session,
                    is_note: true,
                    result,
                })));
            });
        }
    }

    pub(super) fn on_chat_snapshot(&mut self, session: u64, result: Result<Vec<Message>, String>) {
        let Some(chat) = self.current_chat(session) else {
            return;
        };
        let messages = match result {
            Ok(messages) => messages,
            Err(e) => {
                self.toast(format!("Chat disconnected: {e}"));
                return;
            }
        };
        let viewer_id = chat.viewer_id.clone();
        let needs_mark_read = messages.iter().any(|m| m.is_unread_for(&viewer_id));
        let mark_read = needs_mark_read
            .then(|| chat.room.clone().map(|room| (chat.service.clone(), room)))
            .flatten();

        if let Some(view) = self.state.chat.as_mut() {
            view.phase = ChatPhase::Subscribed;
            view.messages = messages
                .iter()
                .map(|m| message_view(m, &viewer_id))
                .collect();
        }
        self.emit_state();

        if let Some((service, room)) = mark_read {
            self.runtime.spawn(async move {
                if let Err(e) = service.mark_read(&room, &viewer_id).await {
                    tracing::warn!(%room, %e, "mark_read failed");
                }
            });
        }
    }

    pub(super) fn send_chat_message(&mut self) {
        let Some(view) = self.state.chat.as_ref() else {
            return;
        };
        if view.sending {
            return;
        }
        let text = view.draft.trim().to_string();
        if text.is_empty() {
            return;
        }
        let session = self.chat_token;
        let Some((service, room, sender_id, role)) = self.current_chat(session).and_then(|c| {
            c.room
                .clone()
                .map(|room| (c.service.clone(), room, c.viewer_id.clone(), c.viewer_role))
        }) else {
            self.toast("Chat is still connecting");
            return;
        };

        if let Some(view) = self.state.chat.as_mut() {
            view.sending = true;
        }
        self.emit_state();

        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = service
                .append_message(&room, &sender_id, &text, role)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ChatSendFinished {
                session,
                is_note: false,
                result,
            })));
        });
    }

    pub(super) fn on_chat_send_finished(
        &mut self,
        session: u64,
        is_note: bool,
        result: Result<String, String>,
    ) {
        let Some(chat) = self.current_chat(session) else {
            return;
        };

        if is_note {
            match result {
                Ok(id) => {
                    tracing::debug!(message_id = %id, "pending note sent");
                    chat.pending_note = None;
                    let chat = self.chat.as_ref();
                    for screen in self.state.router.screen_stack.iter_mut() {
                        if let Screen::ChatRoom {
                            namespace,
                            admin_id,
                            resident_id,
                            context_id,
                            pending_note,
                        } = screen
                        {
                            let same_room = chat.is_some_and(|c| {
                                c.is_for(*namespace, admin_id, resident_id, context_id.as_deref())
                            });
                            if same_room {
                                *pending_note = None;
                            }
                        }
                    }
                    self.emit_state();
                }
                Err(e) => self.toast(format!("Could not post note: {e}")),
            }
            return;
        }

        let Some(view) = self.state.chat.as_mut() else {
            return;
        };
        view.sending = false;
        match result {
            Ok(_) => {
                view.draft.clear();
                self.emit_state();
            }
            Err(e) => self.toast(format!("Failed to send message: {e}")),
        }
    }

    /// Cancels the room's tasks and drops any result still in flight.
    pub(super) fn close_chat_session(&mut self) {
        self.chat_token = self.chat_token.wrapping_add(1);
        if let Some(chat) = self.chat.take() {
            tracing::debug!(room = ?chat.room.as_ref().map(RoomKey::as_str), "closing chat");
        }
        self.state.chat = None;
    }
}
