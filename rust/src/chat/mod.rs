//! Admin/resident chat rooms on top of a tree store.

mod error;
mod model;
mod ordering;
mod room_id;
mod service;

pub use error::ChatError;
pub use model::{Message, Participant, ParticipantRole, Room};
pub use ordering::{normalize_timestamp_ms, order_messages, read_receipt, ReadReceipt};
pub use room_id::{resolve_room_id, RoomKey};
pub use service::{ChatService, MessageFeed};
