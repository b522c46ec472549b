//! Estate store - the tree-store abstraction behind the chat rooms.
//!
//! A store is a hierarchical key/value tree in the style of a realtime
//! database: point reads, whole-node writes, multi-path updates, push-id
//! appends, compare-and-set creation and live subscriptions that deliver the
//! full node on every change.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use async_trait::async_trait;
use serde_json::{Map, Value};

pub mod error;
pub mod path;
pub mod push_id;
pub mod server_value;
pub mod subscription;
pub mod tree;

pub use error::StoreError;
pub use path::StorePath;
pub use push_id::PushIdGenerator;
pub use server_value::ServerValue;
pub use subscription::{SnapshotEvent, Subscription};

/// Which kind of store answers the requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-process memory tree
    Memory,
    /// Remote realtime database reached over REST
    Rtdb,
}

/// Tree store used by the chat service.
///
/// Writes accept [`ServerValue::timestamp`] placeholders anywhere in the
/// written value; the store resolves them against its own clock. Writing
/// `null` deletes a node, and nodes left without children disappear.
#[async_trait]
pub trait TreeStore: Send + Sync + 'static {
    /// Returns the backend type.
    fn backend(&self) -> Backend;

    /// Read the node at `path`. `None` when nothing is stored there.
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError>;

    /// Replace the node at `path`.
    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Apply several writes below `path` in one request.
    ///
    /// Keys of `fields` are paths relative to `path` and may contain `/`.
    async fn update(&self, path: &StorePath, fields: Map<String, Value>)
    -> Result<(), StoreError>;

    /// Append `value` under a freshly allocated push id and return the id.
    ///
    /// Push ids sort lexicographically in allocation order.
    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError>;

    /// Write `value` at `path` only if nothing is stored there yet.
    ///
    /// Returns `true` when this call created the node. Backends with a
    /// conditional-write primitive use it; the others fall back to
    /// check-then-create, which converges because the write is a whole-node
    /// overwrite with identical content.
    async fn set_if_absent(&self, path: &StorePath, value: Value) -> Result<bool, StoreError>;

    /// Open a live subscription on `path`.
    ///
    /// The current node is delivered first, then the full node again after
    /// every change under it.
    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError>;
}
