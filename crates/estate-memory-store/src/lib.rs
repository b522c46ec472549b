//! Memory-based implementation of the [`TreeStore`] trait.
//!
//! Everything lives in one JSON tree behind a `parking_lot` lock. Writes
//! resolve server timestamps against an injectable clock, notify overlapping
//! subscribers synchronously, and can be made to fail for tests that exercise
//! network-error paths.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use estate_store_traits::server_value::resolve_server_values;
use estate_store_traits::tree::{node_at, write_at};
use estate_store_traits::{
    Backend, PushIdGenerator, SnapshotEvent, StoreError, StorePath, Subscription, TreeStore,
};
use flume::Sender;
use parking_lot::RwLock;
use serde_json::{Map, Value};

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

struct Watcher {
    path: StorePath,
    tx: Sender<SnapshotEvent>,
}

#[derive(Default)]
struct Faults {
    offline: bool,
    failing_prefixes: Vec<StorePath>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    watchers: HashMap<u64, Watcher>,
    next_watcher_id: u64,
    push_ids: PushIdGenerator,
    writes: u64,
    faults: Faults,
}

impl Inner {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.faults.offline {
            return Err(StoreError::Network("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self, paths: &[StorePath]) -> Result<(), StoreError> {
        self.check_online()?;
        for path in paths {
            if self
                .faults
                .failing_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix))
            {
                return Err(StoreError::Network(format!("injected write failure at {path}")));
            }
        }
        Ok(())
    }

    fn notify(&mut self, written: &[StorePath]) {
        let root = &self.root;
        self.watchers.retain(|_, watcher| {
            if !written.iter().any(|p| p.overlaps(&watcher.path)) {
                return true;
            }
            let snapshot = node_at(root, &watcher.path).cloned();
            watcher.tx.send(Ok(snapshot)).is_ok()
        });
    }
}

/// In-memory tree store.
///
/// Cloning yields another handle on the same tree.
#[derive(Clone)]
pub struct MemoryTreeStore {
    inner: Arc<RwLock<Inner>>,
    clock: Clock,
}

impl Default for MemoryTreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryTreeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MemoryTreeStore")
            .field("writes", &inner.writes)
            .field("watchers", &inner.watchers.len())
            .finish()
    }
}

impl MemoryTreeStore {
    /// Empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(system_now_ms)
    }

    /// Empty store whose server timestamps come from `clock` (epoch ms).
    pub fn with_clock(clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            clock: Arc::new(clock),
        }
    }

    /// Make every operation fail with a network error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.inner.write().faults.offline = offline;
    }

    /// Make writes at or below `prefix` fail with a network error.
    pub fn fail_writes_under(&self, prefix: StorePath) {
        self.inner.write().faults.failing_prefixes.push(prefix);
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.inner.write().faults = Faults::default();
    }

    /// Number of successful write operations so far.
    pub fn write_count(&self) -> u64 {
        self.inner.read().writes
    }

    /// Number of live subscriptions.
    pub fn watcher_count(&self) -> usize {
        self.inner.read().watchers.len()
    }

    /// Copy of the whole tree.
    pub fn dump(&self) -> Value {
        self.inner.read().root.clone()
    }

    fn now_ms(&self) -> i64 {
        (self.clock)()
    }

    fn apply(&self, writes: Vec<(StorePath, Value)>) -> Result<(), StoreError> {
        let now = self.now_ms();
        let mut inner = self.inner.write();
        let paths: Vec<StorePath> = writes.iter().map(|(p, _)| p.clone()).collect();
        inner.check_writable(&paths)?;
        for (path, value) in writes {
            write_at(&mut inner.root, &path, resolve_server_values(value, now));
        }
        inner.writes += 1;
        inner.notify(&paths);
        Ok(())
    }
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let inner = self.inner.read();
        inner.check_online()?;
        Ok(node_at(&inner.root, path).cloned())
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.apply(vec![(path.clone(), value)])
    }

    async fn update(
        &self,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut writes = Vec::with_capacity(fields.len());
        for (relative, value) in fields {
            writes.push((path.join(&relative)?, value));
        }
        if writes.is_empty() {
            return Ok(());
        }
        self.apply(writes)
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        let now = self.now_ms();
        let mut inner = self.inner.write();
        inner.check_writable(std::slice::from_ref(path))?;
        let key = inner.push_ids.next_id(now);
        let target = path.child(&key)?;
        write_at(&mut inner.root, &target, resolve_server_values(value, now));
        inner.writes += 1;
        inner.notify(&[target]);
        Ok(key)
    }

    async fn set_if_absent(&self, path: &StorePath, value: Value) -> Result<bool, StoreError> {
        let now = self.now_ms();
        let mut inner = self.inner.write();
        inner.check_online()?;
        if node_at(&inner.root, path).is_some() {
            return Ok(false);
        }
        inner.check_writable(std::slice::from_ref(path))?;
        write_at(&mut inner.root, path, resolve_server_values(value, now));
        inner.writes += 1;
        inner.notify(std::slice::from_ref(path));
        Ok(true)
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        let (tx, rx) = flume::unbounded();
        let id = {
            let mut inner = self.inner.write();
            inner.check_online()?;
            let id = inner.next_watcher_id;
            inner.next_watcher_id += 1;
            let _ = tx.send(Ok(node_at(&inner.root, path).cloned()));
            inner.watchers.insert(
                id,
                Watcher {
                    path: path.clone(),
                    tx,
                },
            );
            id
        };
        tracing::trace!(%path, id, "memory store subscription opened");

        let weak: Weak<RwLock<Inner>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(path.clone(), rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.write().watchers.remove(&id);
            }
        }))
    }
}

fn system_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
