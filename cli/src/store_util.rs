use std::sync::Arc;

use anyhow::{Context, Result};
use estate_core::chat::ChatService;
use estate_rtdb_store::RtdbTreeStore;
use estate_store_profiles::{StoreNamespace, profile_for};
use estate_store_traits::TreeStore;

pub fn parse_namespace(raw: &str) -> Result<StoreNamespace> {
    StoreNamespace::parse(raw)
        .with_context(|| format!("unknown namespace {raw:?} (expected general or locker)"))
}

/// Chat service on the realtime-database deployment for `namespace`,
/// optionally pointed at another URL.
pub fn connect_chat(
    namespace: StoreNamespace,
    store_url: Option<&str>,
    auth: Option<String>,
) -> Result<ChatService> {
    let url = profile_for(namespace)
        .resolve_url(store_url)
        .with_context(|| format!("parse store url for {}", namespace.as_str()))?;
    tracing::debug!(namespace = namespace.as_str(), %url, "connecting store");
    let store: Arc<dyn TreeStore> = Arc::new(RtdbTreeStore::new(url, auth));
    ChatService::new(namespace, store).context("build chat service")
}
