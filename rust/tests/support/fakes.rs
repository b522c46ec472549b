use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use estate_core::api::{ApiError, BackendApi, LoginResponse, ResidentDto, UserDto};
use estate_core::payment::{PaymentGateway, PaymentRequest, PaymentTicket, TransactionStatus};
use estate_core::AppServices;
use estate_memory_store::MemoryTreeStore;
use estate_store_traits::{Backend, StoreError, StorePath, Subscription, TreeStore};
use serde_json::{Map, Value};

/// Backend accepting one username; any password works.
pub struct FakeBackend {
    pub user: UserDto,
    pub residents: Vec<ResidentDto>,
    pub logins: AtomicUsize,
}

impl FakeBackend {
    pub fn new(user_id: &str, role: &str, residents: Vec<ResidentDto>) -> Self {
        Self {
            user: UserDto {
                id: user_id.to_string(),
                name: format!("User {user_id}"),
                role: role.to_string(),
            },
            residents,
            logins: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn login(&self, username: &str, _password: &str) -> Result<LoginResponse, ApiError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if username != self.user.id {
            return Err(ApiError::Unauthorized);
        }
        Ok(LoginResponse {
            token: format!("token-{username}"),
            user: self.user.clone(),
        })
    }

    async fn list_residents(&self) -> Result<Vec<ResidentDto>, ApiError> {
        Ok(self.residents.clone())
    }
}

/// Gateway replaying scripted status results; the last one repeats.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<TransactionStatus, ApiError>>>,
    repeat: Mutex<Option<Result<TransactionStatus, ApiError>>>,
    pub status_calls: AtomicUsize,
    pub initiated: Mutex<Vec<PaymentRequest>>,
}

impl ScriptedGateway {
    pub fn new(script: Vec<Result<TransactionStatus, ApiError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: Mutex::new(None),
            status_calls: AtomicUsize::new(0),
            initiated: Mutex::new(vec![]),
        }
    }

    pub fn calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

fn clone_result(r: &Result<TransactionStatus, ApiError>) -> Result<TransactionStatus, ApiError> {
    match r {
        Ok(s) => Ok(s.clone()),
        Err(e) => Err(ApiError::Network(e.to_string())),
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentTicket, ApiError> {
        self.initiated.lock().unwrap().push(request.clone());
        Ok(PaymentTicket {
            transaction_id: "txn-1".to_string(),
            qr_code: "qr-payload".to_string(),
        })
    }

    async fn transaction_status(
        &self,
        _transaction_id: &str,
    ) -> Result<TransactionStatus, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let mut repeat = self.repeat.lock().unwrap();
        match next {
            Some(r) => {
                let out = clone_result(&r);
                *repeat = Some(r);
                out
            }
            None => repeat
                .as_ref()
                .map(clone_result)
                .unwrap_or(Ok(TransactionStatus::Pending)),
        }
    }
}

/// Memory store whose `subscribe` takes `delay` before registering a watcher.
pub struct SlowSubscribeStore {
    pub inner: MemoryTreeStore,
    pub delay: Duration,
    pub subscribe_calls: AtomicUsize,
}

impl SlowSubscribeStore {
    pub fn new(inner: MemoryTreeStore, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            subscribe_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TreeStore for SlowSubscribeStore {
    fn backend(&self) -> Backend {
        self.inner.backend()
    }

    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.inner.set(path, value).await
    }

    async fn update(
        &self,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.inner.update(path, fields).await
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        self.inner.push(path, value).await
    }

    async fn set_if_absent(&self, path: &StorePath, value: Value) -> Result<bool, StoreError> {
        self.inner.set_if_absent(path, value).await
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.subscribe(path).await
    }
}

pub struct Harness {
    pub general: MemoryTreeStore,
    pub locker: MemoryTreeStore,
    pub backend: Arc<FakeBackend>,
    pub gateway: Arc<ScriptedGateway>,
}

impl Harness {
    pub fn new(backend: FakeBackend, gateway: ScriptedGateway) -> Self {
        Self {
            general: MemoryTreeStore::new(),
            locker: MemoryTreeStore::new(),
            backend: Arc::new(backend),
            gateway: Arc::new(gateway),
        }
    }

    pub fn services(&self) -> AppServices {
        AppServices {
            general_store: Arc::new(self.general.clone()),
            locker_store: Arc::new(self.locker.clone()),
            backend: self.backend.clone(),
            payments: self.gateway.clone(),
        }
    }
}
