mod chat_session;
mod config;
mod payment_flow;
mod session;

use std::sync::{Arc, RwLock};

use estate_memory_store::MemoryTreeStore;
use estate_rtdb_store::RtdbTreeStore;
use estate_store_profiles::StoreNamespace;
use estate_store_traits::TreeStore;
use flume::Sender;

use crate::actions::AppAction;
use crate::api::{BackendApi, HttpBackendApi, OfflineBackend};
use crate::chat::{ChatError, ChatService};
use crate::credentials::CredentialStore;
use crate::payment::PaymentGateway;
use crate::state::{AppState, BusyState, Screen};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use chat_session::ChatSession;
pub(crate) use config::default_app_config_json;
use config::AppConfig;
use payment_flow::PaymentFlow;

/// Backends the actor talks to. Built once at start-up and shared by every
/// session; tests swap in memory stores and fakes.
#[derive(Clone)]
pub struct AppServices {
    pub general_store: Arc<dyn TreeStore>,
    pub locker_store: Arc<dyn TreeStore>,
    pub backend: Arc<dyn BackendApi>,
    pub payments: Arc<dyn PaymentGateway>,
}

impl AppServices {
    /// In-process stores and a backend that refuses every call.
    pub fn offline() -> Self {
        Self {
            general_store: Arc::new(MemoryTreeStore::new()),
            locker_store: Arc::new(MemoryTreeStore::new()),
            backend: Arc::new(OfflineBackend),
            payments: Arc::new(OfflineBackend),
        }
    }

    fn from_config(config: &AppConfig, data_dir: &str) -> anyhow::Result<Self> {
        if !config.network_enabled() {
            tracing::info!("network disabled; using offline services");
            return Ok(Self::offline());
        }
        let auth = config.store_auth_token();
        let general = RtdbTreeStore::new(config.store_url(StoreNamespace::General)?, auth.clone());
        let locker = RtdbTreeStore::new(config.store_url(StoreNamespace::Locker)?, auth);
        let api = Arc::new(HttpBackendApi::new(
            config.api_base_url(),
            CredentialStore::new(data_dir),
        ));
        Ok(Self {
            general_store: Arc::new(general),
            locker_store: Arc::new(locker),
            backend: api.clone(),
            payments: api,
        })
    }

    pub fn store(&self, namespace: StoreNamespace) -> Arc<dyn TreeStore> {
        match namespace {
            StoreNamespace::General => self.general_store.clone(),
            StoreNamespace::Locker => self.locker_store.clone(),
        }
    }
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices").finish_non_exhaustive()
    }
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: AppConfig,
    runtime: tokio::runtime::Runtime,
    services: AppServices,
    credentials: CredentialStore,

    // Bumped whenever in-flight work of that kind must be dropped.
    auth_token: u64,
    residents_token: u64,
    chat_token: u64,
    payment_token: u64,

    chat: Option<ChatSession>,
    payment: Option<PaymentFlow>,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        services: Option<AppServices>,
    ) -> anyhow::Result<Self> {
        let config = config::load_app_config(&data_dir);
        let services = match services {
            Some(services) => services,
            None => AppServices::from_config(&config, &data_dir).unwrap_or_else(|e| {
                tracing::error!(%e, "store configuration invalid; falling back to offline services");
                AppServices::offline()
            }),
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()?;

        let mut this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            services,
            credentials: CredentialStore::new(&data_dir),
            auth_token: 0,
            residents_token: 0,
            chat_token: 0,
            payment_token: 0,
            chat: None,
            payment: None,
        };

        // Ensure EstateApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this.restore_session();
        Ok(this)
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Stays in state until the UI clears it, so a resync still shows it.
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_state();
        }
    }

    fn push_screen(&mut self, screen: Screen) {
        if self.state.router.screen_stack.last() != Some(&screen) {
            self.state.router.screen_stack.push(screen);
        }
    }

    fn chat_service(&self, namespace: StoreNamespace) -> Result<Arc<ChatService>, ChatError> {
        Ok(Arc::new(ChatService::new(
            namespace,
            self.services.store(namespace),
        )?))
    }

    /// Tear down sessions whose screen is no longer on the stack.
    fn sync_sessions_to_router(&mut self) {
        let stack = &self.state.router.screen_stack;
        let chat_visible = stack
            .iter()
            .any(|s| matches!(s, Screen::ChatRoom { .. }));
        let payment_visible = stack.iter().any(|s| matches!(s, Screen::Payment { .. }));

        if !chat_visible && (self.chat.is_some() || self.state.chat.is_some()) {
            self.close_chat_session();
        }
        if !payment_visible && (self.payment.is_some() || self.state.payment.is_some()) {
            self.close_payment_flow();
        }
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it can contain a password.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::LoginFinished { token, result } => {
                self.on_login_finished(token, result)
            }
            InternalEvent::ResidentsLoaded { token, result } => {
                self.on_residents_loaded(token, result)
            }
            InternalEvent::ChatRoomReady { session, result } => {
                self.on_chat_room_ready(session, result)
            }
            InternalEvent::ChatSnapshot { session, result } => {
                self.on_chat_snapshot(session, result)
            }
            InternalEvent::ChatSendFinished {
                session,
                is_note,
                result,
            } => self.on_chat_send_finished(session, is_note, result),
            InternalEvent::PaymentInitiated { flow, result } => {
                self.on_payment_initiated(flow, result)
            }
            InternalEvent::PaymentPolled { flow, event } => self.on_payment_polled(flow, event),
            InternalEvent::DeepLinkOpened { url } => self.on_deep_link(&url),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::Login { username, password } => self.login(&username, &password),
            AppAction::Logout => self.logout(),
            AppAction::UpdateScreenStack { stack } => {
                self.state.router.screen_stack = stack;
                self.sync_sessions_to_router();
                self.emit_state();
            }
            AppAction::LoadResidents => self.load_residents(),
            AppAction::OpenChatRoom {
                namespace,
                admin_id,
                resident_id,
                context_id,
                pending_note,
            } => self.open_chat_room(namespace, admin_id, resident_id, context_id, pending_note),
            AppAction::SetChatDraft { text } => {
                if let Some(chat) = self.state.chat.as_mut() {
                    chat.draft = text;
                    self.emit_state();
                }
            }
            AppAction::SendChatMessage => self.send_chat_message(),
            AppAction::CloseChatRoom => {
                self.close_chat_session();
                self.emit_state();
            }
            AppAction::StartPayment {
                apartment_id,
                amount,
                description,
            } => self.start_payment(apartment_id, amount, description),
            AppAction::ClosePayment => {
                self.close_payment_flow();
                self.emit_state();
            }
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
        }
    }
}
