mod actions;
pub mod api;
pub mod chat;
mod core;
pub mod credentials;
mod logging;
pub mod payment;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use crate::core::AppServices;
pub use state::*;
pub use updates::*;

/// Return the default `estate_config.json` payload used when no config file exists.
#[uniffi::export]
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

/// Room key for an admin/resident pair, the same on every device.
#[uniffi::export]
pub fn resolve_chat_room_id(
    admin_id: String,
    resident_id: String,
    context_id: Option<String>,
) -> String {
    chat::resolve_room_id(&admin_id, &resident_id, context_id.as_deref()).into_string()
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct EstateApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

#[uniffi::export]
impl EstateApp {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "EstateApp::new() starting");
        Self::start(data_dir, None)
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Forward a URL the OS opened the app with. Unrelated links are ignored.
    pub fn handle_deep_link(&self, url: String) {
        let _ = self
            .core_tx
            .send(CoreMsg::Internal(Box::new(InternalEvent::DeepLinkOpened {
                url,
            })));
    }
}

impl EstateApp {
    /// Start with caller-provided backends instead of the configured ones.
    pub fn with_services(data_dir: String, services: AppServices) -> Arc<Self> {
        Self::start(data_dir, Some(services))
    }

    fn start(data_dir: String, services: Option<AppServices>) -> Arc<Self> {
        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = match crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                services,
            ) {
                Ok(core) => core,
                Err(e) => {
                    tracing::error!(err = %format!("{e:#}"), "app core failed to start");
                    return;
                }
            };
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }
}
