use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use estate_core::credentials::{CredentialStore, Credentials};
use estate_core::{AppReconciler, AppState, AppUpdate, EstateApp};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn wait_until(what: &str, timeout: Duration, f: impl FnMut() -> bool) {
    wait_until_with_poll(what, timeout, Duration::from_millis(20), f);
}

pub fn wait_until_with_poll(
    what: &str,
    timeout: Duration,
    poll: Duration,
    mut f: impl FnMut() -> bool,
) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(poll);
    }
    panic!("{what}: condition not met within {timeout:?}");
}

/// Block until `app.state()` satisfies `f`, returning that snapshot.
pub fn wait_for_state(
    app: &EstateApp,
    what: &str,
    mut f: impl FnMut(&AppState) -> bool,
) -> AppState {
    let mut last = app.state();
    wait_until(what, WAIT, || {
        last = app.state();
        f(&last)
    });
    last
}

/// Offline config with fast payment polling.
pub fn write_config(data_dir: &str, poll_interval_ms: u64, timeout_ms: u64, max_failures: u32) {
    let path = std::path::Path::new(data_dir).join("estate_config.json");
    let v = serde_json::json!({
        "disable_network": true,
        "deep_link_scheme": "estate",
        "payment_poll_interval_ms": poll_interval_ms,
        "payment_timeout_ms": timeout_ms,
        "payment_max_poll_failures": max_failures,
    });
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

/// Seed a cached session so the app starts signed in.
pub fn write_session(data_dir: &str, user_id: &str, role: &str) {
    CredentialStore::new(data_dir)
        .save(&Credentials {
            token: format!("token-{user_id}"),
            user_id: user_id.to_string(),
            display_name: format!("User {user_id}"),
            role: role.to_string(),
        })
        .unwrap();
}

pub fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

#[derive(Clone)]
pub struct Collector(pub Arc<Mutex<Vec<AppUpdate>>>);

impl Collector {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    /// Every distinct toast, in the order it first appeared.
    pub fn toasts(&self) -> Vec<String> {
        let mut out: Vec<String> = vec![];
        let mut last: Option<String> = None;
        for update in self.0.lock().unwrap().iter() {
            let AppUpdate::FullState(s) = update;
            if s.toast != last {
                if let Some(t) = &s.toast {
                    out.push(t.clone());
                }
                last = s.toast.clone();
            }
        }
        out
    }

    pub fn revs(&self) -> Vec<u64> {
        self.0.lock().unwrap().iter().map(AppUpdate::rev).collect()
    }
}

impl AppReconciler for Collector {
    fn reconcile(&self, update: AppUpdate) {
        self.0.lock().unwrap().push(update);
    }
}
