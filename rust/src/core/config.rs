use std::path::Path;
use std::time::Duration;

use estate_store_profiles::{profile_for, StoreNamespace};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::payment::PollConfig;

pub(crate) const CONFIG_FILE: &str = "estate_config.json";
const DEFAULT_API_BASE_URL: &str = "https://api.estate-app.com/api";
const DEFAULT_DEEP_LINK_SCHEME: &str = "estate";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) disable_network: Option<bool>,
    pub(crate) api_base_url: Option<String>,
    pub(crate) general_store_url: Option<String>,
    pub(crate) locker_store_url: Option<String>,
    pub(crate) store_auth_token: Option<String>,
    pub(crate) deep_link_scheme: Option<String>,
    pub(crate) payment_poll_interval_ms: Option<u64>,
    pub(crate) payment_timeout_ms: Option<u64>,
    pub(crate) payment_max_poll_failures: Option<u32>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "malformed config; using defaults");
            AppConfig::default()
        }
    }
}

/// Payload written by `default_config_json()` for a fresh install.
pub(crate) fn default_app_config_json() -> String {
    let config = AppConfig {
        disable_network: Some(false),
        api_base_url: Some(DEFAULT_API_BASE_URL.to_string()),
        deep_link_scheme: Some(DEFAULT_DEEP_LINK_SCHEME.to_string()),
        payment_poll_interval_ms: Some(PollConfig::default().interval.as_millis() as u64),
        payment_timeout_ms: Some(PollConfig::default().timeout.as_millis() as u64),
        payment_max_poll_failures: Some(PollConfig::default().max_consecutive_failures),
        ..AppConfig::default()
    };
    serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl AppConfig {
    pub(crate) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.disable_network {
            return !disable;
        }
        std::env::var("ESTATE_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }

    pub(crate) fn api_base_url(&self) -> &str {
        non_blank(&self.api_base_url).unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub(crate) fn store_url(&self, namespace: StoreNamespace) -> Result<Url, url::ParseError> {
        let override_url = match namespace {
            StoreNamespace::General => non_blank(&self.general_store_url),
            StoreNamespace::Locker => non_blank(&self.locker_store_url),
        };
        profile_for(namespace).resolve_url(override_url)
    }

    pub(crate) fn store_auth_token(&self) -> Option<String> {
        non_blank(&self.store_auth_token).map(str::to_string)
    }

    pub(crate) fn deep_link_scheme(&self) -> &str {
        non_blank(&self.deep_link_scheme).unwrap_or(DEFAULT_DEEP_LINK_SCHEME)
    }

    pub(crate) fn poll_config(&self) -> PollConfig {
        let defaults = PollConfig::default();
        PollConfig {
            interval: self
                .payment_poll_interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            timeout: self
                .payment_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            max_consecutive_failures: self
                .payment_max_poll_failures
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_consecutive_failures),
        }
    }
}
