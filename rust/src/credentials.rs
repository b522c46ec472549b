use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub role: String,
}

/// Signed-in session cached in the app data dir.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(CREDENTIALS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached credentials; unreadable or malformed files count as signed out.
    pub fn load(&self) -> Option<Credentials> {
        let bytes = std::fs::read(&self.path).ok()?;
        match serde_json::from_slice::<Credentials>(&bytes) {
            Ok(c) if !c.token.trim().is_empty() => Some(c),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(%e, path = %self.path.display(), "ignoring malformed credentials");
                None
            }
        }
    }

    pub fn token(&self) -> Option<String> {
        self.load().map(|c| c.token)
    }

    pub fn save(&self, credentials: &Credentials) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create data dir {}", dir.display()))?;
        }
        let json = serde_json::to_vec_pretty(credentials).context("encode credentials")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", self.path.display())),
        }
    }
}
