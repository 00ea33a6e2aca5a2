//! File-backed credential store
//!
//! Holds the raw key-value entries in memory behind a tokio Mutex and mirrors
//! every change to disk with an atomic temp-file + rename. Entries are kept
//! as raw strings and parsed on `get`, so a corrupted entry degrades to "no
//! credential" instead of failing the caller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::credential::Credential;
use crate::error::{Error, Result};

/// Key under which the credential is stored.
pub const CREDENTIAL_KEY: &str = "auth_token";

type Entries = BTreeMap<String, String>;

/// Thread-safe credential store.
///
/// `path` is `None` for a purely in-memory store.
pub struct CredentialStore {
    path: Option<PathBuf>,
    entries: Mutex<Entries>,
}

impl CredentialStore {
    /// Open the key-value file at `path`.
    ///
    /// A missing file is created as `{}`. A file that does not hold a JSON
    /// object of strings is logged and replaced on the next write.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            match serde_json::from_str::<Entries>(&contents) {
                Ok(entries) => {
                    info!(path = %path.display(), entries = entries.len(), "loaded credential store");
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "credential file is corrupted, starting empty");
                    Entries::new()
                }
            }
        } else {
            info!(path = %path.display(), "credential file not found, starting with empty store");
            let entries = Entries::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// Store without a backing file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Entries::new()),
        }
    }

    /// Current credential, or `None` if absent or unparseable.
    pub async fn get(&self) -> Option<Credential> {
        let entries = self.entries.lock().await;
        let raw = entries.get(CREDENTIAL_KEY)?;
        match serde_json::from_str::<Credential>(raw) {
            Ok(credential) => Some(credential),
            Err(e) => {
                warn!(error = %e, "stored credential is corrupted, treating as absent");
                None
            }
        }
    }

    /// Replace the stored credential and persist.
    ///
    /// The in-memory entry is updated even if the disk write fails, so the
    /// running process keeps using the new credential.
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        let raw = serde_json::to_string(credential)
            .map_err(|e| Error::Serialize(format!("serializing credential: {e}")))?;
        let mut entries = self.entries.lock().await;
        entries.insert(CREDENTIAL_KEY.to_string(), raw);
        debug!("saved credential");
        self.persist(&entries).await
    }

    /// Remove the stored credential and persist.
    pub async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(CREDENTIAL_KEY).is_some() {
            debug!("cleared credential");
            self.persist(&entries).await?;
        }
        Ok(())
    }

    async fn persist(&self, entries: &Entries) -> Result<()> {
        match &self.path {
            Some(path) => write_atomic(path, entries).await,
            None => Ok(()),
        }
    }

    #[cfg(test)]
    async fn put_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
    }
}

/// Write the entries atomically with 0600 permissions on unix.
async fn write_atomic(path: &Path, entries: &Entries) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| Error::Serialize(format!("serializing credential file: {e}")))?;

    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credential store");
    Ok(())
}
