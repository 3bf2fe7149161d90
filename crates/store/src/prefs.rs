//! Small key-value settings kept next to the data files: the controller's
//! Bluetooth address and when it was last synced.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::error;

use crate::error::{Result, StoreError};
use crate::storage::{read_blocking, Storage};
use crate::writer::FileWriter;

pub const PREFS_FILE: &str = "preferences.toml";

pub const DEFAULT_DEVICE_ADDRESS: &str = "00:00:00:00:00:00";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_device_address")]
    pub device_address: String,
    #[serde(default)]
    pub last_sync: String,
}

fn default_device_address() -> String {
    DEFAULT_DEVICE_ADDRESS.to_string()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            device_address: default_device_address(),
            last_sync: String::new(),
        }
    }
}

/// Six colon-separated two-digit hex octets, e.g. `98:D3:31:F5:2A:10`.
pub fn is_device_address(s: &str) -> bool {
    let octets: Vec<&str> = s.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

pub struct PreferenceStore {
    storage: Arc<dyn Storage>,
    writer: FileWriter,
    inner: Mutex<Preferences>,
}

impl PreferenceStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            writer: FileWriter::spawn(Arc::clone(&storage)),
            storage,
            inner: Mutex::new(Preferences::default()),
        }
    }

    /// Missing file means defaults; nothing is written until a setter runs.
    pub async fn load(&self) -> Result<Preferences> {
        let mut inner = self.inner.lock().await;
        let contents = read_blocking(&self.storage, PREFS_FILE)
            .await
            .map_err(|e| StoreError::storage(PREFS_FILE, e))?;
        let prefs = match contents {
            Some(s) => toml::from_str(&s).map_err(|e| StoreError::storage(PREFS_FILE, e))?,
            None => Preferences::default(),
        };
        *inner = prefs.clone();
        Ok(prefs)
    }

    pub async fn get(&self) -> Preferences {
        self.inner.lock().await.clone()
    }

    pub async fn device_address(&self) -> String {
        self.inner.lock().await.device_address.clone()
    }

    pub async fn set_device_address(&self, address: &str) -> Result<()> {
        if !is_device_address(address) {
            return Err(StoreError::Format(format!(
                "'{address}' is not a device address (expected XX:XX:XX:XX:XX:XX)"
            )));
        }
        let mut inner = self.inner.lock().await;
        inner.device_address = address.to_ascii_uppercase();
        self.persist(&inner);
        Ok(())
    }

    pub async fn last_sync(&self) -> String {
        self.inner.lock().await.last_sync.clone()
    }

    pub async fn set_last_sync(&self, stamp: &str) {
        let mut inner = self.inner.lock().await;
        inner.last_sync = stamp.to_string();
        self.persist(&inner);
    }

    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    fn persist(&self, prefs: &Preferences) {
        match toml::to_string(prefs) {
            Ok(s) => self.writer.write(PREFS_FILE, s),
            Err(e) => error!(file = PREFS_FILE, "failed to encode preferences: {e}"),
        }
    }
}
