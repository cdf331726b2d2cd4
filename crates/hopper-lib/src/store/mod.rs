//! Whole-blob key/value persistence.
//!
//! State lives in one JSON file holding a flat object keyed by
//! [`KEY_SETTINGS`], [`KEY_ACCOUNTS`] and [`KEY_SELECTED_ACCOUNT`]. Every
//! write is read-modify-write of the whole document, last write wins.

pub mod types;

pub use types::{
    default_game_path, total_memory_mb, Account, AccountType, Profile, Settings,
    DEFAULT_MAX_MEMORY_MB, DEFAULT_MIN_MEMORY_MB,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::sync::Mutex;

pub const KEY_SETTINGS: &str = "settings";
pub const KEY_ACCOUNTS: &str = "accounts";
pub const KEY_SELECTED_ACCOUNT: &str = "selectedAccount";

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Fetch and deserialize one key. Missing keys and explicit `null` both
/// come back as `None`.
pub async fn get_typed<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let typed = serde_json::from_value(value)
                .with_context(|| format!("Stored value under {:?} has an unexpected shape", key))?;
            Ok(Some(typed))
        }
    }
}

pub async fn set_typed<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_value(value)
        .with_context(|| format!("Failed to serialize value for {:?}", key))?;
    store.set(key, raw).await
}

/// File-backed store. A corrupt file is logged and replaced with an empty
/// document on the next write instead of wedging the launcher.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read store file {:?}", self.path))
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => {
                log::warn!(
                    "Store file {:?} holds {} instead of an object, starting over",
                    self.path,
                    match other {
                        Value::Array(_) => "an array",
                        _ => "a scalar",
                    }
                );
                Ok(Map::new())
            }
            Err(err) => {
                log::warn!(
                    "Store file {:?} is not valid JSON ({}), starting over",
                    self.path,
                    err
                );
                Ok(Map::new())
            }
        }
    }

    async fn write_document(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create store directory {:?}", parent))?;
            }
        }

        let pretty = serde_json::to_vec_pretty(&Value::Object(document.clone()))?;

        // Write a sibling first and rename so a crash mid-write never
        // truncates the store.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, pretty)
            .await
            .with_context(|| format!("Failed to write store file {:?}", tmp))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace store file {:?}", self.path))?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().await;
        let document = self.read_document().await?;
        Ok(document.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(key.to_string(), value);
        self.write_document(&document).await
    }
}
