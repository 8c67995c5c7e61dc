//! Durable key/value storage on the device.
//!
//! The engine only needs single-key reads and writes plus a filtered scan.
//! Multi-step sequences built on top are not atomic; callers that need
//! exclusivity (the outbox) bring their own locks.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::StoreError;

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

pub type ScanFilter<'a> = &'a (dyn Fn(&str, &Value) -> bool + Send + Sync);

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Entries matching `filter`, in key order.
    async fn scan(&self, filter: ScanFilter<'_>) -> Result<Vec<(String, Value)>, StoreError>;
}

pub async fn scan_prefix(
    store: &dyn LocalStore,
    prefix: &str,
) -> Result<Vec<(String, Value)>, StoreError> {
    store
        .scan(&|key: &str, _: &Value| key.starts_with(prefix))
        .await
}

pub async fn load<T: DeserializeOwned>(
    store: &dyn LocalStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => decode(key, value).map(Some),
        None => Ok(None),
    }
}

pub async fn save<T: Serialize + Sync>(
    store: &dyn LocalStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|source| StoreError::Corrupt {
        key: key.to_string(),
        source,
    })?;
    store.put(key, value).await
}

pub fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
        key: key.to_string(),
        source,
    })
}
