//! Reference in-memory [`StorageHooks`] implementation.
//!
//! Real deployments back the cache and CSP-config documents with a
//! durable key-value store (the reference Python adapter uses a cloud
//! provider's managed storage); that store is an external collaborator
//! per the core's scope. This implementation mirrors the same
//! documents in process memory behind a `tokio::sync::Mutex`, which is
//! enough to drive the event loop end to end in tests and in a
//! from-scratch bootstrap, and exercises the same shallow-merge
//! `update(replace=false)` semantics a real store must honor.

use async_trait::async_trait;
use billing_adapter_core::hooks::StorageHooks;
use billing_adapter_shared::config::Config;
use billing_adapter_shared::error::{AdapterError, AdapterResult};
use billing_adapter_shared::types::{merge_present_fields, Cache, CspConfig};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryStorage {
    cache: Mutex<Option<Cache>>,
    csp_config: Mutex<Option<CspConfig>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn merge_document<T>(existing: Option<T>, patch: &T) -> AdapterResult<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let patch_value = serde_json::to_value(patch)
        .map_err(|e| AdapterError::Storage(format!("serializing patch: {e}")))?;

    let merged_value = match existing {
        Some(existing) => {
            let existing_value = serde_json::to_value(existing)
                .map_err(|e| AdapterError::Storage(format!("serializing existing document: {e}")))?;
            merge_present_fields(existing_value, patch_value)
        }
        None => patch_value,
    };

    serde_json::from_value(merged_value)
        .map_err(|e| AdapterError::Storage(format!("deserializing merged document: {e}")))
}

#[async_trait]
impl StorageHooks for MemoryStorage {
    async fn get_cache(&self, _config: &Config) -> AdapterResult<Option<Cache>> {
        Ok(self.cache.lock().await.clone())
    }

    async fn save_cache(&self, _config: &Config, cache: &Cache) -> AdapterResult<()> {
        *self.cache.lock().await = Some(cache.clone());
        Ok(())
    }

    async fn update_cache(&self, _config: &Config, cache: &Cache, replace: bool) -> AdapterResult<()> {
        let mut slot = self.cache.lock().await;
        let next = if replace {
            cache.clone()
        } else {
            merge_document(slot.clone(), cache)?
        };
        *slot = Some(next);
        Ok(())
    }

    async fn get_csp_config(&self, _config: &Config) -> AdapterResult<Option<CspConfig>> {
        Ok(self.csp_config.lock().await.clone())
    }

    async fn save_csp_config(&self, _config: &Config, csp_config: &CspConfig) -> AdapterResult<()> {
        *self.csp_config.lock().await = Some(csp_config.clone());
        Ok(())
    }

    async fn update_csp_config(
        &self,
        _config: &Config,
        csp_config: &CspConfig,
        replace: bool,
    ) -> AdapterResult<()> {
        let mut slot = self.csp_config.lock().await;
        let next = if replace {
            csp_config.clone()
        } else {
            merge_document(slot.clone(), csp_config)?
        };
        *slot = Some(next);
        Ok(())
    }
}
